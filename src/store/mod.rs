//! Persistence seam.
//!
//! The core never talks to a database directly. It sees [`AccountStore`] and
//! [`ActionTokenStore`]; [`postgres::PgStore`] and [`memory::MemoryStore`] are
//! the two adapters, and [`BoundedStore`] puts a deadline on every call.

pub mod memory;
pub mod postgres;

use crate::{
    action_token::{ActionToken, Purpose},
    credential::EncodedCredential,
    lockout::LoginState,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("unique constraint violated")]
    Conflict,
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Persisted account record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub credential: EncodedCredential,
    pub verified: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub failed_attempts: u32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Account {
    /// New unverified account with a fresh `UUIDv7` id.
    #[must_use]
    pub fn new(
        email: impl Into<String>,
        name: impl Into<String>,
        credential: EncodedCredential,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            email: email.into(),
            name: name.into(),
            credential,
            verified: false,
            verified_at: None,
            failed_attempts: 0,
            locked_until: None,
            last_login: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[must_use]
    pub fn login_state(&self) -> LoginState {
        LoginState {
            failed_attempts: self.failed_attempts,
            locked_until: self.locked_until,
        }
    }
}

/// Lockout counters to write with compare-and-set. `last_login` is only
/// written when present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoginStateUpdate {
    pub state: LoginState,
    pub last_login: Option<DateTime<Utc>>,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// # Errors
    /// `Conflict` when the email is already registered.
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    /// Lookup by normalised email.
    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// Writes the lockout counters iff the stored version still equals
    /// `expected_version`. Returns `false` when another writer got there first.
    async fn update_login_state(
        &self,
        id: Uuid,
        expected_version: i64,
        update: &LoginStateUpdate,
    ) -> Result<bool, StoreError>;

    /// Replaces the credential without touching the lockout counters.
    async fn set_credential(
        &self,
        id: Uuid,
        credential: &EncodedCredential,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn mark_verified(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Replaces the credential and clears failed attempts and any lock.
    async fn reset_credential(
        &self,
        id: Uuid,
        credential: &EncodedCredential,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[async_trait]
pub trait ActionTokenStore: Send + Sync {
    /// Stores a new token. Spent or expired tokens of the same account and
    /// purpose, and any dead token holding the same secret, are purged first,
    /// so only live tokens compete for the secret space.
    ///
    /// # Errors
    /// `Conflict` when a live token already holds the secret for the purpose.
    async fn insert_action_token(&self, token: &ActionToken) -> Result<(), StoreError>;

    /// Atomically marks the matching token used iff it is unused and
    /// `now < expires_at`, returning it. `None` covers every other case.
    async fn claim_action_token(
        &self,
        secret_hash: &[u8],
        purpose: Purpose,
        now: DateTime<Utc>,
    ) -> Result<Option<ActionToken>, StoreError>;

    /// Creation time of the newest token for the account and purpose.
    async fn last_action_token_at(
        &self,
        account_id: Uuid,
        purpose: Purpose,
    ) -> Result<Option<DateTime<Utc>>, StoreError>;
}

pub trait Store: AccountStore + ActionTokenStore {}

impl<T: AccountStore + ActionTokenStore + ?Sized> Store for T {}

/// Applies a deadline to every call of the wrapped store.
pub struct BoundedStore {
    inner: Arc<dyn Store>,
    limit: Duration,
}

impl BoundedStore {
    #[must_use]
    pub fn new(inner: Arc<dyn Store>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        tokio::time::timeout(self.limit, call)
            .await
            .map_err(|_| StoreError::Timeout(self.limit))?
    }
}

#[async_trait]
impl AccountStore for BoundedStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.bounded(self.inner.insert_account(account)).await
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        self.bounded(self.inner.find_account_by_id(id)).await
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.bounded(self.inner.find_account_by_email(email)).await
    }

    async fn update_login_state(
        &self,
        id: Uuid,
        expected_version: i64,
        update: &LoginStateUpdate,
    ) -> Result<bool, StoreError> {
        self.bounded(self.inner.update_login_state(id, expected_version, update))
            .await
    }

    async fn set_credential(
        &self,
        id: Uuid,
        credential: &EncodedCredential,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.bounded(self.inner.set_credential(id, credential, at))
            .await
    }

    async fn mark_verified(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.bounded(self.inner.mark_verified(id, at)).await
    }

    async fn reset_credential(
        &self,
        id: Uuid,
        credential: &EncodedCredential,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.bounded(self.inner.reset_credential(id, credential, at))
            .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded(self.inner.ping()).await
    }
}

#[async_trait]
impl ActionTokenStore for BoundedStore {
    async fn insert_action_token(&self, token: &ActionToken) -> Result<(), StoreError> {
        self.bounded(self.inner.insert_action_token(token)).await
    }

    async fn claim_action_token(
        &self,
        secret_hash: &[u8],
        purpose: Purpose,
        now: DateTime<Utc>,
    ) -> Result<Option<ActionToken>, StoreError> {
        self.bounded(self.inner.claim_action_token(secret_hash, purpose, now))
            .await
    }

    async fn last_action_token_at(
        &self,
        account_id: Uuid,
        purpose: Purpose,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.bounded(self.inner.last_action_token_at(account_id, purpose))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StalledStore;

    #[async_trait]
    impl AccountStore for StalledStore {
        async fn insert_account(&self, _account: &Account) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn find_account_by_id(&self, _id: Uuid) -> Result<Option<Account>, StoreError> {
            std::future::pending().await
        }

        async fn find_account_by_email(&self, _email: &str) -> Result<Option<Account>, StoreError> {
            std::future::pending().await
        }

        async fn update_login_state(
            &self,
            _id: Uuid,
            _expected_version: i64,
            _update: &LoginStateUpdate,
        ) -> Result<bool, StoreError> {
            std::future::pending().await
        }

        async fn set_credential(
            &self,
            _id: Uuid,
            _credential: &EncodedCredential,
            _at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn mark_verified(&self, _id: Uuid, _at: DateTime<Utc>) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn reset_credential(
            &self,
            _id: Uuid,
            _credential: &EncodedCredential,
            _at: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl ActionTokenStore for StalledStore {
        async fn insert_action_token(&self, _token: &ActionToken) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn claim_action_token(
            &self,
            _secret_hash: &[u8],
            _purpose: Purpose,
            _now: DateTime<Utc>,
        ) -> Result<Option<ActionToken>, StoreError> {
            std::future::pending().await
        }

        async fn last_action_token_at(
            &self,
            _account_id: Uuid,
            _purpose: Purpose,
        ) -> Result<Option<DateTime<Utc>>, StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn bounded_store_times_out() {
        let store = BoundedStore::new(Arc::new(StalledStore), Duration::from_millis(20));
        let result = store.find_account_by_email("user@example.com").await;
        assert!(matches!(result, Err(StoreError::Timeout(_))));
    }

    #[tokio::test]
    async fn bounded_store_passes_results_through() -> anyhow::Result<()> {
        let memory: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let store = BoundedStore::new(memory, DEFAULT_STORE_TIMEOUT);
        let account = Account::new(
            "user@example.com",
            "User",
            EncodedCredential::new("$argon2id$v=19$m=8,t=1,p=1$c2FsdHNhbHQ$a2V5a2V5"),
            Utc::now(),
        );
        store.insert_account(&account).await?;
        let found = store.find_account_by_email("user@example.com").await?;
        assert_eq!(found.map(|a| a.id), Some(account.id));
        Ok(())
    }

    #[test]
    fn new_account_is_unverified_and_unlocked() {
        let now = Utc::now();
        let account = Account::new(
            "user@example.com",
            "User",
            EncodedCredential::new("x"),
            now,
        );
        assert!(!account.verified);
        assert_eq!(account.login_state(), LoginState::default());
        assert_eq!(account.created_at, now);
        assert_eq!(account.version, 0);
        assert_eq!(account.id.get_version_num(), 7);
    }
}
