//! Login orchestration.
//!
//! ```text
//! lookup ──► lock check ──► verify ──► verified? ──► record success ──► session
//!   │            │            │           │
//!   └ Invalid    └ Locked     └ Invalid   └ Unverified
//!                             (counts as a failure)
//! ```
//!
//! Unknown emails and wrong passwords are indistinguishable to the caller. A
//! locked account is rejected before the password is looked at, so lockout
//! also caps the hashing work an attacker can force.

use crate::{
    clock::Clock,
    credential::{self, CredentialVerifier, EncodedCredential},
    error::AuthError,
    lockout::{LockoutPolicy, LockoutStatus},
    session::SessionIssuer,
    store::{Account, LoginStateUpdate, Store},
    validation::normalize_email,
};
use chrono::{DateTime, Utc};
use std::{fmt, sync::Arc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Compare-and-set attempts for the lockout counters.
const MAX_CAS_ATTEMPTS: usize = 3;

/// Why a login collapsed into `InvalidCredentials`. Logged, never returned to
/// the client.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MismatchReason {
    UnknownEmail,
    WrongPassword,
    CorruptCredential,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnknownEmail => "unknown email",
            Self::WrongPassword => "wrong password",
            Self::CorruptCredential => "stored credential unreadable",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginRejection {
    InvalidCredentials { detail: MismatchReason },
    AccountLocked { until: DateTime<Utc> },
    AccountUnverified { email: String },
}

#[derive(Clone, Debug)]
pub struct LoginGrant {
    pub token: String,
    pub account_id: Uuid,
    pub email: String,
    pub name: String,
}

#[derive(Clone, Debug)]
pub enum LoginOutcome {
    Accepted(LoginGrant),
    Rejected(LoginRejection),
}

impl LoginOutcome {
    fn invalid(detail: MismatchReason) -> Self {
        Self::Rejected(LoginRejection::InvalidCredentials { detail })
    }
}

pub struct LoginOrchestrator {
    store: Arc<dyn Store>,
    verifier: Arc<dyn CredentialVerifier>,
    sessions: Arc<SessionIssuer>,
    policy: LockoutPolicy,
    clock: Arc<dyn Clock>,
}

impl LoginOrchestrator {
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        verifier: Arc<dyn CredentialVerifier>,
        sessions: Arc<SessionIssuer>,
        policy: LockoutPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            verifier,
            sessions,
            policy,
            clock,
        }
    }

    /// Runs one login attempt.
    ///
    /// # Errors
    /// Only faults are errors (store unavailable, signing failure). Every
    /// business rejection is an `Ok(LoginOutcome::Rejected(..))`.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email);
        let Some(account) = self.store.find_account_by_email(&email).await? else {
            // Spend the same Argon2 work as a real verification.
            if let Err(err) = credential::hash_password(&self.verifier, password).await {
                debug!("timing equaliser hash failed: {err}");
            }
            debug!(reason = %MismatchReason::UnknownEmail, "login rejected");
            return Ok(LoginOutcome::invalid(MismatchReason::UnknownEmail));
        };

        let now = self.clock.now();
        if let LockoutStatus::Locked { until } = self.policy.evaluate(&account.login_state(), now) {
            debug!(account_id = %account.id, %until, "login rejected, account locked");
            return Ok(LoginOutcome::Rejected(LoginRejection::AccountLocked {
                until,
            }));
        }

        let matched =
            match credential::verify_password(&self.verifier, password, &account.credential).await
            {
                Ok(matched) => matched,
                Err(AuthError::Credential(err)) => {
                    error!(account_id = %account.id, "stored credential is unreadable: {err}");
                    return Ok(LoginOutcome::invalid(MismatchReason::CorruptCredential));
                }
                Err(err) => return Err(err),
            };

        if !matched {
            self.record_failure(account, now).await?;
            debug!(reason = %MismatchReason::WrongPassword, "login rejected");
            return Ok(LoginOutcome::invalid(MismatchReason::WrongPassword));
        }

        if !account.verified {
            debug!(account_id = %account.id, "login rejected, email not verified");
            return Ok(LoginOutcome::Rejected(LoginRejection::AccountUnverified {
                email: account.email,
            }));
        }

        self.record_success(&account, now).await?;
        let token = self.sessions.issue(account.id)?;

        match self.verifier.needs_rehash(&account.credential) {
            Ok(true) => self.spawn_rehash(account.id, password, account.credential.clone()),
            Ok(false) => {}
            Err(err) => warn!(account_id = %account.id, "rehash check failed: {err}"),
        }

        info!(account_id = %account.id, "login succeeded");
        Ok(LoginOutcome::Accepted(LoginGrant {
            token,
            account_id: account.id,
            email: account.email,
            name: account.name,
        }))
    }

    async fn record_failure(&self, mut account: Account, now: DateTime<Utc>) -> Result<(), AuthError> {
        for _ in 0..MAX_CAS_ATTEMPTS {
            let next = self.policy.on_failure(&account.login_state(), now);
            let update = LoginStateUpdate {
                state: next,
                last_login: None,
                at: now,
            };
            if self
                .store
                .update_login_state(account.id, account.version, &update)
                .await?
            {
                if next.locked_until != account.locked_until && next.locked_until.is_some() {
                    info!(account_id = %account.id, "account locked after repeated failures");
                }
                return Ok(());
            }

            match self.store.find_account_by_id(account.id).await? {
                Some(fresh) => account = fresh,
                None => return Ok(()),
            }

            // A concurrent attempt may have locked the account in between.
            if let LockoutStatus::Locked { .. } = self.policy.evaluate(&account.login_state(), now) {
                debug!(account_id = %account.id, "account locked concurrently, failure not recorded");
                return Ok(());
            }
        }

        warn!(account_id = %account.id, "lost lockout counter update after {MAX_CAS_ATTEMPTS} attempts");
        Ok(())
    }

    async fn record_success(&self, account: &Account, now: DateTime<Utc>) -> Result<(), AuthError> {
        let update = LoginStateUpdate {
            state: self.policy.on_success(),
            last_login: Some(now),
            at: now,
        };
        let mut version = account.version;
        for _ in 0..MAX_CAS_ATTEMPTS {
            if self
                .store
                .update_login_state(account.id, version, &update)
                .await?
            {
                return Ok(());
            }
            match self.store.find_account_by_id(account.id).await? {
                Some(fresh) => version = fresh.version,
                None => return Ok(()),
            }
        }

        warn!(account_id = %account.id, "lost login success update after {MAX_CAS_ATTEMPTS} attempts");
        Ok(())
    }

    /// Upgrades the stored credential to the current parameters in the
    /// background. Failures only log.
    fn spawn_rehash(&self, account_id: Uuid, password: &str, previous: EncodedCredential) {
        let store = Arc::clone(&self.store);
        let verifier = Arc::clone(&self.verifier);
        let clock = Arc::clone(&self.clock);
        let password = password.to_owned();

        tokio::spawn(async move {
            let result = async {
                let upgraded = credential::hash_password(&verifier, &password).await?;
                // Skip if the credential changed meanwhile (e.g. a password reset).
                let current = store.find_account_by_id(account_id).await?;
                if current.is_some_and(|account| account.credential == previous) {
                    store
                        .set_credential(account_id, &upgraded, clock.now())
                        .await?;
                }
                Ok::<(), AuthError>(())
            }
            .await;

            match result {
                Ok(()) => debug!(%account_id, "credential rehashed"),
                Err(err) => warn!(%account_id, "credential rehash failed: {err}"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        clock::FixedClock,
        credential::{Argon2Verifier, CredentialError, PasswordParams, encode, test_support::cheap_params},
        session::{DEFAULT_AUDIENCE, DEFAULT_ISSUER, SigningSecret},
        store::{AccountStore, MemoryStore},
    };
    use chrono::Duration;
    use secrecy::SecretString;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PASSWORD: &str = "Correct-Horse-Battery-9";

    /// Wraps the real verifier and counts calls to `verify`.
    struct CountingVerifier {
        inner: Argon2Verifier,
        calls: AtomicUsize,
        hashes: AtomicUsize,
    }

    impl CredentialVerifier for CountingVerifier {
        fn verify(&self, password: &str, encoded: &EncodedCredential) -> Result<bool, CredentialError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.verify(password, encoded)
        }

        fn needs_rehash(&self, encoded: &EncodedCredential) -> Result<bool, CredentialError> {
            self.inner.needs_rehash(encoded)
        }

        fn hash(&self, password: &str) -> Result<EncodedCredential, CredentialError> {
            self.hashes.fetch_add(1, Ordering::SeqCst);
            self.inner.hash(password)
        }
    }

    struct Fixture {
        clock: Arc<FixedClock>,
        store: Arc<MemoryStore>,
        verifier: Arc<CountingVerifier>,
        sessions: Arc<SessionIssuer>,
        orchestrator: LoginOrchestrator,
    }

    fn fixture() -> anyhow::Result<Fixture> {
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let store = Arc::new(MemoryStore::new());
        let verifier = Arc::new(CountingVerifier {
            inner: Argon2Verifier::new(cheap_params()),
            calls: AtomicUsize::new(0),
            hashes: AtomicUsize::new(0),
        });
        let secret = SigningSecret::new(SecretString::from(
            "0123456789abcdef0123456789abcdef".to_string(),
        ))?;
        let sessions = Arc::new(SessionIssuer::new(
            secret,
            DEFAULT_ISSUER,
            DEFAULT_AUDIENCE,
            clock.clone(),
        ));
        let orchestrator = LoginOrchestrator::new(
            store.clone(),
            verifier.clone(),
            sessions.clone(),
            LockoutPolicy::default(),
            clock.clone(),
        );
        Ok(Fixture {
            clock,
            store,
            verifier,
            sessions,
            orchestrator,
        })
    }

    async fn seed(fx: &Fixture, verified: bool, params: &PasswordParams) -> anyhow::Result<Account> {
        let mut account = Account::new(
            "user@example.com",
            "User",
            encode(PASSWORD, params)?,
            fx.clock.now(),
        );
        account.verified = verified;
        fx.store.insert_account(&account).await?;
        Ok(account)
    }

    async fn stored(fx: &Fixture, id: Uuid) -> anyhow::Result<Account> {
        fx.store
            .find_account_by_id(id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("account {id} missing"))
    }

    #[tokio::test]
    async fn valid_login_issues_session() -> anyhow::Result<()> {
        let fx = fixture()?;
        let account = seed(&fx, true, &cheap_params()).await?;

        let grant = match fx.orchestrator.login("  USER@example.com ", PASSWORD).await? {
            LoginOutcome::Accepted(grant) => grant,
            LoginOutcome::Rejected(rejection) => anyhow::bail!("unexpected rejection: {rejection:?}"),
        };
        assert_eq!(grant.account_id, account.id);
        assert_eq!(fx.sessions.validate(&grant.token)?, account.id);

        let after = stored(&fx, account.id).await?;
        assert_eq!(after.last_login, Some(fx.clock.now()));
        assert_eq!(after.failed_attempts, 0);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_email_is_invalid_credentials() -> anyhow::Result<()> {
        let fx = fixture()?;
        let outcome = fx.orchestrator.login("nobody@example.com", PASSWORD).await?;
        assert!(matches!(
            outcome,
            LoginOutcome::Rejected(LoginRejection::InvalidCredentials {
                detail: MismatchReason::UnknownEmail
            })
        ));
        // unknown emails still pay for one Argon2 derivation
        assert_eq!(fx.verifier.hashes.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_counts_a_failure() -> anyhow::Result<()> {
        let fx = fixture()?;
        let account = seed(&fx, true, &cheap_params()).await?;

        let outcome = fx.orchestrator.login("user@example.com", "Wrong-Horse-Battery-9").await?;
        assert!(matches!(
            outcome,
            LoginOutcome::Rejected(LoginRejection::InvalidCredentials {
                detail: MismatchReason::WrongPassword
            })
        ));
        assert_eq!(stored(&fx, account.id).await?.failed_attempts, 1);
        Ok(())
    }

    #[tokio::test]
    async fn fifth_failure_locks_and_skips_verifier() -> anyhow::Result<()> {
        let fx = fixture()?;
        let account = seed(&fx, true, &cheap_params()).await?;

        for _ in 0..4 {
            fx.orchestrator.login("user@example.com", "Wrong-Horse-Battery-9").await?;
        }
        let after_four = stored(&fx, account.id).await?;
        assert_eq!(after_four.failed_attempts, 4);
        assert!(after_four.locked_until.is_none());

        fx.orchestrator.login("user@example.com", "Wrong-Horse-Battery-9").await?;
        let locked = stored(&fx, account.id).await?;
        assert_eq!(locked.failed_attempts, 0);
        assert_eq!(locked.locked_until, Some(fx.clock.now() + Duration::minutes(15)));

        let calls = fx.verifier.calls.load(Ordering::SeqCst);
        let outcome = fx.orchestrator.login("user@example.com", PASSWORD).await?;
        assert!(matches!(
            outcome,
            LoginOutcome::Rejected(LoginRejection::AccountLocked { .. })
        ));
        assert_eq!(fx.verifier.calls.load(Ordering::SeqCst), calls);
        Ok(())
    }

    #[tokio::test]
    async fn success_after_lock_expiry_resets_state() -> anyhow::Result<()> {
        let fx = fixture()?;
        let account = seed(&fx, true, &cheap_params()).await?;
        for _ in 0..5 {
            fx.orchestrator.login("user@example.com", "Wrong-Horse-Battery-9").await?;
        }

        fx.clock.advance(Duration::minutes(15));
        let outcome = fx.orchestrator.login("user@example.com", PASSWORD).await?;
        assert!(matches!(outcome, LoginOutcome::Accepted(_)));

        let after = stored(&fx, account.id).await?;
        assert_eq!(after.failed_attempts, 0);
        assert!(after.locked_until.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unverified_account_is_rejected_after_password_check() -> anyhow::Result<()> {
        let fx = fixture()?;
        seed(&fx, false, &cheap_params()).await?;

        let outcome = fx.orchestrator.login("user@example.com", PASSWORD).await?;
        assert!(matches!(
            outcome,
            LoginOutcome::Rejected(LoginRejection::AccountUnverified { ref email }) if email == "user@example.com"
        ));

        // A wrong password on an unverified account is still just invalid.
        let outcome = fx.orchestrator.login("user@example.com", "Wrong-Horse-Battery-9").await?;
        assert!(matches!(
            outcome,
            LoginOutcome::Rejected(LoginRejection::InvalidCredentials { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_credential_collapses_to_invalid() -> anyhow::Result<()> {
        let fx = fixture()?;
        let mut account = Account::new(
            "user@example.com",
            "User",
            EncodedCredential::new("$bcrypt$garbage"),
            fx.clock.now(),
        );
        account.verified = true;
        fx.store.insert_account(&account).await?;

        let outcome = fx.orchestrator.login("user@example.com", PASSWORD).await?;
        assert!(matches!(
            outcome,
            LoginOutcome::Rejected(LoginRejection::InvalidCredentials {
                detail: MismatchReason::CorruptCredential
            })
        ));
        assert_eq!(stored(&fx, account.id).await?.failed_attempts, 0);
        Ok(())
    }

    #[tokio::test]
    async fn legacy_credential_is_rehashed_in_background() -> anyhow::Result<()> {
        let fx = fixture()?;
        let legacy = PasswordParams::new(16, 2, 1);
        let account = seed(&fx, true, &legacy).await?;

        let outcome = fx.orchestrator.login("user@example.com", PASSWORD).await?;
        assert!(matches!(outcome, LoginOutcome::Accepted(_)));

        let mut upgraded = None;
        for _ in 0..100 {
            let current = stored(&fx, account.id).await?;
            if current.credential != account.credential {
                upgraded = Some(current.credential);
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let upgraded = upgraded.ok_or_else(|| anyhow::anyhow!("credential was not rehashed"))?;
        assert!(!credential::needs_rehash(&upgraded, &cheap_params())?);
        assert!(credential::verify(PASSWORD, &upgraded)?);
        Ok(())
    }

    #[tokio::test]
    async fn stale_failure_does_not_touch_a_fresh_lock() -> anyhow::Result<()> {
        let fx = fixture()?;
        let account = seed(&fx, true, &cheap_params()).await?;
        for _ in 0..4 {
            fx.orchestrator.login("user@example.com", "Wrong-Horse-Battery-9").await?;
        }
        let snapshot = stored(&fx, account.id).await?;
        assert_eq!(snapshot.failed_attempts, 4);

        // Another request records the fifth failure first.
        let now = fx.clock.now();
        let locked = LockoutPolicy::default().on_failure(&snapshot.login_state(), now);
        let update = LoginStateUpdate {
            state: locked,
            last_login: None,
            at: now,
        };
        assert!(
            fx.store
                .update_login_state(account.id, snapshot.version, &update)
                .await?
        );

        fx.orchestrator.record_failure(snapshot, now).await?;

        let after = stored(&fx, account.id).await?;
        assert_eq!(after.failed_attempts, 0);
        assert_eq!(after.locked_until, locked.locked_until);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_failures_are_all_counted() -> anyhow::Result<()> {
        let fx = Arc::new(fixture()?);
        let account = seed(&fx, true, &cheap_params()).await?;

        let mut handles = Vec::new();
        for _ in 0..3 {
            let fx = Arc::clone(&fx);
            handles.push(tokio::spawn(async move {
                fx.orchestrator
                    .login("user@example.com", "Wrong-Horse-Battery-9")
                    .await
            }));
        }
        for handle in handles {
            handle.await??;
        }

        assert_eq!(stored(&fx, account.id).await?.failed_attempts, 3);
        Ok(())
    }
}
