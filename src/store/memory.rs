//! In-process store for development and tests. State is lost on restart.

use super::{Account, AccountStore, ActionTokenStore, LoginStateUpdate, StoreError};
use crate::{
    action_token::{ActionToken, Purpose},
    credential::EncodedCredential,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
struct State {
    accounts: HashMap<Uuid, Account>,
    tokens: Vec<ActionToken>,
}

impl State {
    fn account_mut(&mut self, id: Uuid) -> Result<&mut Account, StoreError> {
        self.accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::Backend(format!("account {id} not found")))
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a stored token, for inspection.
    pub async fn action_token(&self, id: Uuid) -> Option<ActionToken> {
        let state = self.state.lock().await;
        state.tokens.iter().find(|token| token.id == id).cloned()
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if state
            .accounts
            .values()
            .any(|existing| existing.email == account.email)
            || state.accounts.contains_key(&account.id)
        {
            return Err(StoreError::Conflict);
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.accounts.get(&id).cloned())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .accounts
            .values()
            .find(|account| account.email == email)
            .cloned())
    }

    async fn update_login_state(
        &self,
        id: Uuid,
        expected_version: i64,
        update: &LoginStateUpdate,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let Some(account) = state.accounts.get_mut(&id) else {
            return Ok(false);
        };
        if account.version != expected_version {
            return Ok(false);
        }
        account.failed_attempts = update.state.failed_attempts;
        account.locked_until = update.state.locked_until;
        if update.last_login.is_some() {
            account.last_login = update.last_login;
        }
        account.updated_at = update.at;
        account.version += 1;
        Ok(true)
    }

    async fn set_credential(
        &self,
        id: Uuid,
        credential: &EncodedCredential,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let account = state.account_mut(id)?;
        account.credential = credential.clone();
        account.updated_at = at;
        account.version += 1;
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let account = state.account_mut(id)?;
        if !account.verified {
            account.verified = true;
            account.verified_at = Some(at);
        }
        account.updated_at = at;
        account.version += 1;
        Ok(())
    }

    async fn reset_credential(
        &self,
        id: Uuid,
        credential: &EncodedCredential,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let account = state.account_mut(id)?;
        account.credential = credential.clone();
        account.failed_attempts = 0;
        account.locked_until = None;
        account.updated_at = at;
        account.version += 1;
        Ok(())
    }
}

#[async_trait]
impl ActionTokenStore for MemoryStore {
    async fn insert_action_token(&self, token: &ActionToken) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let now = token.created_at;
        state.tokens.retain(|existing| {
            let related = existing.purpose == token.purpose
                && (existing.account_id == token.account_id
                    || existing.secret_hash == token.secret_hash);
            !related || existing.is_redeemable(now)
        });
        if state
            .tokens
            .iter()
            .any(|existing| existing.purpose == token.purpose && existing.secret_hash == token.secret_hash)
        {
            return Err(StoreError::Conflict);
        }
        state.tokens.push(token.clone());
        Ok(())
    }

    async fn claim_action_token(
        &self,
        secret_hash: &[u8],
        purpose: Purpose,
        now: DateTime<Utc>,
    ) -> Result<Option<ActionToken>, StoreError> {
        let mut state = self.state.lock().await;
        let Some(token) = state.tokens.iter_mut().find(|token| {
            token.purpose == purpose
                && token.secret_hash == secret_hash
                && token.is_redeemable(now)
        }) else {
            return Ok(None);
        };
        token.used = true;
        token.used_at = Some(now);
        Ok(Some(token.clone()))
    }

    async fn last_action_token_at(
        &self,
        account_id: Uuid,
        purpose: Purpose,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .tokens
            .iter()
            .filter(|token| token.account_id == account_id && token.purpose == purpose)
            .map(|token| token.created_at)
            .max())
    }
}
