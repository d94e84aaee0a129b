//! Wiring of the core components behind one shared handle.

use crate::{
    account::AccountService,
    action_token::ActionTokenManager,
    clock::{Clock, SystemClock},
    config::AuthConfig,
    credential::{Argon2Verifier, CredentialVerifier},
    email::Mailer,
    lockout::LockoutPolicy,
    login::LoginOrchestrator,
    session::SessionIssuer,
    store::{BoundedStore, Store},
};
use chrono::Duration;
use std::sync::Arc;

pub struct AuthState {
    config: AuthConfig,
    store: Arc<dyn Store>,
    sessions: Arc<SessionIssuer>,
    login: LoginOrchestrator,
    accounts: AccountService,
}

impl AuthState {
    /// Builds the core on top of `store` and `mailer`, using the system clock.
    #[must_use]
    pub fn new(config: AuthConfig, store: Arc<dyn Store>, mailer: Arc<dyn Mailer>) -> Self {
        Self::with_clock(config, store, mailer, Arc::new(SystemClock))
    }

    /// Every store call made by the core is bounded by the configured timeout.
    #[must_use]
    pub fn with_clock(
        config: AuthConfig,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store: Arc<dyn Store> = Arc::new(BoundedStore::new(store, config.store_timeout()));
        let verifier: Arc<dyn CredentialVerifier> =
            Arc::new(Argon2Verifier::new(*config.password_params()));
        let sessions = Arc::new(SessionIssuer::new(
            config.signing_secret().clone(),
            config.issuer(),
            config.audience(),
            Arc::clone(&clock),
        ));
        let tokens = Arc::new(ActionTokenManager::new(
            Arc::clone(&store),
            mailer,
            Arc::clone(&clock),
            config.frontend_base_url(),
        ));
        let policy = LockoutPolicy::new(
            config.lockout_threshold(),
            Duration::minutes(config.lockout_minutes()),
        );
        let login = LoginOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&verifier),
            Arc::clone(&sessions),
            policy,
            Arc::clone(&clock),
        );
        let accounts = AccountService::new(
            Arc::clone(&store),
            verifier,
            tokens,
            clock,
            Duration::seconds(config.resend_cooldown_seconds()),
        );

        Self {
            config,
            store,
            sessions,
            login,
            accounts,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionIssuer {
        &self.sessions
    }

    #[must_use]
    pub fn login(&self) -> &LoginOrchestrator {
        &self.login
    }

    #[must_use]
    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }
}
