//! # Gatehouse (Credential & Session Lifecycle Core)
//!
//! `gatehouse` owns the password and session lifecycle shared by the backend
//! services: it stores and verifies password credentials, enforces brute-force
//! lockout, issues and validates bearer session tokens, and manages single-use
//! action tokens for email verification and password reset.
//!
//! ## Credentials
//!
//! Passwords are hashed with **Argon2id** into a self-describing string that
//! carries its own cost parameters, so credentials hashed under an older policy
//! keep verifying and are transparently re-hashed on the next successful login.
//!
//! ## Sessions
//!
//! Sessions are HS512-signed bearer tokens (`JWT` compact form) valid for 24
//! hours. There is no revocation store: a valid, unexpired token is accepted
//! until it expires.
//!
//! ## Enumeration Resistance
//!
//! Login collapses an unknown email, a wrong password and an unreadable stored
//! credential into one "invalid credentials" response. Unknown emails still pay
//! for one Argon2 derivation. Resend-verification and forgot-password answer the
//! same way whether or not the account exists. The internal cause is logged,
//! never returned to the client.
//!
//! A locked account (423, checked before the password) and an unverified
//! account whose password matched (403) are reported as such.
//!
//! ## Collaborators
//!
//! Persistence ([`store`]), mail delivery ([`email`]) and the HTTP surface
//! ([`api`]) are thin adapters over the core; the core only sees the traits.

pub mod account;
pub mod action_token;
pub mod api;
pub mod cli;
pub mod clock;
pub mod config;
pub mod credential;
pub mod email;
pub mod error;
pub mod lockout;
pub mod login;
pub mod session;
pub mod state;
pub mod store;
pub mod validation;

pub use error::AuthError;
pub use state::AuthState;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
