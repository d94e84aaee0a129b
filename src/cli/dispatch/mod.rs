//! Command-line argument dispatch.
//!
//! Maps validated CLI matches to the action to run, such as starting the API
//! server with its full configuration.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{auth, smtp};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .filter(|dsn| !dsn.trim().is_empty());

    let auth_opts = auth::Options::parse(matches)?;
    let smtp_opts = smtp::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        jwt_secret: auth_opts.jwt_secret,
        issuer: auth_opts.issuer,
        audience: auth_opts.audience,
        frontend_base_url: auth_opts.frontend_base_url,
        argon2_memory_kib: auth_opts.argon2_memory_kib,
        argon2_iterations: auth_opts.argon2_iterations,
        argon2_parallelism: auth_opts.argon2_parallelism,
        store_timeout_seconds: auth_opts.store_timeout_seconds,
        resend_cooldown_seconds: auth_opts.resend_cooldown_seconds,
        lockout_threshold: auth_opts.lockout_threshold,
        lockout_minutes: auth_opts.lockout_minutes,
        smtp: smtp_opts,
    }))
}
