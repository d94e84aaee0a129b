use crate::{
    config::MAX_RESEND_COOLDOWN_SECONDS,
    credential::{DEFAULT_ITERATIONS, DEFAULT_MEMORY_KIB, DEFAULT_PARALLELISM},
    lockout::{DEFAULT_LOCK_MINUTES, DEFAULT_THRESHOLD, MAX_LOCK_MINUTES},
    session::{DEFAULT_AUDIENCE, DEFAULT_ISSUER},
};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_JWT_SECRET: &str = "jwt-secret";
pub const ARG_ISSUER: &str = "issuer";
pub const ARG_AUDIENCE: &str = "audience";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_ARGON2_MEMORY_KIB: &str = "argon2-memory-kib";
pub const ARG_ARGON2_ITERATIONS: &str = "argon2-iterations";
pub const ARG_ARGON2_PARALLELISM: &str = "argon2-parallelism";
pub const ARG_STORE_TIMEOUT_SECONDS: &str = "store-timeout-seconds";
pub const ARG_RESEND_COOLDOWN_SECONDS: &str = "resend-cooldown-seconds";
pub const ARG_LOCKOUT_THRESHOLD: &str = "lockout-threshold";
pub const ARG_LOCKOUT_MINUTES: &str = "lockout-minutes";

#[derive(Debug, Clone)]
pub struct Options {
    pub jwt_secret: SecretString,
    pub issuer: String,
    pub audience: String,
    pub frontend_base_url: String,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    pub argon2_parallelism: u32,
    pub store_timeout_seconds: u64,
    pub resend_cooldown_seconds: i64,
    pub lockout_threshold: u32,
    pub lockout_minutes: i64,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing secret is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let jwt_secret = matches
            .get_one::<String>(ARG_JWT_SECRET)
            .filter(|secret| !secret.is_empty())
            .cloned()
            .map(SecretString::from)
            .with_context(|| format!("missing required argument: --{ARG_JWT_SECRET}"))?;

        let string = |id: &str, default: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Ok(Self {
            jwt_secret,
            issuer: string(ARG_ISSUER, DEFAULT_ISSUER),
            audience: string(ARG_AUDIENCE, DEFAULT_AUDIENCE),
            frontend_base_url: string(ARG_FRONTEND_BASE_URL, "http://localhost:8080"),
            argon2_memory_kib: matches
                .get_one::<u32>(ARG_ARGON2_MEMORY_KIB)
                .copied()
                .unwrap_or(DEFAULT_MEMORY_KIB),
            argon2_iterations: matches
                .get_one::<u32>(ARG_ARGON2_ITERATIONS)
                .copied()
                .unwrap_or(DEFAULT_ITERATIONS),
            argon2_parallelism: matches
                .get_one::<u32>(ARG_ARGON2_PARALLELISM)
                .copied()
                .unwrap_or(DEFAULT_PARALLELISM),
            store_timeout_seconds: matches
                .get_one::<u64>(ARG_STORE_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(5),
            resend_cooldown_seconds: matches
                .get_one::<i64>(ARG_RESEND_COOLDOWN_SECONDS)
                .copied()
                .unwrap_or(60),
            lockout_threshold: matches
                .get_one::<u32>(ARG_LOCKOUT_THRESHOLD)
                .copied()
                .unwrap_or(DEFAULT_THRESHOLD),
            lockout_minutes: matches
                .get_one::<i64>(ARG_LOCKOUT_MINUTES)
                .copied()
                .unwrap_or(DEFAULT_LOCK_MINUTES),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    let command = with_argon2_args(command);
    with_policy_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_JWT_SECRET)
                .long(ARG_JWT_SECRET)
                .help("HMAC secret used to sign session tokens (at least 32 bytes)")
                .env("GATEHOUSE_JWT_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ISSUER)
                .long(ARG_ISSUER)
                .help("Session token issuer (iss)")
                .env("GATEHOUSE_ISSUER")
                .default_value(DEFAULT_ISSUER),
        )
        .arg(
            Arg::new(ARG_AUDIENCE)
                .long(ARG_AUDIENCE)
                .help("Session token audience (aud)")
                .env("GATEHOUSE_AUDIENCE")
                .default_value(DEFAULT_AUDIENCE),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for email links and the CORS origin")
                .env("GATEHOUSE_FRONTEND_BASE_URL")
                .default_value("http://localhost:8080"),
        )
}

fn with_argon2_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ARGON2_MEMORY_KIB)
                .long(ARG_ARGON2_MEMORY_KIB)
                .help("Argon2id memory cost in KiB for new credentials")
                .env("GATEHOUSE_ARGON2_MEMORY_KIB")
                .default_value("65536")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_ARGON2_ITERATIONS)
                .long(ARG_ARGON2_ITERATIONS)
                .help("Argon2id time cost for new credentials")
                .env("GATEHOUSE_ARGON2_ITERATIONS")
                .default_value("10")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_ARGON2_PARALLELISM)
                .long(ARG_ARGON2_PARALLELISM)
                .help("Argon2id parallelism for new credentials")
                .env("GATEHOUSE_ARGON2_PARALLELISM")
                .default_value("1")
                .value_parser(clap::value_parser!(u32)),
        )
}

fn with_policy_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_SECONDS)
                .long(ARG_STORE_TIMEOUT_SECONDS)
                .help("Deadline for every store call")
                .env("GATEHOUSE_STORE_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_RESEND_COOLDOWN_SECONDS)
                .long(ARG_RESEND_COOLDOWN_SECONDS)
                .help("Cooldown before resending verification emails")
                .env("GATEHOUSE_RESEND_COOLDOWN_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(i64).range(0..=MAX_RESEND_COOLDOWN_SECONDS)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_THRESHOLD)
                .long(ARG_LOCKOUT_THRESHOLD)
                .help("Consecutive failed logins before the account is locked")
                .env("GATEHOUSE_LOCKOUT_THRESHOLD")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_LOCKOUT_MINUTES)
                .long(ARG_LOCKOUT_MINUTES)
                .help("How long a locked account stays locked")
                .env("GATEHOUSE_LOCKOUT_MINUTES")
                .default_value("15")
                .value_parser(clap::value_parser!(i64).range(1..=MAX_LOCK_MINUTES)),
        )
}
