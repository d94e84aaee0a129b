use anyhow::Result;
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_SMTP_HOST: &str = "smtp-host";
pub const ARG_SMTP_PORT: &str = "smtp-port";
pub const ARG_SMTP_USERNAME: &str = "smtp-username";
pub const ARG_SMTP_PASSWORD: &str = "smtp-password";
pub const ARG_SMTP_FROM: &str = "smtp-from";

/// SMTP relay settings. `None` when no host is configured.
#[derive(Debug, Clone)]
pub struct Options {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub from: String,
}

impl Options {
    /// Parse SMTP arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a host is set without a sender address, or only one
    /// half of the credentials is given.
    pub fn parse(matches: &ArgMatches) -> Result<Option<Self>> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let Some(host) = get_non_empty(ARG_SMTP_HOST) else {
            return Ok(None);
        };
        let Some(from) = get_non_empty(ARG_SMTP_FROM) else {
            anyhow::bail!("missing required argument: --{ARG_SMTP_FROM} (required with --{ARG_SMTP_HOST})");
        };

        let username = get_non_empty(ARG_SMTP_USERNAME);
        let password = get_non_empty(ARG_SMTP_PASSWORD).map(SecretString::from);
        if username.is_some() != password.is_some() {
            anyhow::bail!("--{ARG_SMTP_USERNAME} and --{ARG_SMTP_PASSWORD} must be set together");
        }

        Ok(Some(Self {
            host,
            port: matches.get_one::<u16>(ARG_SMTP_PORT).copied().unwrap_or(587),
            username,
            password,
            from,
        }))
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SMTP_HOST)
                .long(ARG_SMTP_HOST)
                .help("SMTP relay host; without it emails are only logged")
                .env("GATEHOUSE_SMTP_HOST"),
        )
        .arg(
            Arg::new(ARG_SMTP_PORT)
                .long(ARG_SMTP_PORT)
                .help("SMTP relay port")
                .env("GATEHOUSE_SMTP_PORT")
                .default_value("587")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_SMTP_USERNAME)
                .long(ARG_SMTP_USERNAME)
                .help("SMTP username")
                .env("GATEHOUSE_SMTP_USERNAME"),
        )
        .arg(
            Arg::new(ARG_SMTP_PASSWORD)
                .long(ARG_SMTP_PASSWORD)
                .help("SMTP password")
                .env("GATEHOUSE_SMTP_PASSWORD")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_SMTP_FROM)
                .long(ARG_SMTP_FROM)
                .help("Sender address, example: Gatehouse <no-reply@example.com>")
                .env("GATEHOUSE_SMTP_FROM"),
        )
}
