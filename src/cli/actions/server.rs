use crate::{
    AuthState, api,
    cli::{commands::smtp, telemetry},
    config::AuthConfig,
    credential::PasswordParams,
    email::{LogMailer, Mailer, SmtpConfig, SmtpMailer},
    store::{MemoryStore, PgStore, Store},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
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
    pub smtp: Option<smtp::Options>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid, the database cannot be
/// reached, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = auth_config(&args)?;
    let mailer = mailer(args.smtp.as_ref())?;

    let store: Arc<dyn Store> = if let Some(dsn) = &args.dsn {
        debug!("Connecting to {}", redact_dsn(dsn));
        Arc::new(PgStore::connect(dsn).await?)
    } else {
        warn!("No DSN configured, accounts are kept in memory and lost on restart");
        Arc::new(MemoryStore::new())
    };

    let state = Arc::new(AuthState::new(config, store, mailer));

    let result = api::new(args.port, state).await;

    telemetry::shutdown_tracer();

    result
}

/// Validate the auth settings once, before anything is served.
///
/// # Errors
/// Returns an error for a weak signing secret or Argon2 costs the hasher rejects.
pub fn auth_config(args: &Args) -> Result<AuthConfig> {
    let params = PasswordParams::new(
        args.argon2_memory_kib,
        args.argon2_iterations,
        args.argon2_parallelism,
    );

    let config = AuthConfig::new(args.jwt_secret.clone())
        .context("Invalid session signing secret")?
        .with_password_params(params)
        .context("Invalid Argon2 parameters")?
        .with_issuer(args.issuer.clone())
        .with_audience(args.audience.clone())
        .with_frontend_base_url(args.frontend_base_url.clone())
        .with_store_timeout(Duration::from_secs(args.store_timeout_seconds))
        .with_resend_cooldown_seconds(args.resend_cooldown_seconds)
        .with_lockout(args.lockout_threshold, args.lockout_minutes);

    Ok(config)
}

fn mailer(options: Option<&smtp::Options>) -> Result<Arc<dyn Mailer>> {
    let Some(options) = options else {
        info!("No SMTP host configured, emails will only be logged");
        return Ok(Arc::new(LogMailer));
    };

    let mut config = SmtpConfig::new(options.host.clone(), options.from.clone())
        .with_port(options.port);
    if let (Some(username), Some(password)) = (&options.username, &options.password) {
        config = config.with_credentials(username.clone(), password.clone());
    }

    info!("Sending email through {}:{}", config.host(), config.port());
    Ok(Arc::new(SmtpMailer::new(&config)?))
}

/// Strip the password from a DSN before it is logged.
fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("****"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable dsn>".to_string(),
    }
}
