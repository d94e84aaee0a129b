//! Outbound email.
//!
//! Every message the core sends is best-effort: a delivery failure is logged by
//! the caller and never fails the request that triggered it.
//!
//! `LogMailer` is the default for local development. `SmtpMailer` delivers
//! through an SMTP relay with `lettre`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tracing::info;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmailMessage {
    pub to_email: String,
    pub subject: String,
    pub html_body: String,
}

/// Email delivery abstraction.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a message or return an error describing why it failed.
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

/// Local dev mailer that logs instead of sending real email.
///
/// Bodies carry verification codes and reset links, so only the envelope is
/// logged.
#[derive(Clone, Debug)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        info!(
            to_email = %message.to_email,
            subject = %message.subject,
            body_len = message.html_body.len(),
            "email not sent, no SMTP relay configured"
        );
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct SmtpConfig {
    host: String,
    port: u16,
    username: Option<String>,
    password: Option<SecretString>,
    from: String,
    timeout: Duration,
}

impl SmtpConfig {
    #[must_use]
    pub fn new(host: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 587,
            username: None,
            password: None,
            from: from.into(),
            timeout: Duration::from_secs(10),
        }
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, username: String, password: SecretString) -> Self {
        self.username = Some(username);
        self.password = Some(password);
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn from(&self) -> &str {
        &self.from
    }
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    /// With credentials the relay is reached over TLS; without, the connection
    /// is plaintext (local catchers such as Mailpit).
    ///
    /// # Errors
    /// Returns an error if the sender address or relay host is invalid.
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config
            .from
            .parse()
            .with_context(|| format!("invalid sender address: {}", config.from))?;

        let transport = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                    .with_context(|| format!("invalid SMTP relay: {}", config.host))?
                    .credentials(Credentials::new(
                        username.clone(),
                        password.expose_secret().to_string(),
                    ))
            }
            _ => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
        }
        .port(config.port)
        .timeout(Some(config.timeout))
        .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let to: Mailbox = message
            .to_email
            .parse()
            .with_context(|| format!("invalid recipient address: {}", message.to_email))?;
        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(message.subject.clone())
            .header(ContentType::TEXT_HTML)
            .body(message.html_body.clone())
            .context("failed to build email")?;

        self.transport
            .send(email)
            .await
            .context("SMTP delivery failed")?;
        Ok(())
    }
}

pub fn build_verify_url(frontend_base_url: &str, code: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/verify-email?code={code}")
}

pub fn build_reset_url(frontend_base_url: &str, token: &str) -> String {
    let base = frontend_base_url.trim_end_matches('/');
    format!("{base}/reset-password?token={token}")
}

fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn wrap(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>{title}</title></head>\
         <body style=\"font-family: sans-serif; line-height: 1.5;\">{body}</body></html>"
    )
}

#[must_use]
pub fn verification_email(to: &str, name: &str, code: &str, frontend_base_url: &str) -> EmailMessage {
    let url = build_verify_url(frontend_base_url, code);
    let body = format!(
        "<p>Hi {name},</p>\
         <p>Your verification code is:</p>\
         <p style=\"font-size: 24px; letter-spacing: 4px;\"><strong>{code}</strong></p>\
         <p>Or follow <a href=\"{url}\">this link</a> to verify your email.</p>\
         <p>The code expires in 24 hours.</p>",
        name = escape_html(name),
    );
    EmailMessage {
        to_email: to.to_string(),
        subject: "Verify your email".to_string(),
        html_body: wrap("Verify your email", &body),
    }
}

#[must_use]
pub fn reset_password_email(
    to: &str,
    name: &str,
    token: &str,
    frontend_base_url: &str,
) -> EmailMessage {
    let url = build_reset_url(frontend_base_url, token);
    let body = format!(
        "<p>Hi {name},</p>\
         <p>We received a request to reset your password.</p>\
         <p><a href=\"{url}\">Reset your password</a></p>\
         <p>The link expires in 1 hour. If you did not ask for this, ignore this email.</p>",
        name = escape_html(name),
    );
    EmailMessage {
        to_email: to.to_string(),
        subject: "Reset your password".to_string(),
        html_body: wrap("Reset your password", &body),
    }
}

#[must_use]
pub fn welcome_email(to: &str, name: &str) -> EmailMessage {
    let body = format!(
        "<p>Hi {name},</p><p>Your email is verified. Welcome aboard.</p>",
        name = escape_html(name),
    );
    EmailMessage {
        to_email: to.to_string(),
        subject: "Welcome".to_string(),
        html_body: wrap("Welcome", &body),
    }
}

#[must_use]
pub fn password_changed_email(to: &str, name: &str) -> EmailMessage {
    let body = format!(
        "<p>Hi {name},</p>\
         <p>Your password was just changed. If this was not you, reset it immediately.</p>",
        name = escape_html(name),
    );
    EmailMessage {
        to_email: to.to_string(),
        subject: "Your password was changed".to_string(),
        html_body: wrap("Password changed", &body),
    }
}
