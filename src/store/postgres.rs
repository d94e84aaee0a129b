//! PostgreSQL adapter. Schema lives in `sql/schema.sql`.

use super::{Account, AccountStore, ActionTokenStore, LoginStateUpdate, StoreError};
use crate::{
    action_token::{ActionToken, Purpose},
    credential::EncodedCredential,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    Connection, PgPool, Row,
    postgres::{PgPoolOptions, PgRow},
};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

const ACCOUNT_COLUMNS: &str = "id, email, name, credential, verified, verified_at, \
     failed_attempts, locked_until, last_login, created_at, updated_at, version";

const TOKEN_COLUMNS: &str =
    "id, account_id, email, secret_hash, purpose, created_at, expires_at, used, used_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects a small pool to `dsn`.
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn connect(dsn: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if is_unique_violation(&err) {
            Self::Conflict
        } else {
            Self::Backend(err.to_string())
        }
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    let failed_attempts: i32 = row.try_get("failed_attempts")?;
    Ok(Account {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        credential: EncodedCredential::new(row.try_get::<String, _>("credential")?),
        verified: row.try_get("verified")?,
        verified_at: row.try_get("verified_at")?,
        failed_attempts: u32::try_from(failed_attempts).unwrap_or(0),
        locked_until: row.try_get("locked_until")?,
        last_login: row.try_get("last_login")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        version: row.try_get("version")?,
    })
}

fn token_from_row(row: &PgRow) -> Result<ActionToken, StoreError> {
    let purpose: String = row.try_get("purpose")?;
    Ok(ActionToken {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        email: row.try_get("email")?,
        secret_hash: row.try_get("secret_hash")?,
        purpose: Purpose::parse(&purpose)
            .ok_or_else(|| StoreError::Backend(format!("unknown token purpose: {purpose}")))?,
        created_at: row.try_get("created_at")?,
        expires_at: row.try_get("expires_at")?,
        used: row.try_get("used")?,
        used_at: row.try_get("used_at")?,
    })
}

fn attempts_column(attempts: u32) -> i32 {
    i32::try_from(attempts).unwrap_or(i32::MAX)
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO accounts
                (id, email, name, credential, verified, verified_at, failed_attempts,
                 locked_until, last_login, created_at, updated_at, version)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(account.id)
            .bind(&account.email)
            .bind(&account.name)
            .bind(account.credential.as_str())
            .bind(account.verified)
            .bind(account.verified_at)
            .bind(attempts_column(account.failed_attempts))
            .bind(account.locked_until)
            .bind(account.last_login)
            .bind(account.created_at)
            .bind(account.updated_at)
            .bind(account.version)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1");
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        row.as_ref().map(account_from_row).transpose()
    }

    async fn update_login_state(
        &self,
        id: Uuid,
        expected_version: i64,
        update: &LoginStateUpdate,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE accounts
            SET failed_attempts = $3,
                locked_until = $4,
                last_login = COALESCE($5, last_login),
                updated_at = $6,
                version = version + 1
            WHERE id = $1
              AND version = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(id)
            .bind(expected_version)
            .bind(attempts_column(update.state.failed_attempts))
            .bind(update.state.locked_until)
            .bind(update.last_login)
            .bind(update.at)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_credential(
        &self,
        id: Uuid,
        credential: &EncodedCredential,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts
            SET credential = $2,
                updated_at = $3,
                version = version + 1
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(credential.as_str())
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts
            SET verified = TRUE,
                verified_at = COALESCE(verified_at, $2),
                updated_at = $2,
                version = version + 1
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn reset_credential(
        &self,
        id: Uuid,
        credential: &EncodedCredential,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = r"
            UPDATE accounts
            SET credential = $2,
                failed_attempts = 0,
                locked_until = NULL,
                updated_at = $3,
                version = version + 1
            WHERE id = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(id)
            .bind(credential.as_str())
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = tracing::info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span =
            tracing::info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }
}

#[async_trait]
impl ActionTokenStore for PgStore {
    async fn insert_action_token(&self, token: &ActionToken) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let purge = r"
            DELETE FROM action_tokens
            WHERE purpose = $1
              AND (account_id = $2 OR secret_hash = $3)
              AND (used OR expires_at <= $4)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = purge
        );
        sqlx::query(purge)
            .bind(token.purpose.as_str())
            .bind(token.account_id)
            .bind(&token.secret_hash)
            .bind(token.created_at)
            .execute(&mut *tx)
            .instrument(span)
            .await?;

        let query = r"
            INSERT INTO action_tokens
                (id, account_id, email, secret_hash, purpose, created_at, expires_at, used, used_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(token.id)
            .bind(token.account_id)
            .bind(&token.email)
            .bind(&token.secret_hash)
            .bind(token.purpose.as_str())
            .bind(token.created_at)
            .bind(token.expires_at)
            .bind(token.used)
            .bind(token.used_at)
            .execute(&mut *tx)
            .instrument(span)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn claim_action_token(
        &self,
        secret_hash: &[u8],
        purpose: Purpose,
        now: DateTime<Utc>,
    ) -> Result<Option<ActionToken>, StoreError> {
        // Single conditional update: concurrent claims race on the row lock and
        // only the first sees `used = FALSE`.
        let query = format!(
            r"
            UPDATE action_tokens
            SET used = TRUE,
                used_at = $3
            WHERE secret_hash = $1
              AND purpose = $2
              AND used = FALSE
              AND expires_at > $3
            RETURNING {TOKEN_COLUMNS}
        "
        );
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query.as_str()
        );
        let row = sqlx::query(&query)
            .bind(secret_hash)
            .bind(purpose.as_str())
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await?;
        row.as_ref().map(token_from_row).transpose()
    }

    async fn last_action_token_at(
        &self,
        account_id: Uuid,
        purpose: Purpose,
    ) -> Result<Option<DateTime<Utc>>, StoreError> {
        let query = r"
            SELECT MAX(created_at) AS created_at
            FROM action_tokens
            WHERE account_id = $1
              AND purpose = $2
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(account_id)
            .bind(purpose.as_str())
            .fetch_one(&self.pool)
            .instrument(span)
            .await?;
        Ok(row.try_get("created_at")?)
    }
}
