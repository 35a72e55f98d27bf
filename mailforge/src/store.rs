//! SQLite-backed account record store.
//!
//! One row per signup attempt. The store enforces the two invariants the
//! workers rely on: email uniqueness (UNIQUE constraint) and monotonic
//! status transitions (terminal updates are guarded so a `verified` or
//! `failed` row never changes again).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

/// Store-level failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email address already registered: {0}")]
    DuplicateEmail(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Lifecycle of one signup attempt.
///
/// The success path runs left to right; `failed` is absorbing and reachable
/// from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AccountStatus {
    Pending,
    CredentialsGenerated,
    VerificationLinkSent,
    EmailReceived,
    Verified,
    Failed,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::CredentialsGenerated => "credentials_generated",
            AccountStatus::VerificationLinkSent => "verification_link_sent",
            AccountStatus::EmailReceived => "email_received",
            AccountStatus::Verified => "verified",
            AccountStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AccountStatus::Verified | AccountStatus::Failed)
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One attempted or completed signup.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Account {
    pub id: i64,
    pub email: String,
    pub full_name: String,
    pub status: AccountStatus,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub error_log: Option<String>,
    pub created_at: DateTime<Utc>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    full_name TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    access_token TEXT,
    refresh_token TEXT,
    error_log TEXT,
    created_at TEXT NOT NULL
)
";

const ALL_COLUMNS: &str =
    "id, email, full_name, status, access_token, refresh_token, error_log, created_at";

/// Handle to the accounts database.
///
/// Cloning is cheap (pool-backed); each worker invocation holds its own
/// clone for its lifetime and drops it on exit.
#[derive(Debug, Clone)]
pub struct AccountStore {
    pool: SqlitePool,
}

impl AccountStore {
    /// Open (creating if missing) the database at `url` and bootstrap the
    /// schema.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    /// Open a fresh in-memory database. Test use.
    pub async fn in_memory() -> Result<Self, StoreError> {
        // A single connection keeps every handle on the same memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.bootstrap().await?;
        Ok(store)
    }

    async fn bootstrap(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA).execute(&self.pool).await?;
        info!("account_store_ready");
        Ok(())
    }

    /// Insert a fresh `pending` record and return it with its assigned id.
    ///
    /// A colliding email surfaces as [`StoreError::DuplicateEmail`], distinct
    /// from every downstream verification failure.
    pub async fn create(&self, email: &str, full_name: &str) -> Result<Account, StoreError> {
        let query = format!(
            "INSERT INTO accounts (email, full_name, status, created_at) \
             VALUES (?, ?, ?, ?) RETURNING {ALL_COLUMNS}"
        );
        let result = sqlx::query_as::<_, Account>(&query)
            .bind(email)
            .bind(full_name)
            .bind(AccountStatus::Pending)
            .bind(Utc::now())
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(account) => Ok(account),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateEmail(email.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Transition a record into `verified` with its session tokens.
    ///
    /// Returns `false` when the record was already terminal (no-op).
    pub async fn mark_verified(
        &self,
        id: i64,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE accounts SET status = 'verified', access_token = ?, refresh_token = ? \
             WHERE id = ? AND status NOT IN ('verified', 'failed')",
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Transition a record into `failed` with its diagnostic log.
    ///
    /// Returns `false` when the record was already terminal (no-op).
    pub async fn mark_failed(&self, id: i64, error_log: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE accounts SET status = 'failed', error_log = ? \
             WHERE id = ? AND status NOT IN ('verified', 'failed')",
        )
        .bind(error_log)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fetch one record by id.
    pub async fn get(&self, id: i64) -> Result<Option<Account>, StoreError> {
        let query = format!("SELECT {ALL_COLUMNS} FROM accounts WHERE id = ?");
        Ok(sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Fetch all records in insertion order.
    pub async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let query = format!("SELECT {ALL_COLUMNS} FROM accounts ORDER BY id");
        Ok(sqlx::query_as::<_, Account>(&query)
            .fetch_all(&self.pool)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_assigns_id_and_pending_status() {
        let store = AccountStore::in_memory().await.unwrap();
        let account = store
            .create("quietfalcon42@tmailbox.net", "Ada Welles")
            .await
            .unwrap();

        assert!(account.id > 0);
        assert_eq!(account.status, AccountStatus::Pending);
        assert_eq!(account.email, "quietfalcon42@tmailbox.net");
        assert!(account.access_token.is_none());
        assert!(account.error_log.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_is_distinct_error() {
        let store = AccountStore::in_memory().await.unwrap();
        store.create("dup@tmailbox.net", "First").await.unwrap();

        let result = store.create("dup@tmailbox.net", "Second").await;
        match result {
            Err(StoreError::DuplicateEmail(email)) => assert_eq!(email, "dup@tmailbox.net"),
            other => panic!("expected DuplicateEmail, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_mark_verified_sets_tokens() {
        let store = AccountStore::in_memory().await.unwrap();
        let account = store.create("v@tmailbox.net", "V").await.unwrap();

        assert!(store.mark_verified(account.id, "acc", "ref").await.unwrap());

        let reloaded = store.get(account.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, AccountStatus::Verified);
        assert_eq!(reloaded.access_token.as_deref(), Some("acc"));
        assert_eq!(reloaded.refresh_token.as_deref(), Some("ref"));
        assert!(reloaded.error_log.is_none());
    }

    #[tokio::test]
    async fn test_mark_failed_sets_error_log() {
        let store = AccountStore::in_memory().await.unwrap();
        let account = store.create("f@tmailbox.net", "F").await.unwrap();

        assert!(store
            .mark_failed(account.id, "timed out waiting for email")
            .await
            .unwrap());

        let reloaded = store.get(account.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, AccountStatus::Failed);
        assert_eq!(
            reloaded.error_log.as_deref(),
            Some("timed out waiting for email")
        );
        assert!(reloaded.access_token.is_none());
    }

    #[tokio::test]
    async fn test_terminal_states_never_regress() {
        let store = AccountStore::in_memory().await.unwrap();
        let account = store.create("t@tmailbox.net", "T").await.unwrap();

        assert!(store.mark_verified(account.id, "acc", "ref").await.unwrap());

        // Both terminal updates are no-ops on an already-terminal row.
        assert!(!store.mark_failed(account.id, "late failure").await.unwrap());
        assert!(!store.mark_verified(account.id, "x", "y").await.unwrap());

        let reloaded = store.get(account.id).await.unwrap().unwrap();
        assert_eq!(reloaded.status, AccountStatus::Verified);
        assert_eq!(reloaded.access_token.as_deref(), Some("acc"));
        assert!(reloaded.error_log.is_none());
    }

    #[tokio::test]
    async fn test_list_returns_insertion_order() {
        let store = AccountStore::in_memory().await.unwrap();
        store.create("a@tmailbox.net", "A").await.unwrap();
        store.create("b@tmailbox.net", "B").await.unwrap();

        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].email, "a@tmailbox.net");
        assert_eq!(all[1].email, "b@tmailbox.net");
    }

    #[tokio::test]
    async fn test_get_unknown_id_is_none() {
        let store = AccountStore::in_memory().await.unwrap();
        assert!(store.get(999).await.unwrap().is_none());
    }
}
