//! SQLite lock storage over `sqlx`.
//!
//! Locks live in a single `active_locks` table keyed on the state token,
//! with a secondary index on the path. One pooled connection is used so
//! lock transactions serialize at the pool, matching the contract in
//! [`crate::transaction`]; a WebDAV lock table sees tiny write volumes and
//! correctness beats parallelism here.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{SqlitePool, Transaction};

use davlock_core::{ActiveLock, LockAccessType, LockShareMode, Timestamp};

use crate::transaction::{LockStore, LockTransaction, StoreError};

const SCHEMA: &str = "\
CREATE TABLE IF NOT EXISTS active_locks (
    state_token        TEXT PRIMARY KEY,
    path               TEXT NOT NULL,
    href               TEXT NOT NULL,
    recursive          INTEGER NOT NULL,
    owner              TEXT,
    access_type        TEXT NOT NULL,
    share_mode         TEXT NOT NULL,
    timeout_secs       INTEGER NOT NULL,
    issued_at          TEXT NOT NULL,
    last_refreshed_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_active_locks_path ON active_locks(path);
";

/// Durable lock storage backed by SQLite.
#[derive(Debug, Clone)]
pub struct SqliteLockStore {
    pool: SqlitePool,
}

impl SqliteLockStore {
    /// Connect to `url` (e.g. `sqlite://davlock.db?mode=rwc` or
    /// `sqlite::memory:`) and create the schema if needed.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await?;
        Self::with_pool(pool).await
    }

    /// Wrap an existing pool, creating the schema if needed.
    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl LockStore for SqliteLockStore {
    async fn begin(&self) -> Result<Box<dyn LockTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqliteLockTransaction { tx }))
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

#[derive(Debug, sqlx::FromRow)]
struct LockRow {
    state_token: String,
    path: String,
    href: String,
    recursive: bool,
    owner: Option<String>,
    access_type: String,
    share_mode: String,
    timeout_secs: i64,
    issued_at: Timestamp,
    last_refreshed_at: Timestamp,
}

impl LockRow {
    fn into_lock(self) -> Result<ActiveLock, StoreError> {
        let access_type = LockAccessType::parse(&self.access_type)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        let share_mode = LockShareMode::parse(&self.share_mode)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(ActiveLock {
            path: self.path,
            href: self.href,
            recursive: self.recursive,
            owner: self.owner,
            access_type,
            share_mode,
            timeout: std::time::Duration::from_secs(self.timeout_secs.max(0) as u64),
            issued_at: self.issued_at,
            last_refreshed_at: self.last_refreshed_at,
            state_token: self.state_token,
        })
    }
}

const SELECT_COLUMNS: &str = "SELECT state_token, path, href, recursive, owner, \
     access_type, share_mode, timeout_secs, issued_at, last_refreshed_at \
     FROM active_locks";

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

struct SqliteLockTransaction {
    tx: Transaction<'static, sqlx::Sqlite>,
}

impl SqliteLockTransaction {
    async fn insert(&mut self, lock: &ActiveLock) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO active_locks (state_token, path, href, recursive, owner, \
             access_type, share_mode, timeout_secs, issued_at, last_refreshed_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&lock.state_token)
        .bind(&lock.path)
        .bind(&lock.href)
        .bind(lock.recursive)
        .bind(&lock.owner)
        .bind(lock.access_type.as_str())
        .bind(lock.share_mode.as_str())
        .bind(lock.timeout.as_secs() as i64)
        .bind(lock.issued_at)
        .bind(lock.last_refreshed_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl LockTransaction for SqliteLockTransaction {
    async fn get_active_locks(&mut self) -> Result<Vec<ActiveLock>, StoreError> {
        let rows: Vec<LockRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} ORDER BY path, state_token"))
                .fetch_all(&mut *self.tx)
                .await?;
        rows.into_iter().map(LockRow::into_lock).collect()
    }

    async fn add(&mut self, lock: &ActiveLock) -> Result<bool, StoreError> {
        let taken: Option<(i64,)> =
            sqlx::query_as("SELECT 1 FROM active_locks WHERE state_token = ?")
                .bind(&lock.state_token)
                .fetch_optional(&mut *self.tx)
                .await?;
        if taken.is_some() {
            return Ok(false);
        }
        self.insert(lock).await?;
        Ok(true)
    }

    async fn update(&mut self, lock: &ActiveLock) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE active_locks SET path = ?, href = ?, recursive = ?, owner = ?, \
             access_type = ?, share_mode = ?, timeout_secs = ?, issued_at = ?, \
             last_refreshed_at = ? WHERE state_token = ?",
        )
        .bind(&lock.path)
        .bind(&lock.href)
        .bind(lock.recursive)
        .bind(&lock.owner)
        .bind(lock.access_type.as_str())
        .bind(lock.share_mode.as_str())
        .bind(lock.timeout.as_secs() as i64)
        .bind(lock.issued_at)
        .bind(lock.last_refreshed_at)
        .bind(&lock.state_token)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() > 0 {
            return Ok(true);
        }
        self.insert(lock).await?;
        Ok(false)
    }

    async fn remove(&mut self, state_token: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM active_locks WHERE state_token = ?")
            .bind(state_token)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get(&mut self, state_token: &str) -> Result<Option<ActiveLock>, StoreError> {
        let row: Option<LockRow> =
            sqlx::query_as(&format!("{SELECT_COLUMNS} WHERE state_token = ?"))
                .bind(state_token)
                .fetch_optional(&mut *self.tx)
                .await?;
        row.map(LockRow::into_lock).transpose()
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
