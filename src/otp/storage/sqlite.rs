//! SQLite storage backend implementation.
//!
//! Records survive restarts and can be shared by several processes on the
//! same host. Expiry deadlines are stored as epoch milliseconds; rows past
//! their deadline are ignored by every query and removed by
//! [`OtpStorage::cleanup_expired`].

use super::{OtpStorage, StorageStats};
use crate::otp::time_utils::{current_timestamp_millis, deadline_millis, remaining};
use crate::otp::{NewOtp, OtpError, OtpRecord};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const RECORD_COLUMNS: &str =
    "namespace, id, passcode, recipient, description, channel, attempts, max_attempts, closed, expires_at";

/// SQLite-based storage backend.
///
/// # Atomicity
///
/// - `read(.., true)` and `close` are single `UPDATE ... RETURNING` statements.
/// - `create` runs its lock check and upsert in one `BEGIN IMMEDIATE`
///   transaction, which also serializes against other processes using the
///   same database file.
///
/// # Example
///
/// ```rust
/// use otp_gateway::storage::SqliteStorage;
/// use std::sync::Arc;
///
/// # fn example() -> Result<(), otp_gateway::OtpError> {
/// // File-based storage
/// let storage = Arc::new(SqliteStorage::new("otp_gateway.db")?);
///
/// // In-memory storage (for testing)
/// let memory_storage = Arc::new(SqliteStorage::new(":memory:")?);
/// # Ok(())
/// # }
/// ```
pub struct SqliteStorage {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Create a new SQLite storage backend.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the SQLite database file, or ":memory:" for in-memory database
    pub fn new(db_path: &str) -> Result<Self, OtpError> {
        let connection = if db_path == ":memory:" {
            Connection::open_in_memory()
        } else {
            Connection::open(db_path)
        };

        let connection = connection.map_err(OtpError::from_storage_error)?;

        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, OtpError> {
        self.connection
            .lock()
            .map_err(|_| OtpError::from_storage_message("SQLite connection mutex poisoned"))
    }

    /// Create the database schema if it doesn't exist.
    fn init_schema(&self) -> Result<(), OtpError> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS otp_record (
                namespace TEXT NOT NULL,
                id TEXT NOT NULL,
                passcode TEXT NOT NULL,
                recipient TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                channel TEXT NOT NULL,
                attempts INTEGER NOT NULL,
                max_attempts INTEGER NOT NULL,
                closed INTEGER NOT NULL DEFAULT 0,
                expires_at INTEGER NOT NULL,
                PRIMARY KEY (namespace, id)
            )
            "#,
            [],
        )
        .map_err(OtpError::from_storage_error)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_otp_expires_at ON otp_record (expires_at)",
            [],
        )
        .map_err(OtpError::from_storage_error)?;

        Ok(())
    }

    fn row_to_record(row: &Row<'_>, now: i64) -> rusqlite::Result<OtpRecord> {
        let expires_at: i64 = row.get(9)?;
        Ok(OtpRecord {
            namespace: row.get(0)?,
            id: row.get(1)?,
            passcode: row.get(2)?,
            recipient: row.get(3)?,
            description: row.get(4)?,
            channel: row.get(5)?,
            attempts: row.get(6)?,
            max_attempts: row.get(7)?,
            closed: row.get(8)?,
            ttl: remaining(expires_at, now),
        })
    }

    fn query_live(
        conn: &Connection,
        sql: &str,
        namespace: &str,
        id: &str,
        now: i64,
    ) -> Result<OtpRecord, OtpError> {
        conn.query_row(sql, params![namespace, id, now], |row| {
            Self::row_to_record(row, now)
        })
        .optional()
        .map_err(OtpError::from_storage_error)?
        .ok_or(OtpError::NotFound)
    }
}

#[async_trait]
impl OtpStorage for SqliteStorage {
    async fn init(&self) -> Result<(), OtpError> {
        self.init_schema()
    }

    async fn create(
        &self,
        namespace: &str,
        id: &str,
        otp: &NewOtp,
        ttl: Duration,
    ) -> Result<OtpRecord, OtpError> {
        let now = current_timestamp_millis()?;
        let expires_at = deadline_millis(now, ttl);

        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(OtpError::from_storage_error)?;

        let select = format!(
            "SELECT {RECORD_COLUMNS} FROM otp_record \
             WHERE namespace = ?1 AND id = ?2 AND expires_at > ?3"
        );
        match Self::query_live(&tx, &select, namespace, id, now) {
            Ok(existing) if existing.is_locked() => {
                return Err(OtpError::Locked(Box::new(existing)));
            }
            Ok(_) | Err(OtpError::NotFound) => {}
            Err(e) => return Err(e),
        }

        tx.execute(
            "INSERT OR REPLACE INTO otp_record \
             (namespace, id, passcode, recipient, description, channel, attempts, max_attempts, closed, expires_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 1, ?7, 0, ?8)",
            params![
                namespace,
                id,
                otp.passcode,
                otp.recipient,
                otp.description,
                otp.channel,
                otp.max_attempts,
                expires_at
            ],
        )
        .map_err(OtpError::from_storage_error)?;
        tx.commit().map_err(OtpError::from_storage_error)?;

        Ok(otp.clone().into_record(namespace, id, ttl))
    }

    async fn read(
        &self,
        namespace: &str,
        id: &str,
        increment: bool,
    ) -> Result<OtpRecord, OtpError> {
        let now = current_timestamp_millis()?;
        let conn = self.lock()?;

        let sql = if increment {
            format!(
                "UPDATE otp_record SET attempts = attempts + 1 \
                 WHERE namespace = ?1 AND id = ?2 AND expires_at > ?3 \
                 RETURNING {RECORD_COLUMNS}"
            )
        } else {
            format!(
                "SELECT {RECORD_COLUMNS} FROM otp_record \
                 WHERE namespace = ?1 AND id = ?2 AND expires_at > ?3"
            )
        };
        Self::query_live(&conn, &sql, namespace, id, now)
    }

    async fn close(&self, namespace: &str, id: &str) -> Result<OtpRecord, OtpError> {
        let now = current_timestamp_millis()?;
        let conn = self.lock()?;

        let sql = format!(
            "UPDATE otp_record SET closed = 1 \
             WHERE namespace = ?1 AND id = ?2 AND expires_at > ?3 \
             RETURNING {RECORD_COLUMNS}"
        );
        Self::query_live(&conn, &sql, namespace, id, now)
    }

    async fn cleanup_expired(&self) -> Result<usize, OtpError> {
        let now = current_timestamp_millis()?;
        let conn = self.lock()?;

        conn.execute(
            "DELETE FROM otp_record WHERE expires_at <= ?1",
            params![now],
        )
        .map_err(OtpError::from_storage_error)
    }

    async fn get_stats(&self) -> Result<StorageStats, OtpError> {
        let now = current_timestamp_millis()?;
        let conn = self.lock()?;

        let count: usize = conn
            .query_row(
                "SELECT COUNT(*) FROM otp_record WHERE expires_at > ?1",
                params![now],
                |row| row.get(0),
            )
            .map_err(OtpError::from_storage_error)?;

        let page_count: i64 = conn
            .query_row("PRAGMA page_count", [], |row| row.get(0))
            .unwrap_or(0);
        let page_size: i64 = conn
            .query_row("PRAGMA page_size", [], |row| row.get(0))
            .unwrap_or(4096);

        Ok(StorageStats {
            total_records: count,
            backend_info: format!(
                "SQLite storage ({} bytes, {} pages)",
                page_count * page_size,
                page_count
            ),
        })
    }
}
