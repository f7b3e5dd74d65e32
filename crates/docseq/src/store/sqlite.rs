use core::time::Duration;
use std::{collections::HashMap, path::Path};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{
    Connection, ErrorCode, OpenFlags, OptionalExtension, Transaction, TransactionBehavior, params,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{
    Allocation, CounterKey, CounterSnapshot, Error, IdentifierLookup, Result, SequenceStore,
    StoreError, is_sequence_type,
};

/// Busy timeout applied to connections outside of allocation attempts.
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sequence_counters (
    sequence_type    TEXT    NOT NULL,
    date_key         TEXT    NOT NULL CHECK (length(date_key) = 8),
    current_sequence INTEGER NOT NULL CHECK (current_sequence >= 1),
    created_at       INTEGER NOT NULL,
    updated_at       INTEGER NOT NULL,
    PRIMARY KEY (sequence_type, date_key)
);";

// Insert-or-increment in one statement; the returned value is the counter
// after this allocation, and no other writer can interleave under the
// IMMEDIATE transaction's reserved lock.
const UPSERT_INCREMENT: &str = "
INSERT INTO sequence_counters (sequence_type, date_key, current_sequence, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?4)
ON CONFLICT (sequence_type, date_key) DO UPDATE
    SET current_sequence = current_sequence + excluded.current_sequence,
        updated_at = excluded.updated_at
RETURNING current_sequence";

const SELECT_COUNTER: &str = "
SELECT current_sequence, created_at, updated_at
FROM sequence_counters
WHERE sequence_type = ?1 AND date_key = ?2";

/// The business table column holding identifiers of one sequence type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusinessTable {
    table: String,
    column: String,
}

impl BusinessTable {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] unless both names are plain SQL
    /// identifiers (`[A-Za-z_][A-Za-z0-9_]*`).
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Result<Self> {
        let table = table.into();
        let column = column.into();
        for name in [&table, &column] {
            if !is_sql_identifier(name) {
                return Err(Error::InvalidConfig {
                    reason: format!("{name:?} is not a plain SQL identifier"),
                });
            }
        }
        Ok(Self { table, column })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    fn exists_query(&self) -> String {
        format!(
            "SELECT EXISTS (SELECT 1 FROM \"{}\" WHERE \"{}\" = ?1)",
            self.table, self.column
        )
    }
}

fn is_sql_identifier(name: &str) -> bool {
    let mut bytes = name.bytes();
    matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// A durable [`SequenceStore`] backed by SQLite.
///
/// Every allocation runs in a `BEGIN IMMEDIATE` transaction, which takes the
/// database's reserved lock up front, and advances the counter with a single
/// `INSERT .. ON CONFLICT DO UPDATE .. RETURNING` statement. Concurrent
/// writers in other processes wait on SQLite's busy handler for at most the
/// attempt timeout, then report [`StoreError::Timeout`].
///
/// Within one process, allocations share a single connection guarded by a
/// mutex, acquired with the same timeout.
///
/// Business tables registered with [`SqliteStore::with_business_table`] are
/// probed read-only from inside the allocation transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    business: HashMap<String, BusinessTable>,
}

impl SqliteStore {
    /// Opens (creating if needed) a database file in WAL mode and ensures the
    /// counter schema exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the file cannot be opened or
    /// initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags).map_err(map_sqlite_error)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = FULL;")
            .map_err(map_sqlite_error)?;
        Self::from_connection(conn)
    }

    /// An in-memory database private to this store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if SQLite cannot allocate it.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory().map_err(map_sqlite_error)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
            .map_err(map_sqlite_error)?;
        conn.execute_batch(SCHEMA).map_err(map_sqlite_error)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(path = ?conn.path(), "sequence store ready");

        Ok(Self {
            conn: Mutex::new(conn),
            business: HashMap::new(),
        })
    }

    /// Enables the safety-net check for `sequence_type` against
    /// `table.column`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for an invalid sequence type.
    pub fn with_business_table(
        mut self,
        sequence_type: impl Into<String>,
        table: BusinessTable,
    ) -> Result<Self> {
        let sequence_type = sequence_type.into();
        if !is_sequence_type(&sequence_type) {
            return Err(Error::InvalidConfig {
                reason: format!("invalid sequence type {sequence_type:?}"),
            });
        }
        self.business.insert(sequence_type, table);
        Ok(self)
    }

    /// Runs `f` with exclusive access to the underlying connection.
    ///
    /// Meant for migrations and fixtures that live next to the counters, such
    /// as creating business tables. Counter rows must not be modified here.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        f(&self.conn.lock())
    }
}

struct TxLookup<'a> {
    tx: &'a Transaction<'a>,
    business: &'a HashMap<String, BusinessTable>,
}

impl IdentifierLookup for TxLookup<'_> {
    fn exists(&self, sequence_type: &str, identifier: &str) -> Result<bool, StoreError> {
        let Some(table) = self.business.get(sequence_type) else {
            return Ok(false);
        };
        self.tx
            .prepare_cached(&table.exists_query())
            .and_then(|mut stmt| stmt.query_row(params![identifier], |row| row.get::<_, bool>(0)))
            .map_err(map_sqlite_error)
    }
}

impl SequenceStore for SqliteStore {
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, finish)))]
    fn allocate<T, F>(&self, key: &CounterKey, count: u64, timeout: Duration, finish: F) -> Result<T>
    where
        F: FnOnce(Allocation, &dyn IdentifierLookup) -> Result<T>,
    {
        let mut conn = self
            .conn
            .try_lock_for(timeout)
            .ok_or(StoreError::Timeout(timeout))?;
        conn.busy_timeout(timeout).map_err(map_sqlite_error)?;

        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| map_busy(e, timeout))?;

        let increment = i64::try_from(count)
            .map_err(|_| StoreError::Unavailable(format!("increment {count} out of range")))?;
        let last: i64 = tx
            .query_row(
                UPSERT_INCREMENT,
                params![
                    key.sequence_type,
                    key.date_key.to_string(),
                    increment,
                    Utc::now().timestamp_millis()
                ],
                |row| row.get(0),
            )
            .map_err(|e| map_busy(e, timeout))?;
        let last = u64::try_from(last)
            .map_err(|_| StoreError::Unavailable(format!("corrupt counter value {last}")))?;

        let value = {
            let lookup = TxLookup {
                tx: &tx,
                business: &self.business,
            };
            finish(Allocation::ending_at(last, count), &lookup)?
        };

        tx.commit().map_err(|e| map_busy(e, timeout))?;
        Ok(value)
    }

    fn snapshot(&self, key: &CounterKey) -> Result<Option<CounterSnapshot>, StoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                SELECT_COUNTER,
                params![key.sequence_type, key.date_key.to_string()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(map_sqlite_error)?;

        row.map(|(current, created, updated)| {
            Ok(CounterSnapshot {
                current_sequence: u64::try_from(current).map_err(|_| {
                    StoreError::Unavailable(format!("corrupt counter value {current}"))
                })?,
                created_at: from_millis(created)?,
                updated_at: from_millis(updated)?,
            })
        })
        .transpose()
    }
}

fn from_millis(millis: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::Unavailable(format!("corrupt timestamp {millis}")))
}

/// Like [`map_sqlite_error`], but reports lock waits that ran out the busy
/// handler as a timeout of the attempt.
fn map_busy(err: rusqlite::Error, timeout: Duration) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::DatabaseBusy => {
            StoreError::Timeout(timeout)
        }
        _ => map_sqlite_error(err),
    }
}

/// Classifies SQLite failures: lock contention and constraint races are
/// retryable conflicts, everything else means the store is unusable.
fn map_sqlite_error(err: rusqlite::Error) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) => match e.code {
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked | ErrorCode::ConstraintViolation => {
                StoreError::Conflict(err.to_string())
            }
            _ => StoreError::Unavailable(err.to_string()),
        },
        _ => StoreError::Unavailable(err.to_string()),
    }
}
