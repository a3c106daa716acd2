//! Storage layer for trackme.
//!
//! Provides persistence for tracker sessions and time entries using `rusqlite`,
//! and implements [`tm_core::Store`] on top of it.
//!
//! # Thread Safety
//!
//! [`Database`] keeps its `rusqlite::Connection` behind a `Mutex`, so one
//! instance can be shared across threads. Separate instances (or separate
//! processes) opened on the same file are also safe: tracker rows carry a
//! `version` column and every update is conditional on it, so a stale
//! read-modify-write is rejected with [`StoreError::Conflict`] instead of
//! overwriting a newer state. Lock contention between connections waits up
//! to [`BUSY_TIMEOUT`].
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in ISO 8601 format with microseconds
//! (e.g., `2024-01-15T10:30:00.000000Z`). The fixed width keeps
//! lexicographic ordering equal to chronological ordering, and values are
//! always UTC.
//!
//! ## Tracker Rows
//!
//! `tracker_sessions` stores the flat [`TrackerRecord`] form. Rows are
//! validated into the tagged tracker state on every read; a row that breaks
//! an invariant surfaces as [`StoreError::Invalid`].
//!
//! ## Metadata
//!
//! `time_entries.metadata` is a JSON object stored verbatim.

use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use thiserror::Error;

use tm_core::{
    EntryId, Metadata, OwnerId, Store, StoreError, TimeEntry, TrackerRecord, TrackerSession,
    ValidationError, Versioned, checked_i64,
};

/// How long a connection waits for another connection's lock.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for {record}: {timestamp}")]
    TimestampParse {
        record: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// Stored metadata is not a JSON object.
    #[error("invalid metadata for entry {entry_id}")]
    InvalidMetadata {
        entry_id: String,
        #[source]
        source: serde_json::Error,
    },
    /// A stored row violates a domain invariant.
    #[error("invalid stored record: {0}")]
    InvalidRecord(#[from] ValidationError),
    /// A tracker write lost an optimistic-concurrency race.
    #[error("tracker for {0} was modified concurrently")]
    Conflict(OwnerId),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Conflict(owner) => Self::Conflict { owner },
            DbError::InvalidRecord(invalid) => Self::Invalid(invalid),
            other => Self::backend(other),
        }
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Loads an owner's tracker row and its version.
    pub fn load_tracker(
        &self,
        owner: &OwnerId,
    ) -> Result<Option<Versioned<TrackerSession>>, DbError> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "
                SELECT started_at, paused_at, accumulated_seconds, is_running, version
                FROM tracker_sessions
                WHERE owner = ?
                ",
                [owner.as_str()],
                |row| {
                    Ok(TrackerRow {
                        started_at: row.get(0)?,
                        paused_at: row.get(1)?,
                        accumulated_seconds: row.get(2)?,
                        is_running: row.get(3)?,
                        version: row.get(4)?,
                    })
                },
            )
            .optional()?;
        drop(conn);

        let Some(row) = row else {
            return Ok(None);
        };
        let record = TrackerRecord {
            started_at: parse_optional_timestamp(row.started_at.as_deref(), owner.as_str())?,
            paused_at: parse_optional_timestamp(row.paused_at.as_deref(), owner.as_str())?,
            accumulated_seconds: row.accumulated_seconds,
            is_running: row.is_running,
        };
        let session = TrackerSession::from_record(owner.clone(), record)?;
        let version = u64::try_from(row.version).map_err(|_| ValidationError::OutOfRange {
            field: "version",
            value: i128::from(row.version),
        })?;
        tracing::debug!(%owner, version, "loaded tracker");
        Ok(Some(Versioned {
            value: session,
            version,
        }))
    }

    /// Inserts or conditionally updates a tracker row.
    ///
    /// See [`Store::save_tracker`] for the version contract.
    pub fn save_tracker(
        &self,
        session: &TrackerSession,
        expected_version: Option<u64>,
    ) -> Result<u64, DbError> {
        write_tracker(&self.conn(), session, expected_version)
    }

    /// Inserts a new time entry.
    pub fn insert_time_entry(&self, entry: &TimeEntry) -> Result<(), DbError> {
        insert_entry(&self.conn(), entry)
    }

    /// Inserts a booked entry and resets the tracker in one transaction.
    ///
    /// The tracker update is conditional on `expected_version`; when it
    /// loses, the transaction rolls back and no entry is stored.
    pub fn book_time_entry(
        &self,
        entry: &TimeEntry,
        session: &TrackerSession,
        expected_version: u64,
    ) -> Result<u64, DbError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let version = write_tracker(&tx, session, Some(expected_version))?;
        insert_entry(&tx, entry)?;
        tx.commit()?;
        tracing::debug!(owner = %entry.owner, entry_id = %entry.id, version, "stored booking");
        Ok(version)
    }

    /// Overwrites the editable fields of an entry. Returns whether a row matched.
    pub fn update_time_entry(&self, entry: &TimeEntry) -> Result<bool, DbError> {
        let metadata = serde_json::to_string(&entry.metadata).map_err(|source| {
            DbError::InvalidMetadata {
                entry_id: entry.id.to_string(),
                source,
            }
        })?;
        let changed = self.conn().execute(
            "
            UPDATE time_entries
            SET description = ?, duration_seconds = ?, start_time = ?, end_time = ?, metadata = ?
            WHERE id = ? AND owner = ?
            ",
            params![
                entry.description,
                checked_i64("duration_seconds", entry.duration_seconds)?,
                entry.start_time.map(format_timestamp),
                format_timestamp(entry.end_time),
                metadata,
                entry.id.as_str(),
                entry.owner.as_str(),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Fetches one entry owned by `owner`.
    pub fn get_time_entry(
        &self,
        owner: &OwnerId,
        id: &EntryId,
    ) -> Result<Option<TimeEntry>, DbError> {
        let row = self
            .conn()
            .query_row(
                &format!("SELECT {ENTRY_COLUMNS} FROM time_entries WHERE id = ? AND owner = ?"),
                [id.as_str(), owner.as_str()],
                EntryRow::from_row,
            )
            .optional()?;
        row.map(EntryRow::into_entry).transpose()
    }

    /// Lists an owner's entries ordered by end time, most recent first.
    pub fn list_time_entries(&self, owner: &OwnerId) -> Result<Vec<TimeEntry>, DbError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "
            SELECT {ENTRY_COLUMNS}
            FROM time_entries
            WHERE owner = ?
            ORDER BY end_time DESC, created_at DESC, id ASC
            "
        ))?;
        let rows = stmt.query_map([owner.as_str()], EntryRow::from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    /// Deletes one entry. Returns whether it existed.
    pub fn delete_time_entry(&self, owner: &OwnerId, id: &EntryId) -> Result<bool, DbError> {
        let changed = self.conn().execute(
            "DELETE FROM time_entries WHERE id = ? AND owner = ?",
            [id.as_str(), owner.as_str()],
        )?;
        Ok(changed > 0)
    }

    /// Deletes the owner's tracker and entries in one transaction.
    pub fn delete_owner(&self, owner: &OwnerId) -> Result<(), DbError> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let entries = tx.execute("DELETE FROM time_entries WHERE owner = ?", [owner.as_str()])?;
        let trackers = tx.execute(
            "DELETE FROM tracker_sessions WHERE owner = ?",
            [owner.as_str()],
        )?;
        tx.commit()?;
        tracing::debug!(%owner, entries, trackers, "deleted owner data");
        Ok(())
    }
}

impl Store for Database {
    fn load_tracker(&self, owner: &OwnerId) -> Result<Option<Versioned<TrackerSession>>, StoreError> {
        Ok(Self::load_tracker(self, owner)?)
    }

    fn save_tracker(
        &self,
        session: &TrackerSession,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        Ok(Self::save_tracker(self, session, expected_version)?)
    }

    fn create_time_entry(&self, entry: &TimeEntry) -> Result<(), StoreError> {
        Ok(self.insert_time_entry(entry)?)
    }

    fn book_time_entry(
        &self,
        entry: &TimeEntry,
        session: &TrackerSession,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        Ok(Self::book_time_entry(self, entry, session, expected_version)?)
    }

    fn update_time_entry(&self, entry: &TimeEntry) -> Result<(), StoreError> {
        if Self::update_time_entry(self, entry)? {
            Ok(())
        } else {
            Err(StoreError::EntryNotFound {
                id: entry.id.clone(),
            })
        }
    }

    fn get_time_entry(
        &self,
        owner: &OwnerId,
        id: &EntryId,
    ) -> Result<Option<TimeEntry>, StoreError> {
        Ok(Self::get_time_entry(self, owner, id)?)
    }

    fn list_time_entries(&self, owner: &OwnerId) -> Result<Vec<TimeEntry>, StoreError> {
        Ok(Self::list_time_entries(self, owner)?)
    }

    fn delete_time_entry(&self, owner: &OwnerId, id: &EntryId) -> Result<bool, StoreError> {
        Ok(Self::delete_time_entry(self, owner, id)?)
    }

    fn delete_owner(&self, owner: &OwnerId) -> Result<(), StoreError> {
        Ok(Self::delete_owner(self, owner)?)
    }
}

/// Initializes the database schema.
///
/// This is idempotent - safe to call on an already-initialized database.
fn init(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "
        -- One row per owner; version increments on every write.
        CREATE TABLE IF NOT EXISTS tracker_sessions (
            owner TEXT PRIMARY KEY,
            started_at TEXT,
            paused_at TEXT,
            accumulated_seconds INTEGER NOT NULL DEFAULT 0 CHECK (accumulated_seconds >= 0),
            is_running INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL,
            CHECK (paused_at IS NULL OR is_running = 0)
        );

        CREATE INDEX IF NOT EXISTS idx_tracker_sessions_running ON tracker_sessions(is_running);

        -- Booked and manual time entries.
        -- metadata: JSON object, opaque to the application
        CREATE TABLE IF NOT EXISTS time_entries (
            id TEXT PRIMARY KEY,
            owner TEXT NOT NULL,
            description TEXT NOT NULL,
            duration_seconds INTEGER NOT NULL CHECK (duration_seconds >= 1),
            start_time TEXT,
            end_time TEXT NOT NULL,
            booked_from_tracker INTEGER NOT NULL DEFAULT 0,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_time_entries_owner_end ON time_entries(owner, end_time);
        CREATE INDEX IF NOT EXISTS idx_time_entries_created ON time_entries(created_at);
        ",
    )?;
    Ok(())
}

/// Inserts or conditionally updates a tracker row on `conn`.
fn write_tracker(
    conn: &Connection,
    session: &TrackerSession,
    expected_version: Option<u64>,
) -> Result<u64, DbError> {
    let record = session.to_record()?;
    let owner = session.owner();
    let started_at = record.started_at.map(format_timestamp);
    let paused_at = record.paused_at.map(format_timestamp);

    let (changed, version) = match expected_version {
        None => {
            let changed = conn.execute(
                "
                INSERT INTO tracker_sessions
                (owner, started_at, paused_at, accumulated_seconds, is_running, version)
                VALUES (?, ?, ?, ?, ?, 1)
                ON CONFLICT(owner) DO NOTHING
                ",
                params![
                    owner.as_str(),
                    started_at,
                    paused_at,
                    record.accumulated_seconds,
                    record.is_running,
                ],
            )?;
            (changed, 1)
        }
        Some(expected) => {
            let changed = conn.execute(
                "
                UPDATE tracker_sessions
                SET started_at = ?, paused_at = ?, accumulated_seconds = ?, is_running = ?,
                    version = version + 1
                WHERE owner = ? AND version = ?
                ",
                params![
                    started_at,
                    paused_at,
                    record.accumulated_seconds,
                    record.is_running,
                    owner.as_str(),
                    checked_i64("version", expected)?,
                ],
            )?;
            (changed, expected + 1)
        }
    };

    if changed == 0 {
        return Err(DbError::Conflict(owner.clone()));
    }
    Ok(version)
}

/// Inserts a new time entry on `conn`.
fn insert_entry(conn: &Connection, entry: &TimeEntry) -> Result<(), DbError> {
    let metadata = serde_json::to_string(&entry.metadata).map_err(|source| {
        DbError::InvalidMetadata {
            entry_id: entry.id.to_string(),
            source,
        }
    })?;
    conn.execute(
        "
        INSERT INTO time_entries
        (id, owner, description, duration_seconds, start_time, end_time,
         booked_from_tracker, metadata, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            entry.id.as_str(),
            entry.owner.as_str(),
            entry.description,
            checked_i64("duration_seconds", entry.duration_seconds)?,
            entry.start_time.map(format_timestamp),
            format_timestamp(entry.end_time),
            entry.booked_from_tracker,
            metadata,
            format_timestamp(entry.created_at),
        ],
    )?;
    Ok(())
}

const ENTRY_COLUMNS: &str = "id, owner, description, duration_seconds, start_time, end_time, \
                             booked_from_tracker, metadata, created_at";

struct TrackerRow {
    started_at: Option<String>,
    paused_at: Option<String>,
    accumulated_seconds: i64,
    is_running: bool,
    version: i64,
}

struct EntryRow {
    id: String,
    owner: String,
    description: String,
    duration_seconds: i64,
    start_time: Option<String>,
    end_time: String,
    booked_from_tracker: bool,
    metadata: String,
    created_at: String,
}

impl EntryRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            owner: row.get(1)?,
            description: row.get(2)?,
            duration_seconds: row.get(3)?,
            start_time: row.get(4)?,
            end_time: row.get(5)?,
            booked_from_tracker: row.get(6)?,
            metadata: row.get(7)?,
            created_at: row.get(8)?,
        })
    }

    fn into_entry(self) -> Result<TimeEntry, DbError> {
        let metadata: Metadata =
            serde_json::from_str(&self.metadata).map_err(|source| DbError::InvalidMetadata {
                entry_id: self.id.clone(),
                source,
            })?;
        let duration_seconds = u64::try_from(self.duration_seconds).map_err(|_| {
            ValidationError::NonPositiveDuration {
                seconds: self.duration_seconds,
            }
        })?;
        Ok(TimeEntry {
            start_time: parse_optional_timestamp(self.start_time.as_deref(), &self.id)?,
            end_time: parse_timestamp(&self.end_time, &self.id)?,
            created_at: parse_timestamp(&self.created_at, &self.id)?,
            id: EntryId::new(self.id)?,
            owner: OwnerId::new(self.owner)?,
            description: self.description,
            duration_seconds,
            booked_from_tracker: self.booked_from_tracker,
            metadata,
        })
    }
}

fn parse_timestamp(timestamp: &str, record: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            record: record.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn parse_optional_timestamp(
    timestamp: Option<&str>,
    record: &str,
) -> Result<Option<DateTime<Utc>>, DbError> {
    timestamp
        .map(|timestamp| parse_timestamp(timestamp, record))
        .transpose()
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}
