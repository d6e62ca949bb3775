//! SQLite-backed link store
//!
//! This module provides the local persistent store that:
//! - Keeps one row per page (link record), keyed by (collection, id)
//! - Keeps one sync status row per collection
//! - Serves ordered range scans over each collection's `updated` values
//! - Carries the cross-process change channel (`events` table)
//!
//! The store is a cache of the remote source. On a schema version mismatch
//! it is dropped and recreated rather than migrated.

mod events;
mod links;
mod schema;
mod status;
mod types;

pub use events::{EventLog, DEFAULT_EVENT_RETENTION};
pub use status::{Flagged, Selection};
pub use types::*;

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use miette::{IntoDiagnostic, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};

/// Current schema version - store is rebuilt on version mismatch
const SCHEMA_VERSION: i32 = 3;

/// How long a writer waits for another process's transaction to finish
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

/// The link store backed by SQLite
pub struct LinkStore {
    conn: Connection,
    path: PathBuf,
}

impl LinkStore {
    /// Open or create the store at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).into_diagnostic()?;
            }
        }

        let conn = open_connection(path)?;
        let mut store = Self {
            conn,
            path: path.to_path_buf(),
        };

        store.ensure_schema()?;

        Ok(store)
    }

    /// Location of the database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Begin a write transaction
    ///
    /// The transaction takes the write lock up front so that two processes
    /// reading-then-writing the same rows serialize instead of interleaving.
    pub fn transaction(&mut self) -> Result<StoreTx<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .into_diagnostic()?;
        Ok(StoreTx { tx })
    }

    /// Get store statistics
    pub fn statistics(&self) -> Result<StoreStats> {
        let count = |sql: &str| -> Result<usize> {
            self.conn
                .query_row(sql, [], |row| row.get::<_, i64>(0))
                .map(|n| n as usize)
                .into_diagnostic()
        };

        Ok(StoreStats {
            total_links: count("SELECT COUNT(*) FROM links")?,
            total_collections: count("SELECT COUNT(*) FROM collections")?,
            invalid_collections: count("SELECT COUNT(*) FROM collections WHERE valid = 0")?,
            pending_events: count("SELECT COUNT(*) FROM events")?,
            db_size_bytes: fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0),
        })
    }
}

/// A write transaction over the store
///
/// Dropping it without calling [`StoreTx::commit`] rolls back.
pub struct StoreTx<'a> {
    tx: Transaction<'a>,
}

impl StoreTx<'_> {
    pub fn commit(self) -> Result<()> {
        self.tx.commit().into_diagnostic()
    }
}

/// Open a connection with the pragmas every store handle uses
pub(crate) fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path).into_diagnostic()?;

    // WAL lets readers in other processes proceed while one process writes
    conn.execute_batch("PRAGMA journal_mode=WAL;")
        .into_diagnostic()?;
    conn.busy_timeout(BUSY_TIMEOUT).into_diagnostic()?;

    Ok(conn)
}
