//! Database schema initialization

use miette::{IntoDiagnostic, Result};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{LinkStore, SCHEMA_VERSION};

impl LinkStore {
    /// Bring the schema to the current version
    ///
    /// The check is repeated under the write lock, so a process that lost
    /// the race to create a fresh store sees the winner's schema and keeps
    /// its rows instead of rebuilding over them.
    pub(super) fn ensure_schema(&mut self) -> Result<()> {
        if schema_version(&self.conn)? == Some(SCHEMA_VERSION) {
            return Ok(());
        }

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .into_diagnostic()?;
        if schema_version(&tx)? != Some(SCHEMA_VERSION) {
            reinitialize_schema(&tx)?;
        }
        tx.commit().into_diagnostic()
    }
}

/// Stored schema version, `None` for a store without one
fn schema_version(conn: &Connection) -> Result<Option<i32>> {
    let has_table: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
            [],
            |row| row.get(0),
        )
        .into_diagnostic()?;
    if !has_table {
        return Ok(None);
    }

    conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
        row.get(0)
    })
    .optional()
    .into_diagnostic()
}

/// Drop all tables and recreate them at the current version
fn reinitialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        DROP TABLE IF EXISTS schema_version;
        DROP TABLE IF EXISTS links;
        DROP TABLE IF EXISTS collections;
        DROP TABLE IF EXISTS events;
        "#,
    )
    .into_diagnostic()?;

    init_schema(conn)
}

/// Initialize database schema
pub(super) fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
            -- Schema version tracking
            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY
            );

            -- One row per page; links is a JSON array of titles
            CREATE TABLE IF NOT EXISTS links (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                title TEXT NOT NULL,
                updated INTEGER NOT NULL,
                links TEXT NOT NULL,
                image TEXT,
                PRIMARY KEY (collection, id)
            );
            CREATE INDEX IF NOT EXISTS idx_links_collection_updated ON links(collection, updated);
            CREATE INDEX IF NOT EXISTS idx_links_updated ON links(updated);

            -- Sync status, one row per collection
            CREATE TABLE IF NOT EXISTS collections (
                name TEXT PRIMARY KEY,
                id TEXT NOT NULL DEFAULT '',
                valid INTEGER NOT NULL,
                checked INTEGER NOT NULL DEFAULT 0,
                updated INTEGER NOT NULL DEFAULT 0,
                updating INTEGER NOT NULL DEFAULT 0,
                reason TEXT,
                display_name TEXT NOT NULL DEFAULT '',
                is_member INTEGER NOT NULL DEFAULT 0,
                public_visible INTEGER NOT NULL DEFAULT 0,
                flagged_at INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_collections_checked ON collections(checked);
            "#,
    )
    .into_diagnostic()?;

    ensure_events_table(conn)?;

    conn.execute("DELETE FROM schema_version", [])
        .into_diagnostic()?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        params![SCHEMA_VERSION],
    )
    .into_diagnostic()?;

    Ok(())
}

/// Create the cross-process change channel table
pub(super) fn ensure_events_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            origin TEXT NOT NULL,
            collection TEXT NOT NULL,
            payload TEXT NOT NULL,
            created INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_events_created ON events(created);
        "#,
    )
    .into_diagnostic()
}
