//! Cross-process change channel
//!
//! Every process that opens the same database file shares the `events`
//! table. Posting appends a row tagged with the poster's origin; polling
//! returns rows after the reader's cursor that some other origin posted.

use std::path::Path;

use chrono::Utc;
use miette::{IntoDiagnostic, Result};
use rusqlite::{params, Connection};
use ulid::Ulid;

use super::{open_connection, schema::ensure_events_table};
use crate::core::notify::{Channel, ChangeEvent};

/// How long posted events are kept before being pruned (seconds)
pub const DEFAULT_EVENT_RETENTION: i64 = 3600;

/// Shared change channel backed by the store's `events` table
pub struct EventLog {
    conn: Connection,
    origin: String,
    cursor: i64,
    retention: i64,
}

impl EventLog {
    /// Open the channel on a store file
    ///
    /// The cursor starts at the newest event, so only events posted after
    /// opening are ever polled.
    pub fn open(path: &Path, retention: i64) -> Result<Self> {
        let conn = open_connection(path)?;
        ensure_events_table(&conn)?;

        let cursor: i64 = conn
            .query_row("SELECT COALESCE(MAX(seq), 0) FROM events", [], |row| {
                row.get(0)
            })
            .into_diagnostic()?;

        Ok(Self {
            conn,
            origin: Ulid::new().to_string(),
            cursor,
            retention,
        })
    }

    /// Identifier of this process on the channel
    pub fn origin(&self) -> &str {
        &self.origin
    }

    fn prune(&self, now: i64) -> Result<usize> {
        self.conn
            .execute(
                "DELETE FROM events WHERE created < ?1",
                params![now - self.retention],
            )
            .into_diagnostic()
    }
}

impl Channel for EventLog {
    fn post(&mut self, event: &ChangeEvent) -> Result<()> {
        let payload = serde_json::to_string(event).into_diagnostic()?;
        let now = Utc::now().timestamp();

        self.conn
            .execute(
                "INSERT INTO events (origin, collection, payload, created) VALUES (?1, ?2, ?3, ?4)",
                params![self.origin, event.collection, payload, now],
            )
            .into_diagnostic()?;
        self.prune(now)?;

        Ok(())
    }

    fn poll(&mut self) -> Result<Vec<ChangeEvent>> {
        let rows: Vec<(i64, String, String)> = {
            let mut stmt = self
                .conn
                .prepare("SELECT seq, origin, payload FROM events WHERE seq > ?1 ORDER BY seq")
                .into_diagnostic()?;
            let rows = stmt
                .query_map(params![self.cursor], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })
                .into_diagnostic()?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .into_diagnostic()?
        };

        let mut events = Vec::new();
        for (seq, origin, payload) in rows {
            self.cursor = self.cursor.max(seq);
            if origin == self.origin {
                continue;
            }
            match serde_json::from_str::<ChangeEvent>(&payload) {
                Ok(event) => events.push(event),
                Err(e) => tracing::warn!("skipping malformed event #{}: {}", seq, e),
            }
        }

        Ok(events)
    }
}
