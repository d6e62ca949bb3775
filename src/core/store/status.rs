//! Collection status rows and the in-flight flag
//!
//! `select_stale` reads the requested rows and persists `updating = true`
//! (with the time the flag was taken) for the ones it picks, in the same
//! write transaction, so two checkers racing on the same collection
//! serialize on the store lock and the loser sees the flag. `release` is the matching cleanup that always runs.

use std::collections::HashSet;

use miette::{IntoDiagnostic, Result};
use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};

use super::{CollectionStatus, InvalidReason, InvalidStatus, LinkStore, StoreTx, ValidStatus};
use crate::core::tracker::{decide, Decision, SkipReason};

const STATUS_COLUMNS: &str = "name, id, valid, checked, updated, updating, reason, \
     display_name, is_member, public_visible, flagged_at";

/// A collection picked for a check cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flagged {
    /// The row as it was before the flag was set (`None` if never seen)
    pub previous: Option<CollectionStatus>,
    /// The row as persisted, with `updating = true`
    pub status: ValidStatus,
}

impl Flagged {
    pub fn name(&self) -> &str {
        &self.status.name
    }

    /// The row to write back when the check produced no new status
    pub fn restore(&self) -> CollectionStatus {
        match &self.previous {
            Some(previous) => previous.with_updating(false),
            None => CollectionStatus::Valid(ValidStatus::placeholder(&self.status.name)),
        }
    }
}

/// Result of [`LinkStore::select_stale`]
#[derive(Debug, Default)]
pub struct Selection {
    pub flagged: Vec<Flagged>,
    pub skipped: Vec<(String, SkipReason)>,
}

impl StoreTx<'_> {
    /// Get a collection's status row
    pub fn get_status(&self, name: &str) -> Result<Option<CollectionStatus>> {
        self.tx
            .query_row(
                &format!("SELECT {} FROM collections WHERE name = ?1", STATUS_COLUMNS),
                params![name],
                row_to_status,
            )
            .optional()
            .into_diagnostic()
    }

    /// Insert or replace a collection's status row
    pub fn put_status(&self, status: &CollectionStatus) -> Result<()> {
        let sql = r#"INSERT OR REPLACE INTO collections
                     (name, id, valid, checked, updated, updating, reason,
                      display_name, is_member, public_visible, flagged_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#;

        match status {
            CollectionStatus::Valid(s) => self.tx.execute(
                sql,
                params![
                    s.name,
                    s.id,
                    true,
                    s.checked,
                    s.updated,
                    s.updating,
                    Option::<String>::None,
                    s.display_name,
                    s.is_member,
                    s.public_visible,
                    s.flagged_at
                ],
            ),
            CollectionStatus::Invalid(s) => self.tx.execute(
                sql,
                params![
                    s.name,
                    s.id,
                    false,
                    s.checked,
                    0i64,
                    s.updating,
                    s.reason.as_str(),
                    "",
                    false,
                    false,
                    0i64
                ],
            ),
        }
        .into_diagnostic()?;

        Ok(())
    }
}

impl LinkStore {
    /// Pick the requested collections that need a check and flag them
    ///
    /// Collections that are invalid, fresh, or held by another checker are
    /// reported in `skipped`. Unseen collections get a placeholder row.
    pub fn select_stale<S: AsRef<str>>(
        &mut self,
        requested: &[S],
        max_age: i64,
        now: i64,
    ) -> Result<Selection> {
        let mut selection = Selection::default();
        let mut seen = HashSet::new();

        let tx = self.transaction()?;
        for name in requested {
            let name = name.as_ref();
            if !seen.insert(name) {
                continue;
            }

            let previous = tx.get_status(name)?;
            match decide(previous.as_ref(), max_age, now) {
                Decision::Skip(reason) => selection.skipped.push((name.to_string(), reason)),
                Decision::Check => {
                    let mut status = match &previous {
                        Some(CollectionStatus::Valid(s)) => s.clone(),
                        _ => ValidStatus::placeholder(name),
                    };
                    status.updating = true;
                    status.flagged_at = now;

                    tx.put_status(&CollectionStatus::Valid(status.clone()))?;
                    selection.flagged.push(Flagged { previous, status });
                }
            }
        }
        tx.commit()?;

        Ok(selection)
    }

    /// Write back the final status rows of a check cycle
    pub fn release(&mut self, statuses: &[CollectionStatus]) -> Result<()> {
        if statuses.is_empty() {
            return Ok(());
        }

        let tx = self.transaction()?;
        for status in statuses {
            tx.put_status(&status.with_updating(false))?;
        }
        tx.commit()
    }

    /// Get a collection's status row
    pub fn status(&self, name: &str) -> Result<Option<CollectionStatus>> {
        self.conn
            .query_row(
                &format!("SELECT {} FROM collections WHERE name = ?1", STATUS_COLUMNS),
                params![name],
                row_to_status,
            )
            .optional()
            .into_diagnostic()
    }

    /// All status rows, least recently checked first
    pub fn statuses(&self) -> Result<Vec<CollectionStatus>> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT {} FROM collections ORDER BY checked, name",
                STATUS_COLUMNS
            ))
            .into_diagnostic()?;
        let rows = stmt.query_map([], row_to_status).into_diagnostic()?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .into_diagnostic()
    }

    /// Un-park an invalid collection so the next check examines it again
    ///
    /// Returns `false` if the collection is unknown or not invalid.
    pub fn reset(&mut self, name: &str) -> Result<bool> {
        let tx = self.transaction()?;
        let reset = match tx.get_status(name)? {
            Some(CollectionStatus::Invalid(_)) => {
                tx.put_status(&CollectionStatus::Valid(ValidStatus::placeholder(name)))?;
                true
            }
            _ => false,
        };
        tx.commit()?;

        Ok(reset)
    }
}

fn row_to_status(row: &Row<'_>) -> rusqlite::Result<CollectionStatus> {
    let valid: bool = row.get(2)?;
    if valid {
        return Ok(CollectionStatus::Valid(ValidStatus {
            name: row.get(0)?,
            id: row.get(1)?,
            checked: row.get(3)?,
            updated: row.get(4)?,
            updating: row.get(5)?,
            display_name: row.get(7)?,
            is_member: row.get(8)?,
            public_visible: row.get(9)?,
            flagged_at: row.get(10)?,
        }));
    }

    let reason: String = row.get(6)?;
    let reason = reason.parse::<InvalidReason>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, Type::Text, e.into())
    })?;

    Ok(CollectionStatus::Invalid(InvalidStatus {
        name: row.get(0)?,
        id: row.get(1)?,
        checked: row.get(3)?,
        updating: row.get(5)?,
        reason,
    }))
}
