//! Link record queries
//!
//! Point lookups, writes, and `updated`-ordered range scans used by the
//! reconciler, plus the read-only `load` path.

use std::collections::HashSet;

use miette::{IntoDiagnostic, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{LinkRecord, LinkStore, StoreTx};

const LINK_COLUMNS: &str = "collection, id, title, updated, links, image";

impl StoreTx<'_> {
    /// Get one record by key
    pub fn get_link(&self, collection: &str, id: &str) -> Result<Option<LinkRecord>> {
        self.tx
            .query_row(
                &format!(
                    "SELECT {} FROM links WHERE collection = ?1 AND id = ?2",
                    LINK_COLUMNS
                ),
                params![collection, id],
                row_to_record,
            )
            .optional()
            .into_diagnostic()
    }

    /// Insert or replace a record
    pub fn put_link(&self, record: &LinkRecord) -> Result<()> {
        let links = serde_json::to_string(&record.links).into_diagnostic()?;
        self.tx
            .execute(
                r#"INSERT OR REPLACE INTO links
                   (collection, id, title, updated, links, image)
                   VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
                params![
                    record.collection,
                    record.id,
                    record.title,
                    record.updated,
                    links,
                    record.image
                ],
            )
            .into_diagnostic()?;
        Ok(())
    }

    /// Delete a record, returning whether it existed
    pub fn delete_link(&self, collection: &str, id: &str) -> Result<bool> {
        let n = self
            .tx
            .execute(
                "DELETE FROM links WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )
            .into_diagnostic()?;
        Ok(n > 0)
    }

    /// Scan a collection's records with `after < updated <= through`
    ///
    /// `None` leaves that side of the window unbounded. Results are ordered by
    /// `updated`.
    pub fn scan_window(
        &self,
        collection: &str,
        after: Option<i64>,
        through: Option<i64>,
    ) -> Result<Vec<LinkRecord>> {
        // Convert the exclusive lower bound into an inclusive one for BETWEEN
        let low = match after {
            Some(v) => v.saturating_add(1),
            None => i64::MIN,
        };
        let high = through.unwrap_or(i64::MAX);

        let mut stmt = self
            .tx
            .prepare(&format!(
                r#"SELECT {} FROM links
                   WHERE collection = ?1 AND updated BETWEEN ?2 AND ?3
                   ORDER BY updated"#,
                LINK_COLUMNS
            ))
            .into_diagnostic()?;
        let rows = stmt
            .query_map(params![collection, low, high], row_to_record)
            .into_diagnostic()?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .into_diagnostic()
    }
}

impl LinkStore {
    /// Read the stored records of the given collections
    ///
    /// Never touches the network. Records come back grouped in request order,
    /// each group ordered by title; unknown collections contribute nothing and
    /// repeated names are read once.
    pub fn load<I, S>(&self, collections: I) -> Result<Vec<LinkRecord>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let start = std::time::Instant::now();
        let mut seen = HashSet::new();
        let mut list = Vec::new();
        let mut requested = 0usize;

        let mut stmt = self
            .conn
            .prepare_cached(&format!(
                "SELECT {} FROM links WHERE collection = ?1 ORDER BY title, id",
                LINK_COLUMNS
            ))
            .into_diagnostic()?;

        for collection in collections {
            let collection = collection.as_ref();
            if !seen.insert(collection.to_string()) {
                continue;
            }
            requested += 1;

            let rows = stmt
                .query_map(params![collection], row_to_record)
                .into_diagnostic()?;
            for row in rows {
                list.push(row.into_diagnostic()?);
            }
        }

        tracing::debug!(
            "read {} links of {} collections in {}ms",
            list.len(),
            requested,
            start.elapsed().as_millis()
        );

        Ok(list)
    }

    /// Number of stored records in a collection
    pub fn count_links(&self, collection: &str) -> Result<usize> {
        count_links(&self.conn, collection)
    }
}

fn count_links(conn: &Connection, collection: &str) -> Result<usize> {
    conn.query_row(
        "SELECT COUNT(*) FROM links WHERE collection = ?1",
        params![collection],
        |row| row.get::<_, i64>(0),
    )
    .map(|n| n as usize)
    .into_diagnostic()
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<LinkRecord> {
    let links: String = row.get(4)?;
    let links: Vec<String> = serde_json::from_str(&links)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;

    Ok(LinkRecord {
        collection: row.get(0)?,
        id: row.get(1)?,
        title: row.get(2)?,
        updated: row.get(3)?,
        links,
        image: row.get(5)?,
    })
}
