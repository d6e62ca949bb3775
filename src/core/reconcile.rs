//! Reconciliation of a collection against its remote listing
//!
//! The remote streams a collection page by page, ordered by `updated`
//! ascending. For every page with largest value `upper`, only the local
//! records with `updated` in `(previous upper, upper]` can have been
//! invalidated by it, so only that window is scanned. Local records in the
//! window that the listing has not (yet) produced become delete candidates;
//! an id that shows up later is taken off the list. Whatever is left when
//! the listing ends, plus local records newer than anything the remote
//! produced, is deleted.
//!
//! Each page is applied in its own transaction. A remote failure mid-stream
//! stops the collection: pages already applied stay, candidates are dropped.

use std::collections::{BTreeMap, HashSet};

use miette::Result;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::remote::{RemoteError, RemotePage, RemoteSource};
use crate::core::store::{LinkRecord, LinkStore};

/// A changed record, before and after
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Update {
    pub old: LinkRecord,
    pub new: LinkRecord,
}

/// Changes applied to one collection, keyed by record id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diff {
    #[serde(default)]
    pub added: BTreeMap<String, LinkRecord>,
    #[serde(default)]
    pub updated: BTreeMap<String, Update>,
    #[serde(default)]
    pub deleted: BTreeMap<String, LinkRecord>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Total number of changed records
    pub fn len(&self) -> usize {
        self.added.len() + self.updated.len() + self.deleted.len()
    }

    /// Record `new` replacing `old`, folding into an earlier change of the
    /// same id
    fn record_update(&mut self, old: LinkRecord, new: LinkRecord) {
        if let Some(added) = self.added.get_mut(&new.id) {
            *added = new;
        } else if let Some(update) = self.updated.get_mut(&new.id) {
            update.new = new;
        } else {
            self.updated.insert(new.id.clone(), Update { old, new });
        }
    }
}

/// Result of reconciling one collection
#[derive(Debug)]
pub struct Reconciled {
    /// Changes that were written to the store
    pub diff: Diff,
    /// The remote failure that cut the listing short, if any
    pub aborted: Option<RemoteError>,
}

/// Bring the stored records of `collection` in line with the remote listing
///
/// Store failures are returned as errors. Remote failures are not: they end
/// the listing early and are reported in [`Reconciled::aborted`].
pub fn reconcile<R: RemoteSource + ?Sized>(
    store: &mut LinkStore,
    remote: &R,
    collection: &str,
) -> Result<Reconciled> {
    let mut reconciler = Reconciler::new(collection, remote.ordered_by_updated());

    let pages = match remote.stream_links(collection) {
        Ok(pages) => pages,
        Err(e) => {
            warn!("failed to list pages of \"{}\": {}", collection, e);
            return Ok(reconciler.abort(e));
        }
    };

    for page in pages {
        match page {
            Ok(page) => reconciler.apply_page(store, page)?,
            Err(e) => {
                warn!(
                    "listing of \"{}\" failed after {} pages: {}",
                    collection, reconciler.pages, e
                );
                return Ok(reconciler.abort(e));
            }
        }
    }

    reconciler.finish(store)
}

struct Reconciler<'c> {
    collection: &'c str,
    ordered: bool,
    /// Exclusive lower bound of the next scan window
    lower: Option<i64>,
    /// Ids the listing has produced so far
    seen: HashSet<String>,
    candidates: BTreeMap<String, LinkRecord>,
    diff: Diff,
    pages: usize,
}

impl<'c> Reconciler<'c> {
    fn new(collection: &'c str, ordered: bool) -> Self {
        Self {
            collection,
            ordered,
            lower: None,
            seen: HashSet::new(),
            candidates: BTreeMap::new(),
            diff: Diff::default(),
            pages: 0,
        }
    }

    fn apply_page(&mut self, store: &mut LinkStore, page: Vec<RemotePage>) -> Result<()> {
        self.pages += 1;
        let Some(upper) = page.iter().map(|p| p.updated).max() else {
            return Ok(());
        };

        let tx = store.transaction()?;

        if self.ordered {
            let page_ids: HashSet<&str> = page.iter().map(|p| p.id.as_str()).collect();
            for local in tx.scan_window(self.collection, self.lower, Some(upper))? {
                if !page_ids.contains(local.id.as_str()) && !self.seen.contains(&local.id) {
                    self.candidates.insert(local.id.clone(), local);
                }
            }
        }

        for entry in page {
            self.candidates.remove(&entry.id);
            self.seen.insert(entry.id.clone());

            let record = entry.into_record(self.collection);
            match tx.get_link(self.collection, &record.id)? {
                None => {
                    tx.put_link(&record)?;
                    self.diff.added.insert(record.id.clone(), record);
                }
                Some(old) if record.updated > old.updated => {
                    tx.put_link(&record)?;
                    self.diff.record_update(old, record);
                }
                // Repeated across pages, or not newer than what we have
                Some(_) => {}
            }
        }

        tx.commit()?;

        if self.ordered {
            self.lower = Some(self.lower.map_or(upper, |lower| lower.max(upper)));
        }
        Ok(())
    }

    fn finish(mut self, store: &mut LinkStore) -> Result<Reconciled> {
        let tx = store.transaction()?;

        // Without ordering no window was scanned, so this covers everything
        let after = if self.ordered { self.lower } else { None };
        for local in tx.scan_window(self.collection, after, None)? {
            if !self.seen.contains(&local.id) {
                self.candidates.insert(local.id.clone(), local);
            }
        }

        for (id, record) in std::mem::take(&mut self.candidates) {
            if tx.delete_link(self.collection, &id)? {
                self.diff.deleted.insert(id, record);
            }
        }
        tx.commit()?;

        debug!(
            "reconciled \"{}\": {} pages, {} added, {} updated, {} deleted",
            self.collection,
            self.pages,
            self.diff.added.len(),
            self.diff.updated.len(),
            self.diff.deleted.len()
        );

        Ok(Reconciled {
            diff: self.diff,
            aborted: None,
        })
    }

    fn abort(self, error: RemoteError) -> Reconciled {
        Reconciled {
            diff: self.diff,
            aborted: Some(error),
        }
    }
}
