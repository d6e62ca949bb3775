//! The link storage engine
//!
//! [`LinkStorage`] ties the pieces together:
//! - `check` refreshes stale collections from the remote source
//! - `load` reads the local store only
//! - `subscribe` registers interest in changes
//!
//! A check cycle flags the stale collections in the store, looks up their
//! remote metadata, reconciles the ones that changed, publishes the diffs,
//! and finally writes every flagged status back with the in-flight flag
//! cleared. The write-back runs even when the cycle fails part way.

use std::time::Instant;

use miette::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::clock::{Clock, SystemClock};
use crate::core::notify::{Bus, ChangeEvent, Listener, Subscription};
use crate::core::reconcile::{reconcile, Diff};
use crate::core::remote::{
    fetch_metadata, Classification, CollectionMeta, RemoteError, RemoteSource,
};
use crate::core::store::{
    CollectionStatus, Flagged, InvalidReason, InvalidStatus, LinkRecord, LinkStore, ValidStatus,
};
use crate::core::tracker::SkipReason;

/// What a check cycle did with one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Not selected for this cycle
    Skipped { reason: SkipReason },
    /// Remote reported no change since the last check
    Unchanged,
    /// Reconciled against the remote listing
    Updated {
        added: usize,
        updated: usize,
        deleted: usize,
    },
    /// Parked by a permanent remote error
    Invalid { reason: InvalidReason },
    /// Transient remote failure; retried on a later cycle
    Failed {
        error: String,
        added: usize,
        updated: usize,
        deleted: usize,
    },
}

impl Outcome {
    fn from_diff(diff: &Diff) -> Self {
        Outcome::Updated {
            added: diff.added.len(),
            updated: diff.updated.len(),
            deleted: diff.deleted.len(),
        }
    }
}

/// Per-collection result of a check cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CollectionReport {
    pub collection: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

/// Summary of a check cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub collections: Vec<CollectionReport>,
}

impl CheckReport {
    fn push(&mut self, collection: &str, outcome: Outcome) {
        self.collections.push(CollectionReport {
            collection: collection.to_string(),
            outcome,
        });
    }

    /// Outcome for one collection
    pub fn outcome(&self, collection: &str) -> Option<&Outcome> {
        self.collections
            .iter()
            .find(|r| r.collection == collection)
            .map(|r| &r.outcome)
    }

    /// Number of collections that were looked up remotely
    pub fn checked(&self) -> usize {
        self.collections
            .iter()
            .filter(|r| !matches!(r.outcome, Outcome::Skipped { .. }))
            .count()
    }

    /// Number of record changes written in this cycle
    pub fn changes(&self) -> usize {
        self.collections
            .iter()
            .map(|r| match r.outcome {
                Outcome::Updated {
                    added,
                    updated,
                    deleted,
                }
                | Outcome::Failed {
                    added,
                    updated,
                    deleted,
                    ..
                } => added + updated + deleted,
                _ => 0,
            })
            .sum()
    }
}

/// Local link cache kept in sync with a remote source
pub struct LinkStorage<R: RemoteSource> {
    store: LinkStore,
    remote: R,
    bus: Bus,
    clock: Box<dyn Clock>,
}

impl<R: RemoteSource> LinkStorage<R> {
    pub fn new(store: LinkStore, remote: R) -> Self {
        Self {
            store,
            remote,
            bus: Bus::new(),
            clock: Box::new(SystemClock),
        }
    }

    /// Use `clock` instead of wall-clock time
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Publish through `bus` (for example one with a cross-process channel)
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    pub fn store(&self) -> &LinkStore {
        &self.store
    }

    pub fn bus_mut(&mut self) -> &mut Bus {
        &mut self.bus
    }

    /// Refresh the given collections if they are stale
    ///
    /// Remote failures are handled per collection and reported in the
    /// returned [`CheckReport`]; only store failures are returned as errors.
    /// Either way every collection flagged by this call has its in-flight
    /// flag cleared before returning.
    pub fn check<S: AsRef<str>>(
        &mut self,
        collections: &[S],
        max_age: i64,
    ) -> Result<CheckReport> {
        let start = Instant::now();
        let now = self.clock.now();
        let selection = self.store.select_stale(collections, max_age, now)?;

        let mut report = CheckReport::default();
        for (name, reason) in &selection.skipped {
            debug!("skipping \"{}\": {}", name, reason);
            report.push(name, Outcome::Skipped { reason: *reason });
        }

        if selection.flagged.is_empty() {
            debug!("no collection needs a check");
            return Ok(report);
        }
        info!("checking {} collections", selection.flagged.len());

        let mut finished: Vec<Option<CollectionStatus>> = vec![None; selection.flagged.len()];
        let result = self.run_cycle(&selection.flagged, &mut finished, &mut report);

        let statuses: Vec<CollectionStatus> = selection
            .flagged
            .iter()
            .zip(finished)
            .map(|(flagged, status)| status.unwrap_or_else(|| flagged.restore()))
            .collect();
        let released = self.store.release(&statuses);

        result?;
        released?;

        debug!(
            "check cycle finished in {}ms ({} changes)",
            start.elapsed().as_millis(),
            report.changes()
        );
        Ok(report)
    }

    fn run_cycle(
        &mut self,
        flagged: &[Flagged],
        finished: &mut [Option<CollectionStatus>],
        report: &mut CheckReport,
    ) -> Result<()> {
        let statuses: Vec<ValidStatus> = flagged.iter().map(|f| f.status.clone()).collect();
        let metas = fetch_metadata(&self.remote, &statuses);

        for (i, (flag, meta)) in flagged.iter().zip(metas).enumerate() {
            let (status, outcome) = match meta {
                Ok(meta) => self.sync_collection(flag, meta)?,
                Err(e) => match e.classify() {
                    Classification::Invalid(reason) => {
                        warn!("\"{}\" is parked: {}", flag.name(), e);
                        (
                            Some(self.invalid_status(flag, reason)),
                            Outcome::Invalid { reason },
                        )
                    }
                    Classification::Transient => {
                        warn!("failed to look up \"{}\": {}", flag.name(), e);
                        (None, failed(&e, &Diff::default()))
                    }
                },
            };

            finished[i] = status;
            report.push(flag.name(), outcome);
        }

        Ok(())
    }

    /// Reconcile one collection whose metadata lookup succeeded
    fn sync_collection(
        &mut self,
        flag: &Flagged,
        meta: CollectionMeta,
    ) -> Result<(Option<CollectionStatus>, Outcome)> {
        let stored = &flag.status;
        let changed = meta.updated >= stored.checked || meta.updated != stored.updated;

        let mut status = ValidStatus {
            name: stored.name.clone(),
            id: meta.id,
            checked: stored.checked,
            updated: stored.updated,
            updating: false,
            flagged_at: 0,
            display_name: meta.display_name,
            is_member: meta.is_member,
            public_visible: meta.public_visible,
        };

        if !changed {
            debug!("\"{}\" has no updates", stored.name);
            status.checked = self.clock.now();
            return Ok((Some(CollectionStatus::Valid(status)), Outcome::Unchanged));
        }

        let reconciled = reconcile(&mut self.store, &self.remote, &stored.name)?;
        let diff = reconciled.diff;

        let outcome = match reconciled.aborted {
            None => {
                status.checked = self.clock.now();
                status.updated = meta.updated;
                if !diff.is_empty() {
                    info!(
                        "\"{}\": {} added, {} updated, {} deleted",
                        stored.name,
                        diff.added.len(),
                        diff.updated.len(),
                        diff.deleted.len()
                    );
                }
                (Some(CollectionStatus::Valid(status)), Outcome::from_diff(&diff))
            }
            Some(e) => match e.classify() {
                Classification::Invalid(reason) => {
                    warn!("\"{}\" is parked: {}", stored.name, e);
                    (
                        Some(self.invalid_status(flag, reason)),
                        Outcome::Invalid { reason },
                    )
                }
                Classification::Transient => {
                    // Keep the old `updated` so the next cycle reconciles again
                    warn!("sync of \"{}\" stopped early: {}", stored.name, e);
                    status.checked = self.clock.now();
                    (Some(CollectionStatus::Valid(status)), failed(&e, &diff))
                }
            },
        };

        self.bus.publish(ChangeEvent {
            collection: stored.name.clone(),
            diff,
        });

        Ok(outcome)
    }

    fn invalid_status(&self, flag: &Flagged, reason: InvalidReason) -> CollectionStatus {
        let id = if flag.status.id.is_empty() {
            flag.status.name.clone()
        } else {
            flag.status.id.clone()
        };

        CollectionStatus::Invalid(InvalidStatus {
            name: flag.status.name.clone(),
            id,
            checked: self.clock.now(),
            updating: false,
            reason,
        })
    }

    /// Read the stored records of `collections`; never touches the network
    pub fn load<I, S>(&self, collections: I) -> Result<Vec<LinkRecord>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.store.load(collections)
    }

    /// Register `listener` for changes to `collections`
    pub fn subscribe<I, S>(&self, collections: I, listener: Listener) -> Subscription
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.bus.subscribe(collections, listener)
    }

    /// Deliver changes made by other processes to local listeners
    pub fn relay(&mut self) -> Result<usize> {
        self.bus.relay()
    }

    /// Make an invalid collection eligible for the next check
    pub fn reset(&mut self, collection: &str) -> Result<bool> {
        let reset = self.store.reset(collection)?;
        if reset {
            info!("\"{}\" will be checked again", collection);
        }
        Ok(reset)
    }

    /// Every collection's status, least recently checked first
    pub fn statuses(&self) -> Result<Vec<CollectionStatus>> {
        self.store.statuses()
    }
}

fn failed(error: &RemoteError, diff: &Diff) -> Outcome {
    Outcome::Failed {
        error: error.to_string(),
        added: diff.added.len(),
        updated: diff.updated.len(),
        deleted: diff.deleted.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use crate::core::remote::{MemorySource, Pages, RemotePage};
    use crate::core::tracker::RECOVERY_WINDOW;
    use std::path::PathBuf;
    use std::rc::Rc;
    use std::sync::{Arc, Mutex};
    use tempfile::{tempdir, TempDir};

    const NOW: i64 = 10_000;

    fn page(id: &str, updated: i64) -> RemotePage {
        RemotePage {
            id: id.to_string(),
            title: format!("Page {}", id),
            updated,
            links: vec![],
            image: None,
        }
    }

    fn open_store(tmp: &TempDir) -> LinkStore {
        LinkStore::open(&tmp.path().join("links.db")).unwrap()
    }

    fn engine<'r>(
        tmp: &TempDir,
        remote: &'r MemorySource,
        clock: &Rc<FixedClock>,
    ) -> LinkStorage<&'r MemorySource> {
        LinkStorage::new(open_store(tmp), remote).with_clock(Rc::clone(clock))
    }

    fn valid(storage: &LinkStorage<impl RemoteSource>, name: &str) -> ValidStatus {
        match storage.store().status(name).unwrap() {
            Some(CollectionStatus::Valid(s)) => s,
            other => panic!("expected a valid status, got {:?}", other),
        }
    }

    fn record_events(
        storage: &LinkStorage<impl RemoteSource>,
        collections: &[&str],
    ) -> Arc<Mutex<Vec<ChangeEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let _ = storage.subscribe(
            collections.iter().copied(),
            Arc::new(move |e: &ChangeEvent| sink.lock().unwrap().push(e.clone())),
        );
        events
    }

    #[test]
    fn test_first_check_loads_collection() {
        let tmp = tempdir().unwrap();
        let remote = MemorySource::new().with_collection(
            "alpha",
            "a1",
            20,
            vec![page("id1", 10), page("id2", 20)],
        );
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);
        let events = record_events(&storage, &["alpha"]);

        let report = storage.check(&["alpha"], 3600).unwrap();

        assert_eq!(
            report.outcome("alpha"),
            Some(&Outcome::Updated {
                added: 2,
                updated: 0,
                deleted: 0
            })
        );
        assert_eq!(storage.load(["alpha"]).unwrap().len(), 2);

        let status = valid(&storage, "alpha");
        assert_eq!(status.id, "a1");
        assert_eq!(status.checked, NOW);
        assert_eq!(status.updated, 20);
        assert!(!status.updating);

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].diff.added.len(), 2);
    }

    #[test]
    fn test_second_check_is_idempotent() {
        let tmp = tempdir().unwrap();
        let remote =
            MemorySource::new().with_collection("alpha", "a1", 20, vec![page("id1", 20)]);
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);
        let events = record_events(&storage, &["alpha"]);

        storage.check(&["alpha"], 0).unwrap();
        clock.advance(5);
        let report = storage.check(&["alpha"], 0).unwrap();

        assert_eq!(report.outcome("alpha"), Some(&Outcome::Unchanged));
        assert_eq!(events.lock().unwrap().len(), 1);
        // Only the listing of the first cycle
        assert_eq!(remote.stream_calls(), vec!["alpha"]);

        let status = valid(&storage, "alpha");
        assert_eq!(status.checked, NOW + 5);
        assert_eq!(status.updated, 20);
    }

    #[test]
    fn test_fresh_collection_is_skipped() {
        let tmp = tempdir().unwrap();
        let remote = MemorySource::new().with_collection("alpha", "a1", 20, vec![]);
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);

        storage.check(&["alpha"], 3600).unwrap();
        clock.advance(60);
        let report = storage.check(&["alpha"], 3600).unwrap();

        assert_eq!(
            report.outcome("alpha"),
            Some(&Outcome::Skipped {
                reason: SkipReason::Fresh
            })
        );
        assert_eq!(report.checked(), 0);
    }

    #[test]
    fn test_remote_changes_are_applied() {
        let tmp = tempdir().unwrap();
        let remote = MemorySource::new().with_collection(
            "alpha",
            "a1",
            10,
            vec![page("id1", 10), page("id2", 10)],
        );
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);
        storage.check(&["alpha"], 0).unwrap();
        let events = record_events(&storage, &["alpha"]);

        clock.advance(100);
        remote.set_pages("alpha", NOW + 50, vec![page("id1", NOW + 50)]);
        let report = storage.check(&["alpha"], 0).unwrap();

        assert_eq!(
            report.outcome("alpha"),
            Some(&Outcome::Updated {
                added: 0,
                updated: 1,
                deleted: 1
            })
        );
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(events[0].diff.updated.contains_key("id1"));
        assert!(events[0].diff.deleted.contains_key("id2"));
    }

    #[test]
    fn test_concurrent_checks_reconcile_once() {
        let tmp = tempdir().unwrap();
        let remote = MemorySource::new().with_collection("alpha", "a1", 20, vec![page("id1", 20)]);
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);
        storage.check(&["alpha"], 0).unwrap();

        // Another checker picks the collection up first
        clock.advance(100);
        let mut other = open_store(&tmp);
        let selection = other.select_stale(&["alpha"], 0, clock.now()).unwrap();
        assert_eq!(selection.flagged.len(), 1);

        let report = storage.check(&["alpha"], 0).unwrap();

        assert_eq!(
            report.outcome("alpha"),
            Some(&Outcome::Skipped {
                reason: SkipReason::InFlight
            })
        );
        assert_eq!(remote.stream_calls().len(), 1);
    }

    #[test]
    fn test_abandoned_flag_is_reclaimed() {
        let tmp = tempdir().unwrap();
        let remote = MemorySource::new().with_collection("alpha", "a1", 20, vec![page("id1", 20)]);
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);
        storage.check(&["alpha"], 0).unwrap();

        // A checker crashed after flagging the collection
        clock.advance(10);
        {
            let mut crashed = open_store(&tmp);
            crashed.select_stale(&["alpha"], 0, clock.now()).unwrap();
        }
        assert!(valid(&storage, "alpha").updating);

        clock.advance(RECOVERY_WINDOW - 20);
        let report = storage.check(&["alpha"], 0).unwrap();
        assert!(matches!(report.outcome("alpha"), Some(Outcome::Skipped { .. })));

        clock.advance(20);
        let report = storage.check(&["alpha"], 0).unwrap();
        assert_eq!(report.outcome("alpha"), Some(&Outcome::Unchanged));
        assert!(!valid(&storage, "alpha").updating);
    }

    #[test]
    fn test_in_flight_holds_with_default_max_age() {
        let tmp = tempdir().unwrap();
        let remote = MemorySource::new().with_collection("alpha", "a1", 20, vec![page("id1", 20)]);
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);
        storage.check(&["alpha"], 3600).unwrap();

        // Stale again; another checker takes the flag first
        clock.advance(4000);
        let mut other = open_store(&tmp);
        let selection = other.select_stale(&["alpha"], 3600, clock.now()).unwrap();
        assert_eq!(selection.flagged.len(), 1);

        clock.advance(30);
        let report = storage.check(&["alpha"], 3600).unwrap();

        assert_eq!(
            report.outcome("alpha"),
            Some(&Outcome::Skipped {
                reason: SkipReason::InFlight
            })
        );
        assert!(valid(&storage, "alpha").updating);
        assert_eq!(remote.stream_calls().len(), 1);

        // The other checker's write-back ends the lease
        other.release(&[selection.flagged[0].restore()]).unwrap();
        assert!(!valid(&storage, "alpha").updating);
    }

    #[test]
    fn test_crashed_flag_reclaimed_with_default_max_age() {
        let tmp = tempdir().unwrap();
        let remote = MemorySource::new().with_collection("alpha", "a1", 20, vec![page("id1", 20)]);
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);
        storage.check(&["alpha"], 3600).unwrap();

        clock.advance(4000);
        {
            let mut crashed = open_store(&tmp);
            crashed.select_stale(&["alpha"], 3600, clock.now()).unwrap();
        }

        clock.advance(RECOVERY_WINDOW);
        let report = storage.check(&["alpha"], 3600).unwrap();
        assert_eq!(report.outcome("alpha"), Some(&Outcome::Unchanged));

        let status = valid(&storage, "alpha");
        assert!(!status.updating);
        assert_eq!(status.flagged_at, 0);
        assert_eq!(status.checked, clock.now());
    }

    #[test]
    fn test_not_found_parks_collection() {
        let tmp = tempdir().unwrap();
        let remote = MemorySource::new();
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);

        let report = storage.check(&["ghost"], 3600).unwrap();
        assert_eq!(
            report.outcome("ghost"),
            Some(&Outcome::Invalid {
                reason: InvalidReason::NotFound
            })
        );

        match storage.store().status("ghost").unwrap() {
            Some(CollectionStatus::Invalid(s)) => {
                assert_eq!(s.reason, InvalidReason::NotFound);
                assert_eq!(s.checked, NOW);
                assert!(!s.updating);
            }
            other => panic!("expected an invalid status, got {:?}", other),
        }

        clock.advance(7200);
        let report = storage.check(&["ghost"], 3600).unwrap();
        assert_eq!(
            report.outcome("ghost"),
            Some(&Outcome::Skipped {
                reason: SkipReason::Invalid
            })
        );
        assert_eq!(remote.single_calls(), vec!["ghost"]);
    }

    #[test]
    fn test_reset_makes_collection_checkable_again() {
        let tmp = tempdir().unwrap();
        let remote = MemorySource::new();
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);
        storage.check(&["ghost"], 3600).unwrap();

        assert!(storage.reset("ghost").unwrap());
        assert!(!storage.reset("ghost").unwrap());
        assert!(!storage.reset("unknown").unwrap());

        let report = storage.check(&["ghost"], 3600).unwrap();
        assert!(matches!(report.outcome("ghost"), Some(Outcome::Invalid { .. })));
    }

    #[test]
    fn test_transient_lookup_failure_leaves_status_untouched() {
        let tmp = tempdir().unwrap();
        let remote = MemorySource::new().with_collection("alpha", "a1", 20, vec![page("id1", 20)]);
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);
        storage.check(&["alpha"], 0).unwrap();
        let before = valid(&storage, "alpha");

        remote.set_error("alpha", RemoteError::Network("connection refused".into()));
        clock.advance(100);
        let report = storage.check(&["alpha"], 0).unwrap();

        assert!(matches!(report.outcome("alpha"), Some(Outcome::Failed { .. })));
        assert_eq!(valid(&storage, "alpha"), before);
    }

    #[test]
    fn test_transient_stream_failure_resumes_next_cycle() {
        let tmp = tempdir().unwrap();
        let pages = vec![page("a", 10), page("b", 20), page("c", 30)];
        let clock = Rc::new(FixedClock::new(NOW));

        let flaky = MemorySource::new()
            .with_collection("alpha", "a1", 30, pages.clone())
            .with_page_size(1);
        flaky.fail_stream_after("alpha", 1, RemoteError::Aborted("timed out".into()));
        let mut storage = engine(&tmp, &flaky, &clock);

        let report = storage.check(&["alpha"], 0).unwrap();
        assert!(matches!(
            report.outcome("alpha"),
            Some(Outcome::Failed { added: 1, .. })
        ));
        let status = valid(&storage, "alpha");
        assert_eq!(status.checked, NOW);
        assert_eq!(status.updated, 0);
        assert!(!status.updating);
        drop(storage);

        // The remote did not change since, but the stored `updated` still lags
        clock.advance(10);
        let healthy = MemorySource::new().with_collection("alpha", "a1", 30, pages);
        let mut storage = engine(&tmp, &healthy, &clock);
        let report = storage.check(&["alpha"], 0).unwrap();

        assert_eq!(
            report.outcome("alpha"),
            Some(&Outcome::Updated {
                added: 2,
                updated: 0,
                deleted: 0
            })
        );
        assert_eq!(valid(&storage, "alpha").updated, 30);
    }

    #[test]
    fn test_failures_do_not_stop_siblings() {
        let tmp = tempdir().unwrap();
        let remote = MemorySource::new()
            .with_collection("alpha", "a1", 20, vec![page("id1", 20)])
            .with_collection("beta", "b1", 20, vec![page("id9", 20)])
            .with_error("alpha", RemoteError::Network("reset".into()));
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);

        let report = storage.check(&["alpha", "ghost", "beta"], 0).unwrap();

        assert!(matches!(report.outcome("alpha"), Some(Outcome::Failed { .. })));
        assert!(matches!(report.outcome("ghost"), Some(Outcome::Invalid { .. })));
        assert!(matches!(report.outcome("beta"), Some(Outcome::Updated { .. })));
        assert_eq!(storage.load(["beta"]).unwrap().len(), 1);
        assert!(storage.statuses().unwrap().iter().all(|s| !s.updating()));
    }

    #[test]
    fn test_known_ids_use_batch_lookup() {
        let tmp = tempdir().unwrap();
        let remote = MemorySource::new()
            .with_collection("alpha", "a1", 20, vec![])
            .with_collection("beta", "b1", 20, vec![]);
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);

        storage.check(&["alpha", "beta"], 0).unwrap();
        assert!(remote.batch_calls().is_empty());
        assert_eq!(remote.single_calls().len(), 2);

        clock.advance(10);
        storage.check(&["alpha", "beta"], 0).unwrap();
        assert_eq!(remote.batch_calls().len(), 1);
        assert_eq!(remote.single_calls().len(), 2);
    }

    #[test]
    fn test_batch_failure_falls_back_to_single_lookups() {
        let tmp = tempdir().unwrap();
        let remote = MemorySource::new()
            .with_collection("alpha", "a1", 20, vec![page("id1", 20)])
            .with_batch_error(RemoteError::Http {
                status: 401,
                message: "Unauthorized".into(),
            });
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);
        storage.check(&["alpha"], 0).unwrap();

        clock.advance(10);
        remote.set_pages("alpha", NOW + 5, vec![page("id1", 20), page("id2", NOW + 5)]);
        let report = storage.check(&["alpha"], 0).unwrap();

        assert_eq!(remote.batch_calls().len(), 1);
        assert_eq!(remote.single_calls(), vec!["alpha", "alpha"]);
        assert!(matches!(
            report.outcome("alpha"),
            Some(Outcome::Updated { added: 1, .. })
        ));
    }

    #[test]
    fn test_empty_diff_is_not_published() {
        let tmp = tempdir().unwrap();
        let remote = MemorySource::new().with_collection("alpha", "a1", 20, vec![page("id1", 20)]);
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage = engine(&tmp, &remote, &clock);
        storage.check(&["alpha"], 0).unwrap();
        let events = record_events(&storage, &["alpha"]);

        // Remote claims a change but the listing is the same
        clock.advance(10);
        remote.set_pages("alpha", NOW + 5, vec![page("id1", 20)]);
        let report = storage.check(&["alpha"], 0).unwrap();

        assert_eq!(
            report.outcome("alpha"),
            Some(&Outcome::Updated {
                added: 0,
                updated: 0,
                deleted: 0
            })
        );
        assert!(events.lock().unwrap().is_empty());
    }

    /// Drops the links table underneath the engine when a listing starts
    struct SabotagedSource {
        inner: MemorySource,
        db: PathBuf,
    }

    impl RemoteSource for SabotagedSource {
        fn list_collections(&self, ids: &[String]) -> Result<Vec<CollectionMeta>, RemoteError> {
            self.inner.list_collections(ids)
        }

        fn get_collection(&self, name: &str) -> Result<CollectionMeta, RemoteError> {
            self.inner.get_collection(name)
        }

        fn stream_links<'a>(&'a self, name: &str) -> Result<Pages<'a>, RemoteError> {
            let conn = rusqlite::Connection::open(&self.db).unwrap();
            conn.execute_batch("DROP TABLE links").unwrap();
            self.inner.stream_links(name)
        }
    }

    #[test]
    fn test_store_failure_still_clears_flags() {
        let tmp = tempdir().unwrap();
        let db = tmp.path().join("links.db");
        let remote = SabotagedSource {
            inner: MemorySource::new()
                .with_collection("alpha", "a1", 20, vec![page("id1", 20)])
                .with_collection("beta", "b1", 20, vec![page("id2", 20)]),
            db: db.clone(),
        };
        let clock = Rc::new(FixedClock::new(NOW));
        let mut storage =
            LinkStorage::new(LinkStore::open(&db).unwrap(), remote).with_clock(Rc::clone(&clock));

        assert!(storage.check(&["alpha", "beta"], 0).is_err());

        let statuses = storage.statuses().unwrap();
        assert_eq!(statuses.len(), 2);
        for status in statuses {
            assert!(!status.updating(), "{} left in flight", status.name());
            assert_eq!(status.checked(), 0);
        }
    }
}
