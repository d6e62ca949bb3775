//! Core module - the sync engine and its collaborators

pub mod clock;
pub mod config;
pub mod engine;
pub mod logging;
pub mod notify;
pub mod reconcile;
pub mod remote;
pub mod store;
pub mod title;
pub mod tracker;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{Config, ConfigError};
pub use engine::{CheckReport, CollectionReport, LinkStorage, Outcome};
pub use notify::{Bus, ChangeEvent, Channel, Listener, Subscription};
pub use reconcile::{reconcile, Diff, Reconciled, Update};
pub use remote::{
    classify, Classification, CollectionMeta, DirectorySource, HttpSource, MemorySource,
    RemoteError, RemotePage, RemoteSource,
};
pub use store::{
    CollectionStatus, EventLog, InvalidReason, InvalidStatus, LinkRecord, LinkStore, StoreStats,
    ValidStatus,
};
pub use title::{expand_links, to_title_lc, GraphEntry};
pub use tracker::{SkipReason, RECOVERY_WINDOW};
