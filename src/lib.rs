//! linkcache: a local link-graph cache kept in sync with a remote source
//!
//! Pages and their outbound links are cached per collection in SQLite and
//! refreshed incrementally. Readers never touch the network; checkers decide
//! which collections are stale, reconcile them against the remote listing,
//! and publish the resulting diffs to listeners in this and other processes.

pub mod cli;
pub mod core;
