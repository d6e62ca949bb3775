//! Command implementations

pub mod check;
pub mod completions;
pub mod graph;
pub mod load;
pub mod reset;
pub mod status;
pub mod watch;
