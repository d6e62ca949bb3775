//! Staleness rule for collection sync status
//!
//! Decides, for a single collection, whether a check cycle should pick it up.
//! The transactional side (reading the rows and persisting the in-flight
//! flag) lives in the store; this module is the pure rule.

use serde::Serialize;

use crate::core::store::CollectionStatus;

/// How long an in-flight flag blocks other checkers (seconds)
///
/// A process that crashed mid-check leaves `updating = true` behind; once
/// `flagged_at + RECOVERY_WINDOW` has passed, the next checker reclaims it.
/// The lease is measured from when the flag was taken, not from `checked`,
/// so it holds whatever `max_age` the checkers use.
pub const RECOVERY_WINDOW: i64 = 600;

/// Why a collection was left out of a check cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Parked by a permanent remote error
    Invalid,
    /// Checked less than `max_age` seconds ago
    Fresh,
    /// Another checker holds the in-flight flag
    InFlight,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::Invalid => write!(f, "invalid"),
            SkipReason::Fresh => write!(f, "fresh"),
            SkipReason::InFlight => write!(f, "in flight"),
        }
    }
}

/// Outcome of the staleness rule for one collection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Check,
    Skip(SkipReason),
}

/// Apply the staleness rule
///
/// `status` is `None` for a collection that has never been seen.
pub fn decide(status: Option<&CollectionStatus>, max_age: i64, now: i64) -> Decision {
    if let Some(CollectionStatus::Invalid(_)) = status {
        return Decision::Skip(SkipReason::Invalid);
    }

    let checked = status.map(|s| s.checked()).unwrap_or(0);
    if checked.saturating_add(max_age) > now {
        return Decision::Skip(SkipReason::Fresh);
    }

    let updating = status.map(|s| s.updating()).unwrap_or(false);
    let flagged_at = status.map(|s| s.flagged_at()).unwrap_or(0);
    if updating && flagged_at.saturating_add(RECOVERY_WINDOW) > now {
        return Decision::Skip(SkipReason::InFlight);
    }

    Decision::Check
}
