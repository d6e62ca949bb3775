//! Store type definitions
//!
//! Records persisted in the local store: link records and per-collection
//! sync status.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// =========================================================================
// Link Records
// =========================================================================

/// One page of a collection, as last confirmed by the remote source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    /// Stable identifier, unique within its collection
    pub id: String,
    /// Owning collection name
    pub collection: String,
    /// Display title
    pub title: String,
    /// Last modified time (UNIX seconds)
    pub updated: i64,
    /// Outbound link titles, in the order received
    #[serde(default)]
    pub links: Vec<String>,
    /// Thumbnail reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

// =========================================================================
// Collection Status
// =========================================================================

/// Why a collection was parked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvalidReason {
    NotFound,
    NotMember,
    NotLoggedIn,
}

impl InvalidReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvalidReason::NotFound => "NotFoundError",
            InvalidReason::NotMember => "NotMemberError",
            InvalidReason::NotLoggedIn => "NotLoggedInError",
        }
    }
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvalidReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NotFoundError" => Ok(InvalidReason::NotFound),
            "NotMemberError" => Ok(InvalidReason::NotMember),
            "NotLoggedInError" => Ok(InvalidReason::NotLoggedIn),
            other => Err(format!("unknown invalid reason: {}", other)),
        }
    }
}

/// Sync metadata of a collection the remote source can serve
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidStatus {
    /// Collection name (key)
    pub name: String,
    /// Remote identifier, empty until resolved
    pub id: String,
    /// Time of the last completed check
    pub checked: i64,
    /// Remote last-modified time seen at the last completed check
    pub updated: i64,
    /// In-flight flag
    pub updating: bool,
    /// When the in-flight flag was set, 0 when not flagged
    pub flagged_at: i64,
    pub display_name: String,
    pub is_member: bool,
    pub public_visible: bool,
}

impl ValidStatus {
    /// Status of a collection that has never been checked
    pub fn placeholder(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Sync metadata of a collection the remote refused to serve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidStatus {
    /// Collection name (key)
    pub name: String,
    /// Remote identifier if it was ever resolved, otherwise the name
    pub id: String,
    pub checked: i64,
    pub updating: bool,
    pub reason: InvalidReason,
}

/// Per-collection sync status, one row per collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CollectionStatus {
    Valid(ValidStatus),
    Invalid(InvalidStatus),
}

impl CollectionStatus {
    pub fn name(&self) -> &str {
        match self {
            CollectionStatus::Valid(s) => &s.name,
            CollectionStatus::Invalid(s) => &s.name,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            CollectionStatus::Valid(s) => &s.id,
            CollectionStatus::Invalid(s) => &s.id,
        }
    }

    pub fn checked(&self) -> i64 {
        match self {
            CollectionStatus::Valid(s) => s.checked,
            CollectionStatus::Invalid(s) => s.checked,
        }
    }

    pub fn updating(&self) -> bool {
        match self {
            CollectionStatus::Valid(s) => s.updating,
            CollectionStatus::Invalid(s) => s.updating,
        }
    }

    /// Start of the in-flight lease; invalid rows are never flagged
    pub fn flagged_at(&self) -> i64 {
        match self {
            CollectionStatus::Valid(s) => s.flagged_at,
            CollectionStatus::Invalid(_) => 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, CollectionStatus::Valid(_))
    }

    /// Copy of this status with the in-flight flag replaced
    ///
    /// Clearing the flag also clears the lease.
    pub fn with_updating(&self, updating: bool) -> Self {
        match self {
            CollectionStatus::Valid(s) => CollectionStatus::Valid(ValidStatus {
                updating,
                flagged_at: if updating { s.flagged_at } else { 0 },
                ..s.clone()
            }),
            CollectionStatus::Invalid(s) => CollectionStatus::Invalid(InvalidStatus {
                updating,
                ..s.clone()
            }),
        }
    }
}

/// Row counts and file size of the store
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_links: usize,
    pub total_collections: usize,
    pub invalid_collections: usize,
    pub pending_events: usize,
    pub db_size_bytes: u64,
}
