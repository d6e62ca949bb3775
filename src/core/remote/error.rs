//! Remote failures and their classification
//!
//! Permanent refusals park a collection as invalid; everything else is
//! transient and is retried by the next natural check cycle.

use thiserror::Error;

use crate::core::store::InvalidReason;

/// Errors a remote source can report
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    #[error("\"{collection}\" is not found")]
    NotFound { collection: String },

    #[error("You are not a member of \"{collection}\"")]
    NotMember { collection: String },

    #[error("You are not a member of \"{collection}\" or you are not logged in yet")]
    NotLoggedIn { collection: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request aborted: {0}")]
    Aborted(String),

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),
}

/// What a remote failure means for the collection's status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Park the collection until it is explicitly reset
    Invalid(InvalidReason),
    /// Leave the status alone and retry on a later cycle
    Transient,
}

impl RemoteError {
    /// Map this failure to its effect on the collection's status
    pub fn classify(&self) -> Classification {
        match self {
            RemoteError::NotFound { .. } => Classification::Invalid(InvalidReason::NotFound),
            RemoteError::NotMember { .. } => Classification::Invalid(InvalidReason::NotMember),
            RemoteError::NotLoggedIn { .. } => Classification::Invalid(InvalidReason::NotLoggedIn),
            RemoteError::Http { .. }
            | RemoteError::Network(_)
            | RemoteError::Aborted(_)
            | RemoteError::InvalidResponse(_) => Classification::Transient,
        }
    }

    /// Build the error a named remote failure stands for
    ///
    /// `name` is the error name reported by the remote (for example
    /// `NotFoundError`); unknown names become [`RemoteError::Http`].
    pub fn from_name(name: &str, collection: &str, status: u16, message: String) -> Self {
        let collection = collection.to_string();
        match name {
            "NotFoundError" => RemoteError::NotFound { collection },
            "NotMemberError" => RemoteError::NotMember { collection },
            "NotLoggedInError" => RemoteError::NotLoggedIn { collection },
            _ => RemoteError::Http { status, message },
        }
    }
}

/// Classify a remote failure
pub fn classify(error: &RemoteError) -> Classification {
    error.classify()
}
