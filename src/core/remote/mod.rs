//! Remote source of truth
//!
//! The engine talks to the remote through [`RemoteSource`]: batch and
//! single collection metadata lookups, and a paginated listing of a
//! collection's pages. Implementations:
//! - [`HttpSource`] - the REST API
//! - [`DirectorySource`] - JSON exports in a local directory
//! - [`MemorySource`] - scripted in-memory source for tests and embedding

mod batch;
mod error;
mod fixture;
mod http;
mod memory;

pub use batch::{fetch_metadata, BATCH_LIMIT};
pub use error::{classify, Classification, RemoteError};
pub use fixture::DirectorySource;
pub use http::HttpSource;
pub use memory::MemorySource;

use serde::{Deserialize, Serialize};

use crate::core::store::LinkRecord;

/// Collection metadata as reported by the remote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionMeta {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    /// Remote last-modified time (UNIX seconds)
    pub updated: i64,
    #[serde(default)]
    pub is_member: bool,
    #[serde(default)]
    pub public_visible: bool,
}

/// One entry of a remote listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePage {
    pub id: String,
    pub title: String,
    pub updated: i64,
    #[serde(default)]
    pub links: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl RemotePage {
    /// The stored form of this entry
    pub fn into_record(self, collection: &str) -> LinkRecord {
        LinkRecord {
            id: self.id,
            collection: collection.to_string(),
            title: self.title,
            updated: self.updated,
            links: self.links,
            image: self.image,
        }
    }
}

/// Lazy sequence of listing pages; each item is one remote round trip
pub type Pages<'a> = Box<dyn Iterator<Item = Result<Vec<RemotePage>, RemoteError>> + 'a>;

/// A remote source of link data
pub trait RemoteSource {
    /// Metadata of many collections by remote id, in one request
    fn list_collections(&self, ids: &[String]) -> Result<Vec<CollectionMeta>, RemoteError>;

    /// Metadata of one collection by name
    fn get_collection(&self, name: &str) -> Result<CollectionMeta, RemoteError>;

    /// Stream every page of a collection
    fn stream_links<'a>(&'a self, name: &str) -> Result<Pages<'a>, RemoteError>;

    /// Whether [`RemoteSource::stream_links`] yields entries ordered by
    /// `updated` ascending
    ///
    /// When `false` the reconciler falls back to comparing the whole
    /// collection instead of bounded windows.
    fn ordered_by_updated(&self) -> bool {
        true
    }
}

impl<R: RemoteSource + ?Sized> RemoteSource for &R {
    fn list_collections(&self, ids: &[String]) -> Result<Vec<CollectionMeta>, RemoteError> {
        (**self).list_collections(ids)
    }

    fn get_collection(&self, name: &str) -> Result<CollectionMeta, RemoteError> {
        (**self).get_collection(name)
    }

    fn stream_links<'a>(&'a self, name: &str) -> Result<Pages<'a>, RemoteError> {
        (**self).stream_links(name)
    }

    fn ordered_by_updated(&self) -> bool {
        (**self).ordered_by_updated()
    }
}

impl<R: RemoteSource + ?Sized> RemoteSource for Box<R> {
    fn list_collections(&self, ids: &[String]) -> Result<Vec<CollectionMeta>, RemoteError> {
        (**self).list_collections(ids)
    }

    fn get_collection(&self, name: &str) -> Result<CollectionMeta, RemoteError> {
        (**self).get_collection(name)
    }

    fn stream_links<'a>(&'a self, name: &str) -> Result<Pages<'a>, RemoteError> {
        (**self).stream_links(name)
    }

    fn ordered_by_updated(&self) -> bool {
        (**self).ordered_by_updated()
    }
}
