//! In-memory remote source
//!
//! Holds collections and scripted failures in memory and records every
//! request it serves. State lives behind `RefCell` so a test can keep a
//! reference, change the "remote" between check cycles, and inspect calls.

use std::cell::RefCell;
use std::collections::BTreeMap;

use super::{CollectionMeta, Pages, RemoteError, RemotePage, RemoteSource};

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone)]
struct MemoryCollection {
    meta: CollectionMeta,
    pages: Vec<RemotePage>,
}

/// Scripted remote source
#[derive(Debug)]
pub struct MemorySource {
    collections: RefCell<BTreeMap<String, MemoryCollection>>,
    errors: RefCell<BTreeMap<String, RemoteError>>,
    stream_failures: RefCell<BTreeMap<String, (usize, RemoteError)>>,
    batch_error: RefCell<Option<RemoteError>>,
    page_size: usize,
    ordered: bool,
    batch_calls: RefCell<Vec<Vec<String>>>,
    single_calls: RefCell<Vec<String>>,
    stream_calls: RefCell<Vec<String>>,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            collections: RefCell::new(BTreeMap::new()),
            errors: RefCell::new(BTreeMap::new()),
            stream_failures: RefCell::new(BTreeMap::new()),
            batch_error: RefCell::new(None),
            page_size: DEFAULT_PAGE_SIZE,
            ordered: true,
            batch_calls: RefCell::new(Vec::new()),
            single_calls: RefCell::new(Vec::new()),
            stream_calls: RefCell::new(Vec::new()),
        }
    }

    /// Add a collection
    pub fn with_collection(
        self,
        name: &str,
        id: &str,
        updated: i64,
        pages: Vec<RemotePage>,
    ) -> Self {
        self.collections.borrow_mut().insert(
            name.to_string(),
            MemoryCollection {
                meta: CollectionMeta {
                    id: id.to_string(),
                    name: name.to_string(),
                    display_name: name.to_string(),
                    updated,
                    is_member: true,
                    public_visible: false,
                },
                pages,
            },
        );
        self
    }

    /// Make every request about `name` fail with `error`
    pub fn with_error(self, name: &str, error: RemoteError) -> Self {
        self.set_error(name, error);
        self
    }

    /// Make every batch request fail with `error`
    pub fn with_batch_error(self, error: RemoteError) -> Self {
        *self.batch_error.borrow_mut() = Some(error);
        self
    }

    /// Number of entries per listing page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Serve listings in insertion order instead of by `updated`
    pub fn unordered(mut self) -> Self {
        self.ordered = false;
        self
    }

    /// Replace a collection's listing and remote last-modified time
    pub fn set_pages(&self, name: &str, updated: i64, pages: Vec<RemotePage>) {
        if let Some(collection) = self.collections.borrow_mut().get_mut(name) {
            collection.meta.updated = updated;
            collection.pages = pages;
        }
    }

    pub fn set_error(&self, name: &str, error: RemoteError) {
        self.errors.borrow_mut().insert(name.to_string(), error);
    }

    pub fn clear_error(&self, name: &str) {
        self.errors.borrow_mut().remove(name);
    }

    /// Fail the listing of `name` after `pages` pages were served
    pub fn fail_stream_after(&self, name: &str, pages: usize, error: RemoteError) {
        self.stream_failures
            .borrow_mut()
            .insert(name.to_string(), (pages, error));
    }

    /// Id lists of every batch request
    pub fn batch_calls(&self) -> Vec<Vec<String>> {
        self.batch_calls.borrow().clone()
    }

    /// Names of every single lookup
    pub fn single_calls(&self) -> Vec<String> {
        self.single_calls.borrow().clone()
    }

    /// Names of every listing request
    pub fn stream_calls(&self) -> Vec<String> {
        self.stream_calls.borrow().clone()
    }
}

impl RemoteSource for MemorySource {
    fn list_collections(&self, ids: &[String]) -> Result<Vec<CollectionMeta>, RemoteError> {
        self.batch_calls.borrow_mut().push(ids.to_vec());
        if let Some(error) = self.batch_error.borrow().as_ref() {
            return Err(error.clone());
        }

        let errors = self.errors.borrow();
        Ok(self
            .collections
            .borrow()
            .values()
            .filter(|c| ids.contains(&c.meta.id) && !errors.contains_key(&c.meta.name))
            .map(|c| c.meta.clone())
            .collect())
    }

    fn get_collection(&self, name: &str) -> Result<CollectionMeta, RemoteError> {
        self.single_calls.borrow_mut().push(name.to_string());
        if let Some(error) = self.errors.borrow().get(name) {
            return Err(error.clone());
        }

        self.collections
            .borrow()
            .get(name)
            .map(|c| c.meta.clone())
            .ok_or_else(|| RemoteError::NotFound {
                collection: name.to_string(),
            })
    }

    fn stream_links<'a>(&'a self, name: &str) -> Result<Pages<'a>, RemoteError> {
        self.stream_calls.borrow_mut().push(name.to_string());
        if let Some(error) = self.errors.borrow().get(name) {
            return Err(error.clone());
        }

        let mut entries = self
            .collections
            .borrow()
            .get(name)
            .map(|c| c.pages.clone())
            .ok_or_else(|| RemoteError::NotFound {
                collection: name.to_string(),
            })?;
        if self.ordered {
            entries.sort_by_key(|p| p.updated);
        }

        let mut pages: Vec<Result<Vec<RemotePage>, RemoteError>> = entries
            .chunks(self.page_size)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        if let Some((after, error)) = self.stream_failures.borrow().get(name) {
            pages.truncate(*after);
            pages.push(Err(error.clone()));
        }

        Ok(Box::new(pages.into_iter()))
    }

    fn ordered_by_updated(&self) -> bool {
        self.ordered
    }
}
