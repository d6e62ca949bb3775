//! Remote source backed by a directory of JSON exports
//!
//! Each collection is one file, `<dir>/<name>.json`:
//!
//! ```json
//! {
//!   "id": "5a1b",
//!   "name": "alpha",
//!   "displayName": "Alpha",
//!   "updated": 1700000000,
//!   "pages": [ { "id": "p1", "title": "Home", "updated": 1699990000, "links": ["About"] } ]
//! }
//! ```
//!
//! A missing file means the collection does not exist. Listings are served
//! ordered by `updated`, so the reconciler can use bounded scans.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::{CollectionMeta, Pages, RemoteError, RemotePage, RemoteSource};

const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Deserialize)]
struct Export {
    #[serde(flatten)]
    meta: CollectionMeta,
    #[serde(default)]
    pages: Vec<RemotePage>,
}

/// Offline remote source reading collection exports from disk
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
    page_size: usize,
}

impl DirectorySource {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Number of entries per listing page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn read_export(&self, name: &str) -> Result<Export, RemoteError> {
        // Names come from the command line; never let one escape the directory
        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(RemoteError::NotFound {
                collection: name.to_string(),
            });
        }

        let path = self.dir.join(format!("{}.json", name));
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RemoteError::NotFound {
                    collection: name.to_string(),
                })
            }
            Err(e) => return Err(RemoteError::Network(format!("{}: {}", path.display(), e))),
        };

        serde_json::from_str(&content)
            .map_err(|e| RemoteError::InvalidResponse(format!("{}: {}", path.display(), e)))
    }
}

impl RemoteSource for DirectorySource {
    fn list_collections(&self, ids: &[String]) -> Result<Vec<CollectionMeta>, RemoteError> {
        let entries = fs::read_dir(&self.dir)
            .map_err(|e| RemoteError::Network(format!("{}: {}", self.dir.display(), e)))?;

        let mut metas = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let export = self.read_export(name)?;
            if ids.contains(&export.meta.id) {
                metas.push(export.meta);
            }
        }

        Ok(metas)
    }

    fn get_collection(&self, name: &str) -> Result<CollectionMeta, RemoteError> {
        self.read_export(name).map(|export| export.meta)
    }

    fn stream_links<'a>(&'a self, name: &str) -> Result<Pages<'a>, RemoteError> {
        let mut entries = self.read_export(name)?.pages;
        entries.sort_by_key(|p| p.updated);

        let pages: Vec<Result<Vec<RemotePage>, RemoteError>> = entries
            .chunks(self.page_size)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Ok(Box::new(pages.into_iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write_export(dir: &Path, name: &str, id: &str, updated: i64, pages: &str) {
        let content = format!(
            r#"{{ "id": "{}", "name": "{}", "updated": {}, "pages": {} }}"#,
            id, name, updated, pages
        );
        fs::write(dir.join(format!("{}.json", name)), content).unwrap();
    }

    #[test]
    fn test_get_collection_reads_export() {
        let tmp = tempdir().unwrap();
        write_export(tmp.path(), "alpha", "id-a", 100, "[]");

        let source = DirectorySource::new(tmp.path());
        let meta = source.get_collection("alpha").unwrap();
        assert_eq!(meta.id, "id-a");
        assert_eq!(meta.updated, 100);
    }

    #[test]
    fn test_missing_export_is_not_found() {
        let tmp = tempdir().unwrap();
        let source = DirectorySource::new(tmp.path());

        assert!(matches!(
            source.get_collection("ghost"),
            Err(RemoteError::NotFound { .. })
        ));
        assert!(matches!(
            source.get_collection("../etc"),
            Err(RemoteError::NotFound { .. })
        ));
    }

    #[test]
    fn test_list_collections_filters_by_id() {
        let tmp = tempdir().unwrap();
        write_export(tmp.path(), "alpha", "id-a", 100, "[]");
        write_export(tmp.path(), "beta", "id-b", 200, "[]");
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let source = DirectorySource::new(tmp.path());
        let metas = source
            .list_collections(&["id-b".to_string(), "id-b".to_string()])
            .unwrap();
        assert_eq!(metas.len(), 1);
        assert_eq!(metas[0].name, "beta");
    }

    #[test]
    fn test_listing_is_paged_by_updated() {
        let tmp = tempdir().unwrap();
        write_export(
            tmp.path(),
            "alpha",
            "id-a",
            100,
            r#"[
                { "id": "p3", "title": "C", "updated": 30 },
                { "id": "p1", "title": "A", "updated": 10 },
                { "id": "p2", "title": "B", "updated": 20 }
            ]"#,
        );

        let source = DirectorySource::new(tmp.path()).with_page_size(2);
        let pages: Vec<Vec<RemotePage>> = source
            .stream_links("alpha")
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(pages.len(), 2);
        let ids: Vec<&str> = pages.iter().flatten().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
    }
}
