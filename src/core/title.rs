//! Page title helpers and the link graph view
//!
//! Titles are compared by their normalised form: lower case with spaces
//! replaced by underscores, so `Foo Bar` and `foo_bar` name the same page.

use std::collections::HashMap;

use serde::Serialize;

use crate::core::store::LinkRecord;

/// Normalised form of a page title
pub fn to_title_lc(title: &str) -> String {
    title.replace(' ', "_").to_lowercase()
}

/// One node of the link graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEntry {
    pub title: String,
    /// `false` for a title that is linked to but has no page
    pub exists: bool,
    /// Last modified time; 0 for titles without a page
    pub updated: i64,
    pub links: Vec<String>,
    pub has_image: bool,
}

/// Build the link graph from stored records
///
/// Every record becomes an existing entry. Every linked title without a page
/// becomes a placeholder entry. Entries are unique by normalised title and
/// keep the position where the title was first met; a page replaces a
/// placeholder for the same title, otherwise the first entry wins.
pub fn expand_links(records: &[LinkRecord]) -> Vec<GraphEntry> {
    let mut entries: Vec<GraphEntry> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let entry = GraphEntry {
            title: record.title.clone(),
            exists: true,
            updated: record.updated,
            links: record.links.clone(),
            has_image: record.image.is_some(),
        };
        match index.get(&to_title_lc(&record.title)) {
            Some(&i) if !entries[i].exists => entries[i] = entry,
            Some(_) => {}
            None => {
                index.insert(to_title_lc(&record.title), entries.len());
                entries.push(entry);
            }
        }

        for link in &record.links {
            let key = to_title_lc(link);
            if index.contains_key(&key) {
                continue;
            }
            index.insert(key, entries.len());
            entries.push(GraphEntry {
                title: link.clone(),
                exists: false,
                updated: 0,
                links: Vec::new(),
                has_image: false,
            });
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, updated: i64, links: &[&str]) -> LinkRecord {
        LinkRecord {
            id: to_title_lc(title),
            collection: "alpha".into(),
            title: title.into(),
            updated,
            links: links.iter().map(|l| l.to_string()).collect(),
            image: None,
        }
    }

    #[test]
    fn test_to_title_lc() {
        assert_eq!(to_title_lc("Foo Bar"), "foo_bar");
        assert_eq!(to_title_lc("foo_bar"), "foo_bar");
        assert_eq!(to_title_lc("ÄBC  d"), "äbc__d");
    }

    #[test]
    fn test_missing_links_become_placeholders() {
        let entries = expand_links(&[record("Home", 10, &["About", "Blog Post"])]);

        let titles: Vec<&str> = entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(titles, vec!["Home", "About", "Blog Post"]);
        assert!(entries[0].exists);
        assert!(!entries[1].exists);
        assert_eq!(entries[1].updated, 0);
        assert!(entries[1].links.is_empty());
    }

    #[test]
    fn test_page_replaces_placeholder() {
        let entries = expand_links(&[
            record("Home", 10, &["about"]),
            record("About", 20, &["Home"]),
        ]);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].title, "About");
        assert!(entries[1].exists);
        assert_eq!(entries[1].updated, 20);
    }

    #[test]
    fn test_first_placeholder_spelling_wins() {
        let entries = expand_links(&[
            record("A", 1, &["Some Page"]),
            record("B", 2, &["some_page", "SOME PAGE"]),
        ]);

        let placeholders: Vec<&str> = entries
            .iter()
            .filter(|e| !e.exists)
            .map(|e| e.title.as_str())
            .collect();
        assert_eq!(placeholders, vec!["Some Page"]);
    }
}
