//! Data-layer collaborator interface.
//!
//! The gallery store lives outside this crate. These traits are what it has to
//! provide so the message model can describe its records and the interface
//! handler can query them. The session is an explicit handle passed to
//! [`crate::interface::Interface::new`], never a global.
//!
//! [`MemoryGalleries`] is a small in-memory store used by the server binary
//! and by tests.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde_json::Value;

/// Shared handle to a data-layer gallery record.
pub type RecordHandle = Arc<dyn GalleryRecord>;

/// A single gallery record as seen by the message model.
pub trait GalleryRecord: fmt::Debug + Send + Sync {
    /// Whether the handle still points at a live record.
    fn is_linked(&self) -> bool {
        true
    }

    /// Single-valued attribute by name (`id`, `language`, `path`, ...).
    fn attribute(&self, name: &str) -> Option<Value>;

    /// Multi-valued attribute by name (`titles`, `artists`, ...), in record order.
    fn collection(&self, name: &str) -> Vec<String>;
}

/// Gallery query capability backing `fetch_gallery`.
pub trait GallerySource: Send + Sync {
    /// Galleries ordered by id, skipping `offset` entries. When `from_id` is
    /// given, only galleries with an id greater than or equal to it count.
    fn galleries(&self, offset: usize, from_id: Option<i64>) -> Vec<RecordHandle>;
}

/// Plain in-memory gallery record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryGallery {
    pub id: i64,
    pub titles: Vec<String>,
    pub artists: Vec<String>,
    pub circles: Vec<String>,
    pub language: Option<String>,
    pub kind: Option<String>,
    pub path: String,
    pub path_in_archive: Option<String>,
}

impl MemoryGallery {
    pub fn new(id: i64, title: &str, path: &str) -> Self {
        Self {
            id,
            titles: vec![title.to_string()],
            path: path.to_string(),
            ..Self::default()
        }
    }
}

impl GalleryRecord for MemoryGallery {
    fn attribute(&self, name: &str) -> Option<Value> {
        match name {
            "id" => Some(Value::from(self.id)),
            "language" => self.language.clone().map(Value::String),
            "type" => self.kind.clone().map(Value::String),
            "path" => Some(Value::String(self.path.clone())),
            "path_in_archive" => self.path_in_archive.clone().map(Value::String),
            _ => None,
        }
    }

    fn collection(&self, name: &str) -> Vec<String> {
        match name {
            "titles" => self.titles.clone(),
            "artists" => self.artists.clone(),
            "circles" => self.circles.clone(),
            _ => Vec::new(),
        }
    }
}

/// In-memory gallery store keyed by id.
#[derive(Debug, Default)]
pub struct MemoryGalleries {
    galleries: RwLock<BTreeMap<i64, Arc<MemoryGallery>>>,
}

impl MemoryGalleries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a gallery.
    pub fn insert(&self, gallery: MemoryGallery) {
        let mut galleries = self
            .galleries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        galleries.insert(gallery.id, Arc::new(gallery));
    }

    pub fn len(&self) -> usize {
        self.galleries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GallerySource for MemoryGalleries {
    fn galleries(&self, offset: usize, from_id: Option<i64>) -> Vec<RecordHandle> {
        let galleries = self
            .galleries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let start = from_id.unwrap_or(i64::MIN);
        galleries
            .range(start..)
            .skip(offset)
            .map(|(_, gallery)| Arc::clone(gallery) as RecordHandle)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryGalleries {
        let store = MemoryGalleries::new();
        for id in [3, 1, 2] {
            store.insert(MemoryGallery::new(id, &format!("Gallery {}", id), "/g"));
        }
        store
    }

    fn ids(records: &[RecordHandle]) -> Vec<i64> {
        records
            .iter()
            .map(|r| r.attribute("id").and_then(|v| v.as_i64()).unwrap())
            .collect()
    }

    #[test]
    fn test_galleries_ordered_by_id() {
        assert_eq!(ids(&store().galleries(0, None)), vec![1, 2, 3]);
    }

    #[test]
    fn test_galleries_offset_and_from_id() {
        let store = store();
        assert_eq!(ids(&store.galleries(1, None)), vec![2, 3]);
        assert_eq!(ids(&store.galleries(0, Some(2))), vec![2, 3]);
        assert_eq!(ids(&store.galleries(1, Some(2))), vec![3]);
        assert!(store.galleries(5, None).is_empty());
    }

    #[test]
    fn test_memory_gallery_attributes() {
        let gallery = MemoryGallery {
            language: Some("English".to_string()),
            artists: vec!["a".to_string(), "b".to_string()],
            ..MemoryGallery::new(7, "Title", "/path")
        };
        assert!(gallery.is_linked());
        assert_eq!(gallery.attribute("id"), Some(Value::from(7)));
        assert_eq!(gallery.attribute("type"), None);
        assert_eq!(gallery.collection("artists"), vec!["a", "b"]);
        assert!(gallery.collection("tags").is_empty());
    }
}
