//! Gallery entity reference.

use serde_json::{Map, Value};

use super::MessageError;
use crate::db::RecordHandle;

pub(super) const GALLERY_KEY: &str = "gallery";

/// Keys of a reduced gallery, in the order they are extracted.
pub const GALLERY_KEYS: [&str; 8] = [
    "id",
    "title",
    "author",
    "circle",
    "language",
    "type",
    "path",
    "archive_path",
];

/// How a reduced key is read from the record.
enum Field {
    /// Single-valued attribute, `null` when absent.
    Attribute(&'static str),
    /// Multi-valued attribute, as an array of strings in record order.
    Collection(&'static str),
}

const FIELDS: [(&str, Field); 8] = [
    ("id", Field::Attribute("id")),
    ("title", Field::Collection("titles")),
    ("author", Field::Collection("artists")),
    ("circle", Field::Collection("circles")),
    ("language", Field::Attribute("language")),
    ("type", Field::Attribute("type")),
    ("path", Field::Attribute("path")),
    ("archive_path", Field::Attribute("path_in_archive")),
];

/// A gallery backed by a data-layer record.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    record: Option<RecordHandle>,
}

impl Gallery {
    pub fn new(record: RecordHandle) -> Self {
        Self {
            record: Some(record),
        }
    }

    /// A gallery with no record yet. Reducing it fails until [`Gallery::link`].
    pub fn unlinked() -> Self {
        Self::default()
    }

    pub fn link(&mut self, record: RecordHandle) {
        self.record = Some(record);
    }

    pub fn is_linked(&self) -> bool {
        self.record.as_ref().is_some_and(|record| record.is_linked())
    }

    pub fn reduce(&self) -> Result<Value, MessageError> {
        let record = match &self.record {
            Some(record) if record.is_linked() => record,
            _ => return Err(MessageError::UnlinkedReference),
        };

        let mut map = Map::new();
        for (key, field) in &FIELDS {
            let value = match field {
                Field::Attribute(name) => record.attribute(name).unwrap_or(Value::Null),
                Field::Collection(name) => Value::from(record.collection(name)),
            };
            map.insert((*key).to_string(), value);
        }
        Ok(Value::Object(map))
    }
}
