use crate::error::{Result, ScholarlyError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Address of one document: `collection/id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentPath {
    pub collection: String,
    pub id: String,
}

impl DocumentPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

impl FromStr for DocumentPath {
    type Err = ScholarlyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((collection, id))
                if is_valid_segment(collection) && is_valid_segment(id) =>
            {
                Ok(Self::new(collection, id))
            }
            _ => Err(ScholarlyError::validation(
                "path",
                format!("'{}' is not a collection/id document path", s),
            )),
        }
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && !segment.contains('/') && segment != "." && segment != ".."
}

/// Field map of a document.
pub type Fields = Map<String, Value>;

/// A document read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub path: DocumentPath,
    pub data: Fields,
}

impl Document {
    pub fn new(path: DocumentPath, data: Fields) -> Self {
        Self { path, data }
    }

    pub fn id(&self) -> &str {
        &self.path.id
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Deserializes the field map into a typed record.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.data.clone()))?)
    }
}

/// Serializes a record into a field map, failing if it is not a JSON object.
pub fn encode_fields<T: Serialize>(value: &T) -> Result<Fields> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(ScholarlyError::Serialization {
            format: "JSON".to_string(),
            message: format!("expected an object, got {}", other),
        }),
    }
}

/// Write options for [`DocumentStore::set`](super::DocumentStore::set).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Merge fields into an existing document instead of replacing it.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }

    pub fn replace() -> Self {
        Self { merge: false }
    }
}
