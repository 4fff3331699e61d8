//! Documents, collection/document paths, and write batches.

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::repository::StorageError;

/// A stored document: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// Encode a value as a document.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the value cannot be encoded or
/// does not encode to a JSON object.
pub fn to_document<T: Serialize>(value: &T) -> Result<Document, StorageError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(StorageError::Serialization(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(StorageError::Serialization(e.to_string())),
    }
}

/// Decode a document into a typed value.
///
/// # Errors
///
/// Returns `StorageError::Serialization` if the document does not match `T`.
pub fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, StorageError> {
    serde_json::from_value(Value::Object(doc))
        .map_err(|e| StorageError::Serialization(e.to_string()))
}

fn check_segment(segment: &str) -> Result<(), StorageError> {
    if segment.is_empty() || segment.contains('/') {
        return Err(StorageError::InvalidPath(segment.to_string()));
    }
    Ok(())
}

//
// ─── PATHS ─────────────────────────────────────────────────────────────────────
//

/// Path to a collection, e.g. `sessions` or `sessions/abc/open_ended_responses`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    /// A top-level collection.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidPath` for empty names or names containing `/`.
    pub fn root(name: &str) -> Result<Self, StorageError> {
        check_segment(name)?;
        Ok(Self(name.to_string()))
    }

    /// A document inside this collection.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidPath` for empty ids or ids containing `/`.
    pub fn doc(&self, id: impl Into<String>) -> Result<DocumentPath, StorageError> {
        let id = id.into();
        check_segment(&id)?;
        Ok(DocumentPath {
            collection: self.clone(),
            id,
        })
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path to a single document: its collection plus a document id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentPath {
    collection: CollectionPath,
    id: String,
}

impl DocumentPath {
    /// A sub-collection nested under this document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::InvalidPath` for invalid collection names.
    pub fn collection(&self, name: &str) -> Result<CollectionPath, StorageError> {
        check_segment(name)?;
        Ok(CollectionPath(format!("{self}/{name}")))
    }

    #[must_use]
    pub fn parent(&self) -> &CollectionPath {
        &self.collection
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

//
// ─── BATCH ─────────────────────────────────────────────────────────────────────
//

/// A set of document writes applied atomically by `DocumentStore::commit`.
///
/// Each entry replaces the document at its path.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    writes: Vec<(DocumentPath, Document)>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: DocumentPath, doc: Document) {
        self.writes.push((path, doc));
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.writes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    #[must_use]
    pub fn writes(&self) -> &[(DocumentPath, Document)] {
        &self.writes
    }

    #[must_use]
    pub fn into_writes(self) -> Vec<(DocumentPath, Document)> {
        self.writes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        name: String,
        n: u32,
    }

    #[test]
    fn nested_paths_render_with_slashes() {
        let sessions = CollectionPath::root("sessions").unwrap();
        let session = sessions.doc("abc").unwrap();
        let responses = session.collection("open_ended_responses").unwrap();
        let doc = responses.doc("3").unwrap();

        assert_eq!(doc.to_string(), "sessions/abc/open_ended_responses/3");
        assert_eq!(doc.parent(), &responses);
        assert_eq!(doc.id(), "3");
    }

    #[test]
    fn invalid_segments_are_rejected() {
        assert!(CollectionPath::root("").is_err());
        let sessions = CollectionPath::root("sessions").unwrap();
        assert!(matches!(
            sessions.doc("a/b"),
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[test]
    fn non_object_values_are_not_documents() {
        let err = to_document(&42).unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[test]
    fn typed_values_survive_document_encoding() {
        let probe = Probe {
            name: "x".into(),
            n: 4,
        };
        let doc = to_document(&probe).unwrap();
        assert_eq!(doc["n"], 4);
        let back: Probe = from_document(doc).unwrap();
        assert_eq!(back, probe);
    }
}
