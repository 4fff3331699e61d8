use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::document::{CollectionPath, Document, DocumentPath, WriteBatch};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid path segment: {0:?}")]
    InvalidPath(String),
}

/// Contract for a hierarchical collection/document store.
///
/// Paths address documents as `collection/doc[/collection/doc...]`.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or replace the document at `path`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be stored.
    async fn set(&self, path: &DocumentPath, doc: Document) -> Result<(), StorageError>;

    /// Merge top-level fields into the document at `path`, creating it if missing.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the document cannot be stored.
    async fn merge(&self, path: &DocumentPath, doc: Document) -> Result<(), StorageError>;

    /// Apply every write in the batch, or none of them.
    ///
    /// # Errors
    ///
    /// Returns a single `StorageError` covering the whole batch.
    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError>;

    /// Fetch a document.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend failures; a missing document is `Ok(None)`.
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StorageError>;

    /// List a collection's documents ordered ascending by a numeric field.
    ///
    /// Documents without the field sort last, ties break on document id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` for backend failures.
    async fn list_ordered(
        &self,
        collection: &CollectionPath,
        order_by: &str,
    ) -> Result<Vec<Document>, StorageError>;
}

pub(crate) fn merge_into(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        target.insert(key, value);
    }
}

pub(crate) fn order_key(doc: &Document, field: &str) -> Option<f64> {
    doc.get(field).and_then(Value::as_f64)
}

/// Simple in-memory store for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    docs: Arc<Mutex<BTreeMap<DocumentPath, Document>>>,
}

impl InMemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            docs: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    /// Number of documents currently stored, across all collections.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        let guard = self
            .docs
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.len())
    }

    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StorageError> {
        self.len().map(|n| n == 0)
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn set(&self, path: &DocumentPath, doc: Document) -> Result<(), StorageError> {
        let mut guard = self
            .docs
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(path.clone(), doc);
        Ok(())
    }

    async fn merge(&self, path: &DocumentPath, doc: Document) -> Result<(), StorageError> {
        let mut guard = self
            .docs
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        merge_into(guard.entry(path.clone()).or_default(), doc);
        Ok(())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        let mut guard = self
            .docs
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        for (path, doc) in batch.into_writes() {
            guard.insert(path, doc);
        }
        Ok(())
    }

    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StorageError> {
        let guard = self
            .docs
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(path).cloned())
    }

    async fn list_ordered(
        &self,
        collection: &CollectionPath,
        order_by: &str,
    ) -> Result<Vec<Document>, StorageError> {
        let guard = self
            .docs
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let mut found: Vec<(Option<f64>, &str, &Document)> = guard
            .iter()
            .filter(|(path, _)| path.parent() == collection)
            .map(|(path, doc)| (order_key(doc, order_by), path.id(), doc))
            .collect();

        found.sort_by(|a, b| match (a.0, b.0) {
            (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.1.cmp(b.1)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.1.cmp(b.1),
        });

        Ok(found.into_iter().map(|(_, _, doc)| doc.clone()).collect())
    }
}

/// Bundles the document store behind a trait object for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub documents: Arc<dyn DocumentStore>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            documents: Arc::new(InMemoryDocumentStore::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    fn responses() -> CollectionPath {
        CollectionPath::root("sessions")
            .unwrap()
            .doc("s1")
            .unwrap()
            .collection("answers")
            .unwrap()
    }

    #[tokio::test]
    async fn merge_keeps_untouched_fields() {
        let store = InMemoryDocumentStore::new();
        let path = CollectionPath::root("sessions").unwrap().doc("s1").unwrap();

        store
            .set(&path, doc(json!({"completed": false, "created_at": "t0"})))
            .await
            .unwrap();
        store
            .merge(&path, doc(json!({"completed": true, "accuracy": 0.5})))
            .await
            .unwrap();

        let stored = store.get(&path).await.unwrap().unwrap();
        assert_eq!(stored["completed"], true);
        assert_eq!(stored["created_at"], "t0");
        assert_eq!(stored["accuracy"], 0.5);
    }

    #[tokio::test]
    async fn merge_creates_missing_document() {
        let store = InMemoryDocumentStore::new();
        let path = CollectionPath::root("sessions").unwrap().doc("new").unwrap();
        store.merge(&path, doc(json!({"a": 1}))).await.unwrap();
        assert!(store.get(&path).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn list_orders_by_numeric_field_within_collection_only() {
        let store = InMemoryDocumentStore::new();
        let col = responses();

        let mut batch = WriteBatch::new();
        batch.set(col.doc("10").unwrap(), doc(json!({"question_number": 10})));
        batch.set(col.doc("2").unwrap(), doc(json!({"question_number": 2})));
        batch.set(col.doc("x").unwrap(), doc(json!({"note": "unordered"})));
        batch.set(col.doc("1").unwrap(), doc(json!({"question_number": 1})));
        store.commit(batch).await.unwrap();

        // A document in a sibling collection must not leak into the listing.
        let other = CollectionPath::root("sessions")
            .unwrap()
            .doc("s2")
            .unwrap()
            .collection("answers")
            .unwrap();
        store
            .set(&other.doc("1").unwrap(), doc(json!({"question_number": 0})))
            .await
            .unwrap();

        let listed = store.list_ordered(&col, "question_number").await.unwrap();
        let numbers: Vec<Option<u64>> = listed
            .iter()
            .map(|d| d.get("question_number").and_then(Value::as_u64))
            .collect();
        assert_eq!(numbers, vec![Some(1), Some(2), Some(10), None]);
    }
}
