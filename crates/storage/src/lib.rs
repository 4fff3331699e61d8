#![forbid(unsafe_code)]

pub mod document;
pub mod paths;
pub mod repository;
pub mod sqlite;

pub use document::{CollectionPath, Document, DocumentPath, WriteBatch};
pub use repository::{DocumentStore, InMemoryDocumentStore, Storage, StorageError};
