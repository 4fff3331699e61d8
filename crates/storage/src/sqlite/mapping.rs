use serde_json::Value;
use sqlx::Row;

use crate::document::Document;
use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn conn<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Connection(e.to_string())
}

pub(crate) fn encode_body(doc: &Document) -> Result<String, StorageError> {
    serde_json::to_string(doc).map_err(ser)
}

pub(crate) fn decode_body(raw: &str) -> Result<Document, StorageError> {
    match serde_json::from_str::<Value>(raw).map_err(ser)? {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::Serialization(format!(
            "stored body is not an object: {other}"
        ))),
    }
}

pub(crate) fn map_body_row(row: &sqlx::sqlite::SqliteRow) -> Result<Document, StorageError> {
    let raw: String = row.try_get("body").map_err(ser)?;
    decode_body(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_rejects_non_object_bodies() {
        assert!(decode_body("[1,2]").is_err());
        assert!(decode_body("{\"a\":1}").is_ok());
    }
}
