use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use tracing::debug;

use super::{
    SqliteRepository,
    mapping::{conn, decode_body, encode_body, map_body_row},
};
use crate::document::{CollectionPath, Document, DocumentPath, WriteBatch};
use crate::repository::{DocumentStore, StorageError, merge_into, order_key};

async fn upsert(
    tx: &mut Transaction<'_, Sqlite>,
    path: &DocumentPath,
    doc: &Document,
) -> Result<(), StorageError> {
    sqlx::query(
        r"
            INSERT INTO documents (collection, id, body, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(collection, id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
        ",
    )
    .bind(path.parent().as_str())
    .bind(path.id())
    .bind(encode_body(doc)?)
    .bind(Utc::now())
    .execute(&mut **tx)
    .await
    .map_err(conn)?;
    Ok(())
}

#[async_trait::async_trait]
impl DocumentStore for SqliteRepository {
    async fn set(&self, path: &DocumentPath, doc: Document) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;
        upsert(&mut tx, path, &doc).await?;
        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn merge(&self, path: &DocumentPath, doc: Document) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(conn)?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT body FROM documents WHERE collection = ?1 AND id = ?2")
                .bind(path.parent().as_str())
                .bind(path.id())
                .fetch_optional(&mut *tx)
                .await
                .map_err(conn)?;

        let mut merged = match existing {
            Some(raw) => decode_body(&raw)?,
            None => Document::new(),
        };
        merge_into(&mut merged, doc);

        upsert(&mut tx, path, &merged).await?;
        tx.commit().await.map_err(conn)?;
        Ok(())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();
        let mut tx = self.pool.begin().await.map_err(conn)?;
        for (path, doc) in batch.writes() {
            upsert(&mut tx, path, doc).await?;
        }
        tx.commit().await.map_err(conn)?;
        debug!(documents = count, "committed batch");
        Ok(())
    }

    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, StorageError> {
        let row = sqlx::query("SELECT body FROM documents WHERE collection = ?1 AND id = ?2")
            .bind(path.parent().as_str())
            .bind(path.id())
            .fetch_optional(&self.pool)
            .await
            .map_err(conn)?;

        row.as_ref().map(map_body_row).transpose()
    }

    async fn list_ordered(
        &self,
        collection: &CollectionPath,
        order_by: &str,
    ) -> Result<Vec<Document>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, body
                FROM documents
                WHERE collection = ?1
                ORDER BY id ASC
            ",
        )
        .bind(collection.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_body_row(&row)?);
        }

        // Ordering happens here rather than in SQL so that the field name never
        // has to be spliced into a JSON path expression.
        out.sort_by(|a, b| match (order_key(a, order_by), order_key(b, order_by)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Ok(out)
    }
}
