use quiz_core::model::{QuestionNumber, SessionId};
use serde_json::{Value, json};
use storage::document::Document;
use storage::paths::{self, QUESTION_NUMBER_FIELD};
use storage::sqlite::SqliteRepository;
use storage::{DocumentStore, WriteBatch};

fn doc(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected object"),
    }
}

async fn repo(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn sqlite_set_then_merge_keeps_created_fields() {
    let repo = repo("memdb_merge").await;
    let path = paths::session_doc(&SessionId::new("s1")).unwrap();

    repo.set(
        &path,
        doc(json!({"id": "s1", "completed": false, "created_at": "2023-11-14T22:13:20Z"})),
    )
    .await
    .unwrap();
    repo.merge(&path, doc(json!({"completed": true, "earned_points": 42})))
        .await
        .unwrap();

    let stored = repo.get(&path).await.unwrap().expect("stored");
    assert_eq!(stored["completed"], true);
    assert_eq!(stored["earned_points"], 42);
    assert_eq!(stored["created_at"], "2023-11-14T22:13:20Z");
}

#[tokio::test]
async fn sqlite_batch_lists_in_question_order() {
    let repo = repo("memdb_batch").await;
    let sid = SessionId::new("s2");
    let col = paths::multiple_choice_responses(&sid).unwrap();

    let mut batch = WriteBatch::new();
    for n in [3_u32, 1, 12, 2] {
        let number = QuestionNumber::new(n).unwrap();
        batch.set(
            paths::response_doc(&col, number).unwrap(),
            doc(json!({ QUESTION_NUMBER_FIELD: n })),
        );
    }
    repo.commit(batch).await.unwrap();

    let listed = repo.list_ordered(&col, QUESTION_NUMBER_FIELD).await.unwrap();
    let numbers: Vec<u64> = listed
        .iter()
        .filter_map(|d| d[QUESTION_NUMBER_FIELD].as_u64())
        .collect();
    // "12" sorts before "2" as a string id; ordering must follow the field.
    assert_eq!(numbers, vec![1, 2, 3, 12]);
}

#[tokio::test]
async fn sqlite_missing_document_is_none() {
    let repo = repo("memdb_missing").await;
    let path = paths::session_doc(&SessionId::new("nope")).unwrap();
    assert!(repo.get(&path).await.unwrap().is_none());
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent() {
    let repo = repo("memdb_migrate_twice").await;
    repo.migrate().await.expect("second migrate");
}
