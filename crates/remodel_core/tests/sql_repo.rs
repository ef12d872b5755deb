use remodel_core::{
    Attributes, AttributeDescriptor, Database, DeleteRepository, ErrorKind, Model, Repository,
    Rule, Schema, SqlConfig, SqlRepository,
};
use serde_json::{json, Value};
use std::error::Error;
use std::sync::Arc;

const POSTS_DDL: &str = "
CREATE TABLE posts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    tags TEXT,
    meta TEXT,
    published INTEGER NOT NULL DEFAULT 0,
    views INTEGER NOT NULL DEFAULT 0
);";

fn post_schema() -> Arc<Schema> {
    Schema::builder("Post")
        .attribute("id", AttributeDescriptor::new())
        .attribute(
            "title",
            AttributeDescriptor::new()
                .writable()
                .with_rule(Rule::Presence),
        )
        .attribute(
            "tags",
            AttributeDescriptor::new()
                .with_default(json!([]))
                .writable()
                .with_rule(Rule::Array),
        )
        .attribute(
            "meta",
            AttributeDescriptor::new().with_default(json!({})).writable(),
        )
        .attribute(
            "published",
            AttributeDescriptor::new().with_default(false).writable(),
        )
        .attribute("views", AttributeDescriptor::new().with_default(0))
        .build()
        .expect("post schema should build")
}

async fn posts_repo() -> Arc<SqlRepository> {
    let db = Database::open_in_memory().expect("in-memory database");
    db.execute_batch(POSTS_DDL).await.expect("posts table");
    SqlRepository::new(post_schema(), db, "posts").expect("repository")
}

fn attrs(value: Value) -> Attributes {
    value.as_object().cloned().expect("object literal")
}

async fn create_post(repo: &Arc<SqlRepository>, raw: Value) -> Model {
    let mut post = repo.build(attrs(raw)).expect("bound model");
    post.save().await.expect("insert should succeed");
    post
}

#[tokio::test]
async fn insert_assigns_id_and_structured_values_round_trip() {
    let repo = posts_repo().await;
    let post = create_post(
        &repo,
        json!({
            "title": "Hello",
            "tags": ["rust", "sql"],
            "meta": {"lang": "en", "draft": {"rev": 3}},
            "published": true
        }),
    )
    .await;

    let id = post.id().cloned().expect("generated id");
    assert_eq!(id, json!(1));

    let rows = repo
        .find(Some(&attrs(json!({"id": 1}))))
        .await
        .expect("find by id");
    assert_eq!(rows.len(), 1);

    let loaded = &rows[0];
    assert_eq!(loaded.get("title"), Some(&json!("Hello")));
    assert_eq!(loaded.get("tags"), Some(&json!(["rust", "sql"])));
    assert_eq!(
        loaded.get("meta"),
        Some(&json!({"lang": "en", "draft": {"rev": 3}}))
    );
    assert_eq!(loaded.get("published"), Some(&json!(true)));
    assert!(Arc::ptr_eq(loaded.schema(), repo.schema()));
}

#[tokio::test]
async fn repository_save_sets_generated_id_in_place() {
    let repo = posts_repo().await;
    let mut post = repo.build(attrs(json!({"title": "direct"}))).expect("bound model");

    let returned = repo.save(&mut post).await.expect("insert");
    assert_eq!(post.id(), Some(&json!(1)));
    assert_eq!(returned.id(), Some(&json!(1)));
}

#[tokio::test]
async fn update_keeps_identifier_and_persists_changes() {
    let repo = posts_repo().await;
    let mut post = create_post(&repo, json!({"title": "Draft"})).await;
    let id = post.id().cloned().expect("generated id");

    post.set("title", "Final").expect("declared");
    post.set("published", true).expect("declared");
    post.save().await.expect("update should succeed");

    assert_eq!(post.id(), Some(&id));
    let all = repo.find_all().await.expect("find all");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].get("title"), Some(&json!("Final")));
    assert_eq!(all[0].get("published"), Some(&json!(true)));
}

#[tokio::test]
async fn only_writable_attributes_are_written() {
    let repo = posts_repo().await;
    let mut post = create_post(&repo, json!({"title": "Counted", "views": 99})).await;

    let raw = repo
        .find_by_id_raw(post.id().cloned().expect("id"))
        .await
        .expect("query")
        .expect("row exists");
    assert_eq!(raw["views"], json!(0));

    post.set("views", 500).expect("declared");
    post.save().await.expect("update");
    let raw = repo.find_all_raw().await.expect("query");
    assert_eq!(raw[0]["views"], json!(0));
}

#[tokio::test]
async fn raw_rows_are_decoded_but_not_wrapped() {
    let repo = posts_repo().await;
    create_post(&repo, json!({"title": "Raw", "meta": {"a": 1}})).await;

    let rows = repo.find_all_raw().await.expect("raw rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["meta"], json!({"a": 1}));
    assert_eq!(rows[0]["tags"], json!([]));
    assert_eq!(rows[0]["published"], json!(false));
}

#[tokio::test]
async fn unknown_filter_keys_are_ignored() {
    let repo = posts_repo().await;
    create_post(&repo, json!({"title": "a"})).await;
    create_post(&repo, json!({"title": "b"})).await;

    let matches = repo
        .find(Some(&attrs(json!({"title": "a", "author": "nobody"}))))
        .await
        .expect("filtered find");
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].get("title"), Some(&json!("a")));

    let everything = repo
        .find(Some(&attrs(json!({"author": "nobody"}))))
        .await
        .expect("unrecognized filter");
    assert_eq!(everything.len(), 2);
}

#[tokio::test]
async fn find_one_and_find_by_id_return_none_when_absent() {
    let repo = posts_repo().await;
    assert!(repo
        .find_one(&attrs(json!({"title": "ghost"})))
        .await
        .expect("query")
        .is_none());
    assert!(repo.find_by_id(json!(404)).await.expect("query").is_none());
}

#[tokio::test]
async fn delete_removes_matching_rows_only() {
    let repo = posts_repo().await;
    create_post(&repo, json!({"title": "keep"})).await;
    create_post(&repo, json!({"title": "drop"})).await;
    create_post(&repo, json!({"title": "drop"})).await;

    let removed = repo
        .delete(&attrs(json!({"title": "drop"})))
        .await
        .expect("delete");
    assert_eq!(removed, 2);

    let untouched = repo
        .delete(&attrs(json!({"unknown": "drop"})))
        .await
        .expect("unrecognized filter");
    assert_eq!(untouched, 0);

    let remaining = repo.find_all().await.expect("find all");
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].get("title"), Some(&json!("keep")));
}

#[tokio::test]
async fn delete_all_leaves_table_empty() {
    let repo = posts_repo().await;
    create_post(&repo, json!({"title": "one"})).await;
    create_post(&repo, json!({"title": "two"})).await;

    assert_eq!(repo.delete_all().await.expect("delete all"), 2);
    assert!(repo.find_all().await.expect("find all").is_empty());
}

#[tokio::test]
async fn validation_failure_blocks_insert() {
    let repo = posts_repo().await;
    let mut post = repo
        .build(attrs(json!({"title": "", "tags": "not-a-list"})))
        .expect("bound model");

    let err = post.save().await.expect_err("invalid post");
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert!(post.errors().contains_key("title"));
    assert!(post.errors().contains_key("tags"));
    assert!(repo.find_all_raw().await.expect("query").is_empty());
}

#[tokio::test]
async fn driver_failures_are_wrapped_with_model_name() {
    let db = Database::open_in_memory().expect("in-memory database");
    let repo = SqlRepository::new(post_schema(), db, "posts").expect("repository");

    let err = repo.find_all().await.expect_err("table does not exist");
    assert_eq!(err.kind(), ErrorKind::General);
    assert_eq!(err.to_string(), "failed querying Post");
    let cause = err.source().expect("driver error is kept as source");
    assert!(cause.to_string().contains("no such table"));

    let mut post = repo.build(attrs(json!({"title": "x"}))).expect("bound model");
    let err = post.save().await.expect_err("insert fails");
    assert_eq!(err.to_string(), "failed inserting Post");
}

#[test]
fn invalid_table_names_are_rejected() {
    let db = Database::open_in_memory().expect("in-memory database");
    let err = SqlRepository::new(post_schema(), db, "posts; DROP TABLE posts").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::General);
}

#[tokio::test]
async fn file_database_from_config_persists_across_repositories() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("blog.db");
    Database::open(&path)
        .expect("file database")
        .execute_batch(POSTS_DDL)
        .await
        .expect("posts table");

    let config = SqlConfig::new(&path, "posts").expect("config");
    let writer = SqlRepository::from_config(post_schema(), &config).expect("writer");
    create_post(&writer, json!({"title": "persisted", "tags": ["a"]})).await;

    let reader = SqlRepository::from_config(post_schema(), &config).expect("reader");
    let found = reader
        .find_one(&attrs(json!({"title": "persisted"})))
        .await
        .expect("query")
        .expect("row exists");
    assert_eq!(found.get("tags"), Some(&json!(["a"])));
}
