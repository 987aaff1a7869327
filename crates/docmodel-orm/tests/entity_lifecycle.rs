mod common;

use common::{create_user, fixture};
use docmodel_core::{doc, Database, FindOptions, WriteOptions};
use docmodel_orm::fields::{
    ArrayField, BooleanField, ForeignKey, NumberField, PrimaryKey, SlugField, StringField,
};
use docmodel_orm::{Entity, EntityState, Model, OrmError, UpdateOptions, ValidationError, Value};

#[test]
fn test_missing_required_field_names_the_field() {
    let fx = fixture();
    let err = Entity::new(&fx.user, [("age", 30)]).unwrap_err();
    match err {
        OrmError::Validation(ValidationError::RequiredValue { field }) => assert_eq!(field, "name"),
        other => panic!("Expected RequiredValue, got {other:?}"),
    }
}

#[test]
fn test_invalid_values_are_rejected() {
    let fx = fixture();
    let long = "x".repeat(61);
    assert!(Entity::new(&fx.user, [("name", long.as_str())]).is_err());

    let err = Entity::new(&fx.user, [("name", Value::from("bob")), ("age", Value::Int(0))])
        .unwrap_err();
    assert!(err.to_string().contains("Cannot be zero"));

    // A nullable field accepts an explicit null.
    assert!(Entity::new(&fx.user, [("name", Value::from("bob")), ("age", Value::Null)]).is_ok());
}

#[test]
fn test_construction_defaults() {
    let fx = fixture();
    let user = Entity::new(&fx.user, [("name", "bob")]).unwrap();
    assert_eq!(user.get("active"), Some(&Value::Bool(true)));
    assert!(user.get("age").is_none());
    assert_eq!(user.state(), EntityState::Transient);
}

#[tokio::test]
async fn test_save_then_get() {
    let fx = fixture();
    let mut user = Entity::new(&fx.user, [("name", Value::from("alice")), ("age", Value::Int(31))])
        .unwrap();
    user.save(WriteOptions::new()).await.unwrap();
    assert_eq!(user.state(), EntityState::Persisted);
    let id = user.id().cloned().unwrap();

    let fetched = fx.user.objects().get(doc! { "name": "alice" }).await.unwrap();
    assert_eq!(fetched.id(), Some(&id));
    assert_eq!(fetched.get("age"), Some(&Value::Int(31)));
    assert!(fetched.created_at().is_some());
    assert_eq!(fetched.state(), EntityState::Persisted);
}

#[tokio::test]
async fn test_save_twice_updates_in_place() {
    let fx = fixture();
    let mut user = create_user(&fx, "alice", 31).await;
    user.set_field("age", 32).unwrap();
    user.save(WriteOptions::new()).await.unwrap();

    assert_eq!(fx.user.objects().count(doc! {}).await.unwrap(), 1);
    let fetched = fx.user.objects().get(doc! { "name": "alice" }).await.unwrap();
    assert_eq!(fetched.get("age"), Some(&Value::Int(32)));
    assert!(fetched.updated_at().is_some());
}

#[tokio::test]
async fn test_update_validates_partial_values() {
    let fx = fixture();
    let mut user = create_user(&fx, "alice", 31).await;

    let err = user
        .update([("age", -4)], UpdateOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
    assert_eq!(user.get("age"), Some(&Value::Int(31)));

    // Without validation the value reaches the store as is.
    user.update([("age", -4)], UpdateOptions::new().validate(false))
        .await
        .unwrap();
    assert_eq!(user.get("age"), Some(&Value::Int(-4)));
}

#[tokio::test]
async fn test_soft_delete_hides_from_default_queries() {
    let fx = fixture();
    let mut user = create_user(&fx, "alice", 31).await;
    create_user(&fx, "bob", 40).await;

    user.delete(WriteOptions::new()).await.unwrap();
    assert_eq!(user.state(), EntityState::SoftDeleted);

    let active = fx.user.objects().all().execute().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].get("name"), Some(&Value::from("bob")));

    let deleted = fx
        .user
        .objects()
        .filter(doc! { "deleted_at": { "$ne": null } })
        .unwrap()
        .execute()
        .await
        .unwrap();
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].state(), EntityState::SoftDeleted);

    // The document is still stored.
    let raw = fx.db.collection("user");
    assert_eq!(raw.count_documents(doc! {}, FindOptions::new()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_hard_delete_removes_the_document() {
    let fx = fixture();
    let mut user = create_user(&fx, "alice", 31).await;

    let result = user.hard_delete(WriteOptions::new()).await.unwrap();
    assert_eq!(result.deleted_count, 1);
    assert_eq!(user.state(), EntityState::Purged);

    let raw = fx.db.collection("user");
    assert_eq!(raw.count_documents(doc! {}, FindOptions::new()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_update_of_missing_document_is_not_modified() {
    let fx = fixture();
    let mut user = create_user(&fx, "alice", 31).await;
    user.clone().hard_delete(WriteOptions::new()).await.unwrap();

    let err = user
        .update([("age", 33)], UpdateOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, OrmError::NotModified { .. }));
    assert_eq!(user.get("age"), Some(&Value::Int(31)));
}

#[tokio::test]
async fn test_extra_fields_pass_through_to_the_store() {
    let fx = fixture();
    let mut user = Entity::new(&fx.user, [("name", Value::from("alice")), ("nickname", Value::from("al"))])
        .unwrap();
    user.save(WriteOptions::new()).await.unwrap();

    let raw = fx
        .db
        .collection("user")
        .find_one(doc! { "name": "alice" }, FindOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw.get("nickname"), Some(&serde_json::json!("al")));
    assert!(raw.get("created_at").is_some_and(serde_json::Value::is_string));
}

#[test]
fn test_stored_document_round_trips() {
    let fx = fixture();
    let product = Model::builder("Product")
        .field("code", PrimaryKey::new().of(SlugField::new()))
        .field("title", StringField::new())
        .field("price", NumberField::new())
        .field("in_stock", BooleanField::new())
        .field("account", ForeignKey::new(&fx.account).nullable(true))
        .field("tags", ArrayField::new().of(StringField::new()))
        .build(fx.db.clone())
        .unwrap();

    let stored = doc! {
        "code": "blue-mug",
        "title": "Blue mug",
        "price": 12.5,
        "in_stock": true,
        "account_id": "a1",
        "tags": ["kitchen", "blue"],
    };
    let written = Entity::create_from_db(&product, stored.clone()).to_document();
    for (key, value) in &stored {
        assert_eq!(written.get(key), Some(value), "{key}");
    }
    assert!(!written.contains_key("account"));

    let stored = doc! { "_id": "t1", "title": "core", "accounts_ids": ["a2", "a1"], "scores": [3, 1] };
    let written = Entity::create_from_db(&fx.team, stored.clone()).to_document();
    for (key, value) in &stored {
        assert_eq!(written.get(key), Some(value), "{key}");
    }
    assert!(!written.contains_key("accounts"));
}
