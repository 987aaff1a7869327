mod common;

use common::{create_account, fixture};
use docmodel_core::{doc, Database, FindOptions, WriteOptions};
use docmodel_orm::{Entity, OrmError, QueryBuildError, Value};

#[tokio::test]
async fn test_foreign_key_is_stored_as_id() {
    let fx = fixture();
    let acme = create_account(&fx, "acme").await;
    let acme_id = acme.id().cloned().unwrap();

    let mut alice = Entity::new(
        &fx.user,
        [("name", Value::from("alice")), ("account", Value::from(acme))],
    )
    .unwrap();
    alice.save(WriteOptions::new()).await.unwrap();

    let raw = fx
        .db
        .collection("user")
        .find_one(doc! { "name": "alice" }, FindOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw.get("account_id"), Some(&acme_id.to_json()));
    assert!(!raw.contains_key("account"));
}

#[tokio::test]
async fn test_select_related_rehydrates_entity() {
    let fx = fixture();
    let acme = create_account(&fx, "acme").await;
    fx.user
        .objects()
        .create([("name", Value::from("alice")), ("account", Value::from(acme.clone()))])
        .await
        .unwrap();

    let alice = fx
        .user
        .objects()
        .filter(doc! { "name": "alice" })
        .unwrap()
        .select_related(["account"])
        .unwrap()
        .get(None)
        .await
        .unwrap();

    let account = alice.get("account").and_then(Value::as_entity).unwrap();
    assert_eq!(account.model(), &fx.account);
    assert_eq!(account.pk(), acme.pk());
    assert_eq!(account.get("name"), Some(&Value::from("acme")));

    // Saving the joined entity back keeps the reference as an id.
    let mut alice = alice;
    alice.set_field("age", 40).unwrap();
    alice.save(WriteOptions::new()).await.unwrap();
    let raw = fx
        .db
        .collection("user")
        .find_one(doc! { "name": "alice" }, FindOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(raw.get("account_id"), Some(&acme.pk().to_json()));
}

#[tokio::test]
async fn test_many_foreign_key() {
    let fx = fixture();
    let a = create_account(&fx, "a").await;
    let b = create_account(&fx, "b").await;

    fx.team
        .objects()
        .create([
            ("title", Value::from("core")),
            ("accounts", Value::from(vec![a.clone(), b.clone()])),
            ("scores", Value::from(vec![1, 2])),
        ])
        .await
        .unwrap();

    let raw = fx
        .db
        .collection("team-membership")
        .find_one(doc! {}, FindOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        raw.get("accounts_ids"),
        Some(&serde_json::json!([a.pk().to_json(), b.pk().to_json()]))
    );

    let team = fx
        .team
        .objects()
        .all()
        .select_related(["accounts"])
        .unwrap()
        .get(None)
        .await
        .unwrap();
    let Some(Value::Array(accounts)) = team.get("accounts") else {
        panic!("accounts not joined: {:?}", team.get("accounts"));
    };
    assert_eq!(accounts.len(), 2);
    assert!(accounts.iter().all(|account| account.as_entity().is_some()));
}

#[tokio::test]
async fn test_reverse_related() {
    let fx = fixture();
    let acme = create_account(&fx, "acme").await;
    create_account(&fx, "empty").await;
    for name in ["alice", "bob"] {
        fx.user
            .objects()
            .create([("name", Value::from(name)), ("account", Value::from(acme.clone()))])
            .await
            .unwrap();
    }

    let accounts = fx
        .account
        .objects()
        .all()
        .reverse_related(&fx.user)
        .sort(doc! { "name": 1 })
        .execute()
        .await
        .unwrap();
    assert_eq!(accounts.len(), 2);

    let Some(Value::Array(users)) = accounts[0].get("users") else {
        panic!("users not joined");
    };
    assert_eq!(users.len(), 2);
    let Some(Value::Array(users)) = accounts[1].get("users") else {
        panic!("users not joined");
    };
    assert!(users.is_empty());
}

#[tokio::test]
async fn test_select_related_rejects_plain_fields() {
    let fx = fixture();
    assert!(matches!(
        fx.user.queryset().select_related(["name"]),
        Err(OrmError::QueryBuild(QueryBuildError::NotAForeignKey(_)))
    ));
    assert!(matches!(
        fx.user.queryset().select_related(["owner"]),
        Err(OrmError::QueryBuild(QueryBuildError::UndefinedField { .. }))
    ));
}

#[tokio::test]
async fn test_foreign_key_requires_matching_model() {
    let fx = fixture();
    let stranger = Entity::new(&fx.user, [("name", "bob")]).unwrap();
    let err = Entity::new(
        &fx.user,
        [("name", Value::from("alice")), ("account", Value::from(stranger))],
    )
    .unwrap_err();
    assert!(matches!(err, OrmError::Validation(_)));
}

#[tokio::test]
async fn test_many_foreign_key_keeps_stored_order() {
    let fx = fixture();
    let a = create_account(&fx, "a").await;
    let b = create_account(&fx, "b").await;

    fx.team
        .objects()
        .create([
            ("title", Value::from("core")),
            ("accounts", Value::from(vec![b.clone(), a.clone()])),
        ])
        .await
        .unwrap();

    let mut team = fx
        .team
        .objects()
        .all()
        .select_related(["accounts"])
        .unwrap()
        .get(None)
        .await
        .unwrap();
    let Some(Value::Array(accounts)) = team.get("accounts") else {
        panic!("accounts not joined: {:?}", team.get("accounts"));
    };
    let joined: Vec<&Value> = accounts
        .iter()
        .filter_map(|account| account.as_entity().map(Entity::pk))
        .collect();
    assert_eq!(joined, vec![b.pk(), a.pk()]);

    team.set_field("title", "renamed").unwrap();
    team.save(WriteOptions::new()).await.unwrap();
    let raw = fx
        .db
        .collection("team-membership")
        .find_one(doc! {}, FindOptions::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        raw.get("accounts_ids"),
        Some(&serde_json::json!([b.pk().to_json(), a.pk().to_json()]))
    );
}
