#![allow(dead_code)]

use std::sync::Arc;

use docmodel_core::memory::MemoryDatabase;
use docmodel_orm::fields::{
    ArrayField, BooleanField, ForeignKey, IntegerField, PositiveIntegerField, SlugField,
    StringField,
};
use docmodel_orm::{Entity, Model};

/// Models bound to one fresh in-memory database.
pub struct Fixture {
    pub db: Arc<MemoryDatabase>,
    pub account: Model,
    pub user: Model,
    pub team: Model,
}

pub fn fixture() -> Fixture {
    let db = Arc::new(MemoryDatabase::new("test"));

    let account = Model::builder("Account")
        .field("name", StringField::new().required(true))
        .field("slug", SlugField::new())
        .build(db.clone())
        .unwrap_or_else(|e| panic!("Failed to build Account: {e}"));

    let user = Model::builder("User")
        .field("name", StringField::new().required(true).max_length(60))
        .field("age", PositiveIntegerField::new().nullable(true))
        .field("active", BooleanField::new().default(true))
        .field("account", ForeignKey::new(&account).nullable(true))
        .build(db.clone())
        .unwrap_or_else(|e| panic!("Failed to build User: {e}"));

    let team = Model::builder("TeamMembership")
        .field("title", StringField::new())
        .field("accounts", ForeignKey::new(&account).many(true))
        .field("scores", ArrayField::new().of(IntegerField::new()))
        .build(db.clone())
        .unwrap_or_else(|e| panic!("Failed to build TeamMembership: {e}"));

    Fixture {
        db,
        account,
        user,
        team,
    }
}

pub async fn create_account(fixture: &Fixture, name: &str) -> Entity {
    fixture
        .account
        .objects()
        .create([("name", name)])
        .await
        .unwrap_or_else(|e| panic!("Failed to create account {name}: {e}"))
}

pub async fn create_user(fixture: &Fixture, name: &str, age: i64) -> Entity {
    fixture
        .user
        .objects()
        .create([("name", name.into()), ("age", docmodel_orm::Value::Int(age))])
        .await
        .unwrap_or_else(|e| panic!("Failed to create user {name}: {e}"))
}
