//! # docmodel-orm
//!
//! A schema-validating document ORM with an aggregation-pipeline QuerySet.
//!
//! This crate provides:
//! - `Model`, an entity type binding a `Schema` of fields to a collection
//! - `Entity`, an in-memory instance with validated construction and
//!   insert, update, soft delete and hard delete
//! - Field types with validation and casting
//! - `QuerySet` for lazy, chainable aggregation pipelines
//! - `Manager`, the query facade of a model
//!
//! Models are built from explicit configuration and bound to a store
//! handle implementing [`docmodel_core::Database`].
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//!
//! use docmodel_core::memory::MemoryDatabase;
//! use docmodel_core::{doc, WriteOptions};
//! use docmodel_orm::fields::{ForeignKey, IntegerField, StringField};
//! use docmodel_orm::{Entity, Model};
//!
//! async fn example() -> docmodel_orm::Result<()> {
//!     let db = Arc::new(MemoryDatabase::new("app"));
//!
//!     let account = Model::builder("Account")
//!         .field("name", StringField::new().required(true))
//!         .build(db.clone())?;
//!     let user = Model::builder("User")
//!         .field("name", StringField::new().required(true))
//!         .field("age", IntegerField::new())
//!         .field("account", ForeignKey::new(&account))
//!         .build(db)?;
//!
//!     let acme = account.objects().create([("name", "acme")]).await?;
//!
//!     let mut alice = Entity::new(&user, [("name", "alice".into()), ("account", acme.into())])?;
//!     alice.save(WriteOptions::new()).await?;
//!
//!     // Get a specific user, with its account resolved
//!     let alice = user
//!         .objects()
//!         .filter(doc! { "name": "alice" })?
//!         .select_related(["account"])?
//!         .get(None)
//!         .await?;
//!
//!     // Count users
//!     let count = user.objects().all().count("total").await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## QuerySet Operations
//!
//! QuerySets are lazy and chainable:
//!
//! ```ignore
//! let qs = user
//!     .objects()
//!     .filter(doc! { "age": { "$gte": 18 } })?
//!     .sort(doc! { "created_at": -1 })
//!     .limit(10)?;
//!
//! // Execute when needed
//! let users = qs.execute().await?;
//!
//! // Or get just the first result
//! let first = qs.first().await?;
//!
//! // Or group
//! let totals = user
//!     .queryset()
//!     .group(doc! { "_id": "$account_id", "total": { "$sum": 1 } })?
//!     .run(Default::default())
//!     .await?;
//! ```

mod cursor;
mod entity;
mod error;
pub mod fields;
mod manager;
mod model;
pub mod query;
mod queryset;
pub mod schema;
mod value;

pub use cursor::EntityCursor;
pub use entity::{Entity, EntityState, UpdateOptions};
pub use error::{OrmError, QueryBuildError, Result, ValidationError};
pub use fields::Field;
pub use manager::Manager;
pub use model::{Model, ModelBuilder, ModelOptions};
pub use query::{Lookup, Operation};
pub use queryset::{QuerySet, RelatedKey};
pub use schema::Schema;
pub use value::{IntoValues, Value, Values};
