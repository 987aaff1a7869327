//! # docmodel-core
//!
//! Store-facing building blocks for the docmodel ORM.
//!
//! This crate provides:
//! - `Document`, the wire representation of a stored document
//! - `Collection` and `Database` traits describing what the ORM needs from a
//!   document store driver
//! - Option structs carrying an opaque `Session` token through every call
//! - `DocumentCursor`, a lazy stream of documents
//! - An in-memory backend (`memory`) that evaluates filters, updates and
//!   aggregation pipelines, useful for tests and prototyping
//!
//! ## Quick Start
//!
//! ```ignore
//! use docmodel_core::memory::MemoryDatabase;
//! use docmodel_core::{doc, Database, FindOptions, WriteOptions};
//!
//! let db = MemoryDatabase::new("app");
//! let users = db.collection("users");
//!
//! users.insert_one(doc! { "name": "alice", "age": 31 }, WriteOptions::new()).await?;
//!
//! let adults = users
//!     .find(doc! { "age": { "$gte": 18 } }, FindOptions::new())
//!     .await?
//!     .try_collect()
//!     .await?;
//! ```

mod collection;
mod cursor;
pub mod document;
mod error;
pub mod memory;
mod options;

pub use collection::{
    Collection, Database, DeleteResult, IndexModel, InsertManyResult, InsertOneResult,
    UpdateResult,
};
pub use cursor::DocumentCursor;
pub use document::Document;
pub use error::{Result, StoreError};
pub use options::{AggregateOptions, FindOptions, Session, WriteOptions};

#[doc(hidden)]
pub use serde_json;
