//! Collaborator traits a document store driver implements.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cursor::DocumentCursor;
use crate::document::Document;
use crate::error::Result;
use crate::options::{AggregateOptions, FindOptions, WriteOptions};

/// Result of `insert_one`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertOneResult {
    /// Identity assigned to (or carried by) the inserted document.
    pub inserted_id: Value,
}

/// Result of `insert_many`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertManyResult {
    /// Identities in input order.
    pub inserted_ids: Vec<Value>,
    /// Number of documents written.
    pub inserted_count: u64,
}

/// Result of `update_one` and `update_many`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UpdateResult {
    /// Documents matched by the filter.
    pub matched_count: u64,
    /// Documents whose content changed.
    pub modified_count: u64,
}

/// Result of `delete_one` and `delete_many`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeleteResult {
    /// Documents removed.
    pub deleted_count: u64,
}

/// An index specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexModel {
    /// Indexed keys and their direction (`1` or `-1`).
    pub keys: Document,
    /// Explicit index name.
    pub name: Option<String>,
    /// Whether the index enforces uniqueness.
    pub unique: bool,
}

impl IndexModel {
    /// Creates an index on the given keys.
    pub fn new(keys: Document) -> Self {
        Self {
            keys,
            name: None,
            unique: false,
        }
    }

    /// Sets an explicit index name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Marks the index as unique.
    #[must_use]
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    /// Returns the explicit name or the derived `field_direction` name.
    pub fn resolved_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }

        self.keys
            .iter()
            .map(|(key, direction)| format!("{key}_{direction}"))
            .collect::<Vec<_>>()
            .join("_")
    }
}

/// A named document container in the store.
///
/// Every method is asynchronous and suspends only while the store performs
/// the call. Options carry an optional session token which implementations
/// must honor or ignore, never alter.
#[async_trait]
pub trait Collection: Send + Sync + fmt::Debug {
    /// Returns the collection name.
    fn name(&self) -> &str;

    /// Finds documents matching a filter.
    async fn find(&self, filter: Document, options: FindOptions) -> Result<DocumentCursor>;

    /// Finds the first document matching a filter.
    async fn find_one(&self, filter: Document, options: FindOptions) -> Result<Option<Document>> {
        let mut cursor = self.find(filter, options.limit(1)).await?;
        cursor.next().await.transpose()
    }

    /// Runs an aggregation pipeline.
    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> Result<DocumentCursor>;

    /// Inserts one document.
    async fn insert_one(&self, document: Document, options: WriteOptions)
        -> Result<InsertOneResult>;

    /// Inserts many documents.
    async fn insert_many(
        &self,
        documents: Vec<Document>,
        options: WriteOptions,
    ) -> Result<InsertManyResult>;

    /// Updates the first document matching a filter.
    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        options: WriteOptions,
    ) -> Result<UpdateResult>;

    /// Updates every document matching a filter.
    async fn update_many(
        &self,
        filter: Document,
        update: Document,
        options: WriteOptions,
    ) -> Result<UpdateResult>;

    /// Deletes the first document matching a filter.
    async fn delete_one(&self, filter: Document, options: WriteOptions) -> Result<DeleteResult>;

    /// Deletes every document matching a filter.
    async fn delete_many(&self, filter: Document, options: WriteOptions) -> Result<DeleteResult>;

    /// Counts documents matching a filter.
    async fn count_documents(&self, filter: Document, options: FindOptions) -> Result<u64>;

    /// Creates an index and returns its name.
    async fn create_index(&self, index: IndexModel, options: WriteOptions) -> Result<String>;

    /// Creates several indexes and returns their names.
    async fn create_indexes(
        &self,
        indexes: Vec<IndexModel>,
        options: WriteOptions,
    ) -> Result<Vec<String>> {
        let mut names = Vec::with_capacity(indexes.len());
        for index in indexes {
            names.push(self.create_index(index, options.clone()).await?);
        }
        Ok(names)
    }
}

/// A store handle able to hand out collections by name.
///
/// Handles are passed explicitly to every model definition; there is no
/// process-wide default connection.
pub trait Database: Send + Sync + fmt::Debug {
    /// Returns the database name.
    fn name(&self) -> &str;

    /// Returns a handle to the named collection.
    fn collection(&self, name: &str) -> Arc<dyn Collection>;
}
