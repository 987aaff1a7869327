//! Manager for database access.
//!
//! The Manager is the query facade of a model, similar to Django's Manager
//! class. It exposes a fixed set of methods, each delegating explicitly to
//! a [`QuerySet`] or to the model's collection.

use docmodel_core::{
    AggregateOptions, Document, FindOptions, IndexModel, InsertManyResult, InsertOneResult,
    WriteOptions,
};
use serde_json::Value as Json;

use crate::cursor::EntityCursor;
use crate::entity::Entity;
use crate::error::Result;
use crate::model::Model;
use crate::queryset::QuerySet;
use crate::schema::DELETED_AT;
use crate::value::IntoValues;

/// Adds `deleted_at: null` unless the filter names `deleted_at`.
fn active_filter(mut filter: Document) -> Document {
    if !filter.contains_key(DELETED_AT) {
        filter.insert(DELETED_AT.to_string(), Json::Null);
    }
    filter
}

/// A Manager provides database access methods for a [`Model`].
///
/// `all`, `filter`, `get`, `find`, `find_one` and `count` skip soft-deleted
/// documents unless the caller's filter names `deleted_at`. Managers are
/// lightweight and can be created freely.
///
/// # Example
///
/// ```ignore
/// // All active users
/// let users = user.objects().all().execute().await?;
///
/// // A specific user
/// let alice = user.objects().get(doc! { "name": "alice" }).await?;
///
/// // Create a new user
/// let bob = user.objects().create([("name", "bob")]).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Manager {
    model: Model,
}

impl Manager {
    /// Creates a Manager for `model`.
    pub fn new(model: &Model) -> Self {
        Self {
            model: model.clone(),
        }
    }

    /// Returns the managed model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Returns an empty QuerySet, without the soft-delete filter.
    pub fn queryset(&self) -> QuerySet {
        QuerySet::new(&self.model)
    }

    /// Returns a QuerySet over every document that is not soft deleted.
    pub fn all(&self) -> QuerySet {
        self.queryset().exclude_deleted()
    }

    /// Returns a QuerySet filtered by `query`.
    ///
    /// # Errors
    ///
    /// Returns the build error of [`QuerySet::filter`].
    pub fn filter(&self, query: Document) -> Result<QuerySet> {
        self.queryset().active(query)
    }

    /// Returns the single entity matching `query`.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`QuerySet::get`].
    pub async fn get(&self, query: Document) -> Result<Entity> {
        self.filter(query)?.get(None).await
    }

    /// Finds entities with a plain collection query.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn find(&self, filter: Document, options: FindOptions) -> Result<Vec<Entity>> {
        let documents = self
            .model
            .collection()
            .find(active_filter(filter), options)
            .await?;
        EntityCursor::new(&self.model, documents).try_collect().await
    }

    /// Finds the first entity matching a plain collection query.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn find_one(&self, filter: Document, options: FindOptions) -> Result<Option<Entity>> {
        let document = self
            .model
            .collection()
            .find_one(active_filter(filter), options)
            .await?;
        Ok(document.map(|document| Entity::create_from_db(&self.model, document)))
    }

    /// Counts the documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn count(&self, filter: Document) -> Result<u64> {
        Ok(self
            .model
            .collection()
            .count_documents(active_filter(filter), FindOptions::new())
            .await?)
    }

    /// Builds, validates and saves a new entity.
    ///
    /// # Errors
    ///
    /// Returns the validation or store error.
    pub async fn create(&self, values: impl IntoValues) -> Result<Entity> {
        self.queryset().create(values).await
    }

    /// Inserts entities in one call. See [`QuerySet::bulk_insert`].
    ///
    /// # Errors
    ///
    /// Returns the errors of [`QuerySet::bulk_insert`].
    pub async fn bulk_insert(&self, entities: &mut [Entity]) -> Result<InsertManyResult> {
        self.queryset().bulk_insert(entities).await
    }

    /// Inserts a raw document, bypassing validation.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn insert_one(
        &self,
        document: Document,
        options: WriteOptions,
    ) -> Result<InsertOneResult> {
        Ok(self.model.collection().insert_one(document, options).await?)
    }

    /// Runs a raw pipeline and maps the results to entities.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        options: AggregateOptions,
    ) -> Result<EntityCursor> {
        let documents = self.model.collection().aggregate(pipeline, options).await?;
        Ok(EntityCursor::new(&self.model, documents))
    }

    /// Creates an index on the collection.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn create_index(&self, index: IndexModel, options: WriteOptions) -> Result<String> {
        self.model.create_index(index, options).await
    }

    /// Creates several indexes on the collection.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn create_indexes(
        &self,
        indexes: Vec<IndexModel>,
        options: WriteOptions,
    ) -> Result<Vec<String>> {
        self.model.create_indexes(indexes, options).await
    }
}
