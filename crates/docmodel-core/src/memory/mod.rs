//! In-memory document store.
//!
//! `MemoryDatabase` implements [`Database`] over a shared map of collections
//! guarded by a `tokio` read-write lock. It evaluates the filter operators,
//! update operators and pipeline stages the ORM emits, which makes it a
//! drop-in backend for tests.
//!
//! ```ignore
//! use docmodel_core::memory::MemoryDatabase;
//! use docmodel_core::{doc, AggregateOptions, Database};
//!
//! let db = MemoryDatabase::new("test");
//! let docs = db
//!     .collection("users")
//!     .aggregate(vec![doc! { "$match": { "age": { "$gt": 18 } } }], AggregateOptions::new())
//!     .await?
//!     .try_collect()
//!     .await?;
//! ```

mod expr;
mod pipeline;
mod query;
mod update;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::collection::{
    Collection, Database, DeleteResult, IndexModel, InsertManyResult, InsertOneResult,
    UpdateResult,
};
use crate::cursor::DocumentCursor;
use crate::document::{get_path, Document};
use crate::error::{Result, StoreError};
use crate::options::{AggregateOptions, FindOptions, WriteOptions};

/// Documents and indexes of one collection.
#[derive(Debug, Default)]
pub(crate) struct CollectionData {
    pub(crate) documents: Vec<Document>,
    pub(crate) indexes: Vec<IndexModel>,
}

impl CollectionData {
    /// Rejects `candidate` if it collides with a stored document on `_id` or
    /// on a unique index. `skip` excludes one stored position from the check.
    fn check_unique(&self, collection: &str, candidate: &Document, skip: Option<usize>) -> Result<()> {
        let others = self
            .documents
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != skip)
            .map(|(_, d)| d);

        for other in others {
            if let (Some(a), Some(b)) = (candidate.get("_id"), other.get("_id")) {
                if query::values_equal(a, b) {
                    return Err(duplicate(collection, "_id", a));
                }
            }
            for index in self.indexes.iter().filter(|i| i.unique) {
                let key = index_key(&index.keys, candidate);
                if key == index_key(&index.keys, other) {
                    return Err(duplicate(
                        collection,
                        &index.resolved_name(),
                        &Value::Array(key),
                    ));
                }
            }
        }
        Ok(())
    }
}

fn index_key(keys: &Document, document: &Document) -> Vec<Value> {
    keys.keys()
        .map(|k| get_path(document, k).cloned().unwrap_or(Value::Null))
        .collect()
}

fn duplicate(collection: &str, key: &str, value: &Value) -> StoreError {
    StoreError::DuplicateKey {
        collection: collection.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// All collections of a database.
#[derive(Debug, Default)]
pub(crate) struct Store {
    pub(crate) collections: BTreeMap<String, CollectionData>,
}

impl Store {
    pub(crate) fn documents(&self, collection: &str) -> &[Document] {
        self.collections
            .get(collection)
            .map(|c| c.documents.as_slice())
            .unwrap_or_default()
    }
}

/// An in-memory database.
#[derive(Clone)]
pub struct MemoryDatabase {
    name: Arc<str>,
    store: Arc<RwLock<Store>>,
}

impl MemoryDatabase {
    /// Creates an empty database.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            store: Arc::new(RwLock::new(Store::default())),
        }
    }

    /// Returns the names of collections that hold documents or indexes.
    pub async fn collection_names(&self) -> Vec<String> {
        self.store.read().await.collections.keys().cloned().collect()
    }

    /// Drops every collection.
    pub async fn clear(&self) {
        self.store.write().await.collections.clear();
    }
}

impl fmt::Debug for MemoryDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryDatabase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Database for MemoryDatabase {
    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        Arc::new(MemoryCollection {
            name: Arc::from(name),
            store: Arc::clone(&self.store),
        })
    }
}

/// A handle to one collection of a [`MemoryDatabase`].
#[derive(Clone)]
pub struct MemoryCollection {
    name: Arc<str>,
    store: Arc<RwLock<Store>>,
}

impl fmt::Debug for MemoryCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCollection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl MemoryCollection {
    fn select(&self, store: &Store, filter: &Document, options: &FindOptions) -> Result<Vec<Document>> {
        let mut selected = Vec::new();
        for document in store.documents(&self.name) {
            if query::matches(document, filter)? {
                selected.push(document.clone());
            }
        }

        if let Some(sort) = &options.sort {
            pipeline::sort_documents(&mut selected, sort);
        }
        let skip = options.skip.and_then(|n| usize::try_from(n).ok()).unwrap_or(0);
        let limit = options
            .limit
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or(usize::MAX);

        Ok(selected.into_iter().skip(skip).take(limit).collect())
    }

    async fn update(&self, filter: Document, update: Document, many: bool) -> Result<UpdateResult> {
        let mut store = self.store.write().await;
        let data = store.collections.entry(self.name.to_string()).or_default();
        let mut result = UpdateResult::default();

        for position in 0..data.documents.len() {
            if !query::matches(&data.documents[position], &filter)? {
                continue;
            }
            result.matched_count += 1;

            let mut updated = data.documents[position].clone();
            update::apply_update(&mut updated, &update)?;
            if updated != data.documents[position] {
                data.check_unique(&self.name, &updated, Some(position))?;
                data.documents[position] = updated;
                result.modified_count += 1;
            }

            if !many {
                break;
            }
        }

        debug!(
            collection = %self.name,
            matched = result.matched_count,
            modified = result.modified_count,
            "Updated documents"
        );
        Ok(result)
    }

    async fn delete(&self, filter: Document, many: bool) -> Result<DeleteResult> {
        let mut store = self.store.write().await;
        let data = store.collections.entry(self.name.to_string()).or_default();

        // Match everything first so a bad filter leaves the collection intact.
        let mut hits = data
            .documents
            .iter()
            .map(|document| query::matches(document, &filter))
            .collect::<Result<Vec<bool>>>()?;
        if !many {
            if let Some(first) = hits.iter().position(|hit| *hit) {
                hits = (0..hits.len()).map(|i| i == first).collect();
            }
        }

        let mut deleted = 0;
        let mut position = 0;
        data.documents.retain(|_| {
            let hit = hits[position];
            position += 1;
            if hit {
                deleted += 1;
            }
            !hit
        });

        debug!(collection = %self.name, deleted, "Deleted documents");
        Ok(DeleteResult {
            deleted_count: deleted,
        })
    }
}

/// Assigns a generated `_id` when the document has none.
fn with_id(mut document: Document) -> (Value, Document) {
    let id = match document.get("_id") {
        Some(id) if !id.is_null() => id.clone(),
        _ => {
            let id = Value::String(Uuid::new_v4().simple().to_string());
            document.insert("_id".to_string(), id.clone());
            id
        }
    };
    (id, document)
}

#[async_trait]
impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find(&self, filter: Document, options: FindOptions) -> Result<DocumentCursor> {
        let store = self.store.read().await;
        let mut documents = self.select(&store, &filter, &options)?;
        if let Some(projection) = &options.projection {
            documents = documents
                .iter()
                .map(|d| pipeline::project(d, projection))
                .collect::<Result<_>>()?;
        }

        debug!(collection = %self.name, returned = documents.len(), "Find");
        Ok(DocumentCursor::from_documents(documents))
    }

    async fn aggregate(
        &self,
        pipeline: Vec<Document>,
        _options: AggregateOptions,
    ) -> Result<DocumentCursor> {
        let store = self.store.read().await;
        let input = store.documents(&self.name).to_vec();
        let output = pipeline::run_pipeline(input, &pipeline, &store)?;

        debug!(
            collection = %self.name,
            stages = pipeline.len(),
            returned = output.len(),
            "Aggregate"
        );
        Ok(DocumentCursor::from_documents(output))
    }

    async fn insert_one(&self, document: Document, _options: WriteOptions) -> Result<InsertOneResult> {
        let mut store = self.store.write().await;
        let data = store.collections.entry(self.name.to_string()).or_default();

        let (id, document) = with_id(document);
        data.check_unique(&self.name, &document, None)?;
        data.documents.push(document);

        debug!(collection = %self.name, id = %id, "Inserted document");
        Ok(InsertOneResult { inserted_id: id })
    }

    async fn insert_many(
        &self,
        documents: Vec<Document>,
        _options: WriteOptions,
    ) -> Result<InsertManyResult> {
        let mut store = self.store.write().await;
        let data = store.collections.entry(self.name.to_string()).or_default();

        let mut inserted_ids = Vec::with_capacity(documents.len());
        for document in documents {
            let (id, document) = with_id(document);
            data.check_unique(&self.name, &document, None)?;
            data.documents.push(document);
            inserted_ids.push(id);
        }

        debug!(collection = %self.name, inserted = inserted_ids.len(), "Inserted documents");
        Ok(InsertManyResult {
            inserted_count: inserted_ids.len() as u64,
            inserted_ids,
        })
    }

    async fn update_one(
        &self,
        filter: Document,
        update: Document,
        _options: WriteOptions,
    ) -> Result<UpdateResult> {
        self.update(filter, update, false).await
    }

    async fn update_many(
        &self,
        filter: Document,
        update: Document,
        _options: WriteOptions,
    ) -> Result<UpdateResult> {
        self.update(filter, update, true).await
    }

    async fn delete_one(&self, filter: Document, _options: WriteOptions) -> Result<DeleteResult> {
        self.delete(filter, false).await
    }

    async fn delete_many(&self, filter: Document, _options: WriteOptions) -> Result<DeleteResult> {
        self.delete(filter, true).await
    }

    async fn count_documents(&self, filter: Document, options: FindOptions) -> Result<u64> {
        let store = self.store.read().await;
        Ok(self.select(&store, &filter, &options)?.len() as u64)
    }

    async fn create_index(&self, index: IndexModel, _options: WriteOptions) -> Result<String> {
        let mut store = self.store.write().await;
        let data = store.collections.entry(self.name.to_string()).or_default();
        let name = index.resolved_name();

        if data.indexes.iter().any(|i| i.resolved_name() == name) {
            return Ok(name);
        }

        if index.unique {
            for (position, document) in data.documents.iter().enumerate() {
                let key = index_key(&index.keys, document);
                if data.documents[position + 1..]
                    .iter()
                    .any(|other| index_key(&index.keys, other) == key)
                {
                    return Err(duplicate(&self.name, &name, &Value::Array(key)));
                }
            }
        }

        debug!(collection = %self.name, index = %name, unique = index.unique, "Created index");
        data.indexes.push(index);
        Ok(name)
    }
}
