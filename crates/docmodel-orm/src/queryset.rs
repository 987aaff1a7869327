//! QuerySet implementation: chainable aggregation pipelines.
//!
//! A QuerySet accumulates [`Operation`]s and does nothing until an
//! executing method (`execute()`, `get()`, `count()`, ...) is awaited. The
//! pipeline is then compiled with [`QuerySet::chain`] and sent to the
//! collection's aggregation capability.
//!
//! Builder calls consume the QuerySet and return it; clone it first to
//! branch a query.

use chrono::Utc;
use docmodel_core::{
    AggregateOptions, DeleteResult, Document, DocumentCursor, InsertManyResult, Session,
    UpdateResult, WriteOptions,
};
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::cursor::EntityCursor;
use crate::entity::Entity;
use crate::error::{OrmError, QueryBuildError, Result};
use crate::model::Model;
use crate::query::{Filter, Lookup, Operation};
use crate::schema::{validate_entity, values_to_db_document, DELETED_AT, ID_KEY, UPDATED_AT};
use crate::value::{IntoValues, Value};

/// A key accepted by [`QuerySet::select_related`].
#[derive(Debug, Clone, PartialEq)]
pub enum RelatedKey {
    /// A foreign key field of the bound model.
    Field(String),
    /// A model holding foreign keys to the bound model.
    Reverse(Model),
}

impl From<&str> for RelatedKey {
    fn from(name: &str) -> Self {
        Self::Field(name.to_string())
    }
}

impl From<String> for RelatedKey {
    fn from(name: String) -> Self {
        Self::Field(name)
    }
}

impl From<&Model> for RelatedKey {
    fn from(model: &Model) -> Self {
        Self::Reverse(model.clone())
    }
}

impl From<Model> for RelatedKey {
    fn from(model: Model) -> Self {
        Self::Reverse(model)
    }
}

/// Underscored form of a collection name, used in reverse relation keys.
fn underscored(model: &Model) -> String {
    model.collection_name().replace('-', "_")
}

/// A lazy, chainable aggregation query bound to a [`Model`].
///
/// # Example
///
/// ```ignore
/// let recent = user
///     .queryset()
///     .filter(doc! { "age": { "$gte": 18 } })?
///     .select_related(["account"])?
///     .sort(doc! { "created_at": -1 })
///     .limit(10)?
///     .execute()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct QuerySet {
    model: Model,
    pipeline: Vec<Operation>,
    options: AggregateOptions,
}

impl QuerySet {
    /// Creates an empty QuerySet bound to `model`.
    pub fn new(model: &Model) -> Self {
        Self {
            model: model.clone(),
            pipeline: Vec::new(),
            options: AggregateOptions::new(),
        }
    }

    /// Returns the bound model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Returns the accumulated operations.
    pub fn operations(&self) -> &[Operation] {
        &self.pipeline
    }

    /// Forwards `session` with every store call.
    #[must_use]
    pub fn session(mut self, session: Session) -> Self {
        self.options.session = Some(session);
        self
    }

    /// Replaces the aggregate options.
    #[must_use]
    pub fn options(mut self, options: AggregateOptions) -> Self {
        self.options = options;
        self
    }

    /// Appends a prebuilt operation.
    #[must_use]
    pub fn operation(mut self, operation: Operation) -> Self {
        self.pipeline.push(operation);
        self
    }

    /// Appends a raw stage document.
    #[must_use]
    pub fn raw(self, stage: Document) -> Self {
        self.operation(Operation::Raw(stage))
    }

    /// Appends a `$match` stage.
    ///
    /// # Errors
    ///
    /// Returns [`QueryBuildError::ForbiddenOperator`] or
    /// [`QueryBuildError::MisplacedTextSearch`].
    pub fn filter(self, query: Document) -> Result<Self> {
        let position = self.pipeline.len();
        let operation = Operation::filter(query, Some(position))?;
        Ok(self.operation(operation))
    }

    /// Appends an empty `$match` stage.
    #[must_use]
    pub fn all(self) -> Self {
        self.operation(Operation::Filter(Filter::default()))
    }

    /// Appends a `$match` stage keeping documents that are not soft deleted.
    #[must_use]
    pub fn exclude_deleted(self) -> Self {
        let mut query = Document::new();
        query.insert(DELETED_AT.to_string(), Json::Null);
        self.operation(Operation::Filter(Filter::trusted(query)))
    }

    /// Filters with `selector`, keeping only documents that are not soft
    /// deleted unless the selector names `deleted_at` itself.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`QuerySet::filter`].
    pub fn active(self, mut selector: Document) -> Result<Self> {
        if !selector.contains_key(DELETED_AT) {
            selector.insert(DELETED_AT.to_string(), Json::Null);
        }
        self.filter(selector)
    }

    /// Appends a `$lookup` stage.
    #[must_use]
    pub fn lookup(self, lookup: Lookup) -> Self {
        self.operation(Operation::Lookup(lookup))
    }

    /// Joins related documents.
    ///
    /// A field name joins the model referenced by that foreign key into the
    /// field itself, matching `<field>_id` against the referenced primary
    /// key. A model joins its documents pointing at the bound model into
    /// `<collection>s`; see [`QuerySet::reverse_related`].
    ///
    /// # Errors
    ///
    /// - [`QueryBuildError::UndefinedField`] for a name the schema does not
    ///   declare.
    /// - [`QueryBuildError::NotAForeignKey`] for a declared field that is
    ///   not a foreign key.
    pub fn select_related<I, K>(mut self, keys: I) -> Result<Self>
    where
        I: IntoIterator<Item = K>,
        K: Into<RelatedKey>,
    {
        for key in keys {
            let lookup = match key.into() {
                RelatedKey::Field(name) => self.forward_lookup(&name)?,
                RelatedKey::Reverse(model) => self.reverse_lookup(&model),
            };
            self = self.lookup(lookup);
        }
        Ok(self)
    }

    /// Joins the documents of `model` whose `<collection>_id` points at the
    /// bound model, into an array named `<model collection>s`.
    ///
    /// Dashes in collection names become underscores: with `model-a` bound
    /// and `model-b` joined, the lookup matches `model_a_id` into
    /// `model_bs`.
    #[must_use]
    pub fn reverse_related(self, model: &Model) -> Self {
        let lookup = self.reverse_lookup(model);
        self.lookup(lookup)
    }

    fn forward_lookup(&self, name: &str) -> std::result::Result<Lookup, QueryBuildError> {
        let field = self
            .model
            .schema()
            .get(name)
            .ok_or_else(|| QueryBuildError::UndefinedField {
                model: self.model.name().to_string(),
                field: name.to_string(),
            })?;
        let foreign_key = field
            .as_foreign_key()
            .ok_or_else(|| QueryBuildError::NotAForeignKey(name.to_string()))?;
        let related = foreign_key.model();
        Ok(Lookup::build(
            related,
            name,
            field.replace_key(name),
            related.pk(),
        ))
    }

    fn reverse_lookup(&self, model: &Model) -> Lookup {
        Lookup::build(
            model,
            format!("{}s", underscored(model)),
            self.model.pk(),
            format!("{}_id", underscored(&self.model)),
        )
    }

    /// Appends a `$sort` stage.
    #[must_use]
    pub fn sort(self, spec: Document) -> Self {
        self.operation(Operation::Sort(spec))
    }

    /// Appends a `$limit` stage.
    ///
    /// # Errors
    ///
    /// Returns [`QueryBuildError::NegativeLimit`] for a negative `n`.
    pub fn limit(self, n: i64) -> Result<Self> {
        Ok(self.operation(Operation::limit(n)?))
    }

    /// Appends a `$skip` stage.
    ///
    /// # Errors
    ///
    /// Returns [`QueryBuildError::NegativeLimit`] for a negative `n`.
    pub fn skip(self, n: i64) -> Result<Self> {
        Ok(self.operation(Operation::skip(n)?))
    }

    /// Appends a `$project` stage.
    #[must_use]
    pub fn project(self, projection: Document) -> Self {
        self.operation(Operation::Project(projection))
    }

    /// Keeps only the named fields.
    #[must_use]
    pub fn values<I, S>(self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let projection = names
            .into_iter()
            .map(|name| (name.into(), Json::from(1)))
            .collect();
        self.project(projection)
    }

    /// Appends an `$addFields` stage.
    #[must_use]
    pub fn annotate(self, fields: Document) -> Self {
        self.operation(Operation::Annotate(fields))
    }

    /// Appends a `$group` stage.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`Group::new`](crate::query::Group::new).
    pub fn group(self, spec: Document) -> Result<Self> {
        Ok(self.operation(Operation::group(spec)?))
    }

    /// Compiles the pipeline into stage documents.
    pub fn chain(&self) -> Vec<Document> {
        self.pipeline.iter().map(Operation::definition).collect()
    }

    /// Renders every stage with its name, logs and returns the text.
    pub fn explain(&self) -> String {
        let rendered = self
            .pipeline
            .iter()
            .map(|operation| {
                let definition =
                    serde_json::to_string_pretty(&operation.definition()).unwrap_or_default();
                format!("{}: {definition}", operation.name())
            })
            .collect::<Vec<_>>()
            .join("\n");
        debug!(model = %self.model.name(), pipeline = %rendered, "Explain");
        rendered
    }

    /// Folds the queries of every filter stage into one. Later keys win.
    pub fn get_combined_filter(&self) -> Document {
        let mut combined = Document::new();
        for operation in &self.pipeline {
            if let Operation::Filter(filter) = operation {
                for (key, value) in filter.query() {
                    combined.insert(key.clone(), value.clone());
                }
            }
        }
        combined
    }

    /// Runs the pipeline with `options` and returns the raw documents.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn run(&self, options: AggregateOptions) -> Result<DocumentCursor> {
        let pipeline = self.chain();
        debug!(
            collection = %self.model.collection_name(),
            stages = pipeline.len(),
            "Executing pipeline"
        );
        Ok(self.model.collection().aggregate(pipeline, options).await?)
    }

    /// Runs the pipeline with the QuerySet options and returns the raw
    /// documents.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn aggregation_cursor(&self) -> Result<DocumentCursor> {
        self.run(self.options.clone()).await
    }

    /// Runs the pipeline and returns a lazy cursor of entities.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn cursor(&self) -> Result<EntityCursor> {
        let documents = self.aggregation_cursor().await?;
        Ok(EntityCursor::new(&self.model, documents))
    }

    /// Runs the pipeline and materializes every result.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn execute(&self) -> Result<Vec<Entity>> {
        self.cursor().await?.try_collect().await
    }

    /// Same as [`QuerySet::execute`].
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn done(&self) -> Result<Vec<Entity>> {
        self.execute().await
    }

    /// Returns the first result, if any.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn first(&self) -> Result<Option<Entity>> {
        let mut cursor = self.clone().operation(Operation::Limit(1)).cursor().await?;
        cursor.next().await.transpose()
    }

    /// Returns `true` if the pipeline yields at least one document.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn exists(&self) -> Result<bool> {
        let mut cursor = self
            .clone()
            .operation(Operation::Limit(1))
            .aggregation_cursor()
            .await?;
        Ok(cursor.next().await.transpose()?.is_some())
    }

    /// Counts the results into the field `name` and returns the count.
    ///
    /// # Errors
    ///
    /// Returns [`QueryBuildError::InvalidCountField`] for a bad name, or the
    /// store error.
    pub async fn count(&self, name: &str) -> Result<u64> {
        let mut cursor = self
            .clone()
            .operation(Operation::count(name)?)
            .aggregation_cursor()
            .await?;
        let count = cursor
            .next()
            .await
            .transpose()?
            .and_then(|document| document.get(name).and_then(Json::as_u64))
            .unwrap_or(0);
        Ok(count)
    }

    /// Returns the single entity matching the pipeline and `query`.
    ///
    /// # Errors
    ///
    /// - [`OrmError::DoesNotExist`] if nothing matches.
    /// - [`OrmError::MultipleObjectsReturned`] if several documents match.
    /// - A build error for an invalid `query`, or the store error.
    pub async fn get(&self, query: Option<Document>) -> Result<Entity> {
        let queryset = match query {
            Some(query) => self.clone().filter(query)?,
            None => self.clone(),
        };
        let mut found = queryset.operation(Operation::Limit(2)).execute().await?;
        match found.len() {
            0 => Err(OrmError::DoesNotExist),
            1 => found.pop().ok_or(OrmError::DoesNotExist),
            _ => Err(OrmError::MultipleObjectsReturned),
        }
    }

    /// Builds, validates and saves a new entity.
    ///
    /// # Errors
    ///
    /// Returns the validation or store error.
    pub async fn create(&self, values: impl IntoValues) -> Result<Entity> {
        let mut entity = Entity::new(&self.model, values)?;
        entity.save(WriteOptions::from(&self.options)).await?;
        Ok(entity)
    }

    /// Inserts transient entities of the bound model in one call and
    /// assigns their ids.
    ///
    /// # Errors
    ///
    /// - [`OrmError::WrongModel`] if an entity belongs to another model.
    /// - [`OrmError::PartialInsert`] if the store wrote fewer documents.
    /// - The store error.
    pub async fn bulk_insert(&self, entities: &mut [Entity]) -> Result<InsertManyResult> {
        let mut documents = Vec::with_capacity(entities.len());
        for entity in entities.iter() {
            if entity.model() != &self.model {
                return Err(OrmError::WrongModel {
                    expected: self.model.name().to_string(),
                    found: entity.model().name().to_string(),
                });
            }
            let mut document = entity.to_document();
            if document.get(ID_KEY).is_some_and(Json::is_null) {
                document.remove(ID_KEY);
            }
            documents.push(document);
        }

        let result = self
            .model
            .collection()
            .insert_many(documents, WriteOptions::from(&self.options))
            .await?;

        if usize::try_from(result.inserted_count).ok() != Some(entities.len()) {
            warn!(
                model = %self.model.name(),
                inserted = result.inserted_count,
                expected = entities.len(),
                "Partial bulk insert"
            );
            return Err(OrmError::PartialInsert {
                inserted: result.inserted_count,
                expected: entities.len(),
            });
        }

        for (entity, id) in entities.iter_mut().zip(&result.inserted_ids) {
            entity.set_field(ID_KEY, Value::from(id))?;
        }
        debug!(model = %self.model.name(), count = result.inserted_count, "Bulk inserted documents");
        Ok(result)
    }

    /// Sets `values` on every document matched by the combined filter.
    ///
    /// The values are validated as a partial update and written in their
    /// stored form; `updated_at` is stamped.
    ///
    /// # Errors
    ///
    /// Returns the validation or store error.
    pub async fn update(&self, values: impl IntoValues) -> Result<UpdateResult> {
        let values = values.into_values()?;
        validate_entity(&self.model, &values, true)?;

        let mut set = values_to_db_document(self.model.schema(), &values);
        set.remove(ID_KEY);
        set.insert(
            UPDATED_AT.to_string(),
            Value::DateTime(Utc::now()).to_json(),
        );
        self.update_matching(set).await
    }

    /// Soft deletes every document matched by the combined filter.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn delete(&self) -> Result<UpdateResult> {
        let now = Value::DateTime(Utc::now()).to_json();
        let mut set = Document::new();
        set.insert(DELETED_AT.to_string(), now.clone());
        set.insert(UPDATED_AT.to_string(), now);
        self.update_matching(set).await
    }

    async fn update_matching(&self, set: Document) -> Result<UpdateResult> {
        let filter = self.get_combined_filter();
        let mut update = Document::new();
        update.insert("$set".to_string(), Json::Object(set));

        let result = self
            .model
            .collection()
            .update_many(filter, update, WriteOptions::from(&self.options))
            .await?;
        debug!(
            model = %self.model.name(),
            matched = result.matched_count,
            modified = result.modified_count,
            "Updated documents"
        );
        Ok(result)
    }

    /// Removes every document matched by the combined filter.
    ///
    /// # Errors
    ///
    /// Returns the store error.
    pub async fn hard_delete(&self) -> Result<DeleteResult> {
        let result = self
            .model
            .collection()
            .delete_many(self.get_combined_filter(), WriteOptions::from(&self.options))
            .await?;
        debug!(model = %self.model.name(), deleted = result.deleted_count, "Hard deleted documents");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{ForeignKey, StringField};
    use docmodel_core::doc;
    use docmodel_core::memory::MemoryDatabase;
    use std::sync::Arc;

    fn models() -> (Model, Model) {
        let db = Arc::new(MemoryDatabase::new("test"));
        let account = Model::builder("ModelA")
            .field("name", StringField::new())
            .build(db.clone())
            .unwrap();
        let user = Model::builder("ModelB")
            .field("name", StringField::new())
            .field("model_a", ForeignKey::new(&account))
            .build(db)
            .unwrap();
        (account, user)
    }

    #[test]
    fn test_chain_is_ordered() {
        let (_, user) = models();
        let qs = user
            .queryset()
            .filter(doc! { "name": "x" })
            .unwrap()
            .sort(doc! { "name": 1 })
            .limit(3)
            .unwrap();
        assert_eq!(
            qs.chain(),
            vec![
                doc! { "$match": { "name": "x" } },
                doc! { "$sort": { "name": 1 } },
                doc! { "$limit": 3 },
            ]
        );
    }

    #[test]
    fn test_clone_is_independent() {
        let (_, user) = models();
        let base = user.queryset().all();
        let limited = base.clone().limit(1).unwrap();
        assert_eq!(base.operations().len(), 1);
        assert_eq!(limited.operations().len(), 2);
    }

    #[test]
    fn test_text_search_position() {
        let (_, user) = models();
        let text = doc! { "$text": { "$search": "x" } };
        assert!(user.queryset().filter(text.clone()).is_ok());
        assert!(matches!(
            user.queryset().all().filter(text),
            Err(OrmError::QueryBuild(QueryBuildError::MisplacedTextSearch))
        ));
    }

    #[test]
    fn test_select_related_forward() {
        let (_, user) = models();
        let qs = user.queryset().select_related(["model_a"]).unwrap();
        assert_eq!(
            qs.chain(),
            vec![doc! {
                "$lookup": {
                    "from": "model-a",
                    "localField": "model_a_id",
                    "foreignField": "_id",
                    "as": "model_a",
                }
            }]
        );
    }

    #[test]
    fn test_select_related_reverse() {
        let (account, user) = models();
        let qs = account.queryset().select_related([&user]).unwrap();
        assert_eq!(
            qs.chain(),
            vec![doc! {
                "$lookup": {
                    "from": "model-b",
                    "localField": "_id",
                    "foreignField": "model_a_id",
                    "as": "model_bs",
                }
            }]
        );
    }

    #[test]
    fn test_select_related_errors() {
        let (_, user) = models();
        assert!(matches!(
            user.queryset().select_related(["missing"]),
            Err(OrmError::QueryBuild(QueryBuildError::UndefinedField { .. }))
        ));
        assert!(matches!(
            user.queryset().select_related(["name"]),
            Err(OrmError::QueryBuild(QueryBuildError::NotAForeignKey(_)))
        ));
    }

    #[test]
    fn test_combined_filter_later_keys_win() {
        let (_, user) = models();
        let qs = user
            .queryset()
            .filter(doc! { "a": 1, "b": 1 })
            .unwrap()
            .limit(5)
            .unwrap()
            .filter(doc! { "b": 2 })
            .unwrap();
        assert_eq!(qs.get_combined_filter(), doc! { "a": 1, "b": 2 });
    }

    #[test]
    fn test_values_projects_named_fields() {
        let (_, user) = models();
        let qs = user.queryset().values(["name", "created_at"]);
        assert_eq!(
            qs.chain(),
            vec![doc! { "$project": { "name": 1, "created_at": 1 } }]
        );
    }

    #[test]
    fn test_explain_names_stages() {
        let (_, user) = models();
        let text = user.queryset().all().limit(2).unwrap().explain();
        assert!(text.contains("FilterOperation"));
        assert!(text.contains("LimitOperation"));
    }

    #[test]
    fn test_active_keeps_explicit_deleted_at() {
        let (_, user) = models();
        let qs = user
            .queryset()
            .active(doc! { "deleted_at": { "$ne": null } })
            .unwrap();
        assert_eq!(
            qs.get_combined_filter(),
            doc! { "deleted_at": { "$ne": null } }
        );

        let qs = user.queryset().active(doc! { "name": "x" }).unwrap();
        assert_eq!(
            qs.get_combined_filter(),
            doc! { "name": "x", "deleted_at": null }
        );
    }
}
