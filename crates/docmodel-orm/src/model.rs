//! Entity types.
//!
//! A [`Model`] binds a name and a [`Schema`] to a collection in a store.
//! It is built once, from explicit configuration, and shared cheaply: every
//! [`Entity`](crate::Entity) and [`QuerySet`] keeps a clone of the handle.
//!
//! # Example
//!
//! ```ignore
//! use docmodel_orm::fields::{IntegerField, StringField};
//! use docmodel_orm::Model;
//!
//! let user = Model::builder("User")
//!     .field("name", StringField::new().required(true))
//!     .field("age", IntegerField::new())
//!     .build(database.clone())?;
//!
//! assert_eq!(user.collection_name(), "user");
//! let adults = user.objects().filter(doc! { "age": { "$gte": 18 } })?.execute().await?;
//! ```

use std::fmt;
use std::sync::{Arc, LazyLock};

use docmodel_core::{Collection, Database, IndexModel, WriteOptions};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{OrmError, Result};
use crate::fields::Field;
use crate::manager::Manager;
use crate::queryset::QuerySet;
use crate::schema::Schema;

static CASE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z])([A-Z])").expect("Invalid case boundary regex"));

const fn default_allow_extra_fields() -> bool {
    true
}

/// Scalar configuration of a model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOptions {
    /// Collection name override. Defaults to the model name.
    #[serde(default)]
    pub collection: Option<String>,
    /// Whether keys absent from the schema are accepted.
    #[serde(default = "default_allow_extra_fields")]
    pub allow_extra_fields: bool,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            collection: None,
            allow_extra_fields: true,
        }
    }
}

struct ModelInner {
    name: String,
    schema: Schema,
    options: ModelOptions,
    pk_name: String,
    database: Arc<dyn Database>,
}

/// A shared handle to an entity type.
///
/// Two handles are equal when they come from the same
/// [`ModelBuilder::build`] call.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    /// Starts the definition of a model named `name`.
    pub fn builder(name: impl Into<String>) -> ModelBuilder {
        ModelBuilder {
            name: name.into(),
            schema: Schema::new(),
            options: ModelOptions::default(),
        }
    }

    /// Returns the model name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Returns the schema.
    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Returns the model options.
    pub fn options(&self) -> &ModelOptions {
        &self.inner.options
    }

    /// Returns the name of the primary key: the declared primary key field,
    /// or `_id`.
    pub fn pk(&self) -> &str {
        &self.inner.pk_name
    }

    /// Returns the declared primary key field, if any.
    pub fn pk_field(&self) -> Option<&dyn Field> {
        self.schema().get(self.pk()).filter(|field| field.is_primary_key())
    }

    /// Returns the database the model is bound to.
    pub fn database(&self) -> &Arc<dyn Database> {
        &self.inner.database
    }

    /// Returns the collection name.
    ///
    /// The configured collection (or the model name) with camel-case
    /// boundaries turned into dashes, lowercased: `ModelA` gives `model-a`.
    pub fn collection_name(&self) -> String {
        let base = self
            .inner
            .options
            .collection
            .as_deref()
            .unwrap_or(&self.inner.name);
        CASE_BOUNDARY.replace_all(base, "$1-$2").to_lowercase()
    }

    /// Returns a handle to the collection.
    pub fn collection(&self) -> Arc<dyn Collection> {
        self.inner.database.collection(&self.collection_name())
    }

    /// Returns the query facade of the model.
    pub fn objects(&self) -> Manager {
        Manager::new(self)
    }

    /// Returns an empty queryset bound to the model.
    pub fn queryset(&self) -> QuerySet {
        QuerySet::new(self)
    }

    /// Creates an index on the collection.
    ///
    /// # Errors
    ///
    /// Returns the store error if the index cannot be created.
    pub async fn create_index(&self, index: IndexModel, options: WriteOptions) -> Result<String> {
        let name = self.collection().create_index(index, options).await?;
        debug!(model = %self.name(), index = %name, "Created index");
        Ok(name)
    }

    /// Creates several indexes on the collection.
    ///
    /// # Errors
    ///
    /// Returns the store error if an index cannot be created.
    pub async fn create_indexes(
        &self,
        indexes: Vec<IndexModel>,
        options: WriteOptions,
    ) -> Result<Vec<String>> {
        let names = self.collection().create_indexes(indexes, options).await?;
        debug!(model = %self.name(), count = names.len(), "Created indexes");
        Ok(names)
    }
}

impl PartialEq for Model {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Model {}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.inner.name)
            .field("collection", &self.collection_name())
            .field("pk", &self.inner.pk_name)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Model`].
#[derive(Debug)]
pub struct ModelBuilder {
    name: String,
    schema: Schema,
    options: ModelOptions,
}

impl ModelBuilder {
    /// Declares a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: impl Field + 'static) -> Self {
        self.schema.push(name.into(), Box::new(field));
        self
    }

    /// Replaces the schema.
    #[must_use]
    pub fn schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    /// Overrides the collection name.
    #[must_use]
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.options.collection = Some(name.into());
        self
    }

    /// Sets whether keys absent from the schema are accepted.
    #[must_use]
    pub fn allow_extra_fields(mut self, value: bool) -> Self {
        self.options.allow_extra_fields = value;
        self
    }

    /// Replaces the scalar options.
    #[must_use]
    pub fn options(mut self, options: ModelOptions) -> Self {
        self.options = options;
        self
    }

    /// Builds the model bound to `database`.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::SchemaDefinition`] if a field is declared twice or
    /// several primary keys are declared.
    pub fn build(self, database: Arc<dyn Database>) -> Result<Model> {
        if let Some(name) = self.schema.duplicate_name() {
            return Err(OrmError::SchemaDefinition(format!(
                "Field \"{name}\" is declared twice in {}",
                self.name
            )));
        }

        let pk_name = self.schema.find_primary_key()?.0.to_string();

        debug!(model = %self.name, fields = self.schema.len(), pk = %pk_name, "Built model");

        Ok(Model {
            inner: Arc::new(ModelInner {
                name: self.name,
                schema: self.schema,
                options: self.options,
                pk_name,
                database,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{PrimaryKey, StringField};
    use docmodel_core::memory::MemoryDatabase;

    fn database() -> Arc<MemoryDatabase> {
        Arc::new(MemoryDatabase::new("test"))
    }

    #[test]
    fn test_collection_name() {
        let db = database();
        let a = Model::builder("ModelA").build(db.clone()).unwrap();
        assert_eq!(a.collection_name(), "model-a");

        let named = Model::builder("User")
            .collection("LegacyUsers")
            .build(db)
            .unwrap();
        assert_eq!(named.collection_name(), "legacy-users");
    }

    #[test]
    fn test_primary_key_name() {
        let db = database();
        let implicit = Model::builder("User").build(db.clone()).unwrap();
        assert_eq!(implicit.pk(), "_id");
        assert!(implicit.pk_field().is_none());

        let explicit = Model::builder("Country")
            .field("code", PrimaryKey::new().of(StringField::new()))
            .build(db)
            .unwrap();
        assert_eq!(explicit.pk(), "code");
        assert!(explicit.pk_field().is_some());
    }

    #[test]
    fn test_build_rejects_inconsistent_schemas() {
        let db = database();
        let duplicated = Model::builder("User")
            .field("name", StringField::new())
            .field("name", StringField::new())
            .build(db.clone());
        assert!(matches!(duplicated, Err(OrmError::SchemaDefinition(_))));

        let two_keys = Model::builder("User")
            .field("a", PrimaryKey::new())
            .field("b", PrimaryKey::new())
            .build(db);
        assert!(matches!(two_keys, Err(OrmError::SchemaDefinition(_))));
    }

    #[test]
    fn test_model_identity() {
        let db = database();
        let a = Model::builder("User").build(db.clone()).unwrap();
        let b = Model::builder("User").build(db).unwrap();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn test_options_deserialize_defaults() {
        let options: ModelOptions = serde_json::from_str(r#"{ "collection": "people" }"#).unwrap();
        assert!(options.allow_extra_fields);
        assert_eq!(options.collection.as_deref(), Some("people"));
    }
}
