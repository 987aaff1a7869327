//! Entities: in-memory instances mapped to one stored document.
//!
//! An entity goes through four states:
//!
//! - **Transient**: built in memory, no `_id` yet.
//! - **Persisted**: has an `_id` and mirrors one document.
//! - **SoftDeleted**: persisted with a non-null `deleted_at`.
//! - **Purged**: the document was removed by [`Entity::hard_delete`]; the
//!   instance is stale.

use chrono::Utc;
use docmodel_core::{DeleteResult, Document, WriteOptions};
use serde_json::Value as Json;
use tracing::{debug, warn};

use crate::error::{OrmError, Result, ValidationError};
use crate::fields::parse_datetime;
use crate::model::Model;
use crate::schema::{
    fill_defaults_for_construction, is_implicit_key, non_null, populate_from_db,
    validate_entity, values_to_db_document, CREATED_AT, DELETED_AT, ID_KEY, UPDATED_AT,
};
use crate::value::{IntoValues, Value, Values};

static NULL: Value = Value::Null;

/// Lifecycle state of an [`Entity`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityState {
    /// Not stored yet.
    Transient,
    /// Stored and active.
    Persisted,
    /// Stored with a deletion timestamp.
    SoftDeleted,
    /// Removed from the store.
    Purged,
}

/// Options for [`Entity::update`].
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOptions {
    /// Whether the partial values are validated first.
    pub validate: bool,
    /// Options forwarded to the store.
    pub write: WriteOptions,
}

impl UpdateOptions {
    /// Creates update options with validation on.
    pub fn new() -> Self {
        Self {
            validate: true,
            write: WriteOptions::new(),
        }
    }

    /// Sets whether the partial values are validated.
    #[must_use]
    pub fn validate(mut self, value: bool) -> Self {
        self.validate = value;
        self
    }

    /// Sets the store write options.
    #[must_use]
    pub fn write(mut self, write: WriteOptions) -> Self {
        self.write = write;
        self
    }
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl From<WriteOptions> for UpdateOptions {
    fn from(write: WriteOptions) -> Self {
        Self::new().write(write)
    }
}

/// An instance of a [`Model`].
///
/// Values are kept in a map keyed by field name, next to the implicit
/// `_id`, `created_at`, `updated_at` and `deleted_at` keys.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    model: Model,
    values: Values,
    purged: bool,
}

impl Entity {
    /// Builds a validated entity from user values.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if the values do not satisfy the schema.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let user = Entity::new(&user_model, [("name", "alice")])?;
    /// assert_eq!(user.state(), EntityState::Transient);
    /// ```
    pub fn new(model: &Model, values: impl IntoValues) -> Result<Self> {
        Self::construct(model, values, true)
    }

    /// Builds an entity, validating the values when `validate` is set.
    ///
    /// Explicit defaults are filled in first. The primary key default, when
    /// declared, is assigned; otherwise the store assigns `_id` on insert.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NotAnObject`] for non-object input and
    /// the first field failure when validating.
    pub fn construct(model: &Model, values: impl IntoValues, validate: bool) -> Result<Self> {
        let mut values = values.into_values()?;
        fill_defaults_for_construction(model.schema(), &mut values);
        if validate {
            validate_entity(model, &values, false)?;
        }
        Ok(Self::assemble(model, values))
    }

    /// Materializes a stored document. The document is trusted and not
    /// validated.
    pub fn create_from_db(model: &Model, document: Document) -> Self {
        let raw = document
            .into_iter()
            .map(|(key, value)| (key, Value::from(value)))
            .collect();
        Self::from_db_values(model, raw)
    }

    /// Materializes stored values already converted to [`Value`]s.
    pub fn from_db_values(model: &Model, raw: Values) -> Self {
        let values = populate_from_db(model.schema(), raw);
        Self::assemble(model, values)
    }

    fn assemble(model: &Model, mut values: Values) -> Self {
        let pk = model.pk();
        if !values.contains_key(pk) {
            if let Some(default) = model.pk_field().and_then(|field| field.get_default()) {
                values.insert(pk.to_string(), default);
            }
        }

        let created_at = match values.remove(CREATED_AT) {
            None | Some(Value::Null) => Value::DateTime(Utc::now()),
            Some(value) => parse_timestamp(value),
        };
        values.insert(CREATED_AT.to_string(), created_at);

        for key in [UPDATED_AT, DELETED_AT] {
            let value = values.remove(key).map_or(Value::Null, parse_timestamp);
            values.insert(key.to_string(), value);
        }

        Self {
            model: model.clone(),
            values,
            purged: false,
        }
    }

    /// Returns the model of the entity.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Returns all values.
    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Returns the value stored under `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Returns the primary key value, null while unassigned.
    pub fn pk(&self) -> &Value {
        self.values.get(self.model.pk()).unwrap_or(&NULL)
    }

    /// Returns the store identity, once persisted.
    pub fn id(&self) -> Option<&Value> {
        non_null(&self.values, ID_KEY)
    }

    /// Returns the creation timestamp.
    pub fn created_at(&self) -> Option<&chrono::DateTime<Utc>> {
        self.values.get(CREATED_AT).and_then(Value::as_datetime)
    }

    /// Returns the last update timestamp.
    pub fn updated_at(&self) -> Option<&chrono::DateTime<Utc>> {
        self.values.get(UPDATED_AT).and_then(Value::as_datetime)
    }

    /// Returns the soft-deletion timestamp.
    pub fn deleted_at(&self) -> Option<&chrono::DateTime<Utc>> {
        self.values.get(DELETED_AT).and_then(Value::as_datetime)
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> EntityState {
        if self.purged {
            EntityState::Purged
        } else if self.id().is_none() {
            EntityState::Transient
        } else if non_null(&self.values, DELETED_AT).is_some() {
            EntityState::SoftDeleted
        } else {
            EntityState::Persisted
        }
    }

    /// Sets one value after validating it.
    ///
    /// The entity is unchanged when validation fails. The store is not
    /// touched; call [`Entity::save`] to persist.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] of the field, or
    /// [`ValidationError::ExtraField`] for an undeclared key on a model
    /// refusing extra fields.
    pub fn set_field(
        &mut self,
        name: &str,
        value: impl Into<Value>,
    ) -> std::result::Result<(), ValidationError> {
        let value = value.into();
        let schema = self.model.schema();

        match schema.get(name) {
            Some(field) => field.is_valid(Some(&value), name, &self.values)?,
            None if is_implicit_key(name)
                || schema.is_replaced_key(name)
                || self.model.options().allow_extra_fields => {}
            None => {
                return Err(ValidationError::ExtraField {
                    model: self.model.name().to_string(),
                    field: name.to_string(),
                })
            }
        }

        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Returns the document written to the store for this entity.
    pub fn to_document(&self) -> Document {
        values_to_db_document(self.model.schema(), &self.values)
    }

    /// Returns a JSON rendering of the in-memory values, related entities
    /// included in full.
    pub fn to_json(&self) -> Json {
        Json::Object(
            self.values
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        )
    }

    /// Applies `partial` to the stored document and mirrors it in memory.
    ///
    /// `updated_at` is stamped with the current time and rolled back if the
    /// store call fails.
    ///
    /// # Errors
    ///
    /// - [`OrmError::NotPersisted`] if the entity has no `_id`.
    /// - A validation error if `options.validate` is set and a value fails.
    /// - [`OrmError::NotModified`] if the store changed no document.
    /// - The store error otherwise.
    pub async fn update(
        &mut self,
        partial: impl IntoValues,
        options: UpdateOptions,
    ) -> Result<&mut Self> {
        let id = self.id().cloned().ok_or(OrmError::NotPersisted)?;
        let partial = partial.into_values()?;
        if options.validate {
            validate_entity(&self.model, &partial, true)?;
        }

        let previous = self
            .values
            .insert(UPDATED_AT.to_string(), Value::DateTime(Utc::now()));

        let mut set = self.to_document();
        set.extend(values_to_db_document(self.model.schema(), &partial));
        set.remove(ID_KEY);

        let mut filter = Document::new();
        filter.insert(ID_KEY.to_string(), id.to_json());
        let mut update = Document::new();
        update.insert("$set".to_string(), Json::Object(set));

        let result = self
            .model
            .collection()
            .update_one(filter, update, options.write)
            .await;

        let modified = match result {
            Ok(result) => result.modified_count,
            Err(err) => {
                self.restore_updated_at(previous);
                return Err(err.into());
            }
        };

        if modified == 0 {
            self.restore_updated_at(previous);
            warn!(model = %self.model.name(), id = %id, "Document was not modified");
            return Err(OrmError::NotModified {
                model: self.model.name().to_string(),
                id: id.to_string(),
            });
        }

        debug!(model = %self.model.name(), id = %id, "Updated document");
        self.values.extend(partial);
        Ok(self)
    }

    fn restore_updated_at(&mut self, previous: Option<Value>) {
        match previous {
            Some(value) => self.values.insert(UPDATED_AT.to_string(), value),
            None => self.values.remove(UPDATED_AT),
        };
    }

    /// Inserts the entity if it is transient, otherwise writes its current
    /// values.
    ///
    /// # Errors
    ///
    /// Returns the store error, or any error of [`Entity::update`].
    pub async fn save(&mut self, options: WriteOptions) -> Result<&mut Self> {
        if self.id().is_some() {
            return self.update(Values::new(), UpdateOptions::from(options)).await;
        }

        let mut document = self.to_document();
        if document.get(ID_KEY).is_some_and(Json::is_null) {
            document.remove(ID_KEY);
        }

        let result = self.model.collection().insert_one(document, options).await?;
        debug!(model = %self.model.name(), id = %result.inserted_id, "Inserted document");
        self.values
            .insert(ID_KEY.to_string(), Value::from(result.inserted_id));
        Ok(self)
    }

    /// Marks the entity deleted by stamping `deleted_at`.
    ///
    /// # Errors
    ///
    /// Returns any error of [`Entity::update`].
    pub async fn delete(&mut self, options: WriteOptions) -> Result<&mut Self> {
        let partial = [(DELETED_AT, Value::DateTime(Utc::now()))];
        self.update(partial, UpdateOptions::from(options)).await
    }

    /// Removes the document from the store. The entity becomes purged.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::NotPersisted`] if the entity has no `_id`, or the
    /// store error.
    pub async fn hard_delete(&mut self, options: WriteOptions) -> Result<DeleteResult> {
        let id = self.id().cloned().ok_or(OrmError::NotPersisted)?;

        let mut filter = Document::new();
        filter.insert(ID_KEY.to_string(), id.to_json());
        let result = self.model.collection().delete_one(filter, options).await?;

        debug!(model = %self.model.name(), id = %id, deleted = result.deleted_count, "Hard deleted document");
        self.purged = true;
        Ok(result)
    }
}

/// Parses timestamp text, keeping any other value as is.
fn parse_timestamp(value: Value) -> Value {
    let parsed = match &value {
        Value::Text(text) => parse_datetime(text),
        _ => None,
    };
    parsed.map_or(value, Value::DateTime)
}
