//! Schemas and the schema-level validation and conversion passes.
//!
//! A [`Schema`] is the ordered list of field declarations of one model. The
//! free functions in this module implement the passes applied to whole
//! value maps: validation, defaulting, and conversion between the in-memory
//! values of an entity and the stored document.

use docmodel_core::Document;

use crate::error::{OrmError, Result, ValidationError};
use crate::fields::Field;
use crate::model::Model;
use crate::value::{Value, Values};

/// Name of the store-assigned identity key.
pub const ID_KEY: &str = "_id";
/// Name of the creation timestamp.
pub const CREATED_AT: &str = "created_at";
/// Name of the last-update timestamp.
pub const UPDATED_AT: &str = "updated_at";
/// Name of the soft-deletion timestamp.
pub const DELETED_AT: &str = "deleted_at";

/// Keys every model accepts without declaring them.
const IMPLICIT_KEYS: [&str; 4] = [ID_KEY, CREATED_AT, UPDATED_AT, DELETED_AT];

/// The ordered field declarations of a model.
#[derive(Debug, Default)]
pub struct Schema {
    fields: Vec<(String, Box<dyn Field>)>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Declares a field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field: impl Field + 'static) -> Self {
        self.push(name.into(), Box::new(field));
        self
    }

    pub(crate) fn push(&mut self, name: String, field: Box<dyn Field>) {
        self.fields.push((name, field));
    }

    /// Returns the field declared under `name`.
    pub fn get(&self, name: &str) -> Option<&dyn Field> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, field)| field.as_ref())
    }

    /// Returns `true` if a field is declared under `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterates over the declarations in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Field)> {
        self.fields
            .iter()
            .map(|(name, field)| (name.as_str(), field.as_ref()))
    }

    /// Returns the number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if no field is declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns `true` if `key` is the stored key of a declared field whose
    /// stored key differs from its name, such as `account_id`.
    pub fn is_replaced_key(&self, key: &str) -> bool {
        self.iter()
            .any(|(name, field)| name != key && field.replace_key(name) == key)
    }

    /// Returns the primary key name and field.
    ///
    /// Without a declared [`PrimaryKey`](crate::fields::PrimaryKey) the
    /// store-assigned `_id` is the identity and no field is returned.
    ///
    /// # Errors
    ///
    /// Returns [`OrmError::SchemaDefinition`] if several primary keys are
    /// declared.
    pub fn find_primary_key(&self) -> Result<(&str, Option<&dyn Field>)> {
        let mut keys = self.iter().filter(|(_, field)| field.is_primary_key());
        let found = keys.next();
        if keys.next().is_some() {
            return Err(OrmError::SchemaDefinition(
                "Cannot define multiple primary keys".to_string(),
            ));
        }
        Ok(found.map_or((ID_KEY, None), |(name, field)| (name, Some(field))))
    }

    /// Returns the first declared name appearing twice, if any.
    pub(crate) fn duplicate_name(&self) -> Option<&str> {
        self.fields.iter().enumerate().find_map(|(i, (name, _))| {
            self.fields[..i]
                .iter()
                .any(|(other, _)| other == name)
                .then_some(name.as_str())
        })
    }
}

/// Validates `values` against the schema of `model`.
///
/// Every present key is checked by its field; unknown keys are rejected
/// unless the model allows extra fields. When `partial` is `false` every
/// declared field missing from `values` is checked as absent, which
/// catches missing required values.
///
/// # Errors
///
/// Returns the first [`ValidationError`] encountered.
pub fn validate_entity(
    model: &Model,
    values: &Values,
    partial: bool,
) -> std::result::Result<(), ValidationError> {
    let schema = model.schema();

    for (key, value) in values {
        match schema.get(key) {
            Some(field) => field.is_valid(Some(value), key, values)?,
            None if IMPLICIT_KEYS.contains(&key.as_str()) || schema.is_replaced_key(key) => {}
            None if model.options().allow_extra_fields => {}
            None => {
                return Err(ValidationError::ExtraField {
                    model: model.name().to_string(),
                    field: key.clone(),
                })
            }
        }
    }

    if !partial {
        for (name, field) in schema.iter() {
            if !values.contains_key(name) {
                field.is_valid(None, name, values)?;
            }
        }
    }

    Ok(())
}

/// Turns raw stored values into entity values.
///
/// Declared fields are cast. Fields absent from the document, under both
/// their name and their stored key, receive their default. A present
/// foreign key id is never replaced by the default of its resolved key.
pub fn populate_from_db(schema: &Schema, raw: Values) -> Values {
    let mut values: Values = raw
        .into_iter()
        .map(|(key, value)| {
            let value = match schema.get(&key) {
                Some(field) => field.cast_value(value),
                None => value,
            };
            (key, value)
        })
        .collect();

    for (name, field) in schema.iter() {
        if field.as_foreign_key().is_some_and(|foreign_key| foreign_key.many) {
            order_by_stored_ids(&mut values, name, &field.replace_key(name));
        }
    }

    for (name, field) in schema.iter() {
        if field.is_primary_key() {
            continue;
        }
        if values.contains_key(name) || values.contains_key(&field.replace_key(name)) {
            continue;
        }
        if let Some(default) = field.get_default() {
            values.insert(name.to_string(), default);
        }
    }

    values
}

/// Sorts the joined entities under `name` in the order of the ids stored
/// under `stored_key`. Entities whose id is not listed go last.
fn order_by_stored_ids(values: &mut Values, name: &str, stored_key: &str) {
    let Some(Value::Array(ids)) = values.get(stored_key).cloned() else {
        return;
    };
    let Some(Value::Array(items)) = values.get_mut(name) else {
        return;
    };
    items.sort_by_key(|item| {
        item.as_entity()
            .and_then(|entity| ids.iter().position(|id| id == entity.pk()))
            .unwrap_or(usize::MAX)
    });
}

/// Injects explicitly configured defaults for fields absent from `values`.
///
/// Primary keys are skipped: their default is applied when the identity is
/// assigned.
pub fn fill_defaults_for_construction(schema: &Schema, values: &mut Values) {
    for (name, field) in schema.iter() {
        if field.is_primary_key() || field.options().default.is_none() {
            continue;
        }
        if values.contains_key(name) || values.contains_key(&field.replace_key(name)) {
            continue;
        }
        if let Some(default) = field.get_default() {
            values.insert(name.to_string(), default);
        }
    }
}

/// Converts entity values into the document written to the store.
///
/// Declared fields are written under their stored key with their stored
/// form; other keys pass through. A null foreign key never overwrites a
/// present id under the same stored key.
pub fn values_to_db_document(schema: &Schema, values: &Values) -> Document {
    let mut document = Document::new();

    for (key, value) in values {
        if !schema.contains(key) {
            document.insert(key.clone(), value.to_json());
        }
    }

    for (key, value) in values {
        let Some(field) = schema.get(key) else {
            continue;
        };
        let stored = field.replace_key(key);
        let keeps_id = value.is_null()
            && field.as_foreign_key().is_some()
            && document.get(&stored).is_some_and(|id| !id.is_null());
        if keeps_id {
            continue;
        }
        document.insert(stored, field.cast_to_db(value));
    }

    document
}

/// Returns `true` when `name` is one of the keys every model accepts.
pub fn is_implicit_key(name: &str) -> bool {
    IMPLICIT_KEYS.contains(&name)
}

/// Returns the value stored under `key` unless it is absent or null.
pub(crate) fn non_null<'a>(values: &'a Values, key: &str) -> Option<&'a Value> {
    values.get(key).filter(|value| !value.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{ForeignKey, IntegerField, PrimaryKey, StringField};
    use docmodel_core::memory::MemoryDatabase;
    use std::sync::Arc;

    fn database() -> Arc<MemoryDatabase> {
        Arc::new(MemoryDatabase::new("test"))
    }

    fn values(pairs: &[(&str, Value)]) -> Values {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_find_primary_key() {
        let implicit = Schema::new().field("name", StringField::new());
        let (name, field) = implicit.find_primary_key().unwrap();
        assert_eq!(name, "_id");
        assert!(field.is_none());

        let explicit = Schema::new()
            .field("code", PrimaryKey::new())
            .field("name", StringField::new());
        assert_eq!(explicit.find_primary_key().unwrap().0, "code");

        let twice = Schema::new()
            .field("a", PrimaryKey::new())
            .field("b", PrimaryKey::new());
        assert!(matches!(
            twice.find_primary_key(),
            Err(OrmError::SchemaDefinition(_))
        ));
    }

    #[test]
    fn test_validate_entity_required_and_partial() {
        let model = Model::builder("User")
            .field("name", StringField::new().required(true))
            .field("age", IntegerField::new())
            .build(database())
            .unwrap();

        let err = validate_entity(&model, &values(&[("age", Value::Int(3))]), false).unwrap_err();
        assert_eq!(
            err,
            ValidationError::RequiredValue {
                field: "name".into()
            }
        );

        assert!(validate_entity(&model, &values(&[("age", Value::Int(3))]), true).is_ok());
        assert!(validate_entity(&model, &values(&[("age", Value::from("x"))]), true).is_err());
    }

    #[test]
    fn test_validate_entity_extra_fields() {
        let strict = Model::builder("Tag")
            .field("name", StringField::new())
            .allow_extra_fields(false)
            .build(database())
            .unwrap();

        let err = validate_entity(&strict, &values(&[("color", Value::from("red"))]), true)
            .unwrap_err();
        assert!(matches!(err, ValidationError::ExtraField { .. }));

        let implicit = values(&[("_id", Value::from("t1")), ("deleted_at", Value::Null)]);
        assert!(validate_entity(&strict, &implicit, true).is_ok());
    }

    #[test]
    fn test_populate_from_db_keeps_foreign_key_id() {
        let db = database();
        let account = Model::builder("Account").build(db.clone()).unwrap();
        let schema = Schema::new()
            .field("account", ForeignKey::new(&account).nullable(true))
            .field("score", IntegerField::new().default(0));

        let populated = populate_from_db(&schema, values(&[("account_id", Value::from("a1"))]));
        assert_eq!(populated.get("account_id"), Some(&Value::from("a1")));
        assert!(!populated.contains_key("account"));
        assert_eq!(populated.get("score"), Some(&Value::Int(0)));

        let document = values_to_db_document(&schema, &values(&[
            ("account_id", Value::from("a1")),
            ("account", Value::Null),
        ]));
        assert_eq!(document.get("account_id"), Some(&serde_json::json!("a1")));
    }

    #[test]
    fn test_populate_from_db_keeps_stored_id_order() {
        let account = Model::builder("Account").build(database()).unwrap();
        let schema = Schema::new().field("accounts", ForeignKey::new(&account).many(true));
        let joined = Value::from(serde_json::json!([{ "_id": "a1" }, { "_id": "a2" }]));

        let populated = populate_from_db(
            &schema,
            values(&[
                ("accounts", joined),
                ("accounts_ids", Value::from(vec!["a2", "a1"])),
            ]),
        );
        let Some(Value::Array(accounts)) = populated.get("accounts") else {
            panic!("accounts not cast: {populated:?}");
        };
        let ids: Vec<&Value> = accounts
            .iter()
            .filter_map(|account| account.as_entity().map(|entity| entity.pk()))
            .collect();
        assert_eq!(ids, vec![&Value::from("a2"), &Value::from("a1")]);

        let document = values_to_db_document(&schema, &populated);
        assert_eq!(document.get("accounts_ids"), Some(&serde_json::json!(["a2", "a1"])));
    }

    #[test]
    fn test_fill_defaults_only_when_configured() {
        let schema = Schema::new()
            .field("score", IntegerField::new().default(0))
            .field("nick", StringField::new().nullable(true))
            .field("code", PrimaryKey::new().default("x"));

        let mut values = Values::new();
        fill_defaults_for_construction(&schema, &mut values);
        assert_eq!(values.get("score"), Some(&Value::Int(0)));
        assert!(!values.contains_key("nick"));
        assert!(!values.contains_key("code"));
    }
}
