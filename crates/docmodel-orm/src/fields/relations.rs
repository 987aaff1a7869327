//! Relational field types: foreign keys and the primary key marker.

use serde_json::Value as Json;

use super::{Field, FieldOptions, Validity};
use crate::entity::Entity;
use crate::error::ValidationError;
use crate::model::Model;
use crate::value::{Value, Values};

/// A reference to entities of another model.
///
/// In memory the field holds the related [`Entity`] (or a list of them when
/// `many` is set). In the store it is written under `<name>_id` (or
/// `<name>_ids`) as the related identity.
///
/// # Example
///
/// ```ignore
/// let author = ForeignKey::new(&account).required(true);
/// let members = ForeignKey::new(&account).many(true);
/// ```
#[derive(Debug, Clone)]
pub struct ForeignKey {
    /// Referenced model.
    pub model: Model,
    /// Whether the field holds a list of references.
    pub many: bool,
    /// Field options.
    pub options: FieldOptions,
}

impl ForeignKey {
    /// Creates a single-valued foreign key to `model`.
    pub fn new(model: &Model) -> Self {
        Self {
            model: model.clone(),
            many: false,
            options: FieldOptions::new(),
        }
    }

    field_option_setters!(options);

    /// Makes the field hold a list of references.
    #[must_use]
    pub fn many(mut self, value: bool) -> Self {
        self.many = value;
        self
    }

    /// Returns the referenced model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    fn is_instance(&self, value: &Value) -> bool {
        value.as_entity().is_some_and(|e| e.model() == &self.model)
    }

    /// Turns a joined document (or the first of a joined list) into an entity.
    fn instantiate(&self, value: Value) -> Value {
        match value {
            Value::Object(values) => Value::from(Entity::from_db_values(&self.model, values)),
            other => other,
        }
    }

    fn identity(value: &Value) -> Json {
        match value {
            Value::Entity(entity) => entity.pk().to_json(),
            other => other.to_json(),
        }
    }
}

impl Field for ForeignKey {
    fn type_name(&self) -> &'static str {
        "ForeignKey"
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn validate(&self, value: &Value, _siblings: &Values) -> Validity {
        if !self.many {
            if self.is_instance(value) {
                return Validity::Valid;
            }
            return Validity::Message(format!(
                "Value {value} is not an instance of {}",
                self.model.name()
            ));
        }

        let Value::Array(items) = value else {
            return Validity::Message(format!(
                "Value {value} is not a list of {}",
                self.model.name()
            ));
        };

        if items.iter().all(|item| self.is_instance(item)) {
            return Validity::Valid;
        }

        let scalar = |v: &Value| !matches!(v, Value::Object(_) | Value::Array(_) | Value::Entity(_));
        let same_type = items
            .first()
            .is_some_and(|first| items.iter().all(|v| v.type_name() == first.type_name()));
        if same_type && items.iter().all(scalar) {
            return Validity::Valid;
        }

        Validity::Message(format!(
            "Values of {} must all be instances of {} or identities of a single type",
            value,
            self.model.name()
        ))
    }

    fn cast(&self, value: Value) -> Value {
        if self.many {
            return match value {
                Value::Array(items) => Value::Array(
                    items.into_iter().map(|item| self.instantiate(item)).collect(),
                ),
                other => self.instantiate(other),
            };
        }

        match value {
            // A lookup stage yields a list: keep its first element.
            Value::Array(items) => items
                .into_iter()
                .next()
                .map_or(Value::Null, |first| self.instantiate(first)),
            other => self.instantiate(other),
        }
    }

    fn cast_to_db(&self, value: &Value) -> Json {
        match value {
            Value::Array(items) if self.many => Json::Array(items.iter().map(Self::identity).collect()),
            other => Self::identity(other),
        }
    }

    fn replace_key(&self, name: &str) -> String {
        let suffix = if self.many { "_ids" } else { "_id" };
        if name.ends_with(suffix) {
            name.to_string()
        } else {
            format!("{name}{suffix}")
        }
    }

    fn as_foreign_key(&self) -> Option<&ForeignKey> {
        Some(self)
    }

    fn check_missing(&self, name: &str, siblings: &Values) -> Result<(), ValidationError> {
        let has_key = siblings
            .get(&self.replace_key(name))
            .is_some_and(|id| !id.is_null());
        if has_key || !self.options.required {
            return Ok(());
        }
        Err(ValidationError::RequiredValue {
            field: name.to_string(),
        })
    }
}

/// Marks the schema identity field.
///
/// At most one per schema. Without a default the value must be supplied by
/// the caller; a schema without a primary key uses the store-assigned `_id`.
///
/// # Example
///
/// ```ignore
/// let code = PrimaryKey::new().of(SlugField::new());
/// let uid = PrimaryKey::new().default_with(|| Value::from(next_id()));
/// ```
#[derive(Debug)]
pub struct PrimaryKey {
    /// Field applying extra validation and casting.
    pub inner: Option<Box<dyn Field>>,
    /// Field options.
    pub options: FieldOptions,
}

impl Default for PrimaryKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PrimaryKey {
    /// Creates a new PrimaryKey marker.
    pub fn new() -> Self {
        Self {
            inner: None,
            options: FieldOptions::new(),
        }
    }

    field_option_setters!(options);

    /// Wraps an inner field for validation and casting.
    #[must_use]
    pub fn of(mut self, field: impl Field + 'static) -> Self {
        self.inner = Some(Box::new(field));
        self
    }
}

impl Field for PrimaryKey {
    fn type_name(&self) -> &'static str {
        "PrimaryKey"
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn validate(&self, value: &Value, siblings: &Values) -> Validity {
        self.inner
            .as_ref()
            .map_or(Validity::Valid, |inner| inner.validate(value, siblings))
    }

    fn cast(&self, value: Value) -> Value {
        match &self.inner {
            Some(inner) => inner.cast(value),
            None => value,
        }
    }

    fn cast_to_db(&self, value: &Value) -> Json {
        match &self.inner {
            Some(inner) => inner.cast_to_db(value),
            None => value.to_json(),
        }
    }

    fn is_primary_key(&self) -> bool {
        true
    }

    fn check_missing(&self, name: &str, _siblings: &Values) -> Result<(), ValidationError> {
        if self.options.required || self.options.default.is_none() {
            return Err(ValidationError::RequiredValue {
                field: name.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{IntegerField, StringField};
    use docmodel_core::memory::MemoryDatabase;
    use std::sync::Arc;

    fn account() -> Model {
        Model::builder("Account")
            .field("name", StringField::new())
            .build(Arc::new(MemoryDatabase::new("test")))
            .unwrap()
    }

    #[test]
    fn test_replace_key() {
        let model = account();
        assert_eq!(ForeignKey::new(&model).replace_key("account"), "account_id");
        assert_eq!(ForeignKey::new(&model).replace_key("account_id"), "account_id");
        assert_eq!(
            ForeignKey::new(&model).many(true).replace_key("accounts"),
            "accounts_ids"
        );
    }

    #[test]
    fn test_single_foreign_key_validation() {
        let model = account();
        let field = ForeignKey::new(&model);
        let entity = Entity::new(&model, [("name", "acme")]).unwrap();

        assert_eq!(field.validate(&Value::from(entity), &Values::new()), Validity::Valid);
        assert_eq!(
            field.validate(&Value::Int(0), &Values::new()),
            Validity::Message("Value 0 is not an instance of Account".into())
        );
    }

    #[test]
    fn test_required_foreign_key_accepts_id_sibling() {
        let model = account();
        let field = ForeignKey::new(&model).required(true);

        let mut siblings = Values::new();
        assert!(field.is_valid(None, "account", &siblings).is_err());

        siblings.insert("account_id".into(), Value::from("a1"));
        assert!(field.is_valid(None, "account", &siblings).is_ok());
    }

    #[test]
    fn test_many_foreign_key_validation() {
        let model = account();
        let field = ForeignKey::new(&model).many(true);
        let a = Entity::new(&model, [("name", "a")]).unwrap();
        let b = Entity::new(&model, [("name", "b")]).unwrap();

        assert_eq!(
            field.validate(&Value::from(vec![a, b]), &Values::new()),
            Validity::Valid
        );
        assert_eq!(
            field.validate(&Value::from(vec!["x", "y"]), &Values::new()),
            Validity::Valid
        );
        assert!(matches!(
            field.validate(&Value::from(vec![Value::from("x"), Value::Int(1)]), &Values::new()),
            Validity::Message(_)
        ));
    }

    #[test]
    fn test_cast_takes_first_joined_document() {
        let model = account();
        let field = ForeignKey::new(&model);

        let joined = Value::from(serde_json::json!([{ "_id": "a1", "name": "acme" }]));
        let cast = field.cast(joined);
        let entity = cast.as_entity().unwrap();
        assert_eq!(entity.pk(), &Value::from("a1"));
        assert_eq!(entity.get("name"), Some(&Value::from("acme")));

        assert_eq!(field.cast(Value::Array(Vec::new())), Value::Null);
    }

    #[test]
    fn test_cast_to_db_writes_identities() {
        let model = account();
        let field = ForeignKey::new(&model).many(true);
        let a = Entity::create_from_db(&model, docmodel_core::doc! { "_id": "a1" });
        let b = Entity::create_from_db(&model, docmodel_core::doc! { "_id": "a2" });

        assert_eq!(
            field.cast_to_db(&Value::from(vec![a, b])),
            serde_json::json!(["a1", "a2"])
        );
    }

    #[test]
    fn test_primary_key_without_default_is_required() {
        let pk = PrimaryKey::new();
        assert!(pk.is_valid(None, "code", &Values::new()).is_err());

        let with_default = PrimaryKey::new().default_with(|| Value::from("generated"));
        assert!(with_default.is_valid(None, "code", &Values::new()).is_ok());

        let typed = PrimaryKey::new().of(IntegerField::new());
        assert!(typed.is_valid(Some(&Value::from("x")), "code", &Values::new()).is_err());
    }
}
