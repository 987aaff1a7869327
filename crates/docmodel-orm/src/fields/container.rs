//! Object and array field types.

use serde_json::Value as Json;

use super::{Field, FieldOptions, Validity};
use crate::value::{Value, Values};

/// An object field, optionally constrained by a nested shape.
///
/// Without a shape any object-like value is accepted: objects, arrays,
/// timestamps and embedded entities.
///
/// # Example
///
/// ```ignore
/// let address = ObjectField::new()
///     .key("city", StringField::new().required(true))
///     .key("zip", StringField::new())
///     .strict(true);
/// ```
#[derive(Debug)]
pub struct ObjectField {
    /// Declared keys and their fields.
    pub shape: Option<Vec<(String, Box<dyn Field>)>>,
    /// Whether every declared key must be present.
    pub strict: bool,
    /// Field options.
    pub options: FieldOptions,
}

impl Default for ObjectField {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectField {
    /// Creates a new ObjectField without a shape.
    pub fn new() -> Self {
        Self {
            shape: None,
            strict: false,
            options: FieldOptions::new(),
        }
    }

    field_option_setters!(options);

    /// Declares a nested key.
    #[must_use]
    pub fn key(mut self, name: impl Into<String>, field: impl Field + 'static) -> Self {
        self.shape
            .get_or_insert_with(Vec::new)
            .push((name.into(), Box::new(field)));
        self
    }

    /// Requires every declared key to be present.
    #[must_use]
    pub fn strict(mut self, value: bool) -> Self {
        self.strict = value;
        self
    }
}

impl Field for ObjectField {
    fn type_name(&self) -> &'static str {
        "Object"
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn validate(&self, value: &Value, _siblings: &Values) -> Validity {
        let Some(shape) = &self.shape else {
            return match value {
                Value::Object(_) | Value::Array(_) | Value::Entity(_) | Value::DateTime(_) => {
                    Validity::Valid
                }
                _ => Validity::Invalid,
            };
        };

        let Value::Object(map) = value else {
            return Validity::Invalid;
        };

        for (key, field) in shape {
            let item = map.get(key);
            if item.is_none() && self.strict {
                return Validity::Message(format!("Missing key \"{key}\""));
            }
            if let Err(err) = field.is_valid(item, key, map) {
                return Validity::Message(err.to_string());
            }
        }

        Validity::Valid
    }

    fn cast(&self, value: Value) -> Value {
        match (&self.shape, value) {
            (Some(shape), Value::Object(mut map)) => {
                for (key, field) in shape {
                    if let Some(item) = map.remove(key) {
                        map.insert(key.clone(), field.cast_value(item));
                    }
                }
                Value::Object(map)
            }
            (_, value) => value,
        }
    }

    fn cast_to_db(&self, value: &Value) -> Json {
        let (Some(shape), Value::Object(map)) = (&self.shape, value) else {
            return value.to_json();
        };
        let mut out = serde_json::Map::new();
        for (key, item) in map {
            let json = match shape.iter().find(|(name, _)| name == key) {
                Some((_, field)) => field.cast_to_db(item),
                None => item.to_json(),
            };
            out.insert(key.clone(), json);
        }
        Json::Object(out)
    }
}

/// An array field, optionally validating every element.
///
/// # Example
///
/// ```ignore
/// let tags = ArrayField::new().of(SlugField::new()).allow_empty(false);
/// ```
#[derive(Debug)]
pub struct ArrayField {
    /// Field every element must satisfy.
    pub of: Option<Box<dyn Field>>,
    /// Whether the empty array is accepted.
    pub allow_empty: bool,
    /// Field options.
    pub options: FieldOptions,
}

impl Default for ArrayField {
    fn default() -> Self {
        Self::new()
    }
}

impl ArrayField {
    /// Creates a new ArrayField accepting any elements.
    pub fn new() -> Self {
        Self {
            of: None,
            allow_empty: true,
            options: FieldOptions::new(),
        }
    }

    field_option_setters!(options);

    /// Sets the element field.
    #[must_use]
    pub fn of(mut self, field: impl Field + 'static) -> Self {
        self.of = Some(Box::new(field));
        self
    }

    /// Sets whether the empty array is accepted.
    #[must_use]
    pub fn allow_empty(mut self, value: bool) -> Self {
        self.allow_empty = value;
        self
    }
}

impl Field for ArrayField {
    fn type_name(&self) -> &'static str {
        "Array"
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn validate(&self, value: &Value, siblings: &Values) -> Validity {
        let Value::Array(items) = value else {
            return Validity::Invalid;
        };

        if !self.allow_empty && items.is_empty() {
            return Validity::Message("Array cannot be empty".to_string());
        }

        if let Some(of) = &self.of {
            for (index, item) in items.iter().enumerate() {
                if let Err(err) = of.is_valid(Some(item), &index.to_string(), siblings) {
                    return Validity::Message(err.to_string());
                }
            }
        }

        Validity::Valid
    }

    fn cast(&self, value: Value) -> Value {
        match (&self.of, value) {
            (Some(of), Value::Array(items)) => {
                Value::Array(items.into_iter().map(|item| of.cast_value(item)).collect())
            }
            (_, value) => value,
        }
    }

    fn cast_to_db(&self, value: &Value) -> Json {
        match (&self.of, value) {
            (Some(of), Value::Array(items)) => {
                Json::Array(items.iter().map(|item| of.cast_to_db(item)).collect())
            }
            _ => value.to_json(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{IntegerField, StringField};
    use std::collections::BTreeMap;

    fn object(pairs: &[(&str, Value)]) -> Value {
        Value::Object(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    #[test]
    fn test_object_without_shape() {
        let field = ObjectField::new();
        assert_eq!(field.validate(&object(&[]), &Values::new()), Validity::Valid);
        assert_eq!(
            field.validate(&Value::Array(vec![]), &Values::new()),
            Validity::Valid
        );
        assert_eq!(field.validate(&Value::from("x"), &Values::new()), Validity::Invalid);
    }

    #[test]
    fn test_object_shape() {
        let field = ObjectField::new()
            .key("city", StringField::new().required(true))
            .key("zip", IntegerField::new());

        assert_eq!(
            field.validate(&object(&[("city", Value::from("Paris"))]), &Values::new()),
            Validity::Valid
        );
        assert!(matches!(
            field.validate(&object(&[("zip", Value::Int(75))]), &Values::new()),
            Validity::Message(m) if m.contains("city")
        ));

        let strict = ObjectField::new().key("zip", IntegerField::new()).strict(true);
        assert_eq!(
            strict.validate(&object(&[]), &Values::new()),
            Validity::Message("Missing key \"zip\"".into())
        );
    }

    #[test]
    fn test_array_empty_and_elements() {
        let field = ArrayField::new().allow_empty(false);
        assert_eq!(
            field.validate(&Value::Array(vec![]), &Values::new()),
            Validity::Message("Array cannot be empty".into())
        );

        let ints = ArrayField::new().of(IntegerField::new());
        assert_eq!(
            ints.validate(&Value::from(vec![1, 2]), &Values::new()),
            Validity::Valid
        );
        assert!(matches!(
            ints.validate(&Value::from(vec![Value::Int(1), Value::from("x")]), &Values::new()),
            Validity::Message(_)
        ));
        assert_eq!(ints.validate(&Value::Int(1), &Values::new()), Validity::Invalid);
    }

    #[test]
    fn test_array_casts_elements() {
        let field = ArrayField::new().of(IntegerField::new());
        assert_eq!(
            field.cast(Value::from(vec!["1", "2"])),
            Value::from(vec![1, 2])
        );
    }
}
