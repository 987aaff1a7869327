//! Field types for model schemas.
//!
//! A field is a validation and casting rule for one schema attribute. Every
//! field carries [`FieldOptions`] (`required`, `nullable`, `default`) and
//! implements [`Field`]. Fields are immutable once the model is built and
//! shared read-only between entities.
//!
//! ```ignore
//! use docmodel_orm::fields::{IntegerField, StringField};
//!
//! let name = StringField::new().required(true).max_length(60);
//! let age = IntegerField::new().nullable(true);
//! ```

use std::fmt;
use std::sync::Arc;

use serde_json::Value as Json;

use crate::error::ValidationError;
use crate::value::{Value, Values};

/// Generates the `FieldOptions` shortcut setters on a field type.
macro_rules! field_option_setters {
    ($($path:ident).+) => {
        /// Replaces the field options.
        #[must_use]
        pub fn options(mut self, options: $crate::fields::FieldOptions) -> Self {
            self.$($path).+ = options;
            self
        }

        /// Sets the required option.
        #[must_use]
        pub fn required(mut self, value: bool) -> Self {
            self.$($path).+.required = value;
            self
        }

        /// Sets the nullable option.
        #[must_use]
        pub fn nullable(mut self, value: bool) -> Self {
            self.$($path).+.nullable = value;
            self
        }

        /// Sets a static default value.
        #[must_use]
        pub fn default(mut self, value: impl Into<$crate::value::Value>) -> Self {
            self.$($path).+ = self.$($path).+.default(value);
            self
        }

        /// Sets a default computed on every use.
        #[must_use]
        pub fn default_with<F>(mut self, compute: F) -> Self
        where
            F: Fn() -> $crate::value::Value + Send + Sync + 'static,
        {
            self.$($path).+ = self.$($path).+.default_with(compute);
            self
        }
    };
}

mod any;
mod boolean;
mod container;
mod numeric;
mod relations;
mod string;
mod temporal;

pub use any::AnyField;
pub use boolean::BooleanField;
pub use container::{ArrayField, ObjectField};
pub use numeric::{IntegerField, NumberField, PositiveIntegerField};
pub use relations::{ForeignKey, PrimaryKey};
pub use string::{slugify, SlugField, StringField};
pub use temporal::DateTimeField;
pub(crate) use temporal::parse_datetime;

/// A field default: a static value or a function evaluated on every use.
#[derive(Clone)]
pub enum FieldDefault {
    /// Static value.
    Value(Value),
    /// Zero-argument function.
    Compute(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl FieldDefault {
    /// Produces the default value.
    pub fn produce(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Compute(compute) => compute(),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}

/// Common field options.
#[derive(Debug, Clone, Default)]
pub struct FieldOptions {
    /// Whether a missing or null value is rejected.
    pub required: bool,
    /// Whether an explicit null is accepted.
    pub nullable: bool,
    /// Default value used when the field is absent.
    pub default: Option<FieldDefault>,
}

impl FieldOptions {
    /// Creates new field options with defaults.
    pub fn new() -> Self {
        Self {
            required: false,
            nullable: false,
            default: None,
        }
    }

    /// Sets the required option.
    #[must_use]
    pub fn required(mut self, value: bool) -> Self {
        self.required = value;
        self
    }

    /// Sets the nullable option.
    #[must_use]
    pub fn nullable(mut self, value: bool) -> Self {
        self.nullable = value;
        self
    }

    /// Sets a static default value. Falsy values such as `0`, `""` and
    /// `false` are kept as real defaults.
    #[must_use]
    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Value(value.into()));
        self
    }

    /// Sets a default computed on every use.
    #[must_use]
    pub fn default_with<F>(mut self, compute: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = Some(FieldDefault::Compute(Arc::new(compute)));
        self
    }
}

/// Outcome of a field-specific validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    /// The value is acceptable.
    Valid,
    /// The value is rejected without further detail.
    Invalid,
    /// The value is rejected with a descriptive message.
    Message(String),
    /// The value is not one of the allowed choices.
    Choice(Vec<String>),
    /// The value violates a length bound.
    Length(String),
    /// The value does not normalize to a slug.
    SlugFormat,
}

/// A validation and casting rule for one schema attribute.
pub trait Field: Send + Sync + fmt::Debug {
    /// Returns the field type name used in error messages.
    fn type_name(&self) -> &'static str;

    /// Returns the field options.
    fn options(&self) -> &FieldOptions;

    /// Checks a present, non-null value. `siblings` holds the other values
    /// being validated alongside it.
    fn validate(&self, value: &Value, siblings: &Values) -> Validity;

    /// Converts a stored value into its in-memory form.
    fn cast(&self, value: Value) -> Value {
        value
    }

    /// Converts an in-memory value into its stored form.
    fn cast_to_db(&self, value: &Value) -> Json {
        value.to_json()
    }

    /// Returns the document key this field is stored under.
    fn replace_key(&self, name: &str) -> String {
        name.to_string()
    }

    /// Returns the field as a foreign key, if it is one.
    fn as_foreign_key(&self) -> Option<&ForeignKey> {
        None
    }

    /// Whether the field marks the schema identity.
    fn is_primary_key(&self) -> bool {
        false
    }

    /// Handles a missing or null value that the nullable rule did not accept.
    fn check_missing(&self, name: &str, _siblings: &Values) -> Result<(), ValidationError> {
        if self.options().required {
            return Err(ValidationError::RequiredValue {
                field: name.to_string(),
            });
        }
        Ok(())
    }

    /// Returns the default value. `None` means "absent": the key must not be
    /// written. A nullable field without an explicit default yields null.
    fn get_default(&self) -> Option<Value> {
        let options = self.options();
        match &options.default {
            Some(default) => Some(default.produce()),
            None if options.nullable => Some(Value::Null),
            None => None,
        }
    }

    /// Casts a value, passing null through unchanged.
    fn cast_value(&self, value: Value) -> Value {
        if value.is_null() {
            value
        } else {
            self.cast(value)
        }
    }

    /// Validates a possibly absent value for the field `name`.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] describing the first failure.
    fn is_valid(
        &self,
        value: Option<&Value>,
        name: &str,
        siblings: &Values,
    ) -> Result<(), ValidationError> {
        let value = match value {
            Some(Value::Null) if self.options().nullable => return Ok(()),
            None | Some(Value::Null) => return self.check_missing(name, siblings),
            Some(value) => value,
        };

        match self.validate(value, siblings) {
            Validity::Valid => Ok(()),
            Validity::Invalid => Err(ValidationError::InvalidValue {
                value: value.to_string(),
                field: name.to_string(),
                field_type: self.type_name(),
            }),
            Validity::Message(message) => Err(ValidationError::Message {
                field: name.to_string(),
                message,
            }),
            Validity::Choice(choices) => Err(ValidationError::Choice {
                value: value.to_string(),
                field: name.to_string(),
                choices,
            }),
            Validity::Length(message) => Err(ValidationError::Length {
                field: name.to_string(),
                message,
            }),
            Validity::SlugFormat => Err(ValidationError::SlugFormat {
                value: value.to_string(),
                field: name.to_string(),
            }),
        }
    }
}
