//! Boolean field type.

use super::{Field, FieldOptions, Validity};
use crate::value::{Value, Values};

/// A boolean field. Only literal `true` and `false` validate; casting uses
/// truthiness.
#[derive(Debug, Clone)]
pub struct BooleanField {
    /// Field options.
    pub options: FieldOptions,
}

impl Default for BooleanField {
    fn default() -> Self {
        Self::new()
    }
}

impl BooleanField {
    /// Creates a new BooleanField.
    pub fn new() -> Self {
        Self {
            options: FieldOptions::new(),
        }
    }

    field_option_setters!(options);
}

impl Field for BooleanField {
    fn type_name(&self) -> &'static str {
        "Boolean"
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn validate(&self, value: &Value, _siblings: &Values) -> Validity {
        match value {
            Value::Bool(_) => Validity::Valid,
            _ => Validity::Invalid,
        }
    }

    fn cast(&self, value: Value) -> Value {
        Value::Bool(value.is_truthy())
    }
}
