//! Unconstrained field type.

use super::{Field, FieldOptions, Validity};
use crate::value::{Value, Values};

/// A field accepting any value, stored as is.
#[derive(Debug, Clone)]
pub struct AnyField {
    /// Field options.
    pub options: FieldOptions,
}

impl Default for AnyField {
    fn default() -> Self {
        Self::new()
    }
}

impl AnyField {
    /// Creates a new AnyField.
    pub fn new() -> Self {
        Self {
            options: FieldOptions::new(),
        }
    }

    field_option_setters!(options);
}

impl Field for AnyField {
    fn type_name(&self) -> &'static str {
        "Any"
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn validate(&self, _value: &Value, _siblings: &Values) -> Validity {
        Validity::Valid
    }
}
