//! Numeric field types.

use super::{Field, FieldOptions, Validity};
use crate::value::{Value, Values};

/// Reads a finite number from a numeric value or numeric text.
fn numeric(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Int(_) | Value::Float(_) => value.as_f64()?,
        Value::Text(text) => text.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// Builds an `Int` for whole numbers and a `Float` otherwise.
#[allow(clippy::cast_possible_truncation)]
fn number(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        Value::Int(n as i64)
    } else {
        Value::Float(n)
    }
}

/// Casts numeric text to a number, leaving every other value untouched.
fn cast_numeric_text(value: Value) -> Value {
    let parsed = match &value {
        Value::Text(_) => numeric(&value),
        _ => None,
    };
    parsed.map_or(value, number)
}

/// Parses the leading integer of a text, ignoring what follows.
fn leading_integer(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let end = text
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || (i == 0 && (c == '-' || c == '+'))))
        .map_or(text.len(), |(i, _)| i);
    text[..end].parse().ok()
}

/// A field holding any finite number. Numeric text is accepted and cast.
#[derive(Debug, Clone)]
pub struct NumberField {
    /// Field options.
    pub options: FieldOptions,
}

impl Default for NumberField {
    fn default() -> Self {
        Self::new()
    }
}

impl NumberField {
    /// Creates a new NumberField.
    pub fn new() -> Self {
        Self {
            options: FieldOptions::new(),
        }
    }

    field_option_setters!(options);
}

impl Field for NumberField {
    fn type_name(&self) -> &'static str {
        "Number"
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn validate(&self, value: &Value, _siblings: &Values) -> Validity {
        if numeric(value).is_some() {
            Validity::Valid
        } else {
            Validity::Invalid
        }
    }

    fn cast(&self, value: Value) -> Value {
        cast_numeric_text(value)
    }
}

/// A field holding a whole number.
#[derive(Debug, Clone)]
pub struct IntegerField {
    /// Field options.
    pub options: FieldOptions,
}

impl Default for IntegerField {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegerField {
    /// Creates a new IntegerField.
    pub fn new() -> Self {
        Self {
            options: FieldOptions::new(),
        }
    }

    field_option_setters!(options);
}

impl Field for IntegerField {
    fn type_name(&self) -> &'static str {
        "Integer"
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn validate(&self, value: &Value, _siblings: &Values) -> Validity {
        match value {
            Value::Int(_) => Validity::Valid,
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Validity::Valid,
            _ => Validity::Invalid,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn cast(&self, value: Value) -> Value {
        let parsed = match &value {
            Value::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            Value::Text(text) => leading_integer(text),
            _ => None,
        };
        parsed.map_or(value, Value::Int)
    }
}

/// A field holding a positive whole number.
///
/// Zero is rejected with the message `"Cannot be zero"` unless `allow_zero`
/// is set.
#[derive(Debug, Clone)]
pub struct PositiveIntegerField {
    /// Whether zero is accepted.
    pub allow_zero: bool,
    /// Field options.
    pub options: FieldOptions,
}

impl Default for PositiveIntegerField {
    fn default() -> Self {
        Self::new()
    }
}

impl PositiveIntegerField {
    /// Creates a new PositiveIntegerField.
    pub fn new() -> Self {
        Self {
            allow_zero: false,
            options: FieldOptions::new(),
        }
    }

    field_option_setters!(options);

    /// Accepts zero.
    #[must_use]
    pub fn allow_zero(mut self, value: bool) -> Self {
        self.allow_zero = value;
        self
    }
}

impl Field for PositiveIntegerField {
    fn type_name(&self) -> &'static str {
        "PositiveInteger"
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn validate(&self, value: &Value, _siblings: &Values) -> Validity {
        let Some(n) = numeric(value) else {
            return Validity::Invalid;
        };

        if n == 0.0 {
            // Only a numeric zero gets the dedicated message.
            return match value {
                Value::Text(_) => Validity::Invalid,
                _ if self.allow_zero => Validity::Valid,
                _ => Validity::Message("Cannot be zero".to_string()),
            };
        }

        if n < 0.0 || n.fract() != 0.0 {
            return Validity::Invalid;
        }

        Validity::Valid
    }

    fn cast(&self, value: Value) -> Value {
        cast_numeric_text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(field: &dyn Field, value: impl Into<Value>) -> bool {
        field.validate(&value.into(), &Values::new()) == Validity::Valid
    }

    #[test]
    fn test_number_accepts_numeric_text() {
        let field = NumberField::new();
        assert!(valid(&field, 3));
        assert!(valid(&field, -1.5));
        assert!(valid(&field, "56"));
        assert!(!valid(&field, "abc"));
        assert!(!valid(&field, f64::NAN));
        assert!(!valid(&field, true));
        assert_eq!(field.cast(Value::from("2.5")), Value::Float(2.5));
        assert_eq!(field.cast(Value::from("7")), Value::Int(7));
    }

    #[test]
    fn test_integer() {
        let field = IntegerField::new();
        assert!(valid(&field, 3));
        assert!(valid(&field, 3.0));
        assert!(!valid(&field, 3.14));
        assert!(!valid(&field, "3"));
        assert_eq!(field.cast(Value::from("3.14")), Value::Int(3));
        assert_eq!(field.cast(Value::from("-12px")), Value::Int(-12));
        assert_eq!(field.cast(Value::Float(9.9)), Value::Int(9));
    }

    #[test]
    fn test_positive_integer_zero() {
        let field = PositiveIntegerField::new();
        assert_eq!(
            field.validate(&Value::Int(0), &Values::new()),
            Validity::Message("Cannot be zero".into())
        );
        assert!(valid(&PositiveIntegerField::new().allow_zero(true), 0));
        assert!(!valid(&PositiveIntegerField::new().allow_zero(true), "0"));
    }

    #[test]
    fn test_positive_integer_sign_and_text() {
        let field = PositiveIntegerField::new();
        assert_eq!(
            field.validate(&Value::Float(-3.14), &Values::new()),
            Validity::Invalid
        );
        assert!(!valid(&field, -2));
        assert!(!valid(&field, 2.5));
        assert!(valid(&field, 56));
        assert!(valid(&field, "56"));
        assert_eq!(field.cast(Value::from("56")), Value::Int(56));
    }
}
