//! Date and time field types.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use super::{Field, FieldOptions, Validity};
use crate::value::{Value, Values};

/// Parses an ISO-8601 timestamp.
///
/// Accepts RFC 3339 with an offset, a naive date-time (taken as UTC) and a
/// bare date (midnight UTC).
pub(crate) fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// A timestamp field. Accepts a timestamp value or ISO-8601 text.
#[derive(Debug, Clone)]
pub struct DateTimeField {
    /// Field options.
    pub options: FieldOptions,
}

impl Default for DateTimeField {
    fn default() -> Self {
        Self::new()
    }
}

impl DateTimeField {
    /// Creates a new DateTimeField.
    pub fn new() -> Self {
        Self {
            options: FieldOptions::new(),
        }
    }

    field_option_setters!(options);

    /// Defaults the field to the current time.
    #[must_use]
    pub fn auto_now(self) -> Self {
        self.default_with(|| Value::DateTime(Utc::now()))
    }
}

impl Field for DateTimeField {
    fn type_name(&self) -> &'static str {
        "DateTime"
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn validate(&self, value: &Value, _siblings: &Values) -> Validity {
        match value {
            Value::DateTime(_) => Validity::Valid,
            Value::Text(text) if parse_datetime(text).is_some() => Validity::Valid,
            _ => Validity::Invalid,
        }
    }

    fn cast(&self, value: Value) -> Value {
        let parsed = match &value {
            Value::Text(text) => parse_datetime(text),
            _ => None,
        };
        parsed.map_or(value, Value::DateTime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_datetime_formats() {
        let dt = parse_datetime("2024-05-01T10:30:00+02:00").unwrap();
        assert_eq!(dt.hour(), 8);
        assert!(parse_datetime("2024-05-01T10:30:00.250").is_some());
        assert_eq!(parse_datetime("2024-05-01").unwrap().day(), 1);
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn test_datetime_field() {
        let field = DateTimeField::new();
        assert_eq!(
            field.validate(&Value::from("2024-05-01"), &Values::new()),
            Validity::Valid
        );
        assert_eq!(field.validate(&Value::from("nope"), &Values::new()), Validity::Invalid);
        assert_eq!(field.validate(&Value::Int(3), &Values::new()), Validity::Invalid);
        assert!(matches!(
            field.cast(Value::from("2024-05-01T00:00:00Z")),
            Value::DateTime(_)
        ));
    }

    #[test]
    fn test_auto_now_default() {
        let field = DateTimeField::new().auto_now();
        assert!(matches!(field.get_default(), Some(Value::DateTime(_))));
    }
}
