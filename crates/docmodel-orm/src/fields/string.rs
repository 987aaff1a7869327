//! Text field types.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value as Json;

use super::{Field, FieldOptions, Validity};
use crate::value::{format_datetime, Value, Values};

static SLUG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_-]+$").expect("Invalid slug pattern regex"));

/// A string field.
///
/// # Example
///
/// ```ignore
/// let status = StringField::new()
///     .required(true)
///     .choices(["draft", "published"]);
/// ```
#[derive(Debug, Clone)]
pub struct StringField {
    /// Whether the empty string is accepted.
    pub blank: bool,
    /// Allowed values.
    pub choices: Option<Vec<String>>,
    /// Minimum length in characters.
    pub min_length: Option<usize>,
    /// Maximum length in characters.
    pub max_length: Option<usize>,
    /// Field options.
    pub options: FieldOptions,
}

impl Default for StringField {
    fn default() -> Self {
        Self::new()
    }
}

impl StringField {
    /// Creates a new StringField.
    pub fn new() -> Self {
        Self {
            blank: false,
            choices: None,
            min_length: None,
            max_length: None,
            options: FieldOptions::new(),
        }
    }

    field_option_setters!(options);

    /// Accepts the empty string.
    #[must_use]
    pub fn blank(mut self, value: bool) -> Self {
        self.blank = value;
        self
    }

    /// Restricts the value to a set of choices.
    #[must_use]
    pub fn choices<I, S>(mut self, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.choices = Some(choices.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the minimum length.
    #[must_use]
    pub fn min_length(mut self, n: usize) -> Self {
        self.min_length = Some(n);
        self
    }

    /// Sets the maximum length.
    #[must_use]
    pub fn max_length(mut self, n: usize) -> Self {
        self.max_length = Some(n);
        self
    }

    fn check_text(&self, text: &str) -> Validity {
        if text.is_empty() {
            return if self.blank {
                Validity::Valid
            } else {
                Validity::Invalid
            };
        }

        if let Some(choices) = &self.choices {
            if !choices.iter().any(|c| c == text) {
                return Validity::Choice(choices.clone());
            }
        }

        let length = text.chars().count();
        if let Some(min) = self.min_length {
            if length < min {
                return Validity::Length(format!("must be at least {min} characters, got {length}"));
            }
        }
        if let Some(max) = self.max_length {
            if length > max {
                return Validity::Length(format!("must be at most {max} characters, got {length}"));
            }
        }

        Validity::Valid
    }
}

impl Field for StringField {
    fn type_name(&self) -> &'static str {
        "String"
    }

    fn options(&self) -> &FieldOptions {
        &self.options
    }

    fn validate(&self, value: &Value, _siblings: &Values) -> Validity {
        match value {
            Value::Text(text) => self.check_text(text),
            _ => Validity::Invalid,
        }
    }

    fn cast(&self, value: Value) -> Value {
        match value {
            Value::Text(_) => value,
            Value::Int(i) => Value::Text(i.to_string()),
            Value::Float(f) if f.fract() == 0.0 && f.is_finite() => {
                Value::Text(format!("{f:.0}"))
            }
            Value::Float(f) => Value::Text(f.to_string()),
            Value::Bool(b) => Value::Text(b.to_string()),
            Value::DateTime(dt) => Value::Text(format_datetime(&dt)),
            other => Value::Text(other.to_string()),
        }
    }
}

/// A string field normalized to `[a-z0-9_-]+`.
///
/// Values are passed through [`slugify`] before the format check, on cast
/// and when written to the store.
#[derive(Debug, Clone)]
pub struct SlugField {
    /// Underlying string rules.
    pub string: StringField,
}

impl Default for SlugField {
    fn default() -> Self {
        Self::new()
    }
}

impl SlugField {
    /// Creates a new SlugField.
    pub fn new() -> Self {
        Self {
            string: StringField::new(),
        }
    }

    field_option_setters!(string.options);

    /// Accepts the empty string before normalization.
    #[must_use]
    pub fn blank(mut self, value: bool) -> Self {
        self.string.blank = value;
        self
    }

    /// Sets the minimum length.
    #[must_use]
    pub fn min_length(mut self, n: usize) -> Self {
        self.string.min_length = Some(n);
        self
    }

    /// Sets the maximum length.
    #[must_use]
    pub fn max_length(mut self, n: usize) -> Self {
        self.string.max_length = Some(n);
        self
    }
}

impl Field for SlugField {
    fn type_name(&self) -> &'static str {
        "Slug"
    }

    fn options(&self) -> &FieldOptions {
        &self.string.options
    }

    fn validate(&self, value: &Value, siblings: &Values) -> Validity {
        let validity = self.string.validate(value, siblings);
        if validity != Validity::Valid {
            return validity;
        }

        match value {
            Value::Text(text) if SLUG_PATTERN.is_match(&slugify(text)) => Validity::Valid,
            _ => Validity::SlugFormat,
        }
    }

    fn cast(&self, value: Value) -> Value {
        match self.string.cast(value) {
            Value::Text(text) => Value::Text(slugify(&text)),
            other => other,
        }
    }

    fn cast_to_db(&self, value: &Value) -> Json {
        match value {
            Value::Text(text) => Json::String(slugify(text)),
            other => other.to_json(),
        }
    }
}

/// Normalizes text into a slug.
///
/// Lowercases and folds Latin diacritics to ASCII. A whitespace run becomes
/// `_` only when both of its neighbours are ASCII word characters before
/// folding, so an accented neighbour drops the separator. Every character
/// outside `[a-z0-9_-]` is then removed and repeated underscores collapse.
///
/// ```ignore
/// assert_eq!(slugify("plép àôïû"), "plepaoiu");
/// assert_eq!(slugify("plep plop 456"), "plep_plop_456");
/// assert_eq!(slugify("Déjà Vu"), "dejavu");
/// ```
pub fn slugify(input: &str) -> String {
    let chars: Vec<char> = input.to_lowercase().chars().collect();
    let mut folded = String::with_capacity(chars.len());

    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            let start = i;
            while i < chars.len() && chars[i].is_whitespace() {
                i += 1;
            }
            let before = start.checked_sub(1).map(|j| chars[j]);
            let after = chars.get(i).copied();
            if before.is_some_and(is_word_char) && after.is_some_and(is_word_char) {
                folded.push('_');
            }
            continue;
        }

        match fold_diacritic(c) {
            Some(ascii) => folded.push_str(ascii),
            None => folded.push(c),
        }
        i += 1;
    }

    let mut slug = String::with_capacity(folded.len());
    for c in folded.chars() {
        let keep = c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-';
        if !keep || (c == '_' && slug.ends_with('_')) {
            continue;
        }
        slug.push(c);
    }
    slug
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn fold_diacritic(c: char) -> Option<&'static str> {
    let ascii = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' => "i",
        'ł' | 'ľ' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ß' => "ss",
        'ť' | 'ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        _ => return None,
    };
    Some(ascii)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;

    fn check(field: &dyn Field, value: impl Into<Value>) -> Result<(), ValidationError> {
        field.is_valid(Some(&value.into()), "f", &Values::new())
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("plép àôïû"), "plepaoiu");
        assert_eq!(slugify("plep plop 456"), "plep_plop_456");
        assert_eq!(slugify("Hello   World"), "hello_world");
        assert_eq!(slugify("a__b"), "a_b");
        assert_eq!(slugify("Crème-Brûlée!"), "creme-brulee");
    }

    #[test]
    fn test_string_blank_and_type() {
        assert!(check(&StringField::new(), "").is_err());
        assert!(check(&StringField::new().blank(true), "").is_ok());
        assert!(check(&StringField::new(), 3).is_err());
    }

    #[test]
    fn test_string_choices() {
        let field = StringField::new().choices(["a", "b"]);
        assert!(check(&field, "a").is_ok());
        assert!(matches!(
            check(&field, "c"),
            Err(ValidationError::Choice { choices, .. }) if choices == vec!["a", "b"]
        ));
    }

    #[test]
    fn test_string_length() {
        let field = StringField::new().min_length(2).max_length(4);
        assert!(check(&field, "ab").is_ok());
        assert!(check(&field, "éèàù").is_ok());
        assert!(matches!(check(&field, "a"), Err(ValidationError::Length { .. })));
        assert!(matches!(check(&field, "abcde"), Err(ValidationError::Length { .. })));
    }

    #[test]
    fn test_string_cast() {
        let field = StringField::new();
        assert_eq!(field.cast(Value::Int(4)), Value::from("4"));
        assert_eq!(field.cast(Value::Float(2.0)), Value::from("2"));
        assert_eq!(field.cast(Value::Bool(true)), Value::from("true"));
    }

    #[test]
    fn test_slug_validation() {
        let field = SlugField::new();
        assert!(check(&field, "plep plop 456").is_ok());
        assert!(check(&field, "déjà vu").is_ok());
        assert!(matches!(check(&field, "!!!"), Err(ValidationError::SlugFormat { .. })));
        assert!(check(&field, 12).is_err());
    }

    #[test]
    fn test_slug_normalizes_on_cast_and_write() {
        let field = SlugField::new();
        assert_eq!(field.cast(Value::from("Plep Plop")), Value::from("plep_plop"));
        assert_eq!(field.cast_to_db(&Value::from("Deja Vu")), Json::from("deja_vu"));
        // The accented `à` next to the space drops the separator.
        assert_eq!(field.cast_to_db(&Value::from("Déjà Vu")), Json::from("dejavu"));
    }
}
