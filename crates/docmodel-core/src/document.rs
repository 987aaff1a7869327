//! Wire representation of stored documents.
//!
//! Documents are JSON objects. Timestamps travel as RFC 3339 strings.

use serde_json::Value;

/// A stored document: an object mapping keys to JSON values.
pub type Document = serde_json::Map<String, Value>;

/// Builds a [`Document`] from JSON-like syntax.
///
/// # Example
///
/// ```ignore
/// use docmodel_core::doc;
///
/// let filter = doc! { "age": { "$gte": 18 }, "deleted_at": null };
/// ```
#[macro_export]
macro_rules! doc {
    ($($body:tt)*) => {
        match $crate::serde_json::json!({ $($body)* }) {
            $crate::serde_json::Value::Object(map) => map,
            _ => $crate::Document::new(),
        }
    };
}

/// Returns the value stored at a dotted path.
///
/// Numeric path segments index into arrays.
pub fn get_path<'a>(document: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = document.get(first)?;

    for segment in segments {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }

    Some(current)
}

/// Stores a value at a dotted path, creating intermediate objects.
pub fn set_path(document: &mut Document, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            document.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let entry = document
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Document::new()));
            if !entry.is_object() {
                *entry = Value::Object(Document::new());
            }
            if let Value::Object(inner) = entry {
                set_path(inner, rest, value);
            }
        }
    }
}

/// Removes the value stored at a dotted path, returning it.
pub fn remove_path(document: &mut Document, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => document.remove(path),
        Some((head, rest)) => match document.get_mut(head) {
            Some(Value::Object(inner)) => remove_path(inner, rest),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_doc_macro() {
        let d = doc! { "a": 1, "b": { "c": "x" } };
        assert_eq!(d.get("a"), Some(&json!(1)));
        assert_eq!(d.len(), 2);
    }

    #[test]
    fn test_get_path() {
        let d = doc! { "a": { "b": [ { "c": 3 } ] } };
        assert_eq!(get_path(&d, "a.b.0.c"), Some(&json!(3)));
        assert_eq!(get_path(&d, "a.x"), None);
        assert_eq!(get_path(&d, "a.b.7"), None);
    }

    #[test]
    fn test_set_and_remove_path() {
        let mut d = Document::new();
        set_path(&mut d, "profile.name", json!("jo"));
        assert_eq!(d, doc! { "profile": { "name": "jo" } });

        assert_eq!(remove_path(&mut d, "profile.name"), Some(json!("jo")));
        assert_eq!(d, doc! { "profile": {} });
    }
}
