//! Update operator application.

use serde_json::Value;

use super::expr::number_value;
use super::query::values_equal;
use crate::document::{get_path, remove_path, set_path, Document};
use crate::error::{Result, StoreError};

/// Applies an operator update document in place.
pub(crate) fn apply_update(document: &mut Document, update: &Document) -> Result<()> {
    if update.is_empty() {
        return Err(StoreError::InvalidUpdate("update document is empty".into()));
    }

    for (op, fields) in update {
        if !op.starts_with('$') {
            return Err(StoreError::InvalidUpdate(format!(
                "update documents may only contain operators, found `{op}`"
            )));
        }
        let Value::Object(fields) = fields else {
            return Err(StoreError::InvalidUpdate(format!("{op} expects a document")));
        };

        for (path, value) in fields {
            if path == "_id" && op != "$set" {
                return Err(StoreError::InvalidUpdate("_id is immutable".into()));
            }
            match op.as_str() {
                "$set" => {
                    if path == "_id" && document.get("_id").is_some_and(|id| !values_equal(id, value)) {
                        return Err(StoreError::InvalidUpdate("_id is immutable".into()));
                    }
                    set_path(document, path, value.clone());
                }
                "$unset" => {
                    remove_path(document, path);
                }
                "$inc" => increment(document, path, value)?,
                "$push" => push(document, path, value)?,
                other => return Err(StoreError::UnsupportedOperator(other.to_string())),
            }
        }
    }

    Ok(())
}

fn increment(document: &mut Document, path: &str, by: &Value) -> Result<()> {
    let Some(by) = by.as_f64() else {
        return Err(StoreError::InvalidUpdate(format!("$inc on `{path}` needs a number")));
    };
    let current = match get_path(document, path) {
        None | Some(Value::Null) => 0.0,
        Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
        Some(_) => {
            return Err(StoreError::InvalidUpdate(format!(
                "cannot apply $inc to non-numeric field `{path}`"
            )))
        }
    };
    set_path(document, path, number_value(current + by));
    Ok(())
}

fn push(document: &mut Document, path: &str, value: &Value) -> Result<()> {
    let additions = match value.get("$each") {
        Some(Value::Array(items)) => items.clone(),
        Some(_) => return Err(StoreError::InvalidUpdate("$each expects an array".into())),
        None => vec![value.clone()],
    };

    let mut items = match get_path(document, path) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.clone(),
        Some(_) => {
            return Err(StoreError::InvalidUpdate(format!(
                "cannot apply $push to non-array field `{path}`"
            )))
        }
    };
    items.extend(additions);
    set_path(document, path, Value::Array(items));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_set_unset_inc_push() {
        let mut d = doc! { "_id": "a", "n": 1, "tags": ["x"], "gone": true };
        apply_update(
            &mut d,
            &doc! {
                "$set": { "profile.name": "jo" },
                "$unset": { "gone": "" },
                "$inc": { "n": 2 },
                "$push": { "tags": { "$each": ["y", "z"] } },
            },
        )
        .unwrap();

        assert_eq!(
            d,
            doc! { "_id": "a", "n": 3, "tags": ["x", "y", "z"], "profile": { "name": "jo" } }
        );
    }

    #[test]
    fn test_replacement_documents_are_rejected() {
        let mut d = doc! { "n": 1 };
        let err = apply_update(&mut d, &doc! { "n": 2 }).unwrap_err();
        assert!(matches!(err, StoreError::InvalidUpdate(_)));
    }

    #[test]
    fn test_id_cannot_change() {
        let mut d = doc! { "_id": "a" };
        assert!(apply_update(&mut d, &doc! { "$set": { "_id": "a" } }).is_ok());
        assert!(apply_update(&mut d, &doc! { "$set": { "_id": "b" } }).is_err());
    }
}
