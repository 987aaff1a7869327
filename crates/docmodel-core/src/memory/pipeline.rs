//! Aggregation pipeline stages.

use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use super::expr::{avg, evaluate, extreme, number_value, sum};
use super::query::{collect_path, compare_values, is_truthy, matches, values_equal};
use super::Store;
use crate::document::{get_path, remove_path, set_path, Document};
use crate::error::{Result, StoreError};

/// Runs every stage of a pipeline over the input documents.
pub(crate) fn run_pipeline(
    mut documents: Vec<Document>,
    pipeline: &[Document],
    store: &Store,
) -> Result<Vec<Document>> {
    for stage in pipeline {
        let mut entries = stage.iter();
        let (Some((name, spec)), None) = (entries.next(), entries.next()) else {
            return Err(StoreError::InvalidPipeline(
                "each stage must contain exactly one operator".into(),
            ));
        };

        debug!(stage = %name, input = documents.len(), "Running pipeline stage");

        documents = match name.as_str() {
            "$match" => match_stage(documents, object(name, spec)?)?,
            "$lookup" => lookup_stage(documents, object(name, spec)?, store)?,
            "$limit" => {
                let n = count_arg(name, spec)?;
                documents.truncate(n);
                documents
            }
            "$skip" => {
                let n = count_arg(name, spec)?;
                documents.into_iter().skip(n).collect()
            }
            "$project" => {
                let spec = object(name, spec)?;
                documents
                    .iter()
                    .map(|d| project(d, spec))
                    .collect::<Result<_>>()?
            }
            "$addFields" | "$set" => add_fields(documents, object(name, spec)?)?,
            "$unset" => unset_stage(documents, spec)?,
            "$sort" => {
                sort_documents(&mut documents, object(name, spec)?);
                documents
            }
            "$count" => count_stage(&documents, spec)?,
            "$unwind" => unwind_stage(documents, spec)?,
            "$group" => group_stage(&documents, object(name, spec)?)?,
            other => return Err(StoreError::UnsupportedStage(other.to_string())),
        };
    }

    Ok(documents)
}

fn object<'a>(stage: &str, spec: &'a Value) -> Result<&'a Document> {
    spec.as_object()
        .ok_or_else(|| StoreError::InvalidPipeline(format!("{stage} expects a document")))
}

fn count_arg(stage: &str, spec: &Value) -> Result<usize> {
    spec.as_u64()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| {
            StoreError::InvalidPipeline(format!("{stage} expects a non-negative integer"))
        })
}

fn match_stage(documents: Vec<Document>, filter: &Document) -> Result<Vec<Document>> {
    let mut kept = Vec::with_capacity(documents.len());
    for document in documents {
        if matches(&document, filter)? {
            kept.push(document);
        }
    }
    Ok(kept)
}

fn lookup_stage(
    mut documents: Vec<Document>,
    spec: &Document,
    store: &Store,
) -> Result<Vec<Document>> {
    let field = |key: &str| {
        spec.get(key).and_then(Value::as_str).ok_or_else(|| {
            StoreError::InvalidPipeline(format!("$lookup requires a string `{key}`"))
        })
    };
    let from = field("from")?;
    let local_field = field("localField")?;
    let foreign_field = field("foreignField")?;
    let as_field = field("as")?;

    let foreign = store.documents(from);

    for document in &mut documents {
        let locals = join_keys(document, local_field);
        let joined: Vec<Value> = foreign
            .iter()
            .filter(|candidate| {
                let keys = join_keys(candidate, foreign_field);
                keys.iter()
                    .any(|k| locals.iter().any(|l| values_equal(k, l)))
            })
            .map(|candidate| Value::Object(candidate.clone()))
            .collect();
        set_path(document, as_field, Value::Array(joined));
    }

    Ok(documents)
}

/// Join keys for `$lookup`: array values contribute each element and a
/// missing field joins as `null`.
fn join_keys(document: &Document, path: &str) -> Vec<Value> {
    let found = collect_path(document, path);
    if found.is_empty() {
        return vec![Value::Null];
    }
    let mut keys = Vec::new();
    for value in found {
        match value {
            Value::Array(items) => keys.extend(items.iter().cloned()),
            other => keys.push(other.clone()),
        }
    }
    keys
}

/// Applies a projection to one document.
pub(crate) fn project(document: &Document, spec: &Document) -> Result<Document> {
    let mut include_id = true;
    let mut inclusions = Vec::new();
    let mut exclusions = Vec::new();
    let mut computed = Vec::new();

    for (key, value) in spec {
        let flag = match value {
            Value::Bool(b) => Some(*b),
            Value::Number(_) => Some(is_truthy(value)),
            _ => None,
        };
        match (key.as_str(), flag) {
            ("_id", Some(flag)) => include_id = flag,
            (_, Some(true)) => inclusions.push(key.as_str()),
            (_, Some(false)) => exclusions.push(key.as_str()),
            (_, None) => computed.push((key.as_str(), value)),
        }
    }

    if !exclusions.is_empty() && !(inclusions.is_empty() && computed.is_empty()) {
        return Err(StoreError::InvalidPipeline(
            "cannot mix inclusion and exclusion in $project".into(),
        ));
    }

    if !exclusions.is_empty() || (inclusions.is_empty() && computed.is_empty()) {
        let mut out = document.clone();
        for path in exclusions {
            remove_path(&mut out, path);
        }
        if !include_id {
            out.remove("_id");
        }
        return Ok(out);
    }

    let mut out = Document::new();
    if include_id {
        if let Some(id) = document.get("_id") {
            out.insert("_id".to_string(), id.clone());
        }
    }
    for path in inclusions {
        if let Some(value) = get_path(document, path) {
            set_path(&mut out, path, value.clone());
        }
    }
    for (path, expr) in computed {
        set_path(&mut out, path, evaluate(document, expr)?);
    }
    Ok(out)
}

fn add_fields(mut documents: Vec<Document>, spec: &Document) -> Result<Vec<Document>> {
    for document in &mut documents {
        let mut computed = Vec::with_capacity(spec.len());
        for (path, expr) in spec {
            computed.push((path, evaluate(document, expr)?));
        }
        for (path, value) in computed {
            set_path(document, path, value);
        }
    }
    Ok(documents)
}

fn unset_stage(mut documents: Vec<Document>, spec: &Value) -> Result<Vec<Document>> {
    let paths: Vec<&str> = match spec {
        Value::String(s) => vec![s.as_str()],
        Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
        _ => {
            return Err(StoreError::InvalidPipeline(
                "$unset expects a field name or a list of names".into(),
            ))
        }
    };
    for document in &mut documents {
        for path in &paths {
            remove_path(document, path);
        }
    }
    Ok(documents)
}

/// Stable sort by a `{field: 1 | -1}` specification.
pub(crate) fn sort_documents(documents: &mut [Document], spec: &Document) {
    documents.sort_by(|a, b| {
        for (path, direction) in spec {
            let left = get_path(a, path).unwrap_or(&Value::Null);
            let right = get_path(b, path).unwrap_or(&Value::Null);
            let mut ord = compare_values(left, right);
            if direction.as_f64().is_some_and(|d| d < 0.0) {
                ord = ord.reverse();
            }
            if ord.is_ne() {
                return ord;
            }
        }
        std::cmp::Ordering::Equal
    });
}

fn count_stage(documents: &[Document], spec: &Value) -> Result<Vec<Document>> {
    let Some(name) = spec.as_str().filter(|n| !n.is_empty()) else {
        return Err(StoreError::InvalidPipeline(
            "$count expects a non-empty field name".into(),
        ));
    };
    if documents.is_empty() {
        return Ok(Vec::new());
    }
    let mut out = Document::new();
    out.insert(name.to_string(), Value::from(documents.len()));
    Ok(vec![out])
}

fn unwind_stage(documents: Vec<Document>, spec: &Value) -> Result<Vec<Document>> {
    let (path, preserve) = match spec {
        Value::String(path) => (path.as_str(), false),
        Value::Object(options) => (
            options.get("path").and_then(Value::as_str).unwrap_or_default(),
            options
                .get("preserveNullAndEmptyArrays")
                .is_some_and(is_truthy),
        ),
        _ => ("", false),
    };
    let Some(path) = path.strip_prefix('$') else {
        return Err(StoreError::InvalidPipeline(
            "$unwind path must start with `$`".into(),
        ));
    };

    let mut out = Vec::with_capacity(documents.len());
    for document in documents {
        let expanded = match get_path(&document, path) {
            Some(Value::Array(items)) if !items.is_empty() => Some(items.clone()),
            Some(Value::Array(_) | Value::Null) | None => {
                if !preserve {
                    continue;
                }
                None
            }
            Some(_) => None,
        };

        match expanded {
            Some(items) => {
                for item in items {
                    let mut copy = document.clone();
                    set_path(&mut copy, path, item);
                    out.push(copy);
                }
            }
            None => out.push(document),
        }
    }
    Ok(out)
}

fn group_stage(documents: &[Document], spec: &Document) -> Result<Vec<Document>> {
    let id_expr = spec
        .get("_id")
        .ok_or_else(|| StoreError::InvalidPipeline("$group requires an _id".into()))?;

    let mut groups: Vec<(Value, Vec<&Document>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for document in documents {
        let key = evaluate(document, id_expr)?;
        let slot = *index
            .entry(serde_json::to_string(&key)?)
            .or_insert_with(|| {
                groups.push((key, Vec::new()));
                groups.len() - 1
            });
        groups[slot].1.push(document);
    }

    let mut out = Vec::with_capacity(groups.len());
    for (key, members) in groups {
        let mut result = Document::new();
        result.insert("_id".to_string(), key);
        for (field, accumulator) in spec.iter().filter(|(k, _)| k.as_str() != "_id") {
            result.insert(field.clone(), accumulate(field, accumulator, &members)?);
        }
        out.push(result);
    }
    Ok(out)
}

fn accumulate(field: &str, accumulator: &Value, members: &[&Document]) -> Result<Value> {
    let Some((op, expr)) = accumulator
        .as_object()
        .filter(|m| m.len() == 1)
        .and_then(|m| m.iter().next())
    else {
        return Err(StoreError::InvalidPipeline(format!(
            "$group field `{field}` must be a single accumulator"
        )));
    };

    let values = members
        .iter()
        .map(|d| evaluate(d, expr))
        .collect::<Result<Vec<_>>>()?;

    let result = match op.as_str() {
        "$sum" => sum(&values),
        "$avg" => avg(&values),
        "$min" => extreme(values, true),
        "$max" => extreme(values, false),
        "$first" => values.into_iter().next().unwrap_or(Value::Null),
        "$last" => values.into_iter().last().unwrap_or(Value::Null),
        "$push" => Value::Array(values),
        "$addToSet" => {
            let mut set: Vec<Value> = Vec::new();
            for value in values {
                if !set.iter().any(|v| values_equal(v, &value)) {
                    set.push(value);
                }
            }
            Value::Array(set)
        }
        "$mergeObjects" => {
            let mut merged = Document::new();
            for value in values {
                if let Value::Object(map) = value {
                    merged.extend(map);
                }
            }
            Value::Object(merged)
        }
        "$stdDevPop" => std_dev(&values, false),
        "$stdDevSamp" => std_dev(&values, true),
        other => return Err(StoreError::UnsupportedOperator(other.to_string())),
    };
    Ok(result)
}

#[allow(clippy::cast_precision_loss)]
fn std_dev(values: &[Value], sample: bool) -> Value {
    let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    let n = numbers.len() as f64;
    let denominator = if sample { n - 1.0 } else { n };
    if denominator <= 0.0 {
        return Value::Null;
    }
    let mean = numbers.iter().sum::<f64>() / n;
    let variance = numbers.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / denominator;
    number_value(variance.sqrt())
}
