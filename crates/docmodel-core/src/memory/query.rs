//! Filter evaluation and value ordering.

use std::cmp::Ordering;

use regex::RegexBuilder;
use serde_json::Value;

use crate::document::Document;
use crate::error::{Result, StoreError};

/// Ordering rank of a value's type. Values of different types never compare
/// equal; within a type the natural order applies.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}

/// Total order over JSON values.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    let rank = type_rank(a).cmp(&type_rank(b));
    if rank != Ordering::Equal {
        return rank;
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (left, right) in x.iter().zip(y) {
                let ord = compare_values(left, right);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            for ((lk, lv), (rk, rv)) in x.iter().zip(y) {
                let ord = lk.cmp(rk).then_with(|| compare_values(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => Ordering::Equal,
    }
}

/// Equality that treats `1` and `1.0` as the same number.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    compare_values(a, b) == Ordering::Equal
}

/// Collects every value reachable through a dotted path. Arrays of
/// sub-documents are traversed element-wise.
pub(crate) fn collect_path<'a>(document: &'a Document, path: &str) -> Vec<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some(first) = document.get(segments[0]) {
        collect_segments(first, &segments[1..], &mut out);
    }
    out
}

fn collect_segments<'a>(value: &'a Value, segments: &[&str], out: &mut Vec<&'a Value>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };

    match value {
        Value::Object(map) => {
            if let Some(next) = map.get(*head) {
                collect_segments(next, rest, out);
            }
        }
        Value::Array(items) => {
            if let Ok(index) = head.parse::<usize>() {
                if let Some(next) = items.get(index) {
                    collect_segments(next, rest, out);
                }
            } else {
                for item in items {
                    if item.is_object() {
                        collect_segments(item, segments, out);
                    }
                }
            }
        }
        _ => {}
    }
}

/// Returns whether a document satisfies a filter.
pub(crate) fn matches(document: &Document, filter: &Document) -> Result<bool> {
    for (key, condition) in filter {
        let ok = match key.as_str() {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(document, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clauses(key, condition)? {
                    if matches(document, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            "$text" => text_matches(document, condition)?,
            "$comment" => true,
            op if op.starts_with('$') => {
                return Err(StoreError::UnsupportedOperator(op.to_string()));
            }
            path => field_matches(&collect_path(document, path), condition)?,
        };

        if !ok {
            return Ok(false);
        }
    }

    Ok(true)
}

fn clauses<'a>(op: &str, condition: &'a Value) -> Result<Vec<&'a Document>> {
    let Value::Array(items) = condition else {
        return Err(StoreError::InvalidPipeline(format!("{op} expects an array")));
    };
    items
        .iter()
        .map(|item| {
            item.as_object()
                .ok_or_else(|| StoreError::InvalidPipeline(format!("{op} expects documents")))
        })
        .collect()
}

fn is_operator_document(condition: &Value) -> Option<&Document> {
    match condition {
        Value::Object(map) if !map.is_empty() && map.keys().all(|k| k.starts_with('$')) => {
            Some(map)
        }
        _ => None,
    }
}

fn field_matches(candidates: &[&Value], condition: &Value) -> Result<bool> {
    match is_operator_document(condition) {
        Some(operators) => operators_match(candidates, operators),
        None => Ok(equals_any(candidates, condition)),
    }
}

/// Equality with array membership. A `null` target also matches a missing
/// field.
fn equals_any(candidates: &[&Value], target: &Value) -> bool {
    if target.is_null() && candidates.is_empty() {
        return true;
    }

    candidates.iter().any(|candidate| {
        values_equal(candidate, target)
            || matches!(candidate, Value::Array(items) if items.iter().any(|i| values_equal(i, target)))
    })
}

/// Flattens array candidates one level so comparisons reach their elements.
fn flattened<'a>(candidates: &[&'a Value]) -> Vec<&'a Value> {
    let mut out = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match *candidate {
            Value::Array(items) => out.extend(items.iter()),
            other => out.push(other),
        }
    }
    out
}

fn compare_any(candidates: &[&Value], target: &Value, accept: fn(Ordering) -> bool) -> bool {
    flattened(candidates).into_iter().any(|candidate| {
        type_rank(candidate) == type_rank(target) && accept(compare_values(candidate, target))
    })
}

fn operators_match(candidates: &[&Value], operators: &Document) -> Result<bool> {
    for (op, arg) in operators {
        let ok = match op.as_str() {
            "$eq" => equals_any(candidates, arg),
            "$ne" => !equals_any(candidates, arg),
            "$gt" => compare_any(candidates, arg, |o| o == Ordering::Greater),
            "$gte" => compare_any(candidates, arg, |o| o != Ordering::Less),
            "$lt" => compare_any(candidates, arg, |o| o == Ordering::Less),
            "$lte" => compare_any(candidates, arg, |o| o != Ordering::Greater),
            "$in" => in_list(op, candidates, arg)?,
            "$nin" => !in_list(op, candidates, arg)?,
            "$exists" => is_truthy(arg) != candidates.is_empty(),
            "$regex" => {
                let options = operators
                    .get("$options")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                regex_matches(candidates, arg, options)?
            }
            "$options" => true,
            "$size" => {
                let expected = arg.as_u64().ok_or_else(|| {
                    StoreError::InvalidPipeline("$size expects a non-negative integer".into())
                })?;
                candidates
                    .iter()
                    .any(|c| matches!(c, Value::Array(items) if items.len() as u64 == expected))
            }
            "$all" => {
                let Value::Array(required) = arg else {
                    return Err(StoreError::InvalidPipeline("$all expects an array".into()));
                };
                required.iter().all(|item| equals_any(candidates, item))
            }
            "$elemMatch" => elem_match(candidates, arg)?,
            "$not" => {
                let Some(inner) = is_operator_document(arg) else {
                    return Err(StoreError::InvalidPipeline(
                        "$not expects an operator document".into(),
                    ));
                };
                !operators_match(candidates, inner)?
            }
            other => return Err(StoreError::UnsupportedOperator(other.to_string())),
        };

        if !ok {
            return Ok(false);
        }
    }

    Ok(true)
}

fn in_list(op: &str, candidates: &[&Value], arg: &Value) -> Result<bool> {
    let Value::Array(options) = arg else {
        return Err(StoreError::InvalidPipeline(format!("{op} expects an array")));
    };
    Ok(options.iter().any(|option| equals_any(candidates, option)))
}

fn regex_matches(candidates: &[&Value], pattern: &Value, options: &str) -> Result<bool> {
    let Some(pattern) = pattern.as_str() else {
        return Err(StoreError::InvalidPipeline("$regex expects a string".into()));
    };
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|e| StoreError::InvalidPipeline(e.to_string()))?;

    Ok(flattened(candidates)
        .into_iter()
        .any(|c| c.as_str().is_some_and(|s| regex.is_match(s))))
}

fn elem_match(candidates: &[&Value], arg: &Value) -> Result<bool> {
    let Value::Object(criteria) = arg else {
        return Err(StoreError::InvalidPipeline("$elemMatch expects a document".into()));
    };
    let operator_form = is_operator_document(arg).is_some()
        && !criteria.keys().any(|k| matches!(k.as_str(), "$and" | "$or" | "$nor"));

    for candidate in candidates {
        let Value::Array(items) = candidate else {
            continue;
        };
        for item in items {
            let hit = if operator_form {
                operators_match(&[item], criteria)?
            } else {
                match item {
                    Value::Object(sub) => matches(sub, criteria)?,
                    _ => false,
                }
            };
            if hit {
                return Ok(true);
            }
        }
    }

    Ok(false)
}

fn text_matches(document: &Document, condition: &Value) -> Result<bool> {
    let search = condition
        .get("$search")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidPipeline("$text requires $search".into()))?;
    let terms: Vec<String> = search.split_whitespace().map(str::to_lowercase).collect();
    if terms.is_empty() {
        return Ok(false);
    }

    let mut words = Vec::new();
    for value in document.values() {
        collect_words(value, &mut words);
    }

    Ok(terms.iter().any(|term| words.contains(term)))
}

fn collect_words(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.extend(
            s.split(|c: char| !c.is_alphanumeric())
                .filter(|w| !w.is_empty())
                .map(str::to_lowercase),
        ),
        Value::Array(items) => items.iter().for_each(|i| collect_words(i, out)),
        Value::Object(map) => map.values().for_each(|v| collect_words(v, out)),
        _ => {}
    }
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}
