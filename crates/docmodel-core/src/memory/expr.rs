//! Aggregation expression evaluation.

use serde_json::{Number, Value};

use super::query::{collect_path, compare_values};
use crate::document::Document;
use crate::error::{Result, StoreError};

/// Converts a float back to a JSON number, preferring integers for whole
/// values.
pub(crate) fn number_value(n: f64) -> Value {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 9_007_199_254_740_992.0 {
        #[allow(clippy::cast_possible_truncation)]
        return Value::from(n as i64);
    }
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

/// Resolves a `$field.path` reference against a document.
pub(crate) fn field_ref(document: &Document, path: &str) -> Value {
    let found = collect_path(document, path);
    match found.as_slice() {
        [] => Value::Null,
        [single] => (*single).clone(),
        many => Value::Array(many.iter().map(|v| (*v).clone()).collect()),
    }
}

/// Evaluates an expression against a document.
pub(crate) fn evaluate(document: &Document, expr: &Value) -> Result<Value> {
    match expr {
        Value::String(s) if s.starts_with('$') && !s.starts_with("$$") => {
            Ok(field_ref(document, &s[1..]))
        }
        Value::Array(items) => items
            .iter()
            .map(|item| evaluate(document, item))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some((op, arg)) = map.iter().next() {
                    if op.starts_with('$') {
                        return evaluate_operator(document, op, arg);
                    }
                }
            }
            let mut out = Document::new();
            for (key, value) in map {
                out.insert(key.clone(), evaluate(document, value)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

/// Evaluates an operator argument into a flat list of operands. A single
/// operand that resolves to an array is spread.
fn operands(document: &Document, arg: &Value) -> Result<Vec<Value>> {
    match arg {
        Value::Array(items) => items.iter().map(|item| evaluate(document, item)).collect(),
        single => match evaluate(document, single)? {
            Value::Array(items) => Ok(items),
            value => Ok(vec![value]),
        },
    }
}

fn evaluate_operator(document: &Document, op: &str, arg: &Value) -> Result<Value> {
    match op {
        "$literal" => Ok(arg.clone()),
        "$sum" => Ok(sum(&operands(document, arg)?)),
        "$avg" => Ok(avg(&operands(document, arg)?)),
        "$min" => Ok(extreme(operands(document, arg)?, true)),
        "$max" => Ok(extreme(operands(document, arg)?, false)),
        "$size" => match evaluate(document, arg)? {
            Value::Array(items) => Ok(Value::from(items.len())),
            _ => Err(StoreError::InvalidPipeline(
                "$size requires an array argument".into(),
            )),
        },
        "$concat" => {
            let mut out = String::new();
            for part in operands(document, arg)? {
                match part {
                    Value::String(s) => out.push_str(&s),
                    Value::Null => return Ok(Value::Null),
                    other => {
                        return Err(StoreError::InvalidPipeline(format!(
                            "$concat only supports strings, got {other}"
                        )))
                    }
                }
            }
            Ok(Value::String(out))
        }
        "$ifNull" => {
            let Value::Array(items) = arg else {
                return Err(StoreError::InvalidPipeline("$ifNull expects an array".into()));
            };
            for item in items {
                let value = evaluate(document, item)?;
                if !value.is_null() {
                    return Ok(value);
                }
            }
            Ok(Value::Null)
        }
        other => Err(StoreError::UnsupportedOperator(other.to_string())),
    }
}

pub(crate) fn sum(values: &[Value]) -> Value {
    number_value(values.iter().filter_map(Value::as_f64).sum())
}

pub(crate) fn avg(values: &[Value]) -> Value {
    let numbers: Vec<f64> = values.iter().filter_map(Value::as_f64).collect();
    if numbers.is_empty() {
        return Value::Null;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = numbers.len() as f64;
    number_value(numbers.iter().sum::<f64>() / count)
}

/// Smallest (or largest) non-null operand.
pub(crate) fn extreme(values: Vec<Value>, smallest: bool) -> Value {
    values
        .into_iter()
        .filter(|v| !v.is_null())
        .reduce(|best, v| {
            let ord = compare_values(&v, &best);
            if (smallest && ord.is_lt()) || (!smallest && ord.is_gt()) {
                v
            } else {
                best
            }
        })
        .unwrap_or(Value::Null)
}
