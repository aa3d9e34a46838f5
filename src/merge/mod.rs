//! Deep object merge
//!
//! Reconciles N partial documents into one with a left-to-right fold. The
//! first input seeds the accumulator; each later input's keys merge in
//! under the selected combine method:
//!
//! - `ArrayMerge` - colliding scalars/objects pair into `[left, right]`
//!   per pairwise step; arrays concatenate
//! - `ArrayMergeNewArray` - collisions accumulate into one flat list
//!   across all inputs
//! - `ObjectCombine` - colliding objects shallow-union (right overrides),
//!   colliding numbers sum, other scalars are overwritten by the later
//!   value
//!
//! Mixing array-shaped and non-array-shaped values at one position is an
//! error (except under `ArrayMergeNewArray`, which accumulates): a partial
//! merge has no well-defined semantics, so callers must not catch and
//! continue.

use serde_json::{Map, Value};
use thiserror::Error;

/// Result type for merge operations
pub type MergeResult<T> = Result<T, MergeError>;

/// Merge failures
#[derive(Debug, Clone, Error)]
pub enum MergeError {
    /// A top-level input was not an object
    #[error("merge input at position {0} is not an object")]
    NotAnObject(usize),

    /// Array-shaped and non-array-shaped values collided
    #[error("conflicting shapes at '{path}': {left} vs {right}")]
    ShapeConflict {
        /// Path of the colliding key
        path: String,
        /// Shape of the accumulated value
        left: &'static str,
        /// Shape of the incoming value
        right: &'static str,
    },
}

/// How colliding values combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CombineMethod {
    /// Pair collisions into `[left, right]`, concatenate arrays
    #[default]
    ArrayMerge,
    /// Accumulate collisions into one flat list across all inputs
    ArrayMergeNewArray,
    /// Shallow-union objects, sum numbers, overwrite other scalars
    ObjectCombine,
}

/// Merge settings
#[derive(Debug, Clone, Default)]
pub struct MergeSettings {
    /// Combine method for colliding values
    pub combine_method: CombineMethod,
}

/// Merges N objects left to right under the given settings.
///
/// Every input must be a JSON object; the output is a new object (inputs
/// are not mutated).
pub fn merge_objects(inputs: &[Value], settings: &MergeSettings) -> MergeResult<Value> {
    let mut accumulator = Map::new();
    for (position, input) in inputs.iter().enumerate() {
        let object = input.as_object().ok_or(MergeError::NotAnObject(position))?;
        for (key, incoming) in object {
            match accumulator.remove(key) {
                None => {
                    accumulator.insert(key.clone(), incoming.clone());
                }
                Some(existing) => {
                    let merged =
                        merge_value(existing, incoming.clone(), settings.combine_method, key)?;
                    accumulator.insert(key.clone(), merged);
                }
            }
        }
    }
    Ok(Value::Object(accumulator))
}

/// Combines two objects: shallow key union with numeric sums.
///
/// Convenience over [`merge_objects`] with [`CombineMethod::ObjectCombine`].
pub fn combine_objects(left: &Value, right: &Value) -> MergeResult<Value> {
    merge_objects(
        &[left.clone(), right.clone()],
        &MergeSettings {
            combine_method: CombineMethod::ObjectCombine,
        },
    )
}

/// Resolves one key collision
fn merge_value(left: Value, right: Value, method: CombineMethod, path: &str) -> MergeResult<Value> {
    // Arrays concatenate under every method
    let (left, right) = match (left, right) {
        (Value::Array(mut left_items), Value::Array(right_items)) => {
            left_items.extend(right_items);
            return Ok(Value::Array(left_items));
        }
        other => other,
    };

    match method {
        CombineMethod::ArrayMergeNewArray => {
            // Flat accumulation: fold every colliding value into one list
            let mut items = match left {
                Value::Array(items) => items,
                other => vec![other],
            };
            match right {
                Value::Array(more) => items.extend(more),
                other => items.push(other),
            }
            Ok(Value::Array(items))
        }
        CombineMethod::ArrayMerge => {
            if left.is_array() != right.is_array() {
                return Err(shape_conflict(path, &left, &right));
            }
            Ok(Value::Array(vec![left, right]))
        }
        CombineMethod::ObjectCombine => {
            if left.is_array() != right.is_array() {
                return Err(shape_conflict(path, &left, &right));
            }
            match (left, right) {
                (Value::Object(mut union), Value::Object(overrides)) => {
                    for (key, value) in overrides {
                        union.insert(key, value);
                    }
                    Ok(Value::Object(union))
                }
                (Value::Number(a), Value::Number(b)) => Ok(sum_numbers(&a, &b)),
                // Non-numeric scalar collision: later value wins
                (_, right) => Ok(right),
            }
        }
    }
}

/// Sums two JSON numbers, staying integral when both sides are and the
/// sum fits; an integer overflow widens to the float path instead
fn sum_numbers(a: &serde_json::Number, b: &serde_json::Number) -> Value {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        if let Some(total) = x.checked_add(y) {
            return Value::Number(total.into());
        }
    }
    let total = a.as_f64().unwrap_or(0.0) + b.as_f64().unwrap_or(0.0);
    serde_json::Number::from_f64(total)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn shape_conflict(path: &str, left: &Value, right: &Value) -> MergeError {
    MergeError::ShapeConflict {
        path: path.to_string(),
        left: shape_name(left),
        right: shape_name(right),
    }
}

fn shape_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
