//! Typed access to results of a JSON-valued batch
//!
//! A batch of `Orchestrator<serde_json::Value>` stores whatever its units
//! returned. These helpers take the entry as returned by
//! [`Orchestrator::get_result`](crate::Orchestrator::get_result) and check it
//! against the type the caller expects.

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::orchestrator::ResultEntry;

/// Error converting a stored result to a concrete type
#[derive(Error, Debug)]
pub enum CoercionError {
    /// Nothing is stored under the key
    #[error("result is missing")]
    Missing,

    /// The stored value has another type
    #[error("result is not {expected}, found {found}")]
    Mismatch {
        /// Requested type
        expected: &'static str,
        /// Kind of the stored value
        found: &'static str,
    },

    /// The stored value does not fit the requested structure
    #[error("result does not match the requested structure: {0}")]
    Structure(#[from] serde_json::Error),
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_i64() || n.is_u64() => "int",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn single<'a>(
    entry: Option<&'a ResultEntry<Value>>,
    expected: &'static str,
) -> Result<&'a Value, CoercionError> {
    match entry {
        None => Err(CoercionError::Missing),
        Some(ResultEntry::Single(value)) => Ok(value),
        Some(ResultEntry::Multiple(_)) => Err(CoercionError::Mismatch {
            expected,
            found: "multiple",
        }),
    }
}

/// Read a single string result
pub fn result_string(entry: Option<&ResultEntry<Value>>) -> Result<String, CoercionError> {
    let value = single(entry, "string")?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or(CoercionError::Mismatch {
            expected: "string",
            found: kind(value),
        })
}

/// Read a single integer result
///
/// Floats are rejected even when they have no fractional part.
pub fn result_int(entry: Option<&ResultEntry<Value>>) -> Result<i64, CoercionError> {
    let value = single(entry, "int")?;
    value.as_i64().ok_or(CoercionError::Mismatch {
        expected: "int",
        found: kind(value),
    })
}

/// Read a single boolean result
pub fn result_bool(entry: Option<&ResultEntry<Value>>) -> Result<bool, CoercionError> {
    let value = single(entry, "bool")?;
    value.as_bool().ok_or(CoercionError::Mismatch {
        expected: "bool",
        found: kind(value),
    })
}

/// Deserialize a result into `D`
///
/// A multiple entry is presented as a JSON array in append order, so it can
/// be read into a `Vec<_>`.
pub fn result_obj<D>(entry: Option<&ResultEntry<Value>>) -> Result<D, CoercionError>
where
    D: DeserializeOwned,
{
    let value = match entry {
        None => return Err(CoercionError::Missing),
        Some(ResultEntry::Single(value)) => value.clone(),
        Some(ResultEntry::Multiple(values)) => Value::Array(values.clone()),
    };
    Ok(serde_json::from_value(value)?)
}
