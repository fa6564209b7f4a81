//! Result aggregation from concurrently completing units

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{Error, Shape};

/// Value stored under one result key
///
/// Serializes as the bare value or as an array of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResultEntry<T> {
    /// Written by a unit registered without `multiple`
    Single(T),
    /// Appended to by units registered with `multiple`, in completion order
    Multiple(Vec<T>),
}

impl<T> ResultEntry<T> {
    /// Shape of this entry
    pub fn shape(&self) -> Shape {
        match self {
            ResultEntry::Single(_) => Shape::Single,
            ResultEntry::Multiple(_) => Shape::Multiple,
        }
    }

    /// Borrow the single value, if this is a single entry
    pub fn as_single(&self) -> Option<&T> {
        match self {
            ResultEntry::Single(value) => Some(value),
            ResultEntry::Multiple(_) => None,
        }
    }

    /// Borrow the appended values, if this is a multiple entry
    pub fn as_multiple(&self) -> Option<&[T]> {
        match self {
            ResultEntry::Single(_) => None,
            ResultEntry::Multiple(values) => Some(values),
        }
    }

    /// Take the single value, if this is a single entry
    pub fn into_single(self) -> Option<T> {
        match self {
            ResultEntry::Single(value) => Some(value),
            ResultEntry::Multiple(_) => None,
        }
    }

    /// Take the appended values, if this is a multiple entry
    pub fn into_multiple(self) -> Option<Vec<T>> {
        match self {
            ResultEntry::Single(_) => None,
            ResultEntry::Multiple(values) => Some(values),
        }
    }

    /// Number of values held
    pub fn len(&self) -> usize {
        match self {
            ResultEntry::Single(_) => 1,
            ResultEntry::Multiple(values) => values.len(),
        }
    }

    /// Whether no value is held
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

struct Inner<T> {
    results: HashMap<String, ResultEntry<T>>,
    error: Option<Error>,
}

/// Key/value results plus the batch's first error, behind one mutex
///
/// Contention is light: each completing unit takes the lock once.
pub struct ResultAggregator<T> {
    inner: Mutex<Inner<T>>,
}

impl<T> ResultAggregator<T> {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                results: HashMap::new(),
                error: None,
            }),
        }
    }

    /// Write one unit's value under `key`
    ///
    /// `None` is a no-op and returns `Ok(false)`. A single write replaces a
    /// prior single value; a multiple write appends, creating the sequence
    /// on first use.
    ///
    /// # Errors
    /// Returns [`Error::ShapeMismatch`] without touching the map when the
    /// write would change the shape of an existing entry.
    pub fn write(&self, key: &str, value: Option<T>, multiple: bool) -> Result<bool, Error> {
        let Some(value) = value else {
            return Ok(false);
        };

        let mut inner = self.inner.lock();
        match inner.results.entry(key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(if multiple {
                    ResultEntry::Multiple(vec![value])
                } else {
                    ResultEntry::Single(value)
                });
            }
            Entry::Occupied(mut slot) => match (slot.get_mut(), multiple) {
                (ResultEntry::Multiple(values), true) => values.push(value),
                (ResultEntry::Single(existing), false) => *existing = value,
                _ => {
                    return Err(Error::ShapeMismatch {
                        key: key.to_string(),
                        attempted: if multiple { Shape::Multiple } else { Shape::Single },
                    });
                }
            },
        }

        Ok(true)
    }

    /// Record a batch error; the first one recorded wins
    ///
    /// Returns `true` if this error became the batch error.
    pub fn record_error(&self, err: Error) -> bool {
        let mut inner = self.inner.lock();
        if inner.error.is_some() {
            tracing::debug!(error = %err, "Batch error already recorded, dropping later error");
            return false;
        }
        inner.error = Some(err);
        true
    }

    /// Whether an error has been recorded
    pub fn has_error(&self) -> bool {
        self.inner.lock().error.is_some()
    }

    /// Take the recorded batch error
    pub fn take_error(&self) -> Option<Error> {
        self.inner.lock().error.take()
    }

    /// Whether a value is stored under `key`
    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().results.contains_key(key)
    }

    /// Number of keys holding a value
    pub fn len(&self) -> usize {
        self.inner.lock().results.len()
    }

    /// Whether no key holds a value
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Take every stored result, leaving the aggregator empty
    pub fn take_results(&self) -> HashMap<String, ResultEntry<T>> {
        std::mem::take(&mut self.inner.lock().results)
    }
}

impl<T: Clone> ResultAggregator<T> {
    /// Clone the entry stored under `key`
    pub fn get(&self, key: &str) -> Option<ResultEntry<T>> {
        self.inner.lock().results.get(key).cloned()
    }
}

impl<T> Default for ResultAggregator<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ResultAggregator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        let mut keys: Vec<&str> = inner.results.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("ResultAggregator")
            .field("keys", &keys)
            .field("error", &inner.error.as_ref().map(ToString::to_string))
            .finish()
    }
}
