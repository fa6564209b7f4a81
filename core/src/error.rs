//! Error types for taskbatch-core

use std::time::Duration;

use thiserror::Error;

/// Boxed error carried from a failed unit of work
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Shape of a value stored under a result key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// One value, written by a unit registered without `multiple`
    Single,
    /// A sequence of values appended by units registered with `multiple`
    Multiple,
}

impl Shape {
    fn verb(self) -> &'static str {
        match self {
            Shape::Single => "store single",
            Shape::Multiple => "append",
        }
    }

    fn conflict(self) -> &'static str {
        match self {
            Shape::Single => "the key already holds appended results",
            Shape::Multiple => "the key already holds a single result registered without `multiple`",
        }
    }
}

/// Core error type
///
/// Every variant raised by a unit of work names that unit's key in its
/// message, so callers can tell which unit failed the batch.
#[derive(Error, Debug)]
pub enum Error {
    /// The unit's function returned an error
    #[error("unit of work `{key}` failed: {source}")]
    Task {
        /// Result key of the failing unit
        key: String,
        /// Error returned by the function
        #[source]
        source: BoxError,
    },

    /// The unit's function panicked
    #[error("panic recovered in unit of work `{key}`: {message}")]
    Panicked {
        /// Result key of the panicking unit
        key: String,
        /// Panic payload rendered as text
        message: String,
        /// Stack trace captured when the panic was contained
        backtrace: String,
    },

    /// The unit did not produce a value within its time limit
    #[error("unit of work `{key}` reached its time limit of {limit:?}")]
    TimedOut {
        /// Result key of the unit
        key: String,
        /// Configured time limit
        limit: Duration,
    },

    /// A key was reused by a unit registered without `multiple`
    #[error("key `{key}` has been used before without `multiple`")]
    DuplicateKey {
        /// The reused key
        key: String,
    },

    /// A write tried to change the shape of an existing result
    #[error("cannot {} result for key `{key}`: {}", .attempted.verb(), .attempted.conflict())]
    ShapeMismatch {
        /// Key being written
        key: String,
        /// Shape the write tried to produce
        attempted: Shape,
    },

    /// A unit was registered without a function
    #[error("unit of work `{key}` has no function to run")]
    MissingFunc {
        /// Key passed to `register`
        key: String,
    },

    /// A unit was registered under an empty key
    #[error("result key must not be empty")]
    EmptyKey,

    /// The orchestrator has already been run
    #[error("orchestrator has already been started")]
    AlreadyStarted,

    /// The unit's task went away without delivering an outcome
    #[error("unit of work `{key}` exited without delivering a result")]
    Lost {
        /// Result key of the unit
        key: String,
    },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Wrap an error returned by a unit's function
    pub fn task(key: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Task {
            key: key.into(),
            source: source.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Key of the unit this error belongs to, if any
    pub fn key(&self) -> Option<&str> {
        match self {
            Error::Task { key, .. }
            | Error::Panicked { key, .. }
            | Error::TimedOut { key, .. }
            | Error::DuplicateKey { key }
            | Error::ShapeMismatch { key, .. }
            | Error::MissingFunc { key }
            | Error::Lost { key } => Some(key),
            Error::EmptyKey | Error::AlreadyStarted | Error::Config(_) => None,
        }
    }

    /// Whether this error came from a contained panic
    pub fn is_panic(&self) -> bool {
        matches!(self, Error::Panicked { .. })
    }

    /// Whether this error came from a time limit
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::TimedOut { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
