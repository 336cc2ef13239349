use std::time::Duration;

use thiserror::Error;

use mqe_core::api::{MetadataError, StorageError, StorageErrorCode};
use mqe_exec::TimedOut;

use crate::value::ValueKind;

/// Canonical result for evaluation.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Coarse classification surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    FetchTimeout,
    FetchIO,
    InvalidSeries,
    LimitExceeded,
    Unsupported,
    ArgumentLength,
    ArgumentType,
    ConversionFailure,
    InvalidArgument,
    Internal,
}

/// A value could not be converted to the type an operation needed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot convert {context} (type {from}) to type {to}")]
pub struct ConversionError {
    pub from: ValueKind,
    pub to: ValueKind,
    /// Short rendering of the offending value, usually its expression.
    pub context: String,
}

/// Errors are `Clone` because memoized failures are handed to every caller
/// that asked for the same subexpression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("performing fetch of {requested} additional series brings the total to {actual}, which exceeds the specified limit {limit}")]
    LimitExceeded {
        requested: usize,
        actual: i64,
        limit: usize,
    },

    #[error("timeout after {0:?}")]
    Timeout(Duration),

    #[error("{}", arity_message(.name, .min, .max, .actual))]
    ArgumentLength {
        name: String,
        min: usize,
        /// `None` means unbounded.
        max: Option<usize>,
        actual: usize,
    },

    #[error("function {0} doesn't allow a group-by clause")]
    GroupByNotAllowed(String),

    #[error("function `{function}` argument {position} (`{name}`): {source}")]
    ArgumentType {
        function: String,
        position: usize,
        name: String,
        source: ConversionError,
    },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("{function}: {message}")]
    InvalidArgument { function: String, message: String },

    #[error("no such function `{0}`")]
    UnknownFunction(String),

    #[error("cannot register function: {0}")]
    Registration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

fn arity_message(name: &str, min: &usize, max: &Option<usize>, actual: &usize) -> String {
    match *max {
        Some(max) if max == *min => {
            format!("Function `{name}` expected {min} arguments but received {actual}.")
        }
        None => format!(
            "Function `{name}` expected at least {min} arguments but received {actual}."
        ),
        Some(max) => format!(
            "Function `{name}` expected between {min} and {max} arguments but received {actual}."
        ),
    }
}

impl EvalError {
    pub fn invalid_argument(function: impl Into<String>, message: impl Into<String>) -> Self {
        EvalError::InvalidArgument {
            function: function.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EvalError::Storage(e) => match e.code {
                StorageErrorCode::FetchTimeout => ErrorCode::FetchTimeout,
                StorageErrorCode::FetchIO => ErrorCode::FetchIO,
                StorageErrorCode::InvalidSeries => ErrorCode::InvalidSeries,
                StorageErrorCode::Limit => ErrorCode::LimitExceeded,
                StorageErrorCode::Unsupported => ErrorCode::Unsupported,
            },
            EvalError::Metadata(_) => ErrorCode::FetchIO,
            EvalError::LimitExceeded { .. } => ErrorCode::LimitExceeded,
            EvalError::Timeout(_) => ErrorCode::FetchTimeout,
            EvalError::ArgumentLength { .. } => ErrorCode::ArgumentLength,
            EvalError::ArgumentType { .. } => ErrorCode::ArgumentType,
            EvalError::Conversion(_) => ErrorCode::ConversionFailure,
            EvalError::GroupByNotAllowed(_)
            | EvalError::InvalidArgument { .. }
            | EvalError::UnknownFunction(_) => ErrorCode::InvalidArgument,
            EvalError::Registration(_) | EvalError::Internal(_) => ErrorCode::Internal,
        }
    }
}

impl From<TimedOut> for EvalError {
    fn from(t: TimedOut) -> Self {
        EvalError::Timeout(t.0)
    }
}

impl From<mqe_core::Error> for EvalError {
    fn from(e: mqe_core::Error) -> Self {
        match e {
            mqe_core::Error::LimitExceeded {
                requested,
                actual,
                limit,
            } => EvalError::LimitExceeded {
                requested,
                actual,
                limit,
            },
            mqe_core::Error::Storage(s) => EvalError::Storage(s),
            other => EvalError::Internal(other.to_string()),
        }
    }
}
