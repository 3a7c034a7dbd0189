use thiserror::Error;

/// Client-caused parameter failures. Always rendered as a 400 and never
/// reach a controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required parameter {param:?}")]
    Missing { param: String },

    #[error("parameter {param:?} has invalid type: expected {expected}, got {actual}")]
    TypeMismatch {
        param: String,
        expected: String,
        actual: String,
    },

    #[error("parameter {param:?} rejected: {reason}")]
    Rejected { param: String, reason: String },

    #[error("parameter {param:?} element #{index} ({value}) is invalid: {reason}")]
    Element {
        param: String,
        index: usize,
        value: String,
        reason: String,
    },

    #[error("unexpected parameter {param:?}")]
    Unexpected { param: String },

    #[error("parameter {param:?} is specified more than once (as {first:?} and {second:?})")]
    Duplicate {
        param: String,
        first: String,
        second: String,
    },

    #[error("malformed request body: {0}")]
    MalformedBody(String),
}

impl ValidationError {
    /// Name of the offending parameter, when the failure is tied to one.
    pub fn param(&self) -> Option<&str> {
        match self {
            ValidationError::Missing { param }
            | ValidationError::TypeMismatch { param, .. }
            | ValidationError::Rejected { param, .. }
            | ValidationError::Element { param, .. }
            | ValidationError::Unexpected { param }
            | ValidationError::Duplicate { param, .. } => Some(param),
            ValidationError::MalformedBody(_) => None,
        }
    }
}

/// Classification a controller attaches to a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendErrorKind {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    Unavailable,
    Internal,
}

/// Failure reported by a controller or the cluster behind it. The message is
/// surfaced to the caller verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct BackendError {
    pub kind: BackendErrorKind,
    pub message: String,
}

impl BackendError {
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::NotFound, message)
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::AlreadyExists, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::InvalidArgument, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Unavailable, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Internal, message)
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
