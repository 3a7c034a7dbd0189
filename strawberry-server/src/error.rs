// Error taxonomy of the control plane and its HTTP rendering

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strawberry_core::{BackendError, BackendErrorKind, ConfigError, ValidationError};
use thiserror::Error;

use crate::client::ClientError;

/// Uniform response wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Envelope {
    Ok {
        #[serde(default)]
        result: Value,
    },
    Error {
        message: String,
    },
}

impl Envelope {
    pub fn ok(result: Value) -> Self {
        Envelope::Ok { result }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Envelope::Error {
            message: message.into(),
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        let status = match self {
            Envelope::Ok { .. } => StatusCode::OK,
            Envelope::Error { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("authentication required: {0}")]
    MissingCredential(String),

    #[error("invalid credential: {0}")]
    InvalidCredential(String),
}

/// Everything a request can fail with once it has been routed.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("no family is mapped for host {0:?}")]
    UnknownHost(String),

    #[error("cluster {0:?} is not served by this family")]
    UnknownCluster(String),

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("no route for {0:?}")]
    UnknownRoute(String),

    #[error("method {method} is not allowed for {path:?}")]
    MethodNotAllowed { method: String, path: String },

    #[error("request timed out")]
    Timeout,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Backend(err) => match err.kind {
                BackendErrorKind::NotFound => StatusCode::NOT_FOUND,
                BackendErrorKind::AlreadyExists => StatusCode::CONFLICT,
                BackendErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
                BackendErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                BackendErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::UnknownHost(_)
            | ApiError::UnknownCluster(_)
            | ApiError::UnknownCommand(_)
            | ApiError::UnknownRoute(_) => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Timeout => StatusCode::REQUEST_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(Envelope::error(self.to_string()))).into_response()
    }
}

/// Fatal problems while building the routing table. The process must not
/// start serving when one of these occurs.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to create backend client for cluster {proxy:?} of family {family:?}: {source}")]
    ClientConstruction {
        family: String,
        proxy: String,
        #[source]
        source: ClientError,
    },

    #[error("family {family:?} uses unknown controller {controller:?}")]
    UnknownController { family: String, controller: String },

    #[error("host {host:?} is mapped to family {family:?} which has no router")]
    UnmappedFamily { host: String, family: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ApiResult<T> = Result<T, ApiError>;
