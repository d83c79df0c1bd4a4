use lambda_http::{http::StatusCode, Body, Response};
use serde::{Deserialize, Serialize};

/// Failure from the record store. Propagated to callers unchanged as an
/// internal error.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("malformed user record {id}: {reason}")]
    Malformed { id: String, reason: String },

    #[error("user {0} already exists")]
    Conflict(String),

    #[error("user {0} not found")]
    NotFound(String),
}

/// Failure from the identity provider while provisioning a principal.
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("identity provider error: {0}")]
    Provider(String),

    #[error("identity provider returned no subject for {0}")]
    MissingSubject(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Callable status codes, serialized the way the dashboard expects them.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorStatus {
    Unauthenticated,
    PermissionDenied,
    InvalidArgument,
    NotFound,
    Internal,
}

impl ErrorStatus {
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorStatus::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorStatus::PermissionDenied => StatusCode::FORBIDDEN,
            ErrorStatus::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorStatus::NotFound => StatusCode::NOT_FOUND,
            ErrorStatus::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Terminal outcome of a failed function call.
#[derive(Debug, thiserror::Error)]
pub enum FunctionError {
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

impl FunctionError {
    pub fn unauthenticated() -> Self {
        FunctionError::Unauthenticated(
            "The function must be called while authenticated.".to_string(),
        )
    }

    pub fn status(&self) -> ErrorStatus {
        match self {
            FunctionError::Unauthenticated(_) => ErrorStatus::Unauthenticated,
            FunctionError::PermissionDenied(_) => ErrorStatus::PermissionDenied,
            FunctionError::InvalidArgument(_) => ErrorStatus::InvalidArgument,
            FunctionError::NotFound(_) => ErrorStatus::NotFound,
            FunctionError::Store(_) | FunctionError::Provision(_) => ErrorStatus::Internal,
        }
    }

    /// Message safe to show the caller. Backend details stay in the logs.
    pub fn public_message(&self) -> String {
        match self {
            FunctionError::Unauthenticated(msg)
            | FunctionError::PermissionDenied(msg)
            | FunctionError::InvalidArgument(msg)
            | FunctionError::NotFound(msg) => msg.clone(),
            FunctionError::Store(_) | FunctionError::Provision(_) => "INTERNAL".to_string(),
        }
    }

    pub fn body(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error: ErrorBody {
                status: self.status(),
                message: self.public_message(),
            },
        }
    }

    pub fn into_response(self) -> Result<Response<Body>, lambda_http::Error> {
        let status = self.status();
        if status == ErrorStatus::Internal {
            tracing::error!("Function failed: {}", self);
        }
        Ok(Response::builder()
            .status(status.http_status())
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .body(serde_json::to_string(&self.body())?.into())
            .map_err(Box::new)?)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorBody {
    pub status: ErrorStatus,
    pub message: String,
}

/// `{"error": {"status": "...", "message": "..."}}`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ErrorEnvelope {
    pub error: ErrorBody,
}
