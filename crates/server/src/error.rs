use axum::{
    Json,
    extract::{
        FromRequest, FromRequestParts,
        multipart::MultipartError,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::fmt;

use taskdeck_api::{ErrorBody, FieldError, ServiceError};

/// Unified API error type.
///
/// Produces the `{"success": false, "error": "<message>", "details": [...]}`
/// envelope. `details` is only present for validation failures.
#[derive(Debug)]
pub struct ApiErr {
    status: StatusCode,
    message: String,
    details: Vec<FieldError>,
}

impl ApiErr {
    fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            details: Vec::new(),
        }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn validation(details: Vec<FieldError>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Validation failed".into(),
            details,
        }
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, msg)
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, msg)
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// A 500 that carries a short description of the downstream failure.
    pub fn downstream(msg: impl Into<String>, detail: impl fmt::Display) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
            details: vec![FieldError::new("upstream", detail.to_string())],
        }
    }

    /// Build a closure that logs a DB/IO error and returns `500 Internal Server Error`.
    pub fn from_db<E: fmt::Display>(context: &str) -> impl FnOnce(E) -> Self + '_ {
        move |e| {
            tracing::error!("{context}: {e}");
            Self::internal("internal server error")
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ServiceError> for ApiErr {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::Validation(details) => Self::validation(details),
            ServiceError::Internal(msg) => {
                tracing::error!("{msg}");
                Self::internal("internal server error")
            }
            other => {
                let status = StatusCode::from_u16(other.status_code())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                Self::new(status, other.message())
            }
        }
    }
}

impl From<taskdeck_api::policy::Denial> for ApiErr {
    fn from(d: taskdeck_api::policy::Denial) -> Self {
        Self::forbidden(d.message())
    }
}

impl From<JsonRejection> for ApiErr {
    fn from(rejection: JsonRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Invalid request body".into(),
            details: vec![FieldError::new("body", rejection.body_text())],
        }
    }
}

impl From<QueryRejection> for ApiErr {
    fn from(rejection: QueryRejection) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Invalid query parameters".into(),
            details: vec![FieldError::new("query", rejection.body_text())],
        }
    }
}

impl From<MultipartError> for ApiErr {
    fn from(e: MultipartError) -> Self {
        Self::bad_request(format!("Invalid upload: {}", e.body_text()))
    }
}

impl IntoResponse for ApiErr {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(ErrorBody {
                success: false,
                error: self.message,
                details: self.details,
            }),
        )
            .into_response()
    }
}

/// `Json` extractor whose rejections use the error envelope.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiErr))]
pub struct ApiJson<T>(pub T);

/// `Query` extractor whose rejections use the error envelope.
#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiErr))]
pub struct ApiQuery<T>(pub T);
