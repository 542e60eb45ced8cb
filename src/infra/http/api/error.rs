use crate::application::error::{CatalogError, ErrorReport, INVALID_REFERENCE_MESSAGE};
use crate::application::repos::RepoError;
use crate::application::storage::StorageError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const UNAUTHORIZED: &str = "unauthorized";
    pub const FORBIDDEN: &str = "forbidden";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_REFERENCE: &str = "invalid_reference";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const BLOB_TIMEOUT: &str = "blob_timeout";
    pub const REPO: &str = "repo_error";
    pub const STORAGE: &str = "storage_error";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    source: &'static str,
    /// Diagnostic for the response log only; never rendered to the caller.
    detail: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            source: "infra::http::api",
            detail: None,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn invalid_input(hint: impl Into<String>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_INPUT,
            "Invalid input",
            Some(hint.into()),
        )
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            codes::UNAUTHORIZED,
            "Actor headers required",
            Some("set x-actor-id and x-actor-role".to_string()),
        )
    }

    pub fn forbidden(hint: Option<String>) -> Self {
        Self::new(
            StatusCode::FORBIDDEN,
            codes::FORBIDDEN,
            "Actor lacks the required role",
            hint,
        )
    }

    pub fn not_found(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, hint)
    }

    pub fn payload_too_large(limit: usize) -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            codes::PAYLOAD_TOO_LARGE,
            "Image too large",
            Some(format!("images are limited to {limit} bytes")),
        )
    }

    pub fn with_source(mut self, source: &'static str) -> Self {
        self.source = source;
        self
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

/// Map a service failure onto the wire. Store faults keep their cause out of the body.
pub fn catalog_to_api(source: &'static str, err: CatalogError) -> ApiError {
    let detail = err.to_string();
    let api = match err {
        CatalogError::NotFound { .. } => ApiError::not_found("Monster not found", Some(detail.clone())),
        CatalogError::InvalidReference => ApiError::new(
            StatusCode::BAD_REQUEST,
            codes::INVALID_REFERENCE,
            INVALID_REFERENCE_MESSAGE,
            None,
        ),
        CatalogError::Validation(message) => ApiError::invalid_input(message),
        CatalogError::Forbidden { .. } => ApiError::forbidden(Some(detail.clone())),
        CatalogError::Repo(RepoError::Timeout) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::DB_TIMEOUT,
            "Database timeout",
            None,
        ),
        CatalogError::Repo(_) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::REPO,
            "Persistence error",
            None,
        ),
        CatalogError::Storage(StorageError::Timeout { .. }) => ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::BLOB_TIMEOUT,
            "Object store timeout",
            None,
        ),
        CatalogError::Storage(_) => ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            codes::STORAGE,
            "Object store error",
            None,
        ),
    };
    api.with_source(source).with_detail(detail)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let logged = self
            .detail
            .clone()
            .or_else(|| self.hint.clone())
            .unwrap_or_else(|| self.message.to_string());
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(self.source, self.status, format!("{}: {logged}", self.code))
            .attach(&mut response);
        response
    }
}
