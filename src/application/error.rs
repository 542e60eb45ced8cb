use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::application::repos::RepoError;
use crate::application::storage::StorageError;
use crate::domain::error::DomainError;
use crate::infra::error::InfraError;

pub const INVALID_REFERENCE_MESSAGE: &str =
    "invalid category id or type id, please check valid id in each of their list";

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Failures surfaced by the catalog read and write services.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("monster with id {id} not found")]
    NotFound { id: String },
    #[error("{}", INVALID_REFERENCE_MESSAGE)]
    InvalidReference,
    #[error("{0}")]
    Validation(String),
    #[error("actor `{actor}` is not allowed to {action}")]
    Forbidden { actor: String, action: &'static str },
    #[error(transparent)]
    Repo(RepoError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CatalogError {
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Map a repository error raised while operating on `id`, turning a missing row into
    /// the id-carrying domain error.
    pub fn for_monster(id: &str, err: RepoError) -> Self {
        match err {
            RepoError::NotFound => Self::not_found(id),
            other => Self::from(other),
        }
    }

    /// Relational, blob and timeout failures; everything the caller cannot fix.
    pub fn is_store_fault(&self) -> bool {
        matches!(self, Self::Repo(_) | Self::Storage(_))
    }
}

impl From<RepoError> for CatalogError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::ConstraintViolation { .. } => Self::InvalidReference,
            other => Self::Repo(other),
        }
    }
}

impl From<DomainError> for CatalogError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { message } => Self::Validation(message),
            DomainError::Invariant { message } => Self::Repo(RepoError::Persistence(message)),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
