use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{
    application::{query::QueryError, repos::RepoError},
    infra::error::InfraError,
};

/// Diagnostic detail carried on a response for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
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

/// Request-level failures surfaced to API clients.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Bad or unrecognised request parameters.
    #[error("{0}")]
    Validation(String),
    /// The resolved query matched nothing.
    #[error("{0}")]
    NotFound(String),
    /// The data layer failed.
    #[error("{0}")]
    Upstream(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn source_label(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "application::query",
            ApiError::NotFound(_) => "application::handlers",
            ApiError::Upstream(_) => "application::repos",
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(error: QueryError) -> Self {
        Self::Validation(error.to_string())
    }
}

impl From<RepoError> for ApiError {
    fn from(error: RepoError) -> Self {
        Self::Upstream(error.to_string())
    }
}

/// Process-level failures returned from the binary's entry point.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(
            ApiError::validation("bad").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::not_found("gone").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(RepoError::Timeout).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn query_errors_become_validation_errors() {
        let error = ApiError::from(QueryError::TakeOutOfRange { value: 0, max: 100 });
        assert_eq!(
            error,
            ApiError::Validation("Query parameter `take` must be between 1 and 100, got 0".into())
        );
    }

    #[test]
    fn report_collects_error_chain() {
        let io = std::io::Error::other("disk on fire");
        let infra = InfraError::from(io);
        let report = ErrorReport::from_error("test", StatusCode::INTERNAL_SERVER_ERROR, &infra);
        assert_eq!(report.messages.len(), 2);
        assert!(report.messages[1].contains("disk on fire"));
    }
}
