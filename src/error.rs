//! Application error types.
//!
//! The sync core distinguishes transport failures (tolerable per PR, fatal
//! only for the top-level listings), persistence failures (logged, never
//! fatal) and internal errors. Malformed remote payloads are not an error
//! variant at all: conversion substitutes placeholder entities instead.

use thiserror::Error;

/// Errors produced by the sync core.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bitbucket API request returned a non-2xx response.
    #[error("API error: {message}")]
    Api {
        message: String,
        status_code: Option<u16>,
        endpoint: Option<String>,
    },

    /// Network request failed before a response was received.
    #[error("Network error: {message}")]
    Network { message: String },

    /// Snapshot database operation failed.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Credentials missing or rejected.
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// Requested resource not found in the local store.
    #[error("Not found: {resource}")]
    NotFound {
        resource: String,
        id: Option<String>,
    },

    /// Invalid input provided by a caller.
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    /// Create an API error without response context.
    pub fn api(message: impl Into<String>) -> Self {
        Self::Api {
            message: message.into(),
            status_code: None,
            endpoint: None,
        }
    }

    /// Create an API error carrying the status code and endpoint.
    pub fn api_full(
        message: impl Into<String>,
        status_code: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self::Api {
            message: message.into(),
            status_code: Some(status_code),
            endpoint: Some(endpoint.into()),
        }
    }

    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a not found error with the offending id.
    pub fn not_found_with_id(resource: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id: Some(id.into()),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Status code of the failed request, if this is an API error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

// Conversions from common error types

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::database(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network("Request timed out")
        } else if err.is_connect() {
            Self::network("Failed to connect to server")
        } else if err.is_status() {
            Self::api(format!("HTTP error: {}", err))
        } else {
            Self::network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_full() {
        let err = AppError::api_full("Not Found", 404, "/dashboard/pull-requests");
        assert_eq!(err.status_code(), Some(404));
        assert_eq!(format!("{}", err), "API error: Not Found");
    }

    #[test]
    fn test_status_code_absent_for_other_variants() {
        assert_eq!(AppError::network("down").status_code(), None);
        assert_eq!(AppError::database("locked").status_code(), None);
    }

    #[test]
    fn test_display_impl() {
        let err = AppError::authentication("invalid credentials");
        assert_eq!(
            format!("{}", err),
            "Authentication error: invalid credentials"
        );
    }
}
