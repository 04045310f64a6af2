//! Error handler for saksin.

use std::collections::BTreeMap;

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use sqlx::Error as SQLxError;
use thiserror::Error;
use validator::{ValidationError, ValidationErrors};

pub type Result<T> = std::result::Result<T, ServerError>;

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Axum(#[from] JsonRejection),

    #[error("error parsing multipart form")]
    Multipart(#[from] MultipartError),

    #[error("SQL request failed: {0}")]
    Sql(#[from] SQLxError),

    #[error("cache request failed: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("rate limit exceeded")]
    RateLimited,

    #[error("upstream provider '{provider}' failed")]
    Upstream {
        provider: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("internal server error, {details}")]
    Internal { details: String },

    #[error("invalid 'Authorization' header")]
    Unauthorized,
}

impl ServerError {
    /// Wrap a third-party call failure. The source is logged, never echoed.
    pub fn upstream(
        provider: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Upstream {
            provider,
            source: Box::new(source),
        }
    }

    pub fn internal(details: impl ToString) -> Self {
        Self::Internal {
            details: details.to_string(),
        }
    }
}

/// Build a [`ValidationErrors`] holding a single message outside any field.
pub fn non_field_error(message: &'static str) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add(
        "non_field_errors",
        ValidationError::new("non_field_errors").with_message(message.into()),
    );
    errors
}

/// Build a [`ValidationErrors`] attached to one field.
pub fn field_error(field: &'static str, message: &'static str) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add(field, ValidationError::new(field).with_message(message.into()));
    errors
}

/// Structure for error responses.
///
/// Every failure body carries at least `msg`; validation failures add a
/// field-to-messages map.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    msg: String,
    #[serde(skip_serializing)]
    status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<BTreeMap<String, Vec<String>>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `msg` field.
    pub fn msg(mut self, msg: &str) -> Self {
        self.msg = msg.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    fn into_response(self) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            msg: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            errors: None,
        }
    }
}

fn parse_validation_errors(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .iter()
        .map(|(field, issues)| {
            (
                field.to_string(),
                issues.iter().map(|issue| issue.to_string()).collect(),
            )
        })
        .collect()
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = ResponseError::default()
            .msg(&self.to_string())
            .status(StatusCode::BAD_REQUEST);

        let response = match &self {
            ServerError::Validation(validation_errors) => response
                .msg("There were validation errors with your request.")
                .errors(validation_errors),

            ServerError::Axum(rejection) => response.msg(&rejection.body_text()),

            ServerError::Multipart(_) => response.msg("Invalid multipart form data."),

            ServerError::NotFound(entity) => response
                .msg(&format!("{entity} not found."))
                .status(StatusCode::NOT_FOUND),

            ServerError::Conflict(entity) => {
                response.msg(&format!("{entity} already exists."))
            }

            ServerError::Unauthorized => response
                .msg("Missing or invalid 'Authorization' header.")
                .status(StatusCode::UNAUTHORIZED),

            // Reported as 400 with retry guidance.
            ServerError::RateLimited => response
                .msg("Rate limit exceeded. Please wait before sending another request."),

            ServerError::Upstream { provider, source } => {
                tracing::error!(provider, error = %source, "upstream provider failed");
                ResponseError::default().msg("Service temporarily unavailable.")
            }

            ServerError::Sql(err) => {
                tracing::error!(error = %err, "database request failed");
                ResponseError::default()
            }

            ServerError::Cache(err) => {
                tracing::error!(error = %err, "cache request failed");
                ResponseError::default()
            }

            ServerError::Internal { details } => {
                tracing::error!(%details, "server returned 500 status");
                ResponseError::default()
            }
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({ "msg": "Internal server error." })
                .to_string()
                .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_field_error_shape() {
        let errors = non_field_error("Invalid or expired OTP.");
        let parsed = parse_validation_errors(&errors);
        assert_eq!(
            parsed.get("non_field_errors"),
            Some(&vec!["Invalid or expired OTP.".to_string()])
        );
    }

    #[test]
    fn test_upstream_is_opaque_500() {
        let err = ServerError::upstream(
            "gemini",
            std::io::Error::new(std::io::ErrorKind::Other, "key leaked"),
        );
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rate_limited_is_400_with_guidance() {
        let response = ServerError::RateLimited.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
