use std::collections::HashMap;

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Field name -> list of messages, accumulated during payload validation.
pub type FieldErrors = HashMap<String, Vec<String>>;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("You must be logged in to perform this action")]
    Unauthorized,
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("{message}")]
    Validation {
        message: String,
        errors: FieldErrors,
    },
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    pub fn validation(errors: FieldErrors) -> Self {
        AppError::Validation {
            message: "Please fix errors in the form".to_string(),
            errors,
        }
    }

    pub fn field_error(field: &str, message: &str) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(field.to_string(), vec![message.to_string()]);
        AppError::validation(errors)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<FieldErrors>,
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let errors = match self {
            AppError::Validation { errors, .. } if !errors.is_empty() => Some(errors.clone()),
            _ => None,
        };
        // Store failures stay generic so nothing internal leaks to the client.
        let message = match self {
            AppError::Database(_) => "Something went wrong. Please try again.".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            success: false,
            error: message,
            errors,
        })
    }
}
