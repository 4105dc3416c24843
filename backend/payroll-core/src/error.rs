// src/error.rs

use axum::http::StatusCode as AxumStatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::connecteam_client::ConnecteamError;
use crate::payroll::PayrollError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Connecteam error: {0}")]
    Connecteam(#[from] ConnecteamError),
    #[error("Data store error: {0}")]
    Store(#[from] StoreError),
    #[error("Payroll error: {0}")]
    Payroll(#[from] PayrollError),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),
}

fn upstream_status(status: reqwest::StatusCode) -> AxumStatusCode {
    AxumStatusCode::from_u16(status.as_u16()).unwrap_or(AxumStatusCode::BAD_GATEWAY)
}

impl AppError {
    fn status_and_message(&self) -> (AxumStatusCode, String) {
        match self {
            AppError::MissingEnvVar(var) => (
                AxumStatusCode::INTERNAL_SERVER_ERROR,
                format!("Configuration error: {} is not set.", var),
            ),
            AppError::Connecteam(e) => match e {
                ConnecteamError::RateLimitExceeded { .. } => (
                    AxumStatusCode::TOO_MANY_REQUESTS,
                    "Connecteam rate limit exceeded. Try again later.".to_string(),
                ),
                ConnecteamError::ConfigError(msg) => {
                    (AxumStatusCode::INTERNAL_SERVER_ERROR, msg.clone())
                }
                ConnecteamError::NoActiveTimeClock => {
                    (AxumStatusCode::UNPROCESSABLE_ENTITY, e.to_string())
                }
                ConnecteamError::ApiError { status, .. } => (
                    AxumStatusCode::BAD_GATEWAY,
                    format!(
                        "Connecteam API returned status {}. Details logged.",
                        status.as_u16()
                    ),
                ),
                _ => (
                    AxumStatusCode::BAD_GATEWAY,
                    "Failed to communicate with Connecteam. Details logged.".to_string(),
                ),
            },
            AppError::Store(e) => store_status(e),
            AppError::Payroll(e) => match e {
                PayrollError::InvalidAmount(_) | PayrollError::InvalidHours(_) => {
                    (AxumStatusCode::BAD_REQUEST, e.to_string())
                }
                PayrollError::RecordNotFound(_) | PayrollError::EmployeeNotFound(_) => {
                    (AxumStatusCode::NOT_FOUND, e.to_string())
                }
                PayrollError::Store(inner) => store_status(inner),
            },
            AppError::Csv(_) | AppError::Io(_) => (
                AxumStatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error (export). Check logs.".to_string(),
            ),
            AppError::TlsConfig(msg) => (
                AxumStatusCode::INTERNAL_SERVER_ERROR,
                format!("TLS configuration error: {}", msg),
            ),
        }
    }
}

fn store_status(e: &StoreError) -> (AxumStatusCode, String) {
    match e {
        StoreError::NotFound { .. } => (AxumStatusCode::NOT_FOUND, e.to_string()),
        StoreError::ApiError { status, .. } if status.as_u16() == 429 => (
            upstream_status(*status),
            "Data store rate limit exceeded.".to_string(),
        ),
        StoreError::ConfigError(msg) => (AxumStatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        _ => (
            AxumStatusCode::BAD_GATEWAY,
            "Data store request failed. Details logged.".to_string(),
        ),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error!("Error occurred: {}", self);
        let (status, message) = self.status_and_message();
        (status, Json(json!({ "error": message }))).into_response()
    }
}
