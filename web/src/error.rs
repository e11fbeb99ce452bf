/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Error as AnyhowError;
use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use sea_orm::DbErr;
use shipyard_core::ingest::IngestError;
use shipyard_core::input::InputError;
use shipyard_core::storage::StoreError;
use shipyard_core::types::BaseResponse;
use std::fmt;

#[derive(Debug)]
pub enum WebError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Database(DbErr),
    InputValidation(InputError),
    JsonParsing(JsonRejection),
    QueryParsing(QueryRejection),
    Internal(AnyhowError),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            WebError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            WebError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            WebError::Database(err) => write!(f, "Database error: {}", err),
            WebError::InputValidation(err) => write!(f, "Input validation error: {}", err),
            WebError::JsonParsing(err) => write!(f, "JSON parsing error: {}", err),
            WebError::QueryParsing(err) => write!(f, "Query parsing error: {}", err),
            WebError::Internal(err) => write!(f, "Internal error: {:#}", err),
        }
    }
}

impl std::error::Error for WebError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            WebError::Database(err) => Some(err),
            WebError::InputValidation(err) => Some(err),
            WebError::JsonParsing(err) => Some(err),
            WebError::QueryParsing(err) => Some(err),
            WebError::Internal(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<DbErr> for WebError {
    fn from(err: DbErr) -> Self {
        WebError::Database(err)
    }
}

impl From<InputError> for WebError {
    fn from(err: InputError) -> Self {
        WebError::InputValidation(err)
    }
}

impl From<JsonRejection> for WebError {
    fn from(err: JsonRejection) -> Self {
        WebError::JsonParsing(err)
    }
}

impl From<QueryRejection> for WebError {
    fn from(err: QueryRejection) -> Self {
        WebError::QueryParsing(err)
    }
}

impl From<AnyhowError> for WebError {
    fn from(err: AnyhowError) -> Self {
        WebError::Internal(err)
    }
}

impl From<IngestError> for WebError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Input(e) => WebError::InputValidation(e),
            IngestError::AlreadyRunning(_) => {
                WebError::Conflict("A deployment is already running for this project".to_string())
            }
            IngestError::SubdomainTaken(_) => WebError::already_exists("Subdomain"),
            IngestError::NotFound => WebError::not_found("Project"),
            IngestError::Internal(e) => WebError::Internal(e),
        }
    }
}

impl From<StoreError> for WebError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => WebError::not_found("Artifact"),
            StoreError::InvalidKey(key) => {
                WebError::BadRequest(format!("Invalid artifact key: {}", key))
            }
            StoreError::Io(e) => WebError::Internal(e.into()),
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            WebError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            WebError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            WebError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            WebError::Database(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            WebError::InputValidation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            WebError::JsonParsing(err) => {
                (StatusCode::BAD_REQUEST, format!("Invalid JSON: {}", err.body_text()))
            }
            WebError::QueryParsing(err) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid query: {}", err.body_text()),
            ),
            WebError::Internal(err) => {
                tracing::error!(error = %format!("{:#}", err), "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(BaseResponse {
            error: true,
            message: error_message,
        });

        (status, body).into_response()
    }
}

pub type WebResult<T> = Result<T, WebError>;

impl WebError {
    pub fn already_exists(resource: &str) -> Self {
        WebError::Conflict(format!("{} already exists", resource))
    }

    pub fn not_found(resource: &str) -> Self {
        WebError::NotFound(format!("{} not found", resource))
    }
}
