/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use axum::response::{IntoResponse, Response};
use http::StatusCode;
use tracing::error;

use crate::pages;

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Failed to resolve site: {0:#}")]
    Resolve(#[from] anyhow::Error),
    #[error("Failed to read request body: {0}")]
    Body(#[from] axum::Error),
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("Upstream responded with {0}")]
    UpstreamStatus(StatusCode),
    #[error("Failed to build response: {0}")]
    Response(#[from] http::Error),
}

pub type ProxyResult<T> = Result<T, ProxyError>;

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        error!(error = %self, "Proxy request failed");

        match self {
            ProxyError::Upstream(_) | ProxyError::UpstreamStatus(_) => pages::bad_gateway(),
            ProxyError::Body(_) => StatusCode::BAD_REQUEST.into_response(),
            ProxyError::Resolve(_) | ProxyError::Response(_) => pages::internal_error(),
        }
    }
}
