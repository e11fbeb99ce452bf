/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::{WebError, WebResult};
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use shipyard_core::storage::is_source_key;
use shipyard_core::types::*;
use std::sync::Arc;

/// Serves build outputs from the artifact store. Source trees are never
/// exposed.
pub async fn get_artifact(
    state: State<Arc<ServerState>>,
    Path(key): Path<String>,
) -> WebResult<Response> {
    if is_source_key(&key) {
        return Err(WebError::not_found("Artifact"));
    }

    let content = state.store.get(&key).await?;
    let mime = mime_guess::from_path(&key).first_or_octet_stream();

    Ok(([(header::CONTENT_TYPE, mime.to_string())], content).into_response())
}
