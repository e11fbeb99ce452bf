/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::WebResult;
use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use entity::deployment::DeploymentStatus;
use serde::{Deserialize, Serialize};
use shipyard_core::ingest::{SubmitRequest, submit_build};
use shipyard_core::types::*;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug)]
pub struct DeployResponse {
    pub deployment: Uuid,
    pub project: Uuid,
    pub subdomain: String,
    pub url: String,
    pub status: DeploymentStatus,
}

pub async fn post_deploy(
    state: State<Arc<ServerState>>,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> WebResult<Json<BaseResponse<DeployResponse>>> {
    let Json(body) = body?;
    let submission = submit_build(&state, body).await?;

    let res = BaseResponse {
        error: false,
        message: DeployResponse {
            deployment: submission.deployment.id,
            project: submission.project.id,
            subdomain: submission.project.subdomain,
            url: submission.url,
            status: submission.deployment.status,
        },
    };

    Ok(Json(res))
}
