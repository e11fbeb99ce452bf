/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::{WebError, WebResult};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use shipyard_core::database::{
    get_current_deployment, get_latest_deployment,
};
use shipyard_core::ingest::{
    MakeProjectRequest, PatchProjectRequest, register_project, update_project,
};
use shipyard_core::types::*;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Serialize, Deserialize, Debug)]
pub struct ProjectDetailsResponse {
    pub id: Uuid,
    pub name: String,
    pub repository: String,
    pub subdomain: String,
    pub url: String,
    pub build_command: Option<String>,
    pub output_dir: Option<String>,
    pub created_at: chrono::NaiveDateTime,
    /// Deployment currently served at the project's subdomain.
    pub current_deployment: Option<Uuid>,
    pub latest_deployment: Option<MDeployment>,
}

async fn find_project(state: &ServerState, project_id: Uuid) -> WebResult<MProject> {
    EProject::find_by_id(project_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| WebError::not_found("Project"))
}

pub async fn post_project(
    state: State<Arc<ServerState>>,
    body: Result<Json<MakeProjectRequest>, JsonRejection>,
) -> WebResult<Json<BaseResponse<MProject>>> {
    let Json(body) = body?;
    let project = register_project(&state, body).await?;

    let res = BaseResponse {
        error: false,
        message: project,
    };

    Ok(Json(res))
}

pub async fn get_project(
    state: State<Arc<ServerState>>,
    Path(project_id): Path<Uuid>,
) -> WebResult<Json<BaseResponse<ProjectDetailsResponse>>> {
    let project = find_project(&state, project_id).await?;
    let current = get_current_deployment(&state.db, project.id).await?;
    let latest = get_latest_deployment(&state.db, project.id).await?;

    let res = BaseResponse {
        error: false,
        message: ProjectDetailsResponse {
            id: project.id,
            url: state.cli.site_url(&project.subdomain),
            name: project.name,
            repository: project.repository,
            subdomain: project.subdomain,
            build_command: project.build_command,
            output_dir: project.output_dir,
            created_at: project.created_at,
            current_deployment: current.map(|d| d.id),
            latest_deployment: latest,
        },
    };

    Ok(Json(res))
}

pub async fn patch_project(
    state: State<Arc<ServerState>>,
    Path(project_id): Path<Uuid>,
    body: Result<Json<PatchProjectRequest>, JsonRejection>,
) -> WebResult<Json<BaseResponse<MProject>>> {
    let Json(body) = body?;
    let project = update_project(&state, project_id, body).await?;

    let res = BaseResponse {
        error: false,
        message: project,
    };

    Ok(Json(res))
}

pub async fn get_project_deployments(
    state: State<Arc<ServerState>>,
    Path(project_id): Path<Uuid>,
) -> WebResult<Json<BaseResponse<Vec<MDeployment>>>> {
    let project = find_project(&state, project_id).await?;
    let deployments = shipyard_core::database::get_project_deployments(&state.db, project.id).await?;

    let res = BaseResponse {
        error: false,
        message: deployments,
    };

    Ok(Json(res))
}
