/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Context;
use chrono::Utc;
use entity::deployment::DeploymentStatus;
use entity::log_event::LogKind;
use git_url_parse::GitUrl;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseBackend,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::channel::record_event;
use super::consts::{ERROR_MARKER, STAGE_FAILED, STAGE_UPLOADED};
use super::database::{get_in_flight_deployment, get_project_by_subdomain};
use super::input::*;
use super::lease::hold_claim;
use super::queue::record_snapshot;
use super::sources::upload_sources;
use super::types::*;
use super::walk::remove_tree;

const SUBDOMAIN_ATTEMPTS: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error("A deployment is already running for this project")]
    AlreadyRunning(Uuid),
    #[error("Subdomain {0} is already taken")]
    SubdomainTaken(String),
    #[error("Project not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MakeProjectRequest {
    pub repository: String,
    pub name: Option<String>,
    pub subdomain: Option<String>,
    pub build_command: Option<String>,
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatchProjectRequest {
    pub name: Option<String>,
    pub subdomain: Option<String>,
}

/// Either `repo_url` or `project_id` selects what to build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmitRequest {
    #[serde(alias = "repoUrl")]
    pub repo_url: Option<String>,
    #[serde(alias = "projectId")]
    pub project_id: Option<Uuid>,
    pub subdomain: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub deployment: MDeployment,
    pub project: MProject,
    pub url: String,
}

fn name_from_repository(repository: &str) -> Option<String> {
    GitUrl::parse(repository)
        .ok()
        .map(|url| url.name)
        .filter(|name| !name.is_empty())
}

async fn unused_subdomain<C: ConnectionTrait>(db: &C) -> Result<String, IngestError> {
    for _ in 0..SUBDOMAIN_ATTEMPTS {
        let subdomain = generate_subdomain();

        if get_project_by_subdomain(db, &subdomain).await?.is_none() {
            return Ok(subdomain);
        }
    }

    Err(IngestError::Internal(anyhow::anyhow!(
        "Failed to generate an unused subdomain"
    )))
}

#[instrument(skip(state, request), fields(repository = %request.repository))]
pub async fn register_project(
    state: &ServerState,
    request: MakeProjectRequest,
) -> Result<MProject, IngestError> {
    let repository = check_repository_url(&request.repository)?;

    let subdomain = match request.subdomain {
        Some(subdomain) => {
            let subdomain = subdomain.trim().to_lowercase();
            check_subdomain(&subdomain)?;

            if get_project_by_subdomain(&state.db, &subdomain).await?.is_some() {
                return Err(IngestError::SubdomainTaken(subdomain));
            }

            subdomain
        }
        None => unused_subdomain(&state.db).await?,
    };

    let name = request
        .name
        .or_else(|| name_from_repository(&repository))
        .unwrap_or_else(|| subdomain.clone());
    check_project_name(&name)?;

    if let Some(output_dir) = &request.output_dir {
        check_output_dir(output_dir)?;
    }

    let aproject = AProject {
        id: Set(Uuid::new_v4()),
        name: Set(name),
        repository: Set(repository),
        subdomain: Set(subdomain),
        build_command: Set(request.build_command.filter(|c| !c.trim().is_empty())),
        output_dir: Set(request.output_dir.filter(|d| !d.trim().is_empty())),
        created_at: Set(Utc::now().naive_utc()),
    };

    let project = aproject
        .insert(&state.db)
        .await
        .context("Failed to insert project")?;

    info!(project_id = %project.id, subdomain = %project.subdomain, "Registered project");
    Ok(project)
}

/// Renames a project and/or moves it to another subdomain.
pub async fn update_project(
    state: &ServerState,
    project_id: Uuid,
    request: PatchProjectRequest,
) -> Result<MProject, IngestError> {
    let project = EProject::find_by_id(project_id)
        .one(&state.db)
        .await
        .context("Failed to query project")?
        .ok_or(IngestError::NotFound)?;

    let mut aproject: AProject = project.clone().into();

    if let Some(name) = request.name {
        check_project_name(&name)?;
        aproject.name = Set(name);
    }

    if let Some(subdomain) = request.subdomain {
        let subdomain = subdomain.trim().to_lowercase();
        check_subdomain(&subdomain)?;

        if subdomain != project.subdomain {
            if get_project_by_subdomain(&state.db, &subdomain).await?.is_some() {
                return Err(IngestError::SubdomainTaken(subdomain));
            }

            aproject.subdomain = Set(subdomain);
        }
    }

    if !aproject.is_changed() {
        return Ok(project);
    }

    let project = aproject
        .update(&state.db)
        .await
        .context("Failed to update project")?;

    Ok(project)
}

async fn resolve_project(
    state: &ServerState,
    request: SubmitRequest,
) -> Result<MProject, IngestError> {
    if let Some(project_id) = request.project_id {
        return EProject::find_by_id(project_id)
            .one(&state.db)
            .await
            .context("Failed to query project")?
            .ok_or(IngestError::NotFound);
    }

    let repo_url = request.repo_url.ok_or(InputError::MissingRepository)?;
    let repository = check_repository_url(&repo_url)?;

    let existing = match &request.subdomain {
        Some(subdomain) => {
            let subdomain = subdomain.trim().to_lowercase();
            check_subdomain(&subdomain)?;

            match get_project_by_subdomain(&state.db, &subdomain).await? {
                Some(project) if project.repository != repository => {
                    return Err(IngestError::SubdomainTaken(subdomain));
                }
                project => project,
            }
        }
        None => EProject::find()
            .filter(CProject::Repository.eq(repository.clone()))
            .order_by_asc(CProject::CreatedAt)
            .one(&state.db)
            .await
            .context("Failed to query project by repository")?,
    };

    match existing {
        Some(project) => Ok(project),
        None => {
            register_project(
                state,
                MakeProjectRequest {
                    repository,
                    name: request.name,
                    subdomain: request.subdomain,
                    ..Default::default()
                },
            )
            .await
        }
    }
}

/// Inserts a `QUEUED` deployment unless the project already has one in
/// flight. Check and insert share a transaction.
async fn create_deployment(
    state: &ServerState,
    project: &MProject,
) -> Result<MDeployment, IngestError> {
    let txn = state
        .db
        .begin()
        .await
        .context("Failed to begin transaction")?;

    if txn.get_database_backend() == DatabaseBackend::Postgres {
        EProject::find_by_id(project.id)
            .lock_exclusive()
            .one(&txn)
            .await
            .context("Failed to lock project")?;
    }

    if let Some(running) = get_in_flight_deployment(&txn, project.id).await? {
        txn.rollback()
            .await
            .context("Failed to roll back transaction")?;
        return Err(IngestError::AlreadyRunning(running.id));
    }

    let now = Utc::now().naive_utc();
    let adeployment = ADeployment {
        id: Set(Uuid::new_v4()),
        project: Set(project.id),
        status: Set(DeploymentStatus::Queued),
        created_at: Set(now),
        updated_at: Set(now),
        claimed_by: Set(Some(state.instance)),
        heartbeat_at: Set(Some(now)),
    };

    let deployment = adeployment
        .insert(&txn)
        .await
        .context("Failed to insert deployment")?;
    txn.commit().await.context("Failed to commit deployment")?;

    Ok(deployment)
}

async fn prepare_sources(
    state: &ServerState,
    project: &MProject,
    deployment: Uuid,
    checkout: &Path,
) -> anyhow::Result<()> {
    remove_tree(checkout)
        .await
        .context("Failed to clear checkout directory")?;

    if let Some(parent) = checkout.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .context("Failed to create ingest directory")?;
    }

    state
        .fetcher
        .fetch(&project.repository, checkout)
        .await
        .context("Failed to fetch repository")?;

    upload_sources(state.store.as_ref(), deployment, checkout).await?;
    record_snapshot(state.queue.as_ref(), deployment, STAGE_UPLOADED).await;
    state.queue.enqueue(deployment).await?;

    Ok(())
}

/// Creates a deployment for a repository or an existing project, stores its
/// source tree and enqueues the build.
#[instrument(skip(state, request))]
pub async fn submit_build(
    state: &ServerState,
    request: SubmitRequest,
) -> Result<Submission, IngestError> {
    let project = resolve_project(state, request).await?;
    let deployment = create_deployment(state, &project).await?;

    let checkout = state.cli.ingest_path().join(deployment.id.to_string());
    let heartbeat = hold_claim(state, deployment.id).await?;
    let prepared = prepare_sources(state, &project, deployment.id, &checkout).await;
    drop(heartbeat);

    if let Err(e) = remove_tree(&checkout).await {
        error!(error = %e, deployment_id = %deployment.id, "Failed to remove checkout");
    }

    if let Err(e) = prepared {
        error!(error = %format!("{:#}", e), deployment_id = %deployment.id, "Failed to prepare deployment");

        // leave no in-flight deployment behind
        record_event(
            state,
            deployment.id,
            project.id,
            LogKind::Failed,
            format!("{} failed to prepare sources: {:#}", ERROR_MARKER, e),
        )
        .await?;
        record_snapshot(state.queue.as_ref(), deployment.id, STAGE_FAILED).await;

        return Err(IngestError::Internal(e));
    }

    info!(
        deployment_id = %deployment.id,
        project_id = %project.id,
        "Queued deployment"
    );

    let url = state.cli.site_url(&project.subdomain);
    Ok(Submission {
        deployment,
        project,
        url,
    })
}
