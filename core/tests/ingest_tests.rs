/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Tests for project registration and build submission

mod common;

use async_trait::async_trait;
use common::*;
use entity::deployment::DeploymentStatus;
use entity::log_event::LogKind;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use shipyard_core::consts::{ERROR_MARKER, STAGE_FAILED, STAGE_UPLOADED};
use shipyard_core::ingest::*;
use shipyard_core::input::InputError;
use shipyard_core::queue::{MemoryQueue, WorkQueue};
use shipyard_core::storage::{source_key, source_prefix};
use shipyard_core::types::*;
use std::sync::Arc;
use uuid::Uuid;

fn submit(repo_url: &str) -> SubmitRequest {
    SubmitRequest {
        repo_url: Some(repo_url.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_submit_build_queues_deployment() {
    let (state, _dir) = create_test_state(site_fetcher()).await;

    let submission = submit_build(&state, submit("https://github.com/user/site.git"))
        .await
        .unwrap();

    assert_eq!(submission.deployment.status, DeploymentStatus::Queued);
    assert_eq!(submission.project.name, "site");
    assert_eq!(
        submission.url,
        format!("http://{}.example.com", submission.project.subdomain)
    );

    let id = submission.deployment.id;
    assert!(state.queue.contains(id).await.unwrap());
    assert_eq!(state.queue.pending().await.unwrap(), 1);
    assert_eq!(
        state.queue.snapshot(id).await.unwrap().as_deref(),
        Some(STAGE_UPLOADED)
    );

    let keys = state.store.list(&source_prefix(id)).await.unwrap();
    assert_eq!(
        keys,
        vec![source_key(id, "package.json"), source_key(id, "src/index.js")]
    );

    // checkout is removed after upload
    assert!(!state.cli.ingest_path().join(id.to_string()).exists());
}

#[tokio::test]
async fn test_submit_build_rejects_while_running() {
    let (state, _dir) = create_test_state(site_fetcher()).await;

    let first = submit_build(&state, submit("https://github.com/user/site.git"))
        .await
        .unwrap();

    let err = submit_build(&state, submit("https://github.com/user/site.git"))
        .await
        .unwrap_err();

    match err {
        IngestError::AlreadyRunning(id) => assert_eq!(id, first.deployment.id),
        e => panic!("unexpected error: {:?}", e),
    }

    let err = submit_build(
        &state,
        SubmitRequest {
            project_id: Some(first.project.id),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IngestError::AlreadyRunning(_)));

    assert_eq!(state.queue.pending().await.unwrap(), 1);
    assert_eq!(EDeployment::find().count(&state.db).await.unwrap(), 1);
}

#[tokio::test]
async fn test_submit_build_after_completion() {
    let (state, _dir) = create_test_state(site_fetcher()).await;

    let first = submit_build(&state, submit("https://github.com/user/site.git"))
        .await
        .unwrap();

    shipyard_core::channel::record_event(
        &state,
        first.deployment.id,
        first.project.id,
        LogKind::Completed,
        "build completed",
    )
    .await
    .unwrap();

    let second = submit_build(&state, submit("https://github.com/user/site.git"))
        .await
        .unwrap();

    assert_eq!(second.project.id, first.project.id);
    assert_ne!(second.deployment.id, first.deployment.id);
    assert_eq!(state.queue.pending().await.unwrap(), 2);
}

#[tokio::test]
async fn test_submit_build_input_errors() {
    let (state, _dir) = create_test_state(site_fetcher()).await;

    let err = submit_build(&state, SubmitRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Input(InputError::MissingRepository)
    ));

    let err = submit_build(&state, submit("file:///srv/site"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Input(InputError::LocalRepository)));

    let err = submit_build(
        &state,
        SubmitRequest {
            repo_url: Some("https://github.com/user/site.git".to_string()),
            subdomain: Some("not_valid".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        IngestError::Input(InputError::InvalidSubdomain(_))
    ));

    let err = submit_build(
        &state,
        SubmitRequest {
            project_id: Some(Uuid::new_v4()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IngestError::NotFound));

    assert_eq!(EProject::find().count(&state.db).await.unwrap(), 0);
    assert_eq!(state.queue.pending().await.unwrap(), 0);
}

#[tokio::test]
async fn test_submit_build_fetch_failure_fails_deployment() {
    let (state, _dir) = create_test_state(Arc::new(FailingFetcher)).await;

    let err = submit_build(&state, submit("https://github.com/user/missing.git"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Internal(_)));

    let deployment = EDeployment::find().one(&state.db).await.unwrap().unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Failed);
    assert_eq!(
        state.queue.snapshot(deployment.id).await.unwrap().as_deref(),
        Some(STAGE_FAILED)
    );
    assert_eq!(state.queue.pending().await.unwrap(), 0);

    let events = ELogEvent::find()
        .filter(CLogEvent::Deployment.eq(deployment.id))
        .all(&state.db)
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, LogKind::Failed);
    assert!(events[0].text.starts_with(ERROR_MARKER));

    // the project is not blocked by the failed attempt
    let err = submit_build(&state, submit("https://github.com/user/missing.git"))
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Internal(_)));
}

/// Memory queue whose status snapshots cannot be written.
#[derive(Default)]
struct SnapshotlessQueue {
    jobs: MemoryQueue,
}

#[async_trait]
impl WorkQueue for SnapshotlessQueue {
    async fn enqueue(&self, deployment: Uuid) -> anyhow::Result<()> {
        self.jobs.enqueue(deployment).await
    }

    async fn dequeue(&self) -> anyhow::Result<Uuid> {
        self.jobs.dequeue().await
    }

    async fn contains(&self, deployment: Uuid) -> anyhow::Result<bool> {
        self.jobs.contains(deployment).await
    }

    async fn pending(&self) -> anyhow::Result<u64> {
        self.jobs.pending().await
    }

    async fn set_snapshot(&self, _deployment: Uuid, _stage: &str) -> anyhow::Result<()> {
        anyhow::bail!("snapshot store unavailable")
    }

    async fn snapshot(&self, _deployment: Uuid) -> anyhow::Result<Option<String>> {
        Ok(None)
    }
}

#[tokio::test]
async fn test_submit_build_survives_snapshot_failure() {
    let (state, _dir) = create_test_state_with(
        site_fetcher(),
        Arc::new(SnapshotlessQueue::default()),
        create_test_db().await,
    )
    .await;

    let submission = submit_build(&state, submit("https://github.com/user/site.git"))
        .await
        .unwrap();
    let id = submission.deployment.id;

    assert!(state.queue.contains(id).await.unwrap());

    let deployment = EDeployment::find_by_id(id).one(&state.db).await.unwrap().unwrap();
    assert_eq!(deployment.status, DeploymentStatus::Queued);

    let events = ELogEvent::find()
        .filter(CLogEvent::Deployment.eq(id))
        .count(&state.db)
        .await
        .unwrap();
    assert_eq!(events, 0);
}

#[tokio::test]
async fn test_register_project() {
    let (state, _dir) = create_test_state(site_fetcher()).await;

    let project = register_project(
        &state,
        MakeProjectRequest {
            repository: "https://github.com/user/blog.git".to_string(),
            subdomain: Some("Blog".to_string()),
            output_dir: Some("public".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(project.subdomain, "blog");
    assert_eq!(project.name, "blog");
    assert_eq!(project.output_dir.as_deref(), Some("public"));
    assert_eq!(project.build_command, None);

    let err = register_project(
        &state,
        MakeProjectRequest {
            repository: "https://github.com/other/blog.git".to_string(),
            subdomain: Some("blog".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IngestError::SubdomainTaken(_)));

    let err = register_project(
        &state,
        MakeProjectRequest {
            repository: "https://github.com/user/blog.git".to_string(),
            output_dir: Some("../etc".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IngestError::Input(InputError::InvalidPath(_))));
}

#[tokio::test]
async fn test_submit_build_subdomain_owned_by_other_repository() {
    let (state, _dir) = create_test_state(site_fetcher()).await;

    register_project(
        &state,
        MakeProjectRequest {
            repository: "https://github.com/user/blog.git".to_string(),
            subdomain: Some("blog".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let err = submit_build(
        &state,
        SubmitRequest {
            repo_url: Some("https://github.com/user/site.git".to_string()),
            subdomain: Some("blog".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IngestError::SubdomainTaken(_)));

    let submission = submit_build(
        &state,
        SubmitRequest {
            repo_url: Some("https://github.com/user/blog.git".to_string()),
            subdomain: Some("blog".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(submission.project.subdomain, "blog");
}

#[tokio::test]
async fn test_update_project() {
    let (state, _dir) = create_test_state(site_fetcher()).await;

    let blog = register_project(
        &state,
        MakeProjectRequest {
            repository: "https://github.com/user/blog.git".to_string(),
            subdomain: Some("blog".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    register_project(
        &state,
        MakeProjectRequest {
            repository: "https://github.com/user/docs.git".to_string(),
            subdomain: Some("docs".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let updated = update_project(
        &state,
        blog.id,
        PatchProjectRequest {
            name: Some("Weblog".to_string()),
            subdomain: Some("weblog".to_string()),
        },
    )
    .await
    .unwrap();
    assert_eq!(updated.name, "Weblog");
    assert_eq!(updated.subdomain, "weblog");

    let err = update_project(
        &state,
        blog.id,
        PatchProjectRequest {
            subdomain: Some("docs".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, IngestError::SubdomainTaken(_)));

    let err = update_project(&state, Uuid::new_v4(), PatchProjectRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::NotFound));
}
