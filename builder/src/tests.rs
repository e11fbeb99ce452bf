/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::start_builder;
use crate::worker::process_job;
use bytes::Bytes;
use chrono::Utc;
use clap::Parser;
use entity::deployment::DeploymentStatus;
use entity::log_event::LogKind;
use futures::StreamExt;
use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectOptions, Database, EntityTrait,
    QueryFilter, QueryOrder,
};
use shipyard_core::channel::{BroadcastChannel, channel_name};
use shipyard_core::consts::*;
use shipyard_core::queue::MemoryQueue;
use shipyard_core::sources::GitFetcher;
use shipyard_core::storage::{MemoryArtifactStore, output_key, output_prefix, source_key};
use shipyard_core::types::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

fn create_mock_cli(base_path: &std::path::Path) -> Cli {
    Cli::parse_from([
        "shipyard",
        "--database-url",
        "sqlite::memory:",
        "--base-path",
        &base_path.display().to_string(),
        "--queue",
        "memory",
        "--output-dir",
        "dist",
    ])
}

async fn create_mock_state() -> (Arc<ServerState>, TempDir) {
    let dir = tempfile::tempdir().unwrap();

    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let db = Database::connect(opt).await.unwrap();
    Migrator::up(&db, None).await.unwrap();

    let state = Arc::new(ServerState {
        db,
        instance: Uuid::new_v4(),
        cli: create_mock_cli(dir.path()),
        queue: Arc::new(MemoryQueue::new()),
        channel: Arc::new(BroadcastChannel::default()),
        store: Arc::new(MemoryArtifactStore::new()),
        fetcher: Arc::new(GitFetcher::new("git")),
        shutdown: CancellationToken::new(),
    });

    (state, dir)
}

/// Inserts a project with `build_command` and a queued deployment with a
/// stored source tree.
async fn create_deployment(state: &ServerState, build_command: &str) -> MDeployment {
    let now = Utc::now().naive_utc();

    let project = AProject {
        id: Set(Uuid::new_v4()),
        name: Set("site".to_string()),
        repository: Set("https://github.com/user/site.git".to_string()),
        subdomain: Set(format!("site-{}", &Uuid::new_v4().simple().to_string()[..8])),
        build_command: Set(Some(build_command.to_string())),
        output_dir: Set(None),
        created_at: Set(now),
    }
    .insert(&state.db)
    .await
    .unwrap();

    let deployment = ADeployment {
        id: Set(Uuid::new_v4()),
        project: Set(project.id),
        status: Set(DeploymentStatus::Queued),
        created_at: Set(now),
        updated_at: Set(now),
        claimed_by: Set(None),
        heartbeat_at: Set(None),
    }
    .insert(&state.db)
    .await
    .unwrap();

    state
        .store
        .put(
            &source_key(deployment.id, "package.json"),
            Bytes::from_static(b"{\"name\": \"site\"}"),
        )
        .await
        .unwrap();
    state
        .store
        .put(
            &source_key(deployment.id, "src/page.html"),
            Bytes::from_static(b"<h1>hi</h1>"),
        )
        .await
        .unwrap();

    deployment
}

async fn get_status(state: &ServerState, id: Uuid) -> DeploymentStatus {
    EDeployment::find_by_id(id)
        .one(&state.db)
        .await
        .unwrap()
        .unwrap()
        .status
}

async fn get_events(state: &ServerState, id: Uuid) -> Vec<MLogEvent> {
    ELogEvent::find()
        .filter(CLogEvent::Deployment.eq(id))
        .order_by_asc(CLogEvent::Id)
        .all(&state.db)
        .await
        .unwrap()
}

#[tokio::test]
async fn test_successful_build() {
    let (state, _dir) = create_mock_state().await;
    let deployment = create_deployment(
        &state,
        "echo one && echo two && echo three >&2 && mkdir -p dist/assets \
         && cp src/page.html dist/index.html && printf 'let a;' > dist/assets/app.js",
    )
    .await;

    process_job(Arc::clone(&state), deployment.id).await.unwrap();

    assert_eq!(
        get_status(&state, deployment.id).await,
        DeploymentStatus::Completed
    );

    let events = get_events(&state, deployment.id).await;
    let first = events.first().unwrap();
    let last = events.last().unwrap();
    assert_eq!(first.kind, LogKind::Started);
    assert_eq!(first.text, BUILD_STARTED);
    assert_eq!(last.kind, LogKind::Completed);
    assert_eq!(last.text, BUILD_COMPLETED);

    let lines = events
        .iter()
        .filter(|e| e.kind == LogKind::Line)
        .map(|e| e.text.as_str())
        .collect::<Vec<&str>>();
    for expected in ["one", "two", "three", "uploaded index.html", "uploaded assets/app.js"] {
        assert!(lines.contains(&expected), "missing line {}", expected);
    }

    let index = state
        .store
        .get(&output_key(deployment.id, "index.html"))
        .await
        .unwrap();
    assert_eq!(&index[..], b"<h1>hi</h1>");

    let keys = state.store.list(&output_prefix(deployment.id)).await.unwrap();
    assert_eq!(keys.len(), 2);

    assert_eq!(
        state.queue.snapshot(deployment.id).await.unwrap().as_deref(),
        Some(STAGE_DEPLOYED)
    );
    assert!(!state.cli.scratch_path().join(deployment.id.to_string()).exists());
}

#[tokio::test]
async fn test_failing_build() {
    let (state, _dir) = create_mock_state().await;
    let deployment = create_deployment(&state, "echo building; exit 3").await;

    process_job(Arc::clone(&state), deployment.id).await.unwrap();

    assert_eq!(
        get_status(&state, deployment.id).await,
        DeploymentStatus::Failed
    );

    let events = get_events(&state, deployment.id).await;
    let last = events.last().unwrap();
    assert_eq!(last.kind, LogKind::Failed);
    assert_eq!(last.text, "error: build command exited with code 3");
    assert!(events.iter().any(|e| e.text == "building"));

    assert!(state
        .store
        .list(&output_prefix(deployment.id))
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        state.queue.snapshot(deployment.id).await.unwrap().as_deref(),
        Some(STAGE_FAILED)
    );
}

#[tokio::test]
async fn test_error_text_in_output_does_not_fail() {
    let (state, _dir) = create_mock_state().await;
    let deployment = create_deployment(
        &state,
        "echo 'error: deprecated dependency' && mkdir -p dist && touch dist/index.html",
    )
    .await;

    process_job(Arc::clone(&state), deployment.id).await.unwrap();

    assert_eq!(
        get_status(&state, deployment.id).await,
        DeploymentStatus::Completed
    );
}

#[tokio::test]
async fn test_missing_output_dir() {
    let (state, _dir) = create_mock_state().await;
    let deployment = create_deployment(&state, "true").await;

    process_job(Arc::clone(&state), deployment.id).await.unwrap();

    let events = get_events(&state, deployment.id).await;
    assert_eq!(
        events.last().unwrap().text,
        "error: output directory dist not found"
    );
    assert_eq!(
        get_status(&state, deployment.id).await,
        DeploymentStatus::Failed
    );
}

#[tokio::test]
async fn test_empty_output_dir() {
    let (state, _dir) = create_mock_state().await;
    let deployment = create_deployment(&state, "mkdir -p dist").await;

    process_job(Arc::clone(&state), deployment.id).await.unwrap();

    assert_eq!(
        get_status(&state, deployment.id).await,
        DeploymentStatus::Completed
    );

    let events = get_events(&state, deployment.id).await;
    assert!(!events.iter().any(|e| e.text.starts_with("uploaded ")));
}

#[tokio::test]
async fn test_skips_unknown_and_finished_deployments() {
    let (state, _dir) = create_mock_state().await;

    process_job(Arc::clone(&state), Uuid::new_v4()).await.unwrap();
    assert!(ELogEvent::find().all(&state.db).await.unwrap().is_empty());

    let deployment = create_deployment(&state, "mkdir -p dist").await;
    let mut adeployment: ADeployment = deployment.clone().into();
    adeployment.status = Set(DeploymentStatus::Failed);
    adeployment.update(&state.db).await.unwrap();

    process_job(Arc::clone(&state), deployment.id).await.unwrap();
    assert!(get_events(&state, deployment.id).await.is_empty());
}

#[tokio::test]
async fn test_worker_pool_processes_queue() {
    let (state, _dir) = create_mock_state().await;
    let deployment = create_deployment(&state, "mkdir -p dist && echo ok > dist/index.html").await;

    let mut live = state
        .channel
        .subscribe(&channel_name(deployment.id))
        .await
        .unwrap();

    let handles = start_builder(Arc::clone(&state));
    state.queue.enqueue(deployment.id).await.unwrap();

    let completed = tokio::time::timeout(Duration::from_secs(30), async {
        while let Some(message) = live.next().await {
            if message.is_ok_and(|message| message.kind == LogKind::Completed) {
                return true;
            }
        }
        false
    })
    .await
    .unwrap();
    assert!(completed);

    state.shutdown.cancel();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    assert_eq!(
        get_status(&state, deployment.id).await,
        DeploymentStatus::Completed
    );
}
