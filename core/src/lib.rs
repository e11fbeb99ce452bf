/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod channel;
pub mod consts;
pub mod database;
pub mod ingest;
pub mod input;
pub mod lease;
pub mod queue;
pub mod sources;
pub mod status;
pub mod storage;
pub mod types;
pub mod walk;

use anyhow::{Context, Result};
use channel::BroadcastChannel;
use database::connect_db;
use queue::{DatabaseQueue, MemoryQueue, WorkQueue};
use sources::GitFetcher;
use std::sync::Arc;
use std::time::Duration;
use storage::FsArtifactStore;
use tokio_util::sync::CancellationToken;
use tracing::info;
use types::*;
use uuid::Uuid;

pub async fn init_state(cli: Cli) -> Result<Arc<ServerState>> {
    info!(ip = %cli.ip, port = cli.port, "Starting Shipyard");

    let db = connect_db(&cli).await?;

    let queue: Arc<dyn WorkQueue> = match cli.queue {
        QueueBackend::Database => Arc::new(DatabaseQueue::new(
            db.clone(),
            Duration::from_secs(cli.queue_poll_interval),
        )),
        QueueBackend::Memory => Arc::new(MemoryQueue::new()),
    };

    let artifacts = cli.artifacts_path();
    tokio::fs::create_dir_all(&artifacts)
        .await
        .with_context(|| format!("Failed to create {}", artifacts.display()))?;

    let instance = Uuid::new_v4();
    info!(instance = %instance, "Registered process instance");

    Ok(Arc::new(ServerState {
        db,
        instance,
        queue,
        channel: Arc::new(BroadcastChannel::default()),
        store: Arc::new(FsArtifactStore::new(artifacts)),
        fetcher: Arc::new(GitFetcher::new(cli.binpath_git.clone())),
        shutdown: CancellationToken::new(),
        cli,
    }))
}
