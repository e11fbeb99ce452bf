/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use shipyard_core::channel::BroadcastChannel;
use shipyard_core::queue::{MemoryQueue, WorkQueue};
use shipyard_core::sources::SourceFetcher;
use shipyard_core::storage::MemoryArtifactStore;
use shipyard_core::types::*;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Writes a fixed file tree instead of cloning.
pub struct StaticFetcher {
    pub files: Vec<(&'static str, &'static str)>,
}

#[async_trait]
impl SourceFetcher for StaticFetcher {
    async fn fetch(&self, _repository: &str, dest: &Path) -> Result<()> {
        for (path, content) in &self.files {
            let path = dest.join(path);
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(path, content).await?;
        }

        Ok(())
    }
}

pub struct FailingFetcher;

#[async_trait]
impl SourceFetcher for FailingFetcher {
    async fn fetch(&self, repository: &str, _dest: &Path) -> Result<()> {
        anyhow::bail!("repository {} not found", repository)
    }
}

pub fn site_fetcher() -> Arc<dyn SourceFetcher> {
    Arc::new(StaticFetcher {
        files: vec![
            ("package.json", "{\"name\": \"site\"}"),
            ("src/index.js", "console.log('hi');"),
            (".git/HEAD", "ref: refs/heads/main"),
        ],
    })
}

pub fn create_mock_cli(base_path: &Path) -> Cli {
    Cli::parse_from([
        "shipyard",
        "--database-url",
        "sqlite::memory:",
        "--base-path",
        &base_path.display().to_string(),
        "--queue",
        "memory",
        "--domain",
        "example.com",
    ])
}

pub async fn create_test_db() -> DatabaseConnection {
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);

    let db = Database::connect(opt).await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub async fn create_test_state_with(
    fetcher: Arc<dyn SourceFetcher>,
    queue: Arc<dyn WorkQueue>,
    db: DatabaseConnection,
) -> (Arc<ServerState>, TempDir) {
    let dir = tempfile::tempdir().unwrap();

    let state = Arc::new(ServerState {
        db,
        instance: Uuid::new_v4(),
        cli: create_mock_cli(dir.path()),
        queue,
        channel: Arc::new(BroadcastChannel::default()),
        store: Arc::new(MemoryArtifactStore::new()),
        fetcher,
        shutdown: CancellationToken::new(),
    });

    (state, dir)
}

pub async fn create_test_state(fetcher: Arc<dyn SourceFetcher>) -> (Arc<ServerState>, TempDir) {
    let db = create_test_db().await;
    create_test_state_with(fetcher, Arc::new(MemoryQueue::new()), db).await
}
