/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::Path;
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, instrument};
use uuid::Uuid;

use super::consts::IGNORED_SOURCE_DIRS;
use super::storage::{ArtifactStore, source_key, source_prefix};
use super::walk::collect_files;

/// Produces a working tree for a repository at `dest`.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, repository: &str, dest: &Path) -> Result<()>;
}

pub struct GitFetcher {
    binpath: String,
}

impl GitFetcher {
    pub fn new(binpath: impl Into<String>) -> Self {
        Self {
            binpath: binpath.into(),
        }
    }
}

#[async_trait]
impl SourceFetcher for GitFetcher {
    #[instrument(skip(self), fields(dest = %dest.display()))]
    async fn fetch(&self, repository: &str, dest: &Path) -> Result<()> {
        let output = Command::new(&self.binpath)
            .arg("clone")
            .arg("--depth")
            .arg("1")
            .arg("--")
            .arg(repository)
            .arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0")
            .kill_on_drop(true)
            .output()
            .await
            .context("Failed to execute git")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("git clone failed: {}", stderr.trim());
        }

        Ok(())
    }
}

/// Uploads a checked out tree to `_sources/<deployment>/`, skipping VCS
/// metadata. Returns the number of uploaded files.
pub async fn upload_sources(
    store: &dyn ArtifactStore,
    deployment: Uuid,
    root: &Path,
) -> Result<usize> {
    let files = collect_files(root, &IGNORED_SOURCE_DIRS)
        .await
        .context("Failed to walk source tree")?;

    for file in &files {
        let content = fs::read(&file.path)
            .await
            .with_context(|| format!("Failed to read {}", file.relative))?;

        store
            .put(&source_key(deployment, &file.relative), Bytes::from(content))
            .await
            .with_context(|| format!("Failed to upload {}", file.relative))?;
    }

    debug!(deployment_id = %deployment, files = files.len(), "Uploaded sources");
    Ok(files.len())
}

/// Writes the stored source tree of `deployment` below `dest`.
pub async fn materialize_sources(
    store: &dyn ArtifactStore,
    deployment: Uuid,
    dest: &Path,
) -> Result<usize> {
    let prefix = source_prefix(deployment);
    let keys = store
        .list(&prefix)
        .await
        .context("Failed to list sources")?;

    if keys.is_empty() {
        anyhow::bail!("No sources stored for deployment {}", deployment);
    }

    for key in &keys {
        let relative = &key[prefix.len()..];
        let path = relative.split('/').fold(dest.to_path_buf(), |p, s| p.join(s));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create directory for {}", relative))?;
        }

        let content = store
            .get(key)
            .await
            .with_context(|| format!("Failed to download {}", relative))?;
        fs::write(&path, &content)
            .await
            .with_context(|| format!("Failed to write {}", relative))?;
    }

    Ok(keys.len())
}
