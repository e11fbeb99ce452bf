/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::consts::SOURCE_PREFIX;
use super::walk::collect_files;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Artifact not found: {0}")]
    NotFound(String),
    #[error("Invalid artifact key: {0}")]
    InvalidKey(String),
    #[error("Artifact store I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Blob storage addressed by slash delimited keys.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError>;
    async fn get(&self, key: &str) -> Result<Bytes, StoreError>;
    /// Every key starting with `prefix`, in lexicographic order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

pub fn source_prefix(deployment: Uuid) -> String {
    format!("{}/{}/", SOURCE_PREFIX, deployment)
}

pub fn source_key(deployment: Uuid, relative: &str) -> String {
    format!("{}{}", source_prefix(deployment), relative)
}

pub fn output_prefix(deployment: Uuid) -> String {
    format!("{}/", deployment)
}

pub fn output_key(deployment: Uuid, relative: &str) -> String {
    format!("{}{}", output_prefix(deployment), relative)
}

pub fn is_source_key(key: &str) -> bool {
    key.split('/').next() == Some(SOURCE_PREFIX)
}

pub fn check_key(key: &str) -> Result<(), StoreError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.contains('\0')
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..");

    if invalid {
        Err(StoreError::InvalidKey(key.to_string()))
    } else {
        Ok(())
    }
}

/// Directory below the store root holding partially written objects.
const STAGING_DIR: &str = ".staging";

/// Stores every key as a file below `root`.
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        check_key(key)?;

        if key.split('/').next() == Some(STAGING_DIR) {
            return Err(StoreError::InvalidKey(key.to_string()));
        }

        Ok(key.split('/').fold(self.root.clone(), |path, s| path.join(s)))
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        let path = self.path_for(key)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // readers never observe a partially written object
        let staging = self.root.join(STAGING_DIR);
        fs::create_dir_all(&staging).await?;
        let tmp = staging.join(Uuid::new_v4().to_string());
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        let path = self.path_for(key)?;

        match fs::read(&path).await {
            Ok(content) => Ok(Bytes::from(content)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(e) => match fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => Err(StoreError::NotFound(key.to_string())),
                _ => Err(StoreError::Io(e)),
            },
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        // start at the deepest directory fully named by the prefix
        let dir_part = match prefix.rfind('/') {
            Some(i) => &prefix[..i],
            None => "",
        };

        let mut start = self.root.clone();
        let mut start_key = String::new();
        for segment in dir_part.split('/').filter(|s| !s.is_empty()) {
            if segment == ".." || segment == "." {
                return Err(StoreError::InvalidKey(prefix.to_string()));
            }
            start = start.join(segment);
            start_key.push_str(segment);
            start_key.push('/');
        }

        let entries = match collect_files(&start, &[]).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(StoreError::Io(e)),
        };

        let mut keys = entries
            .into_iter()
            .map(|e| format!("{}{}", start_key, e.relative))
            .filter(|key| key.starts_with(prefix))
            .filter(|key| key.split('/').next() != Some(STAGING_DIR))
            .collect::<Vec<String>>();
        keys.sort();

        Ok(keys)
    }
}

#[derive(Default)]
pub struct MemoryArtifactStore {
    objects: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for MemoryArtifactStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        check_key(key)?;
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, StoreError> {
        check_key(key)?;
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }
}
