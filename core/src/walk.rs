/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Directory traversal driven by an explicit stack, so deeply nested build
//! outputs cannot exhaust the call stack.

use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    /// Slash separated path relative to the walk root.
    pub relative: String,
}

/// Lists every regular file below `root`. Symlinks are skipped, as are
/// directories whose name is in `skip_dirs`.
pub async fn collect_files(root: &Path, skip_dirs: &[&str]) -> io::Result<Vec<WalkEntry>> {
    let mut files = Vec::new();
    let mut stack = vec![(root.to_path_buf(), String::new())];

    while let Some((dir, prefix)) = stack.pop() {
        let mut entries = fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let relative = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}/{}", prefix, name)
            };

            if file_type.is_dir() {
                if !skip_dirs.contains(&name.as_str()) {
                    stack.push((entry.path(), relative));
                }
            } else if file_type.is_file() {
                files.push(WalkEntry {
                    path: entry.path(),
                    relative,
                });
            }
        }
    }

    Ok(files)
}

/// Removes `root` and everything below it. A missing root is not an error.
pub async fn remove_tree(root: &Path) -> io::Result<()> {
    match fs::symlink_metadata(root).await {
        Ok(meta) if !meta.is_dir() => return fs::remove_file(root).await,
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    }

    let mut stack = vec![root.to_path_buf()];
    let mut dirs = Vec::new();

    while let Some(dir) = stack.pop() {
        let mut entries = fs::read_dir(&dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                stack.push(entry.path());
            } else {
                fs::remove_file(entry.path()).await?;
            }
        }

        dirs.push(dir);
    }

    // children were pushed after their parents
    for dir in dirs.iter().rev() {
        fs::remove_dir(dir).await?;
    }

    Ok(())
}
