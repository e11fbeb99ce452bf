/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use bytes::Bytes;
use entity::log_event::LogKind;
use sea_orm::EntityTrait;
use shipyard_core::channel::record_event;
use shipyard_core::consts::*;
use shipyard_core::input::check_output_dir;
use shipyard_core::lease::{hold_claim, recover_expired_deployments};
use shipyard_core::queue::record_snapshot;
use shipyard_core::sources::materialize_sources;
use shipyard_core::storage::output_key;
use shipyard_core::types::*;
use shipyard_core::walk::{collect_files, remove_tree};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

fn init_error_reporting(cli: &Cli) -> Option<sentry::ClientInitGuard> {
    if !cli.report_errors {
        return None;
    }

    let Some(dsn) = &cli.sentry_dsn else {
        warn!("Error reporting enabled without a Sentry DSN");
        return None;
    };

    match dsn.parse::<sentry::types::Dsn>() {
        Ok(dsn) => Some(sentry::init(sentry::ClientOptions {
            dsn: Some(dsn),
            release: sentry::release_name!(),
            ..Default::default()
        })),
        Err(e) => {
            warn!(error = %e, "Invalid Sentry DSN, error reporting disabled");
            None
        }
    }
}

pub async fn worker_loop(state: Arc<ServerState>, index: usize) {
    let _guard = init_error_reporting(&state.cli);

    info!(worker = index, "Build worker started");

    loop {
        let job = tokio::select! {
            _ = state.shutdown.cancelled() => break,
            job = state.queue.dequeue() => job,
        };

        match job {
            Ok(deployment_id) => {
                if let Err(e) = process_job(Arc::clone(&state), deployment_id).await {
                    error!(
                        worker = index,
                        deployment_id = %deployment_id,
                        error = %format!("{:#}", e),
                        "Failed to process job"
                    );
                }
            }
            Err(e) => {
                error!(worker = index, error = %format!("{:#}", e), "Failed to dequeue job");

                tokio::select! {
                    _ = state.shutdown.cancelled() => break,
                    _ = time::sleep(WORKER_ERROR_BACKOFF) => {}
                }
            }
        }
    }

    info!(worker = index, "Build worker stopped");
}

/// Fails deployments abandoned by crashed processes, once at startup and then
/// every lease timeout.
pub async fn recovery_loop(state: Arc<ServerState>) {
    let mut interval = time::interval(state.cli.lease());

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        if let Err(e) = recover_expired_deployments(&state).await {
            error!(error = %format!("{:#}", e), "Failed to recover abandoned deployments");
        }
    }

    debug!("Recovery stopped");
}

/// Builds one deployment. Build errors end up as a `failed` log event; an
/// `Err` means the job could not be tracked at all.
#[instrument(skip(state), fields(deployment_id = %deployment_id))]
pub async fn process_job(state: Arc<ServerState>, deployment_id: Uuid) -> Result<()> {
    let Some(deployment) = EDeployment::find_by_id(deployment_id)
        .one(&state.db)
        .await
        .context("Failed to query deployment")?
    else {
        warn!("Deployment no longer exists, skipping job");
        return Ok(());
    };

    if deployment.status.is_terminal() {
        warn!(status = %deployment.status, "Deployment already finished, skipping job");
        return Ok(());
    }

    let Some(project) = EProject::find_by_id(deployment.project)
        .one(&state.db)
        .await
        .context("Failed to query project")?
    else {
        warn!(project_id = %deployment.project, "Project no longer exists, skipping job");
        return Ok(());
    };

    info!(project_id = %project.id, "Executing build");

    let heartbeat = hold_claim(&state, deployment.id).await?;

    record_event(
        &state,
        deployment.id,
        project.id,
        LogKind::Started,
        BUILD_STARTED,
    )
    .await?;
    record_snapshot(state.queue.as_ref(), deployment.id, STAGE_BUILDING).await;

    let scratch = state.cli.scratch_path().join(deployment.id.to_string());
    let result = run_build(&state, &project, deployment.id, &scratch).await;

    if let Err(e) = remove_tree(&scratch).await {
        warn!(error = %e, "Failed to remove scratch directory");
    }

    match result {
        Ok(uploaded) => {
            record_event(
                &state,
                deployment.id,
                project.id,
                LogKind::Completed,
                BUILD_COMPLETED,
            )
            .await?;
            record_snapshot(state.queue.as_ref(), deployment.id, STAGE_DEPLOYED).await;
            info!(files = uploaded, "Deployment completed");
        }
        Err(e) => {
            warn!(error = %format!("{:#}", e), "Build failed");
            record_event(
                &state,
                deployment.id,
                project.id,
                LogKind::Failed,
                format!("{} {:#}", ERROR_MARKER, e),
            )
            .await?;
            record_snapshot(state.queue.as_ref(), deployment.id, STAGE_FAILED).await;
        }
    }

    drop(heartbeat);
    Ok(())
}

async fn run_build(
    state: &ServerState,
    project: &MProject,
    deployment_id: Uuid,
    scratch: &Path,
) -> Result<usize> {
    remove_tree(scratch)
        .await
        .context("Failed to clear scratch directory")?;
    fs::create_dir_all(scratch)
        .await
        .context("Failed to create scratch directory")?;

    let files = materialize_sources(state.store.as_ref(), deployment_id, scratch).await?;
    debug!(files, "Materialized sources");

    let command = project
        .build_command
        .as_deref()
        .unwrap_or(state.cli.build_command.as_str());
    run_command(state, project, deployment_id, command, scratch).await?;

    let output_dir = project
        .output_dir
        .as_deref()
        .unwrap_or(state.cli.output_dir.as_str());
    check_output_dir(output_dir)?;

    upload_output(state, project, deployment_id, output_dir, scratch).await
}

async fn forward_lines<R>(reader: R, sender: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();

        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim_end_matches(['\n', '\r']).to_string();

                if sender.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to read build output");
                break;
            }
        }
    }
}

/// Runs the build command in `dir`, publishing every output line as it
/// arrives.
async fn run_command(
    state: &ServerState,
    project: &MProject,
    deployment_id: Uuid,
    command: &str,
    dir: &Path,
) -> Result<()> {
    debug!(command, "Running build command");

    let mut child = Command::new(&state.cli.binpath_shell)
        .arg("-c")
        .arg(command)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .context("Failed to start build command")?;

    let (sender, mut receiver) = mpsc::unbounded_channel();

    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, sender.clone()));
    }

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, sender.clone()));
    }

    drop(sender);

    while let Some(line) = receiver.recv().await {
        record_event(state, deployment_id, project.id, LogKind::Line, line).await?;
    }

    let status = child
        .wait()
        .await
        .context("Failed to wait for build command")?;

    if !status.success() {
        match status.code() {
            Some(code) => anyhow::bail!("build command exited with code {}", code),
            None => anyhow::bail!("build command was terminated by a signal"),
        }
    }

    Ok(())
}

/// Uploads every file below `<dir>/<output_dir>` to `<deployment id>/<path>`.
async fn upload_output(
    state: &ServerState,
    project: &MProject,
    deployment_id: Uuid,
    output_dir: &str,
    dir: &Path,
) -> Result<usize> {
    let root = output_dir
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .fold(dir.to_path_buf(), |path, s| path.join(s));

    if !fs::metadata(&root).await.is_ok_and(|meta| meta.is_dir()) {
        anyhow::bail!("output directory {} not found", output_dir);
    }

    let files = collect_files(&root, &[])
        .await
        .context("Failed to walk output directory")?;

    for file in &files {
        let content = fs::read(&file.path)
            .await
            .with_context(|| format!("Failed to read {}", file.relative))?;

        state
            .store
            .put(&output_key(deployment_id, &file.relative), Bytes::from(content))
            .await
            .with_context(|| format!("Failed to upload {}", file.relative))?;

        record_event(
            state,
            deployment_id,
            project.id,
            LogKind::Line,
            format!("uploaded {}", file.relative),
        )
        .await?;
    }

    Ok(files.len())
}
