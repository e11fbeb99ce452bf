/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod worker;

#[cfg(test)]
mod tests;

use shipyard_core::types::ServerState;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Spawns `--workers` build workers plus the recovery sweep. They stop
/// between jobs once `state.shutdown` is cancelled.
pub fn start_builder(state: Arc<ServerState>) -> Vec<JoinHandle<()>> {
    let mut handles = (0..state.cli.workers)
        .map(|index| tokio::spawn(worker::worker_loop(Arc::clone(&state), index)))
        .collect::<Vec<JoinHandle<()>>>();

    handles.push(tokio::spawn(worker::recovery_loop(state)));
    handles
}
