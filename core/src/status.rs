/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use entity::deployment::DeploymentStatus;
use entity::log_event::LogKind;
use sea_orm::Iterable;

/// Single step of the deployment status machine. Terminal states absorb
/// every event.
pub fn transition(current: DeploymentStatus, kind: LogKind) -> DeploymentStatus {
    match (current, kind) {
        (DeploymentStatus::Completed | DeploymentStatus::Failed, _) => current,
        (DeploymentStatus::Queued, LogKind::Started) => DeploymentStatus::InProgress,
        (_, LogKind::Completed) => DeploymentStatus::Completed,
        (_, LogKind::Failed) => DeploymentStatus::Failed,
        (_, LogKind::Started | LogKind::Line) => current,
    }
}

/// Folds a whole event sequence starting from `QUEUED`.
pub fn reduce<I>(events: I) -> DeploymentStatus
where
    I: IntoIterator<Item = LogKind>,
{
    events
        .into_iter()
        .fold(DeploymentStatus::Queued, transition)
}

/// Statuses a deployment can still leave.
pub fn in_flight_statuses() -> Vec<DeploymentStatus> {
    DeploymentStatus::iter()
        .filter(|status| status.is_in_flight())
        .collect()
}
