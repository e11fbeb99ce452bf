/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Deployment leases. A process working on a deployment claims it and keeps
//! `heartbeat_at` fresh; only deployments whose heartbeat is older than the
//! lease timeout are failed by recovery. Several processes can share one
//! database without failing each other's builds.

use anyhow::{Context, Result};
use chrono::{NaiveDateTime, Utc};
use entity::deployment::DeploymentStatus;
use entity::log_event::LogKind;
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::channel::record_event;
use super::consts::{ERROR_MARKER, STAGE_FAILED};
use super::queue::record_snapshot;
use super::status::in_flight_statuses;
use super::types::*;

/// Renews a claim until dropped.
#[derive(Debug)]
pub struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

pub fn heartbeat_interval(lease: Duration) -> Duration {
    (lease / 4).max(Duration::from_secs(1))
}

/// Marks an in-flight deployment as owned by `owner`. Returns `false` when
/// the deployment is gone or already finished.
pub async fn claim_deployment<C: ConnectionTrait>(
    db: &C,
    deployment: Uuid,
    owner: Uuid,
) -> Result<bool> {
    let result = EDeployment::update_many()
        .col_expr(CDeployment::ClaimedBy, Expr::value(owner))
        .col_expr(CDeployment::HeartbeatAt, Expr::value(Utc::now().naive_utc()))
        .filter(CDeployment::Id.eq(deployment))
        .filter(CDeployment::Status.is_in(in_flight_statuses()))
        .exec(db)
        .await
        .context("Failed to claim deployment")?;

    Ok(result.rows_affected > 0)
}

/// Refreshes the heartbeat of a deployment regardless of its owner.
pub async fn touch_deployment<C: ConnectionTrait>(db: &C, deployment: Uuid) -> Result<()> {
    EDeployment::update_many()
        .col_expr(CDeployment::HeartbeatAt, Expr::value(Utc::now().naive_utc()))
        .filter(CDeployment::Id.eq(deployment))
        .filter(CDeployment::Status.is_in(in_flight_statuses()))
        .exec(db)
        .await
        .context("Failed to touch deployment")?;

    Ok(())
}

/// Refreshes the heartbeat while `owner` still holds the claim.
pub async fn renew_claim<C: ConnectionTrait>(
    db: &C,
    deployment: Uuid,
    owner: Uuid,
) -> Result<bool> {
    let result = EDeployment::update_many()
        .col_expr(CDeployment::HeartbeatAt, Expr::value(Utc::now().naive_utc()))
        .filter(CDeployment::Id.eq(deployment))
        .filter(CDeployment::ClaimedBy.eq(owner))
        .filter(CDeployment::Status.is_in(in_flight_statuses()))
        .exec(db)
        .await
        .context("Failed to renew deployment claim")?;

    Ok(result.rows_affected > 0)
}

/// Claims `deployment` for this process and renews the claim in the
/// background until the returned [`Heartbeat`] is dropped.
pub async fn hold_claim(state: &ServerState, deployment: Uuid) -> Result<Heartbeat> {
    if !claim_deployment(&state.db, deployment, state.instance).await? {
        debug!(deployment_id = %deployment, "Deployment not claimable");
    }

    let db = state.db.clone();
    let owner = state.instance;
    let every = heartbeat_interval(state.cli.lease());

    let handle = tokio::spawn(async move {
        let mut interval = time::interval(every);
        interval.tick().await;

        loop {
            interval.tick().await;

            match renew_claim(&db, deployment, owner).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!(deployment_id = %deployment, "Claim released");
                    break;
                }
                Err(e) => warn!(
                    deployment_id = %deployment,
                    error = %format!("{:#}", e),
                    "Failed to renew claim"
                ),
            }
        }
    });

    Ok(Heartbeat { handle })
}

fn is_expired(deployment: &MDeployment, cutoff: NaiveDateTime) -> bool {
    deployment.heartbeat_at.unwrap_or(deployment.updated_at) <= cutoff
}

/// Takes over an abandoned deployment. Succeeds only if nobody touched the
/// row since it was read.
async fn take_over<C: ConnectionTrait>(
    db: &C,
    deployment: &MDeployment,
    owner: Uuid,
) -> Result<bool> {
    let heartbeat = match deployment.heartbeat_at {
        Some(heartbeat_at) => CDeployment::HeartbeatAt.eq(heartbeat_at),
        None => CDeployment::HeartbeatAt.is_null(),
    };

    let result = EDeployment::update_many()
        .col_expr(CDeployment::ClaimedBy, Expr::value(owner))
        .col_expr(CDeployment::HeartbeatAt, Expr::value(Utc::now().naive_utc()))
        .filter(CDeployment::Id.eq(deployment.id))
        .filter(CDeployment::Status.eq(deployment.status))
        .filter(CDeployment::UpdatedAt.eq(deployment.updated_at))
        .filter(heartbeat)
        .exec(db)
        .await
        .context("Failed to take over deployment")?;

    Ok(result.rows_affected == 1)
}

/// Fails in-flight deployments whose lease expired. `QUEUED` deployments
/// whose job is still waiting are left alone. Returns the number of
/// deployments marked as failed.
#[instrument(skip(state), fields(instance = %state.instance))]
pub async fn recover_expired_deployments(state: &ServerState) -> Result<usize> {
    let lease = chrono::Duration::from_std(state.cli.lease()).context("Invalid lease timeout")?;
    let cutoff = Utc::now().naive_utc() - lease;

    let deployments = EDeployment::find()
        .filter(CDeployment::Status.is_in(in_flight_statuses()))
        .all(&state.db)
        .await
        .context("Failed to query in-flight deployments")?;

    let mut recovered = 0;

    for deployment in deployments {
        if !is_expired(&deployment, cutoff) {
            continue;
        }

        if deployment.status == DeploymentStatus::Queued
            && state.queue.contains(deployment.id).await?
        {
            continue;
        }

        if !take_over(&state.db, &deployment, state.instance).await? {
            debug!(deployment_id = %deployment.id, "Deployment renewed meanwhile, skipping");
            continue;
        }

        warn!(
            deployment_id = %deployment.id,
            status = %deployment.status,
            claimed_by = ?deployment.claimed_by,
            "Failing abandoned deployment"
        );

        record_event(
            state,
            deployment.id,
            deployment.project,
            LogKind::Failed,
            format!("{} deployment abandoned by its worker", ERROR_MARKER),
        )
        .await?;
        record_snapshot(state.queue.as_ref(), deployment.id, STAGE_FAILED).await;
        recovered += 1;
    }

    if recovered > 0 {
        info!(recovered, "Recovered abandoned deployments");
    }

    Ok(recovered)
}
