/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use chrono::Utc;
use entity::deployment::DeploymentStatus;
use entity::log_event::LogKind;
use migration::{Migrator, MigratorTrait};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
};
use std::time::Duration;
use tracing::log::LevelFilter;
use uuid::Uuid;

use super::consts::{DEFAULT_LOG_PAGE_SIZE, MAX_LOG_PAGE_SIZE};
use super::status::{in_flight_statuses, transition};
use super::types::*;

pub async fn connect_db(cli: &Cli) -> Result<DatabaseConnection> {
    let db_url = if let Some(file) = &cli.database_url_file {
        std::fs::read_to_string(file)
            .context("Failed to read database url from file")?
            .trim()
            .to_string()
    } else if let Some(url) = &cli.database_url {
        url.clone()
    } else {
        anyhow::bail!("No database url provided")
    };

    let mut opt = ConnectOptions::new(db_url);

    if cli.log_level == "debug" {
        opt.sqlx_logging(true)
            .sqlx_logging_level(LevelFilter::Debug);
    } else {
        opt.sqlx_logging(false);
    }

    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(8))
        .max_lifetime(Duration::from_secs(8));

    let db = Database::connect(opt)
        .await
        .context("Failed to connect to database")?;
    Migrator::up(&db, None)
        .await
        .context("Failed to run database migrations")?;
    Ok(db)
}

pub async fn get_project_by_subdomain<C: ConnectionTrait>(
    db: &C,
    subdomain: &str,
) -> Result<Option<MProject>> {
    EProject::find()
        .filter(CProject::Subdomain.eq(subdomain.to_lowercase()))
        .one(db)
        .await
        .context("Failed to query project by subdomain")
}

/// Most recent deployment of a project regardless of its status.
pub async fn get_latest_deployment<C: ConnectionTrait>(
    db: &C,
    project: Uuid,
) -> Result<Option<MDeployment>> {
    EDeployment::find()
        .filter(CDeployment::Project.eq(project))
        .order_by_desc(CDeployment::CreatedAt)
        .order_by_desc(CDeployment::UpdatedAt)
        .one(db)
        .await
        .context("Failed to query latest deployment")
}

/// Most recent `COMPLETED` deployment of a project.
pub async fn get_current_deployment<C: ConnectionTrait>(
    db: &C,
    project: Uuid,
) -> Result<Option<MDeployment>> {
    EDeployment::find()
        .filter(CDeployment::Project.eq(project))
        .filter(CDeployment::Status.eq(DeploymentStatus::Completed))
        .order_by_desc(CDeployment::CreatedAt)
        .one(db)
        .await
        .context("Failed to query current deployment")
}

pub async fn get_in_flight_deployment<C: ConnectionTrait>(
    db: &C,
    project: Uuid,
) -> Result<Option<MDeployment>> {
    EDeployment::find()
        .filter(CDeployment::Project.eq(project))
        .filter(CDeployment::Status.is_in(in_flight_statuses()))
        .one(db)
        .await
        .context("Failed to query in-flight deployment")
}

pub async fn get_project_deployments<C: ConnectionTrait>(
    db: &C,
    project: Uuid,
) -> Result<Vec<MDeployment>> {
    EDeployment::find()
        .filter(CDeployment::Project.eq(project))
        .order_by_desc(CDeployment::CreatedAt)
        .all(db)
        .await
        .context("Failed to query deployments")
}

/// Clamps a requested page size into `1..=MAX_LOG_PAGE_SIZE`.
pub fn log_page_size(limit: Option<u64>) -> u64 {
    limit
        .unwrap_or(DEFAULT_LOG_PAGE_SIZE)
        .clamp(1, MAX_LOG_PAGE_SIZE)
}

/// One page of a deployment's log, newest first. Pages start at 0.
pub async fn get_log_page<C: ConnectionTrait>(
    db: &C,
    deployment: Uuid,
    page: u64,
    limit: Option<u64>,
) -> Result<Vec<MLogEvent>> {
    ELogEvent::find()
        .filter(CLogEvent::Deployment.eq(deployment))
        .order_by_desc(CLogEvent::Id)
        .paginate(db, log_page_size(limit))
        .fetch_page(page)
        .await
        .context("Failed to query log events")
}

/// Full log of a deployment in publish order.
pub async fn get_log_history<C: ConnectionTrait>(
    db: &C,
    deployment: Uuid,
) -> Result<Vec<MLogEvent>> {
    ELogEvent::find()
        .filter(CLogEvent::Deployment.eq(deployment))
        .order_by_asc(CLogEvent::Id)
        .all(db)
        .await
        .context("Failed to query log events")
}

/// Events published after the event with id `after`, oldest first.
pub async fn get_log_events_after<C: ConnectionTrait>(
    db: &C,
    deployment: Uuid,
    after: i64,
) -> Result<Vec<MLogEvent>> {
    ELogEvent::find()
        .filter(CLogEvent::Deployment.eq(deployment))
        .filter(CLogEvent::Id.gt(after))
        .order_by_asc(CLogEvent::Id)
        .all(db)
        .await
        .context("Failed to query log events")
}

/// Applies a single event to a deployment's status. Writes only when the
/// status changes; terminal deployments are never touched. Returns the
/// resulting status.
pub async fn update_deployment_status<C: ConnectionTrait>(
    db: &C,
    deployment: MDeployment,
    kind: LogKind,
) -> Result<DeploymentStatus> {
    let next = transition(deployment.status, kind);

    if next == deployment.status {
        return Ok(next);
    }

    let mut adeployment: ADeployment = deployment.into();
    adeployment.status = Set(next);
    adeployment.updated_at = Set(Utc::now().naive_utc());
    adeployment
        .update(db)
        .await
        .context("Failed to update deployment status")?;

    Ok(next)
}
