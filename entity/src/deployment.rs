/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use chrono::NaiveDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, DeriveActiveEnum, EnumIter, Deserialize, Serialize)]
#[sea_orm(rs_type = "i16", db_type = "SmallInteger")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    #[sea_orm(num_value = 0)]
    Queued,
    #[sea_orm(num_value = 1)]
    InProgress,
    #[sea_orm(num_value = 2)]
    Completed,
    #[sea_orm(num_value = 3)]
    Failed,
}

impl DeploymentStatus {
    /// `Completed` and `Failed` never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentStatus::Completed | DeploymentStatus::Failed)
    }

    pub fn is_in_flight(&self) -> bool {
        !self.is_terminal()
    }

    /// Position in the lifecycle. Both terminal states share the last rank.
    pub fn rank(&self) -> u8 {
        match self {
            DeploymentStatus::Queued => 0,
            DeploymentStatus::InProgress => 1,
            DeploymentStatus::Completed | DeploymentStatus::Failed => 2,
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeploymentStatus::Queued => "QUEUED",
            DeploymentStatus::InProgress => "IN_PROGRESS",
            DeploymentStatus::Completed => "COMPLETED",
            DeploymentStatus::Failed => "FAILED",
        };

        write!(f, "{}", s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "deployment")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub project: Uuid,
    pub status: DeploymentStatus,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
    /// Process currently working on the deployment.
    pub claimed_by: Option<Uuid>,
    /// Last time the claiming process reported progress. A deployment whose
    /// heartbeat is older than the lease timeout is considered abandoned.
    pub heartbeat_at: Option<NaiveDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::Project",
        to = "super::project::Column::Id"
    )]
    Project,
    #[sea_orm(has_many = "super::log_event::Entity")]
    LogEvent,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl Related<super::log_event::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::LogEvent.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
