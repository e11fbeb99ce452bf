/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use chrono::NaiveDateTime;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a log event means for the deployment lifecycle. Build output is
/// always `Line`, whatever its text says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, DeriveActiveEnum, EnumIter, Deserialize, Serialize)]
#[sea_orm(rs_type = "i16", db_type = "SmallInteger")]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    #[sea_orm(num_value = 0)]
    Started,
    #[sea_orm(num_value = 1)]
    Line,
    #[sea_orm(num_value = 2)]
    Failed,
    #[sea_orm(num_value = 3)]
    Completed,
}

impl LogKind {
    /// Nothing is published for a deployment after its final event.
    pub fn is_final(&self) -> bool {
        matches!(self, LogKind::Completed | LogKind::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Deserialize, Serialize)]
#[sea_orm(table_name = "log_event")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub deployment: Uuid,
    pub project: Uuid,
    pub kind: LogKind,
    #[sea_orm(column_type = "Text")]
    pub text: String,
    pub created_at: NaiveDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::deployment::Entity",
        from = "Column::Deployment",
        to = "super::deployment::Column::Id"
    )]
    Deployment,
}

impl Related<super::deployment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Deployment.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
