/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // sqlite only takes one column per ALTER TABLE
        manager
            .alter_table(
                Table::alter()
                    .table(Deployment::Table)
                    .add_column(ColumnDef::new(Deployment::ClaimedBy).uuid().null())
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(Deployment::Table)
                    .add_column(ColumnDef::new(Deployment::HeartbeatAt).date_time().null())
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .alter_table(
                Table::alter()
                    .table(Deployment::Table)
                    .drop_column(Deployment::HeartbeatAt)
                    .to_owned(),
            )
            .await?;

        manager
            .alter_table(
                Table::alter()
                    .table(Deployment::Table)
                    .drop_column(Deployment::ClaimedBy)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum Deployment {
    Table,
    ClaimedBy,
    HeartbeatAt,
}
