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
        manager
            .create_table(
                Table::create()
                    .table(LogEvent::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(LogEvent::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(LogEvent::Deployment).uuid().not_null())
                    .col(ColumnDef::new(LogEvent::Project).uuid().not_null())
                    .col(ColumnDef::new(LogEvent::Kind).small_integer().not_null())
                    .col(ColumnDef::new(LogEvent::Text).text().not_null())
                    .col(ColumnDef::new(LogEvent::CreatedAt).date_time().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-log_event-deployment")
                            .from(LogEvent::Table, LogEvent::Deployment)
                            .to(Deployment::Table, Deployment::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-log_event-deployment")
                    .table(LogEvent::Table)
                    .col(LogEvent::Deployment)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LogEvent::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum LogEvent {
    Table,
    Id,
    Deployment,
    Project,
    Kind,
    Text,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Deployment {
    Table,
    Id,
}
