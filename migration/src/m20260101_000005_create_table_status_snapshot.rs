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
                    .table(StatusSnapshot::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StatusSnapshot::Deployment)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StatusSnapshot::Stage).string().not_null())
                    .col(
                        ColumnDef::new(StatusSnapshot::UpdatedAt)
                            .date_time()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StatusSnapshot::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StatusSnapshot {
    Table,
    Deployment,
    Stage,
    UpdatedAt,
}
