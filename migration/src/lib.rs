/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub use sea_orm_migration::prelude::*;

mod m20260101_000001_create_table_project;
mod m20260101_000002_create_table_deployment;
mod m20260101_000003_create_table_log_event;
mod m20260101_000004_create_table_job;
mod m20260101_000005_create_table_status_snapshot;
mod m20260101_000006_add_claim_to_deployment;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20260101_000001_create_table_project::Migration),
            Box::new(m20260101_000002_create_table_deployment::Migration),
            Box::new(m20260101_000003_create_table_log_event::Migration),
            Box::new(m20260101_000004_create_table_job::Migration),
            Box::new(m20260101_000005_create_table_status_snapshot::Migration),
            Box::new(m20260101_000006_add_claim_to_deployment::Migration),
        ]
    }
}
