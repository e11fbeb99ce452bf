/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use super::channel::LogChannel;
use super::input::{greater_than_zero, port_in_range};
use super::queue::WorkQueue;
use super::sources::SourceFetcher;
use super::storage::ArtifactStore;
use clap::{Parser, ValueEnum};
use entity::*;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum QueueBackend {
    Database,
    Memory,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "Shipyard", display_name = "Shipyard", bin_name = "shipyard", author = "Wavelens", version, about, long_about = None)]
pub struct Cli {
    #[arg(long, env = "SHIPYARD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
    #[arg(long, env = "SHIPYARD_LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,
    #[arg(long, env = "SHIPYARD_IP", default_value = "127.0.0.1")]
    pub ip: String,
    #[arg(long, env = "SHIPYARD_PORT", value_parser = port_in_range, default_value_t = 3000)]
    pub port: u16,
    #[arg(long, env = "SHIPYARD_PROXY_IP", default_value = "127.0.0.1")]
    pub proxy_ip: String,
    #[arg(long, env = "SHIPYARD_PROXY_PORT", value_parser = port_in_range, default_value_t = 8080)]
    pub proxy_port: u16,
    /// Platform domain; sites are served at `<subdomain>.<domain>`.
    #[arg(long, env = "SHIPYARD_DOMAIN")]
    pub domain: Option<String>,
    #[arg(long, env = "SHIPYARD_SITE_SCHEME", default_value = "http")]
    pub site_scheme: String,
    /// Base URL the proxy forwards to; `<artifact_url>/<deployment id>/<path>`.
    #[arg(
        long,
        env = "SHIPYARD_ARTIFACT_URL",
        default_value = "http://127.0.0.1:3000/artifacts"
    )]
    pub artifact_url: String,
    #[arg(long, env = "SHIPYARD_DATABASE_URL")]
    pub database_url: Option<String>,
    #[arg(long, env = "SHIPYARD_DATABASE_URL_FILE")]
    pub database_url_file: Option<String>,
    #[arg(long, env = "SHIPYARD_BASE_PATH", default_value = ".")]
    pub base_path: String,
    #[arg(long, env = "SHIPYARD_WORKERS", value_parser = greater_than_zero::<usize>, default_value = "1")]
    pub workers: usize,
    #[arg(long, env = "SHIPYARD_QUEUE", value_enum, default_value = "database")]
    pub queue: QueueBackend,
    #[arg(long, env = "SHIPYARD_QUEUE_POLL_INTERVAL", value_parser = greater_than_zero::<u64>, default_value = "5")]
    pub queue_poll_interval: u64,
    /// Seconds without a heartbeat after which an in-flight deployment is
    /// considered abandoned and failed by the recovery sweep.
    #[arg(long, env = "SHIPYARD_LEASE_TIMEOUT", value_parser = greater_than_zero::<u64>, default_value = "300")]
    pub lease_timeout: u64,
    #[arg(
        long,
        env = "SHIPYARD_BUILD_COMMAND",
        default_value = "npm install && npm run build"
    )]
    pub build_command: String,
    #[arg(long, env = "SHIPYARD_OUTPUT_DIR", default_value = "dist")]
    pub output_dir: String,
    #[arg(long, env = "SHIPYARD_BINPATH_GIT", default_value = "git")]
    pub binpath_git: String,
    #[arg(long, env = "SHIPYARD_BINPATH_SHELL", default_value = "sh")]
    pub binpath_shell: String,
    #[arg(long, env = "SHIPYARD_REPORT_ERRORS", default_value = "false")]
    pub report_errors: bool,
    /// Sentry DSN used when `--report-errors` is set.
    #[arg(long, env = "SHIPYARD_SENTRY_DSN")]
    pub sentry_dsn: Option<String>,
    #[arg(long, env = "SHIPYARD_DISABLE_BUILDER", default_value = "false")]
    pub disable_builder: bool,
    #[arg(long, env = "SHIPYARD_DISABLE_PROXY", default_value = "false")]
    pub disable_proxy: bool,
}

impl Cli {
    pub fn artifacts_path(&self) -> PathBuf {
        PathBuf::from(&self.base_path).join("artifacts")
    }

    pub fn scratch_path(&self) -> PathBuf {
        PathBuf::from(&self.base_path).join("scratch")
    }

    pub fn ingest_path(&self) -> PathBuf {
        PathBuf::from(&self.base_path).join("ingest")
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_timeout)
    }

    pub fn site_url(&self, subdomain: &str) -> String {
        let domain = self.domain.as_deref().unwrap_or("localhost");
        format!("{}://{}.{}", self.site_scheme, subdomain, domain)
    }
}

/// Process-wide handles. Every collaborator is injected so tests can swap in
/// in-memory implementations.
pub struct ServerState {
    pub db: DatabaseConnection,
    pub cli: Cli,
    /// Identifies this process in deployment claims.
    pub instance: Uuid,
    pub queue: Arc<dyn WorkQueue>,
    pub channel: Arc<dyn LogChannel>,
    pub store: Arc<dyn ArtifactStore>,
    pub fetcher: Arc<dyn SourceFetcher>,
    pub shutdown: CancellationToken,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct BaseResponse<T> {
    pub error: bool,
    pub message: T,
}

pub type EDeployment = deployment::Entity;
pub type EJob = job::Entity;
pub type ELogEvent = log_event::Entity;
pub type EProject = project::Entity;
pub type EStatusSnapshot = status_snapshot::Entity;

pub type MDeployment = deployment::Model;
pub type MJob = job::Model;
pub type MLogEvent = log_event::Model;
pub type MProject = project::Model;
pub type MStatusSnapshot = status_snapshot::Model;

pub type ADeployment = deployment::ActiveModel;
pub type AJob = job::ActiveModel;
pub type ALogEvent = log_event::ActiveModel;
pub type AProject = project::ActiveModel;
pub type AStatusSnapshot = status_snapshot::ActiveModel;

pub type CDeployment = deployment::Column;
pub type CJob = job::Column;
pub type CLogEvent = log_event::Column;
pub type CProject = project::Column;
pub type CStatusSnapshot = status_snapshot::Column;
