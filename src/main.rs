/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use clap::Parser;
use shipyard_core::init_state;
use shipyard_core::types::{Cli, LogFormat, ServerState};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn init_tracing(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("Invalid log level")?;

    match cli.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Text => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init(),
    }
    .context("Failed to initialize logging")
}

async fn wait_for_shutdown(state: Arc<ServerState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        return;
    }

    info!("Shutting down");
    state.shutdown.cancel();
}

#[tokio::main]
pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let state = init_state(cli).await?;

    let workers = if state.cli.disable_builder {
        Vec::new()
    } else {
        builder::start_builder(Arc::clone(&state))
    };

    let proxy = (!state.cli.disable_proxy).then(|| {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            if let Err(e) = proxy::serve_proxy(Arc::clone(&state)).await {
                error!(error = %format!("{:#}", e), "Proxy stopped");
                state.shutdown.cancel();
            }
        })
    });

    tokio::spawn(wait_for_shutdown(Arc::clone(&state)));

    let served = web::serve_web(Arc::clone(&state))
        .await
        .context("API server failed");
    state.shutdown.cancel();

    if let Some(proxy) = proxy {
        proxy.await.context("Proxy task panicked")?;
    }

    for worker in workers {
        if let Err(e) = worker.await {
            error!(error = %e, "Build worker panicked");
        }
    }

    served
}
