/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

pub mod error;
pub mod forward;
pub mod pages;
pub mod resolver;
pub mod rewrite;


use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use http::header;
use shipyard_core::types::ServerState;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use crate::error::ProxyResult;
use crate::forward::forward;
use crate::resolver::{Resolution, resolve};

pub struct ProxyState {
    pub server: Arc<ServerState>,
    pub client: reqwest::Client,
}

fn request_host(request: &Request) -> String {
    request
        .headers()
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or_default()
        .to_string()
}

#[instrument(skip_all, fields(host = %host, path = %request.uri().path()))]
async fn handle(proxy: &ProxyState, host: String, request: Request) -> ProxyResult<Response> {
    match resolve(&proxy.server, &host, request.uri().path()).await? {
        Resolution::NotFound => Ok(pages::not_found()),
        Resolution::Unavailable => Ok(pages::unavailable()),
        Resolution::Upstream { url, .. } => forward(&proxy.client, &url, &host, request).await,
    }
}

async fn proxy_request(State(proxy): State<Arc<ProxyState>>, request: Request) -> Response {
    let host = request_host(&request);

    match handle(&proxy, host, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

pub fn router(state: Arc<ServerState>) -> Result<Router> {
    let client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("Failed to create HTTP client")?;

    let proxy = Arc::new(ProxyState {
        server: state,
        client,
    });

    Ok(Router::new()
        .fallback(proxy_request)
        .layer(TraceLayer::new_for_http())
        .with_state(proxy))
}

pub async fn serve_proxy(state: Arc<ServerState>) -> Result<()> {
    let proxy_url = format!("{}:{}", state.cli.proxy_ip, state.cli.proxy_port);
    let app = router(Arc::clone(&state))?;

    let listener = tokio::net::TcpListener::bind(&proxy_url)
        .await
        .with_context(|| format!("Failed to bind proxy to {}", proxy_url))?;
    info!(address = %proxy_url, "Serving sites");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Proxy server failed")
}
