/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

mod endpoints;
pub mod error;


use axum::Router;
use axum::http::{Method, header};
use axum::routing::{get, post};
use shipyard_core::types::ServerState;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub fn router(state: Arc<ServerState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    Router::new()
        .route("/api/health", get(endpoints::get_health))
        .route("/api/deploy", post(endpoints::deploy::post_deploy))
        .route("/api/project", post(endpoints::projects::post_project))
        .route(
            "/api/project/{project}",
            get(endpoints::projects::get_project).patch(endpoints::projects::patch_project),
        )
        .route(
            "/api/project/{project}/deployments",
            get(endpoints::projects::get_project_deployments),
        )
        .route(
            "/api/deployment/{deployment}",
            get(endpoints::deployments::get_deployment),
        )
        .route(
            "/api/deployment/{deployment}/logs",
            get(endpoints::deployments::get_deployment_logs),
        )
        .route(
            "/api/deployment/{deployment}/logs/stream",
            get(endpoints::deployments::get_deployment_logs_stream),
        )
        .route(
            "/api/deployment/{deployment}/logs/live",
            get(endpoints::deployments::get_deployment_logs_live),
        )
        .route("/artifacts/{*key}", get(endpoints::artifacts::get_artifact))
        .fallback(endpoints::handle_404)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve_web(state: Arc<ServerState>) -> std::io::Result<()> {
    let server_url = format!("{}:{}", state.cli.ip, state.cli.port);
    let app = router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(&server_url).await?;
    info!(address = %server_url, "Serving API");

    let shutdown = state.shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
