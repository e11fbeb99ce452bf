/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::error::{WebError, WebResult};
use async_stream::stream;
use axum::Json;
use axum::extract::rejection::QueryRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum_streams::StreamBodyAs;
use entity::deployment::DeploymentStatus;
use futures::{SinkExt, StreamExt};
use sea_orm::EntityTrait;
use serde::{Deserialize, Serialize};
use shipyard_core::channel::{LogMessage, channel_name, follow_logs};
use shipyard_core::database::{get_log_history, get_log_page};
use shipyard_core::status::reduce;
use shipyard_core::types::*;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize, Deserialize, Debug)]
pub struct DeploymentResponse {
    pub id: Uuid,
    pub project: Uuid,
    pub status: DeploymentStatus,
    /// Last stage reported by ingestion or the worker.
    pub stage: Option<String>,
    pub created_at: chrono::NaiveDateTime,
    pub updated_at: chrono::NaiveDateTime,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct LogQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
}

async fn find_deployment(state: &ServerState, deployment_id: Uuid) -> WebResult<MDeployment> {
    EDeployment::find_by_id(deployment_id)
        .one(&state.db)
        .await?
        .ok_or_else(|| WebError::not_found("Deployment"))
}

pub async fn get_deployment(
    state: State<Arc<ServerState>>,
    Path(deployment_id): Path<Uuid>,
) -> WebResult<Json<BaseResponse<DeploymentResponse>>> {
    let deployment = find_deployment(&state, deployment_id).await?;
    let stage = state.queue.snapshot(deployment.id).await?;

    let res = BaseResponse {
        error: false,
        message: DeploymentResponse {
            id: deployment.id,
            project: deployment.project,
            status: deployment.status,
            stage,
            created_at: deployment.created_at,
            updated_at: deployment.updated_at,
        },
    };

    Ok(Json(res))
}

/// One page of the deployment log, newest first.
pub async fn get_deployment_logs(
    state: State<Arc<ServerState>>,
    Path(deployment_id): Path<Uuid>,
    query: Result<Query<LogQuery>, QueryRejection>,
) -> WebResult<Json<BaseResponse<Vec<LogMessage>>>> {
    let Query(query) = query?;
    let deployment = find_deployment(&state, deployment_id).await?;

    let events = get_log_page(
        &state.db,
        deployment.id,
        query.page.unwrap_or_default(),
        query.limit,
    )
    .await?;

    let res = BaseResponse {
        error: false,
        message: events.into_iter().map(LogMessage::from).collect(),
    };

    Ok(Json(res))
}

/// Full history followed by live events, one JSON document per line. Ends
/// after the final event of the deployment.
pub async fn get_deployment_logs_stream(
    state: State<Arc<ServerState>>,
    Path(deployment_id): Path<Uuid>,
) -> WebResult<StreamBodyAs<'static>> {
    let deployment = find_deployment(&state, deployment_id).await?;

    // subscribe before reading the history so no event falls in between
    let live = state
        .channel
        .subscribe(&channel_name(deployment.id))
        .await?;
    let history = get_log_history(&state.db, deployment.id).await?;
    let state = Arc::clone(&state);

    let stream = stream! {
        let last = history.last().map(|e| e.id).unwrap_or_default();
        let finished = reduce(history.iter().map(|e| e.kind)).is_terminal();

        for event in history {
            yield LogMessage::from(event);
        }

        if !finished {
            let mut follow = follow_logs(state, deployment.id, live, last);

            while let Some(message) = follow.next().await {
                yield message;
            }
        }
    };

    Ok(StreamBodyAs::json_nl(stream))
}

pub async fn get_deployment_logs_live(
    state: State<Arc<ServerState>>,
    Path(deployment_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> WebResult<Response> {
    let deployment = find_deployment(&state, deployment_id).await?;
    let state = Arc::clone(&state);

    Ok(ws.on_upgrade(move |socket| forward_logs(socket, state, deployment)))
}

/// Forwards live log events of one deployment to a WebSocket until the
/// deployment finishes, the client leaves or pings go unanswered.
async fn forward_logs(socket: WebSocket, state: Arc<ServerState>, deployment: MDeployment) {
    let (mut sender, mut receiver) = socket.split();

    let live = match state.channel.subscribe(&channel_name(deployment.id)).await {
        Ok(live) => live,
        Err(e) => {
            warn!(error = %e, deployment_id = %deployment.id, "Failed to subscribe to logs");
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    // nothing more will be published for a finished deployment; events
    // recorded before subscribing are not repeated
    let history = match get_log_history(&state.db, deployment.id).await {
        Ok(history) => history,
        Err(e) => {
            warn!(
                error = %format!("{:#}", e),
                deployment_id = %deployment.id,
                "Failed to query log history"
            );
            let _ = sender.send(Message::Close(None)).await;
            return;
        }
    };

    if reduce(history.iter().map(|e| e.kind)).is_terminal() {
        let _ = sender.send(Message::Close(None)).await;
        return;
    }

    let last = history.last().map(|e| e.id).unwrap_or_default();
    let mut live = follow_logs(Arc::clone(&state), deployment.id, live, last);

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = state.shutdown.cancelled() => break,
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    debug!(deployment_id = %deployment.id, "Log subscriber timed out");
                    break;
                }

                if sender.send(Message::Ping(Default::default())).await.is_err() {
                    break;
                }

                awaiting_pong = true;
            }
            message = live.next() => {
                let Some(message) = message else {
                    break;
                };

                let json = match serde_json::to_string(&message) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize log message");
                        continue;
                    }
                };

                if sender.send(Message::Text(json.into())).await.is_err() {
                    break;
                }

                if message.kind.is_final() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}
