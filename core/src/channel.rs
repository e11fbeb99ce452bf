/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use entity::log_event::LogKind;
use futures::StreamExt;
use futures::stream::BoxStream;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

use super::consts::{LOG_CHANNEL_CAPACITY, LOG_CHANNEL_PREFIX};
use super::database::{get_log_events_after, update_deployment_status};
use super::types::*;

/// A single build log event as seen by live subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogMessage {
    /// Sequence id of the persisted event.
    pub sequence: i64,
    pub text: String,
    pub deployment_id: Uuid,
    pub project_id: Uuid,
    pub kind: LogKind,
}

impl LogMessage {
    pub fn channel(&self) -> String {
        channel_name(self.deployment_id)
    }
}

impl From<MLogEvent> for LogMessage {
    fn from(event: MLogEvent) -> Self {
        Self {
            sequence: event.id,
            text: event.text,
            deployment_id: event.deployment,
            project_id: event.project,
            kind: event.kind,
        }
    }
}

pub fn channel_name(deployment: Uuid) -> String {
    format!("{}{}", LOG_CHANNEL_PREFIX, deployment)
}

/// Exact match, or prefix match when the pattern ends with `*`.
pub fn matches_pattern(pattern: &str, channel: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => channel.starts_with(prefix),
        None => pattern == channel,
    }
}

/// The subscriber fell behind and the channel dropped messages meant for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Log subscriber lagged behind by {0} messages")]
pub struct Lagged(pub u64);

pub type LogStream = BoxStream<'static, Result<LogMessage, Lagged>>;

#[async_trait]
pub trait LogChannel: Send + Sync {
    async fn publish(&self, message: LogMessage) -> Result<()>;
    /// The subscription is registered before this returns; messages published
    /// afterwards are delivered in publish order. Dropped messages show up as
    /// a single `Err(Lagged)` in their place.
    async fn subscribe(&self, pattern: &str) -> Result<LogStream>;
}

pub struct BroadcastChannel {
    sender: broadcast::Sender<LogMessage>,
}

impl BroadcastChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastChannel {
    fn default() -> Self {
        Self::new(LOG_CHANNEL_CAPACITY)
    }
}

#[async_trait]
impl LogChannel for BroadcastChannel {
    async fn publish(&self, message: LogMessage) -> Result<()> {
        // no receivers is fine, nobody is watching this deployment
        if let Ok(receivers) = self.sender.send(message) {
            debug!(receivers, "Published log message");
        }

        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<LogStream> {
        let mut receiver = self.sender.subscribe();
        let pattern = pattern.to_string();

        let stream = async_stream::stream! {
            loop {
                match receiver.recv().await {
                    Ok(message) => {
                        if matches_pattern(&pattern, &message.channel()) {
                            yield Ok(message);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, pattern = %pattern, "Log subscriber lagged behind");
                        yield Err(Lagged(skipped));
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Live events of one deployment published after the event `after`, ending
/// with its final event or on shutdown. Events the subscription dropped are
/// read back from the database, so the output has neither gaps nor
/// duplicates.
pub fn follow_logs(
    state: Arc<ServerState>,
    deployment: Uuid,
    mut live: LogStream,
    after: i64,
) -> BoxStream<'static, LogMessage> {
    let stream = async_stream::stream! {
        let mut last = after;

        loop {
            let item = tokio::select! {
                _ = state.shutdown.cancelled() => break,
                item = live.next() => item,
            };

            let Some(item) = item else {
                break;
            };

            let messages = match item {
                Ok(message) => vec![message],
                Err(Lagged(skipped)) => {
                    debug!(
                        skipped,
                        deployment_id = %deployment,
                        after = last,
                        "Catching up from log history"
                    );

                    match get_log_events_after(&state.db, deployment, last).await {
                        Ok(events) => events.into_iter().map(LogMessage::from).collect(),
                        Err(e) => {
                            warn!(
                                error = %format!("{:#}", e),
                                deployment_id = %deployment,
                                "Failed to catch up log history"
                            );
                            break;
                        }
                    }
                }
            };

            let mut done = false;
            for message in messages {
                if message.sequence <= last {
                    continue;
                }

                last = message.sequence;
                done = message.kind.is_final();
                yield message;

                if done {
                    break;
                }
            }

            if done {
                break;
            }
        }
    };

    Box::pin(stream)
}

/// Persists a log event, advances the deployment status and publishes the
/// event on the deployment's channel.
pub async fn record_event(
    state: &ServerState,
    deployment_id: Uuid,
    project_id: Uuid,
    kind: LogKind,
    text: impl Into<String>,
) -> Result<MLogEvent> {
    let now = Utc::now().naive_utc();
    let txn = state.db.begin().await.context("Failed to begin transaction")?;

    let alog_event = ALogEvent {
        id: sea_orm::ActiveValue::NotSet,
        deployment: Set(deployment_id),
        project: Set(project_id),
        kind: Set(kind),
        text: Set(text.into()),
        created_at: Set(now),
    };

    let event = alog_event
        .insert(&txn)
        .await
        .context("Failed to insert log event")?;

    let deployment = EDeployment::find_by_id(deployment_id)
        .one(&txn)
        .await
        .context("Failed to query deployment")?
        .with_context(|| format!("Deployment {} not found", deployment_id))?;

    let previous = deployment.status;
    let next = update_deployment_status(&txn, deployment, kind).await?;

    if next != previous {
        debug!(
            deployment_id = %deployment_id,
            from = %previous,
            to = %next,
            "Updated deployment status"
        );
    }

    txn.commit().await.context("Failed to commit log event")?;

    state
        .channel
        .publish(LogMessage::from(event.clone()))
        .await
        .context("Failed to publish log event")?;

    Ok(event)
}
