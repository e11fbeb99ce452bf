/*
 * SPDX-FileCopyrightText: 2026 Wavelens GmbH <info@wavelens.io>
 *
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::{LockBehavior, LockType, OnConflict};
use sea_orm::{
    ActiveValue::{NotSet, Set},
    ColumnTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, TransactionTrait,
};
use std::collections::{HashMap, VecDeque};
use std::pin::pin;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time;
use tracing::{debug, warn};
use uuid::Uuid;

use super::lease::touch_deployment;
use super::types::*;

/// FIFO of deployment ids waiting for a build worker. Each id is handed to
/// exactly one consumer; a job lost after `dequeue` is not redelivered.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(&self, deployment: Uuid) -> Result<()>;
    /// Blocks until a job is available.
    async fn dequeue(&self) -> Result<Uuid>;
    async fn contains(&self, deployment: Uuid) -> Result<bool>;
    async fn pending(&self) -> Result<u64>;
    async fn set_snapshot(&self, deployment: Uuid, stage: &str) -> Result<()>;
    async fn snapshot(&self, deployment: Uuid) -> Result<Option<String>>;
}

/// Writes a status snapshot, logging instead of failing. Snapshots are
/// informational; the deployment status lives in the database.
pub async fn record_snapshot(queue: &dyn WorkQueue, deployment: Uuid, stage: &str) {
    if let Err(e) = queue.set_snapshot(deployment, stage).await {
        warn!(
            deployment_id = %deployment,
            stage,
            error = %format!("{:#}", e),
            "Failed to write status snapshot"
        );
    }
}

#[derive(Default)]
pub struct MemoryQueue {
    jobs: Mutex<VecDeque<Uuid>>,
    snapshots: Mutex<HashMap<Uuid, String>>,
    notify: Notify,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl WorkQueue for MemoryQueue {
    async fn enqueue(&self, deployment: Uuid) -> Result<()> {
        self.jobs.lock().await.push_back(deployment);
        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Result<Uuid> {
        loop {
            // registered before the check so an enqueue in between is not missed
            let notified = self.notify.notified();
            let mut notified = pin!(notified);
            notified.as_mut().enable();

            if let Some(deployment) = self.jobs.lock().await.pop_front() {
                return Ok(deployment);
            }

            notified.await;
        }
    }

    async fn contains(&self, deployment: Uuid) -> Result<bool> {
        Ok(self.jobs.lock().await.contains(&deployment))
    }

    async fn pending(&self) -> Result<u64> {
        Ok(self.jobs.lock().await.len() as u64)
    }

    async fn set_snapshot(&self, deployment: Uuid, stage: &str) -> Result<()> {
        self.snapshots
            .lock()
            .await
            .insert(deployment, stage.to_string());
        Ok(())
    }

    async fn snapshot(&self, deployment: Uuid) -> Result<Option<String>> {
        Ok(self.snapshots.lock().await.get(&deployment).cloned())
    }
}

/// Jobs stored as rows of the `job` table.
pub struct DatabaseQueue {
    db: DatabaseConnection,
    notify: Notify,
    poll_interval: Duration,
}

impl DatabaseQueue {
    pub fn new(db: DatabaseConnection, poll_interval: Duration) -> Self {
        Self {
            db,
            notify: Notify::new(),
            poll_interval,
        }
    }

    async fn try_pop(&self) -> Result<Option<Uuid>> {
        loop {
            let txn = self.db.begin().await.context("Failed to begin transaction")?;

            let mut query = EJob::find().order_by_asc(CJob::Id);
            if txn.get_database_backend() == DatabaseBackend::Postgres {
                query = query.lock_with_behavior(LockType::Update, LockBehavior::SkipLocked);
            }

            let Some(job) = query.one(&txn).await.context("Failed to query job")? else {
                txn.commit().await.context("Failed to commit transaction")?;
                return Ok(None);
            };

            let result = EJob::delete_by_id(job.id)
                .exec(&txn)
                .await
                .context("Failed to delete job")?;

            // another consumer took it first
            if result.rows_affected == 0 {
                txn.commit().await.context("Failed to commit transaction")?;
                continue;
            }

            // keeps the deployment out of recovery until the worker claims it
            touch_deployment(&txn, job.deployment).await?;
            txn.commit().await.context("Failed to commit transaction")?;

            debug!(deployment_id = %job.deployment, "Dequeued job");
            return Ok(Some(job.deployment));
        }
    }
}

#[async_trait]
impl WorkQueue for DatabaseQueue {
    async fn enqueue(&self, deployment: Uuid) -> Result<()> {
        let ajob = AJob {
            id: NotSet,
            deployment: Set(deployment),
            enqueued_at: Set(Utc::now().naive_utc()),
        };

        EJob::insert(ajob)
            .exec(&self.db)
            .await
            .context("Failed to insert job")?;

        self.notify.notify_one();
        Ok(())
    }

    async fn dequeue(&self) -> Result<Uuid> {
        loop {
            let notified = self.notify.notified();
            let mut notified = pin!(notified);
            notified.as_mut().enable();

            if let Some(deployment) = self.try_pop().await? {
                return Ok(deployment);
            }

            tokio::select! {
                _ = notified => {}
                _ = time::sleep(self.poll_interval) => {}
            }
        }
    }

    async fn contains(&self, deployment: Uuid) -> Result<bool> {
        let count = EJob::find()
            .filter(CJob::Deployment.eq(deployment))
            .count(&self.db)
            .await
            .context("Failed to query job")?;

        Ok(count > 0)
    }

    async fn pending(&self) -> Result<u64> {
        EJob::find()
            .count(&self.db)
            .await
            .context("Failed to count jobs")
    }

    async fn set_snapshot(&self, deployment: Uuid, stage: &str) -> Result<()> {
        let asnapshot = AStatusSnapshot {
            deployment: Set(deployment),
            stage: Set(stage.to_string()),
            updated_at: Set(Utc::now().naive_utc()),
        };

        EStatusSnapshot::insert(asnapshot)
            .on_conflict(
                OnConflict::column(CStatusSnapshot::Deployment)
                    .update_columns([CStatusSnapshot::Stage, CStatusSnapshot::UpdatedAt])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .context("Failed to write status snapshot")?;

        Ok(())
    }

    async fn snapshot(&self, deployment: Uuid) -> Result<Option<String>> {
        let snapshot = EStatusSnapshot::find_by_id(deployment)
            .one(&self.db)
            .await
            .context("Failed to query status snapshot")?;

        Ok(snapshot.map(|s| s.stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_memory_queue_fifo() {
        let queue = MemoryQueue::new();
        let ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];

        for id in ids {
            queue.enqueue(id).await.unwrap();
        }

        assert_eq!(queue.pending().await.unwrap(), 3);
        assert!(queue.contains(ids[1]).await.unwrap());

        for id in ids {
            assert_eq!(queue.dequeue().await.unwrap(), id);
        }

        assert!(!queue.contains(ids[1]).await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_queue_blocks_until_enqueue() {
        let queue = Arc::new(MemoryQueue::new());
        let id = Uuid::new_v4();

        let consumer = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.dequeue().await.unwrap() }
        });

        tokio::task::yield_now().await;
        queue.enqueue(id).await.unwrap();

        assert_eq!(consumer.await.unwrap(), id);
    }

    #[tokio::test]
    async fn test_memory_queue_each_job_once() {
        let queue = Arc::new(MemoryQueue::new());
        let mut consumers = Vec::new();

        for _ in 0..4 {
            let queue = Arc::clone(&queue);
            consumers.push(tokio::spawn(async move { queue.dequeue().await.unwrap() }));
        }

        let mut ids = (0..4).map(|_| Uuid::new_v4()).collect::<Vec<Uuid>>();
        for id in &ids {
            queue.enqueue(*id).await.unwrap();
        }

        let mut received = Vec::new();
        for consumer in consumers {
            received.push(consumer.await.unwrap());
        }

        ids.sort();
        received.sort();
        assert_eq!(ids, received);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_memory_queue_no_lost_wakeups() {
        let queue = Arc::new(MemoryQueue::new());

        for _ in 0..200 {
            let consumers = (0..4)
                .map(|_| {
                    let queue = Arc::clone(&queue);
                    tokio::spawn(async move { queue.dequeue().await.unwrap() })
                })
                .collect::<Vec<_>>();

            let producer = tokio::spawn({
                let queue = Arc::clone(&queue);
                async move {
                    for _ in 0..4 {
                        queue.enqueue(Uuid::new_v4()).await.unwrap();
                        tokio::task::yield_now().await;
                    }
                }
            });

            producer.await.unwrap();
            for consumer in consumers {
                tokio::time::timeout(Duration::from_secs(5), consumer)
                    .await
                    .expect("consumer missed a wakeup")
                    .unwrap();
            }
        }

        assert_eq!(queue.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_memory_queue_snapshot() {
        let queue = MemoryQueue::new();
        let id = Uuid::new_v4();

        assert_eq!(queue.snapshot(id).await.unwrap(), None);
        queue.set_snapshot(id, "uploaded").await.unwrap();
        queue.set_snapshot(id, "deployed").await.unwrap();
        assert_eq!(queue.snapshot(id).await.unwrap().as_deref(), Some("deployed"));
    }
}
