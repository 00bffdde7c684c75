//! Persistent job scheduling.
//!
//! Every autonomous behavior (identity reclamation, audit retention)
//! runs through the scheduler. One-shot jobs are persisted in the
//! key-value store under `job/once/...` keys with no TTL, so a job
//! that comes due while the process is down still fires, at or after
//! its due time, on the first tick after restart. Recurring jobs are
//! re-registered in memory at startup and carry no persistent state.
//!
//! Handlers are registered explicitly by name at startup; there is no
//! name-based discovery. Execution is at-most-once per persisted job:
//! the tick claims a record with an atomic remove-and-return before
//! dispatching, so two concurrent ticks (or two processes over the
//! same store) cannot both run it.
//!
//! Job failures are logged and never crash the tick loop.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sudogate_storage::{prefix_range, KeyValueStore, StorageError};
use tokio::{select, sync::watch, time::sleep};

use crate::SudoResult;

/// Storage key prefix for persisted one-shot jobs.
const ONCE_PREFIX: &str = "job/once/";

/// Executes one kind of scheduled job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Runs the job with its persisted payload (recurring jobs receive
    /// `Value::Null`).
    async fn run(&self, payload: serde_json::Value) -> SudoResult<()>;
}

/// Scheduling capability handed to components that register future work.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Persists a one-shot job to fire at or after `due`.
    async fn schedule_once(
        &self,
        due: DateTime<Utc>,
        job: &str,
        payload: serde_json::Value,
    ) -> SudoResult<()>;

    /// Registers a recurring job firing every `interval`, first run one
    /// interval from now. In-memory only; re-register at startup.
    async fn schedule_recurring(&self, interval: Duration, job: &str) -> SudoResult<()>;

    /// Removes every pending one-shot record and recurring registration
    /// for `job`.
    async fn cancel(&self, job: &str) -> SudoResult<()>;
}

/// Persisted one-shot job record.
#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    job: String,
    due: DateTime<Utc>,
    payload: serde_json::Value,
}

struct RecurringEntry {
    job: String,
    interval: Duration,
    next_due: Instant,
}

/// Stops the tick loop when the last scheduler clone is dropped.
struct ShutdownGuard {
    shutdown_tx: watch::Sender<()>,
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Scheduler persisting one-shot jobs in the key-value store.
///
/// # Cloning
///
/// Cheaply cloneable; clones share handlers, recurring registrations,
/// and the shutdown signal.
///
/// # Lifecycle
///
/// Register handlers first, then call [`start`](Self::start) to spawn
/// the once-a-second tick loop. Tests drive ticks deterministically via
/// [`run_pending`](Self::run_pending) instead.
#[derive(Clone)]
pub struct StoreScheduler {
    store: Arc<dyn KeyValueStore>,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn JobHandler>>>>,
    recurring: Arc<RwLock<Vec<RecurringEntry>>>,
    started: Arc<AtomicBool>,
    shutdown_guard: Arc<ShutdownGuard>,
    shutdown_rx: watch::Receiver<()>,
}

impl StoreScheduler {
    /// Creates a scheduler over the given store. Does not spawn anything.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        Self {
            store,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            recurring: Arc::new(RwLock::new(Vec::new())),
            started: Arc::new(AtomicBool::new(false)),
            shutdown_guard: Arc::new(ShutdownGuard { shutdown_tx }),
            shutdown_rx,
        }
    }

    /// Registers the handler dispatched for jobs named `job`.
    pub fn register(&self, job: &str, handler: Arc<dyn JobHandler>) {
        self.handlers.write().insert(job.to_owned(), handler);
    }

    /// Spawns the tick loop. Subsequent calls are no-ops.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let scheduler = self.clone();
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                select! {
                    _ = sleep(Duration::from_secs(1)) => {}
                    _ = shutdown_rx.changed() => {
                        return;
                    }
                }

                if let Err(error) = scheduler.run_pending().await {
                    tracing::warn!(%error, "scheduler tick failed");
                }
            }
        });
    }

    /// Stops the tick loop explicitly. Dropping all clones has the same
    /// effect.
    pub fn shutdown(&self) {
        let _ = self.shutdown_guard.shutdown_tx.send(());
    }

    /// Executes one tick: claims and dispatches every due one-shot job,
    /// then runs due recurring jobs.
    ///
    /// A job with no registered handler is left in place so it survives
    /// until a handler exists (typically after a restart that registers
    /// handlers before starting the loop).
    pub async fn run_pending(&self) -> SudoResult<()> {
        let now = Utc::now();
        let records = self.store.get_range(prefix_range(ONCE_PREFIX.as_bytes())).await?;

        for entry in records {
            let record: JobRecord = match serde_json::from_slice(&entry.value) {
                Ok(record) => record,
                Err(error) => {
                    // Undecodable records would otherwise be retried forever.
                    tracing::warn!(%error, "dropping undecodable job record");
                    self.store.delete(&entry.key).await?;
                    continue;
                }
            };

            // Keys sort by due time, so the first future record ends the scan.
            if record.due > now {
                break;
            }

            let handler = self.handlers.read().get(&record.job).cloned();
            let Some(handler) = handler else {
                tracing::warn!(job = %record.job, "no handler registered; leaving job pending");
                continue;
            };

            // Claim before dispatch: exactly one claimant wins the record.
            if self.store.take(&entry.key).await?.is_none() {
                continue;
            }

            if let Err(error) = handler.run(record.payload).await {
                tracing::warn!(job = %record.job, %error, "scheduled job failed");
            }
        }

        self.run_due_recurring().await;
        Ok(())
    }

    async fn run_due_recurring(&self) {
        let now = Instant::now();
        let due: Vec<String> = {
            let mut recurring = self.recurring.write();
            recurring
                .iter_mut()
                .filter(|entry| entry.next_due <= now)
                .map(|entry| {
                    entry.next_due = now + entry.interval;
                    entry.job.clone()
                })
                .collect()
        };

        for job in due {
            let handler = self.handlers.read().get(&job).cloned();
            match handler {
                Some(handler) => {
                    if let Err(error) = handler.run(serde_json::Value::Null).await {
                        tracing::warn!(%job, %error, "recurring job failed");
                    }
                }
                None => tracing::warn!(%job, "no handler registered for recurring job"),
            }
        }
    }

    /// Number of persisted one-shot jobs still pending.
    pub async fn pending_once(&self) -> SudoResult<usize> {
        Ok(self.store.get_range(prefix_range(ONCE_PREFIX.as_bytes())).await?.len())
    }
}

/// Key layout: `job/once/{due_millis:020}/{nonce}` so a prefix scan
/// yields records in due-time order.
fn once_key(due: DateTime<Utc>) -> Vec<u8> {
    let mut nonce = [0u8; 8];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut nonce);
    format!("{ONCE_PREFIX}{:020}/{}", due.timestamp_millis().max(0), hex::encode(nonce))
        .into_bytes()
}

#[async_trait]
impl Scheduler for StoreScheduler {
    async fn schedule_once(
        &self,
        due: DateTime<Utc>,
        job: &str,
        payload: serde_json::Value,
    ) -> SudoResult<()> {
        let record = JobRecord { job: job.to_owned(), due, payload };
        let value = serde_json::to_vec(&record)
            .map_err(|e| StorageError::serialization_with_source("encoding job record", e))?;
        self.store.set(once_key(due), value).await?;

        tracing::debug!(%job, due = %due.to_rfc3339(), "scheduled one-shot job");
        Ok(())
    }

    async fn schedule_recurring(&self, interval: Duration, job: &str) -> SudoResult<()> {
        let mut recurring = self.recurring.write();
        if recurring.iter().any(|entry| entry.job == job) {
            return Ok(());
        }
        recurring.push(RecurringEntry {
            job: job.to_owned(),
            interval,
            next_due: Instant::now() + interval,
        });
        Ok(())
    }

    async fn cancel(&self, job: &str) -> SudoResult<()> {
        self.recurring.write().retain(|entry| entry.job != job);

        let records = self.store.get_range(prefix_range(ONCE_PREFIX.as_bytes())).await?;
        for entry in records {
            let Ok(record) = serde_json::from_slice::<JobRecord>(&entry.value) else {
                continue;
            };
            if record.job == job {
                self.store.delete(&entry.key).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sudogate_storage::MemoryStore;

    use super::*;

    struct CountingHandler {
        runs: AtomicUsize,
    }

    impl CountingHandler {
        fn new() -> Arc<Self> {
            Arc::new(Self { runs: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl JobHandler for CountingHandler {
        async fn run(&self, _payload: serde_json::Value) -> SudoResult<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl JobHandler for FailingHandler {
        async fn run(&self, _payload: serde_json::Value) -> SudoResult<()> {
            Err(crate::SudoError::InvalidJobPayload("boom".into()))
        }
    }

    fn store() -> Arc<dyn KeyValueStore> {
        Arc::new(MemoryStore::new())
    }

    #[tokio::test]
    async fn test_due_job_fires_once() {
        let scheduler = StoreScheduler::new(store());
        let handler = CountingHandler::new();
        scheduler.register("count", handler.clone());

        scheduler
            .schedule_once(Utc::now() - chrono::Duration::seconds(1), "count", serde_json::json!({}))
            .await
            .unwrap();

        scheduler.run_pending().await.unwrap();
        scheduler.run_pending().await.unwrap();

        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_future_job_does_not_fire_early() {
        let scheduler = StoreScheduler::new(store());
        let handler = CountingHandler::new();
        scheduler.register("count", handler.clone());

        scheduler
            .schedule_once(Utc::now() + chrono::Duration::hours(1), "count", serde_json::json!({}))
            .await
            .unwrap();

        scheduler.run_pending().await.unwrap();
        assert_eq!(handler.runs.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending_once().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_due_job_survives_restart() {
        let shared = store();

        // First process persists the job and exits before it fires.
        {
            let scheduler = StoreScheduler::new(shared.clone());
            scheduler
                .schedule_once(
                    Utc::now() - chrono::Duration::seconds(5),
                    "count",
                    serde_json::json!({"id": 7}),
                )
                .await
                .unwrap();
        }

        // Second process registers the handler and ticks.
        let scheduler = StoreScheduler::new(shared);
        let handler = CountingHandler::new();
        scheduler.register("count", handler.clone());
        scheduler.run_pending().await.unwrap();

        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unhandled_job_is_left_pending() {
        let scheduler = StoreScheduler::new(store());
        scheduler
            .schedule_once(Utc::now() - chrono::Duration::seconds(1), "orphan", serde_json::json!({}))
            .await
            .unwrap();

        scheduler.run_pending().await.unwrap();
        assert_eq!(scheduler.pending_once().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_failing_job_does_not_abort_tick() {
        let scheduler = StoreScheduler::new(store());
        let handler = CountingHandler::new();
        scheduler.register("fail", Arc::new(FailingHandler));
        scheduler.register("count", handler.clone());

        let past = Utc::now() - chrono::Duration::seconds(10);
        scheduler.schedule_once(past, "fail", serde_json::json!({})).await.unwrap();
        scheduler
            .schedule_once(past + chrono::Duration::seconds(1), "count", serde_json::json!({}))
            .await
            .unwrap();

        scheduler.run_pending().await.unwrap();
        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.pending_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_cancel_removes_pending_records() {
        let scheduler = StoreScheduler::new(store());
        scheduler.register("count", CountingHandler::new());

        scheduler
            .schedule_once(Utc::now() + chrono::Duration::hours(1), "count", serde_json::json!({}))
            .await
            .unwrap();
        scheduler
            .schedule_once(Utc::now() + chrono::Duration::hours(2), "other", serde_json::json!({}))
            .await
            .unwrap();

        scheduler.cancel("count").await.unwrap();
        assert_eq!(scheduler.pending_once().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_recurring_fires_after_interval() {
        let scheduler = StoreScheduler::new(store());
        let handler = CountingHandler::new();
        scheduler.register("sweep", handler.clone());

        scheduler.schedule_recurring(Duration::from_millis(50), "sweep").await.unwrap();
        scheduler.run_pending().await.unwrap();
        assert_eq!(handler.runs.load(Ordering::SeqCst), 0, "first run is one interval out");

        sleep(Duration::from_millis(80)).await;
        scheduler.run_pending().await.unwrap();
        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_started_loop_fires_due_job() {
        let scheduler = StoreScheduler::new(store());
        let handler = CountingHandler::new();
        scheduler.register("count", handler.clone());
        scheduler.start();

        scheduler
            .schedule_once(Utc::now(), "count", serde_json::json!({}))
            .await
            .unwrap();

        sleep(Duration::from_millis(1500)).await;
        scheduler.shutdown();
        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
    }
}
