//! Background task queue: periodic incremental syncs plus work queued by
//! the HTTP API, run one at a time with bounded retries.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use hubsync_engine::{Backfill, BackfillOptions, SyncEngine, SyncError, SyncMode};
use hubsync_remote::RetryPolicy;

const QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncTask {
    Sync(SyncMode),
    ChatMessages(String),
    Backfill(BackfillOptions),
    Shutdown,
}

#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SyncTask>,
}

impl SchedulerHandle {
    /// Queue a task. Returns `false` if the queue is full or closed.
    pub fn enqueue(&self, task: SyncTask) -> bool {
        match self.tx.try_send(task) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "sync task not queued");
                false
            }
        }
    }
}

impl SchedulerHandle {
    /// Ask the loop to stop after the task in flight, waiting for queue
    /// space if needed.
    pub async fn shutdown(&self) {
        if self.tx.send(SyncTask::Shutdown).await.is_err() {
            debug!("scheduler already stopped");
        }
    }
}

/// A handle and the receiving end of a fresh task queue.
pub(crate) fn channel() -> (SchedulerHandle, mpsc::Receiver<SyncTask>) {
    let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
    (SchedulerHandle { tx }, rx)
}

/// Run `op` until `should_retry` rejects its result or `policy` runs out
/// of attempts, sleeping with exponential backoff in between.
pub async fn retry_with_backoff<F, Fut, T, R>(task: &str, policy: &RetryPolicy, mut op: F, should_retry: R) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    R: Fn(&T) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let result = op().await;
        if attempt >= max_attempts || !should_retry(&result) {
            return result;
        }
        let delay = policy.backoff(attempt);
        warn!(task, attempt, max_attempts, delay_ms = delay.as_millis() as u64, "task failed, retrying");
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Worth retrying: the hub answered with a transient error. Unavailability
/// waits for the next scheduled run instead.
fn is_transient(err: &SyncError) -> bool {
    matches!(err, SyncError::Remote(e) if e.is_retryable() && !e.is_unavailable())
}

pub struct Scheduler {
    engine: SyncEngine,
    backfill: Backfill,
    interval: Duration,
    retry: RetryPolicy,
}

impl Scheduler {
    pub fn new(engine: SyncEngine, interval: Duration, retry: RetryPolicy) -> Self {
        Self {
            backfill: Backfill::new(engine.clone()),
            engine,
            interval,
            retry,
        }
    }

    /// Start the scheduler loop. The first incremental sync runs
    /// immediately.
    pub fn spawn(self) -> (SchedulerHandle, JoinHandle<()>) {
        let (handle, mut rx) = channel();

        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.dispatch(SyncTask::Sync(SyncMode::Incremental)).await;
                    }
                    task = rx.recv() => {
                        match task {
                            Some(SyncTask::Shutdown) | None => {
                                info!("scheduler stopped");
                                break;
                            }
                            Some(task) => self.dispatch(task).await,
                        }
                    }
                }
            }
        });

        (handle, join)
    }

    pub async fn dispatch(&self, task: SyncTask) {
        debug!(?task, "dispatching sync task");
        match task {
            SyncTask::Sync(mode) => {
                let report = retry_with_backoff(
                    "sync",
                    &self.retry,
                    || self.engine.run_sync(mode),
                    |report| !report.skipped && report.outcome.is_failed(),
                )
                .await;
                debug!(run_id = %report.run_id, skipped = report.skipped, outcome = ?report.outcome, "scheduled sync done");
            }
            SyncTask::ChatMessages(chat_id) => {
                let result = retry_with_backoff(
                    "chat messages",
                    &self.retry,
                    || self.engine.sync_chat_messages(&chat_id),
                    |result| result.as_ref().is_err_and(is_transient),
                )
                .await;
                if let Err(err) = result {
                    warn!(chat_id, error = %err, "chat message refresh failed");
                }
            }
            SyncTask::Backfill(options) => {
                let report = retry_with_backoff(
                    "backfill",
                    &self.retry,
                    || self.backfill.run(options.clone()),
                    |report| !report.skipped && !report.stopped && report.outcome.is_failed(),
                )
                .await;
                debug!(run_id = %report.run_id, outcome = ?report.outcome, "scheduled backfill done");
            }
            SyncTask::Shutdown => {}
        }
    }
}
