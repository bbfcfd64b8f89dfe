//! Subscription runner: the long-lived loop driving one subscription.
//!
//! ```text
//! Idle -> Starting -> Running -> Stopping -> Stopped
//!            |           |
//!            +-----------+--> Faulted
//! ```
//!
//! Each iteration loads the checkpoint, reads the next batch strictly after
//! it and hands the batch to a [`Checkpointer`]. Cancellation is observed at
//! the top of the loop and while waiting (for new events or between
//! retries), never in the middle of a batch, so a stop always lets the
//! in-flight batch commit or roll back first.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::model::{BatchProcessingOptions, Position};
use crate::outcome::{FailureReason, StoreResult};
use crate::processing::Checkpointer;
use crate::storage::{EventStore, StorageError, SubscriptionLock};
use crate::utils::retry::RetryConfig;

/// Lifecycle state of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
    Faulted,
}

impl RunnerState {
    /// Whether the runner has exited.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Faulted)
    }
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

/// Published on every state change and every committed batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerStatus {
    pub state: RunnerState,
    /// Last position known to be committed.
    pub last_position: Option<Position>,
}

/// Errors that end a runner.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Subscription {0} is locked by another runner")]
    LockHeld(String),

    #[error("Subscription {subscription_id} faulted after position {position:?}: {reason}")]
    Faulted {
        subscription_id: String,
        /// Last committed position; the failing batch starts right after it.
        position: Option<Position>,
        reason: FailureReason,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Runner task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Idle polling intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    /// First wait after an empty read.
    pub poll_interval: Duration,
    /// Cap for consecutive empty reads; the wait doubles up to this.
    pub max_poll_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            max_poll_interval: Duration::from_secs(5),
        }
    }
}

/// Drives one subscription until stopped or faulted.
pub struct SubscriptionRunner {
    events: Arc<dyn EventStore>,
    checkpointer: Arc<dyn Checkpointer>,
    options: BatchProcessingOptions,
    lock: Option<Arc<dyn SubscriptionLock>>,
    retry: RetryConfig,
    poll: PollSettings,
}

impl SubscriptionRunner {
    pub fn new(
        events: Arc<dyn EventStore>,
        checkpointer: Arc<dyn Checkpointer>,
        options: BatchProcessingOptions,
    ) -> Self {
        Self {
            events,
            checkpointer,
            options,
            lock: None,
            retry: RetryConfig::default(),
            poll: PollSettings::default(),
        }
    }

    /// Hold `lock` for the lifetime of the runner.
    pub fn with_lock(mut self, lock: Arc<dyn SubscriptionLock>) -> Self {
        self.lock = Some(lock);
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_poll(mut self, poll: PollSettings) -> Self {
        self.poll = poll;
        self
    }

    /// Spawn the runner on the current tokio runtime.
    pub fn start(self) -> RunnerHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (status_tx, status_rx) = watch::channel(RunnerStatus {
            state: RunnerState::Idle,
            last_position: None,
        });

        let span = info_span!(
            "subscription",
            subscription = %self.checkpointer.subscription_id(),
            scope = %self.options.scope,
        );
        let join = tokio::spawn(self.run(cancel_rx, status_tx).instrument(span));

        RunnerHandle {
            cancel: cancel_tx,
            status: status_rx,
            join,
        }
    }

    async fn run(
        self,
        mut cancel: watch::Receiver<bool>,
        status: watch::Sender<RunnerStatus>,
    ) -> Result<(), RunnerError> {
        let subscription_id = self.checkpointer.subscription_id().to_string();
        set_state(&status, RunnerState::Starting);

        let guard = match &self.lock {
            Some(lock) => match lock.try_acquire(&subscription_id).await {
                Ok(Some(guard)) => Some(guard),
                Ok(None) => {
                    error!("Subscription lock held elsewhere, refusing to start");
                    set_state(&status, RunnerState::Faulted);
                    return Err(RunnerError::LockHeld(subscription_id));
                }
                Err(e) => {
                    error!(error = %e, "Failed to acquire subscription lock");
                    set_state(&status, RunnerState::Faulted);
                    return Err(e.into());
                }
            },
            None => None,
        };

        let result = match self.checkpointer.load().await {
            Ok(checkpoint) => {
                status.send_modify(|s| {
                    s.state = RunnerState::Running;
                    s.last_position = checkpoint.position;
                });
                info!(position = ?checkpoint.position, batch_size = self.options.batch_size, "Subscription running");
                self.run_loop(&subscription_id, &mut cancel, &status).await
            }
            Err(e) => {
                error!(error = %e, "Failed to load checkpoint at startup");
                Err(e.into())
            }
        };

        if let (Some(lock), Some(guard)) = (&self.lock, guard) {
            if let Err(e) = lock.release(guard).await {
                warn!(error = %e, "Failed to release subscription lock");
            }
        }

        match &result {
            Ok(()) => {
                set_state(&status, RunnerState::Stopped);
                info!("Subscription stopped");
            }
            Err(e) => {
                set_state(&status, RunnerState::Faulted);
                error!(error = %e, "Subscription faulted");
            }
        }
        result
    }

    async fn run_loop(
        &self,
        subscription_id: &str,
        cancel: &mut watch::Receiver<bool>,
        status: &watch::Sender<RunnerStatus>,
    ) -> Result<(), RunnerError> {
        let mut attempt = 0u32;
        let mut idle_wait = self.poll.poll_interval;

        loop {
            if cancel_requested(cancel) {
                set_state(status, RunnerState::Stopping);
                return Ok(());
            }

            let checkpoint = match self.checkpointer.load().await {
                Ok(checkpoint) => checkpoint,
                Err(e) => {
                    let reason = FailureReason::Transient(e.to_string());
                    if self.back_off(subscription_id, None, reason, &mut attempt, cancel).await? {
                        set_state(status, RunnerState::Stopping);
                        return Ok(());
                    }
                    continue;
                }
            };

            let batch = self
                .events
                .read_forward(
                    &self.options.scope,
                    checkpoint.position,
                    self.options.batch_size as usize,
                )
                .await;
            let events = match batch {
                Ok(events) => events,
                Err(e) => {
                    let reason = FailureReason::Transient(e.to_string());
                    if self
                        .back_off(subscription_id, checkpoint.position, reason, &mut attempt, cancel)
                        .await?
                    {
                        set_state(status, RunnerState::Stopping);
                        return Ok(());
                    }
                    continue;
                }
            };

            if events.is_empty() {
                attempt = 0;
                if wait_or_cancel(idle_wait, cancel).await {
                    set_state(status, RunnerState::Stopping);
                    return Ok(());
                }
                idle_wait = (idle_wait * 2).min(self.poll.max_poll_interval);
                continue;
            }
            idle_wait = self.poll.poll_interval;

            let to = events.last().map(|e| e.position);
            debug!(from = ?checkpoint.position, to = ?to, count = events.len(), "Processing batch");

            match self
                .checkpointer
                .process(&events, &checkpoint, &self.options)
                .await
            {
                StoreResult::Success => {
                    attempt = 0;
                    status.send_modify(|s| s.last_position = to);
                }
                StoreResult::Failure(reason) if reason.is_conflict() => {
                    warn!(%reason, "Checkpoint moved underneath us, reloading");
                }
                StoreResult::Failure(reason) if reason.is_retryable() => {
                    if self
                        .back_off(subscription_id, checkpoint.position, reason, &mut attempt, cancel)
                        .await?
                    {
                        set_state(status, RunnerState::Stopping);
                        return Ok(());
                    }
                }
                StoreResult::Failure(reason) => {
                    return Err(RunnerError::Faulted {
                        subscription_id: subscription_id.to_string(),
                        position: checkpoint.position,
                        reason,
                    });
                }
            }
        }
    }

    /// Wait before the next attempt, or fault when the budget is spent.
    ///
    /// Returns `true` when cancelled while waiting.
    async fn back_off(
        &self,
        subscription_id: &str,
        position: Option<Position>,
        reason: FailureReason,
        attempt: &mut u32,
        cancel: &mut watch::Receiver<bool>,
    ) -> Result<bool, RunnerError> {
        if !self.retry.should_retry(*attempt) {
            return Err(RunnerError::Faulted {
                subscription_id: subscription_id.to_string(),
                position,
                reason,
            });
        }

        let delay = self.retry.delay_for_attempt(*attempt);
        *attempt += 1;
        warn!(
            %reason,
            kind = reason.kind(),
            attempt = *attempt,
            max_retries = self.retry.max_retries,
            delay = ?delay,
            "Batch failed, backing off"
        );
        Ok(wait_or_cancel(delay, cancel).await)
    }
}

fn set_state(status: &watch::Sender<RunnerStatus>, state: RunnerState) {
    status.send_modify(|s| s.state = state);
}

/// Stop was requested, or the handle is gone.
fn cancel_requested(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow() || cancel.has_changed().is_err()
}

/// Sleep for `duration` unless cancelled first. Returns `true` if cancelled.
async fn wait_or_cancel(duration: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = cancel.changed() => match changed {
            Ok(()) => *cancel.borrow(),
            Err(_) => true,
        },
    }
}

/// Handle to a running subscription.
///
/// Dropping the handle also stops the runner at its next wait.
pub struct RunnerHandle {
    cancel: watch::Sender<bool>,
    status: watch::Receiver<RunnerStatus>,
    join: JoinHandle<Result<(), RunnerError>>,
}

impl RunnerHandle {
    pub fn state(&self) -> RunnerState {
        self.status.borrow().state
    }

    pub fn status(&self) -> RunnerStatus {
        self.status.borrow().clone()
    }

    /// Watch status changes.
    pub fn subscribe(&self) -> watch::Receiver<RunnerStatus> {
        self.status.clone()
    }

    /// Wait until the status satisfies `predicate`, returning that status.
    ///
    /// Returns the final status if the runner exits first.
    pub async fn wait_for(&self, predicate: impl Fn(&RunnerStatus) -> bool) -> RunnerStatus {
        let mut rx = self.status.clone();
        if let Ok(status) = rx.wait_for(|s| predicate(s)).await {
            return status.clone();
        }
        let last = rx.borrow().clone();
        last
    }

    /// Ask the runner to stop without waiting.
    pub fn request_stop(&self) {
        let _ = self.cancel.send(true);
    }

    /// Signal stop and wait for the in-flight batch to finish.
    pub async fn stop(self) -> Result<(), RunnerError> {
        self.request_stop();
        self.wait().await
    }

    /// Wait for the runner to exit on its own.
    pub async fn wait(self) -> Result<(), RunnerError> {
        self.join.await?
    }
}
