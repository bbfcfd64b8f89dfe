//! Subscription configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::model::{BatchProcessingOptions, StreamScope};
use crate::monitor::DEFAULT_LIVENESS_THRESHOLD;
use crate::runner::PollSettings;

/// Settings for one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Stable identity. Keys the checkpoint and the lock.
    pub id: String,
    /// `$all` or a stream id.
    pub scope: StreamScope,
    pub batch_size: u32,
    /// Maximum gap still reported as live (exclusive).
    pub liveness_threshold: u64,
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    /// Co-commit projection writes with the checkpoint.
    pub transactional: bool,
    /// How often the runner binary logs a liveness report.
    pub report_interval_secs: u64,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            scope: StreamScope::All,
            batch_size: BatchProcessingOptions::DEFAULT_BATCH_SIZE,
            liveness_threshold: DEFAULT_LIVENESS_THRESHOLD,
            poll_interval_ms: 100,
            max_poll_interval_ms: 5_000,
            transactional: false,
            report_interval_secs: 30,
        }
    }
}

impl SubscriptionConfig {
    pub fn batch_options(&self) -> BatchProcessingOptions {
        BatchProcessingOptions::new(self.batch_size, self.scope.clone())
    }

    pub fn poll_settings(&self) -> PollSettings {
        PollSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            max_poll_interval: Duration::from_millis(self.max_poll_interval_ms),
        }
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}
