use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What `enqueue` does when the URL already has a pending queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// Always insert a new entry.
    Allow,
    /// Leave the queue untouched if the URL is already queued.
    #[default]
    SkipQueued,
}

impl DuplicatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicatePolicy::Allow => "allow",
            DuplicatePolicy::SkipQueued => "skip-queued",
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "allow" => Ok(DuplicatePolicy::Allow),
            "skip-queued" | "skip" => Ok(DuplicatePolicy::SkipQueued),
            _ => Err(format!("Unknown duplicate policy: {}", s)),
        }
    }
}

/// Read-path configuration for [`ArchiveService`](crate::archive::ArchiveService).
#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// A URL whose newest record is older than this is re-enqueued on read.
    pub stale_after: Duration,
    pub history_limit: usize,
    pub sources_limit: usize,
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            stale_after: Duration::from_secs(60 * 60 * 24),
            history_limit: 30,
            sources_limit: 30,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl ArchiveConfig {
    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}

/// Configuration for the worker loop.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// Fixed pause after any failed attempt. Not exponential, no retry cap.
    pub retry_delay: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", &Uuid::new_v4().to_string()[..8]),
            retry_delay: Duration::from_secs(5),
        }
    }
}

impl WorkerConfig {
    pub fn with_worker_id(mut self, id: impl Into<String>) -> Self {
        self.worker_id = id.into();
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}
