//! Types for the external task poller.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::{ServiceError, TaskStatus};

/// Timing bounds for one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Maximum total wait.
    pub timeout: Duration,
    /// Minimum spacing between status queries.
    pub poll_interval: Duration,
}

impl PollerConfig {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(900),
            poll_interval: Duration::from_secs(15),
        }
    }
}

/// Emitted when the observed task status differs from the previous one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChange {
    pub task_id: String,
    pub status: TaskStatus,
    pub elapsed: Duration,
    pub remaining: Duration,
}

/// Errors that end a wait without success.
#[derive(Debug, Error)]
pub enum PollError {
    /// The task reached `failed` or `cancelled`.
    #[error("task {task_id} ended with status {status}: {payload}")]
    TaskFailed {
        task_id: String,
        status: TaskStatus,
        payload: serde_json::Value,
    },

    /// The task did not reach a terminal status in time. The task itself is
    /// left running.
    #[error("task {task_id} timed out after {}s (last status: {})",
        .timeout.as_secs(),
        .last_status.map(|s| s.as_str()).unwrap_or("unknown"))]
    TaskTimeout {
        task_id: String,
        timeout: Duration,
        last_status: Option<TaskStatus>,
    },

    /// The status query itself failed.
    #[error("task status query failed: {0}")]
    Service(#[from] ServiceError),
}
