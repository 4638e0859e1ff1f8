//! Blocking wait on one external asynchronous task.

use std::future::Future;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::metrics::EXTERNAL_TASKS;
use crate::services::{ServiceError, TaskSnapshot, TaskStatus};

use super::types::{PollError, PollerConfig, StatusChange};

/// Waits on external tasks until they reach a terminal status.
///
/// A single poller can serve many concurrent waits; each call to
/// [`wait`](Self::wait) owns its own loop state.
#[derive(Debug, Clone)]
pub struct ExternalTaskPoller {
    config: PollerConfig,
}

impl ExternalTaskPoller {
    pub fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Polls `status_fn` until the task succeeds, fails, or the timeout elapses.
    ///
    /// `on_change` runs only when the observed status differs from the last one.
    /// Status queries are spaced at least `poll_interval` apart, and the whole
    /// wait never exceeds `timeout + poll_interval` even if a query hangs.
    pub async fn wait<F, Fut, C, CFut>(
        &self,
        task_id: &str,
        status_fn: F,
        mut on_change: C,
    ) -> Result<TaskSnapshot, PollError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<TaskSnapshot, ServiceError>>,
        C: FnMut(StatusChange) -> CFut,
        CFut: Future<Output = ()>,
    {
        let PollerConfig {
            timeout,
            poll_interval,
        } = self.config;
        let start = Instant::now();
        let mut last_status: Option<TaskStatus> = None;

        debug!(task_id, timeout_secs = timeout.as_secs(), "Waiting for external task");

        loop {
            let elapsed = start.elapsed();
            if elapsed > timeout {
                return Err(self.timed_out(task_id, last_status));
            }

            let budget = timeout.saturating_sub(elapsed) + poll_interval;
            let snapshot = match tokio::time::timeout(budget, status_fn(task_id.to_string())).await
            {
                Ok(result) => result?,
                Err(_) => return Err(self.timed_out(task_id, last_status)),
            };

            if last_status != Some(snapshot.status) {
                last_status = Some(snapshot.status);
                let elapsed = start.elapsed();
                debug!(task_id, status = %snapshot.status, elapsed_secs = elapsed.as_secs(), "Task status changed");
                on_change(StatusChange {
                    task_id: task_id.to_string(),
                    status: snapshot.status,
                    elapsed,
                    remaining: timeout.saturating_sub(elapsed),
                })
                .await;
            }

            match snapshot.status {
                TaskStatus::Succeeded => {
                    info!(task_id, elapsed_secs = start.elapsed().as_secs(), "External task succeeded");
                    EXTERNAL_TASKS.with_label_values(&["succeeded"]).inc();
                    return Ok(snapshot);
                }
                TaskStatus::Failed | TaskStatus::Cancelled => {
                    warn!(task_id, status = %snapshot.status, "External task did not succeed");
                    EXTERNAL_TASKS.with_label_values(&["failed"]).inc();
                    return Err(PollError::TaskFailed {
                        task_id: task_id.to_string(),
                        status: snapshot.status,
                        payload: snapshot.payload,
                    });
                }
                TaskStatus::Pending | TaskStatus::Running => {}
            }

            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(self.timed_out(task_id, last_status));
            }
            tokio::time::sleep(poll_interval.min(remaining)).await;
        }
    }

    fn timed_out(&self, task_id: &str, last_status: Option<TaskStatus>) -> PollError {
        warn!(task_id, timeout_secs = self.config.timeout.as_secs(), "External task timed out");
        EXTERNAL_TASKS.with_label_values(&["timeout"]).inc();
        PollError::TaskTimeout {
            task_id: task_id.to_string(),
            timeout: self.config.timeout,
            last_status,
        }
    }
}
