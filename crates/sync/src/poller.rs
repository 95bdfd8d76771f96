//! Per-job poll timers.
//!
//! [`PollScheduler`] keeps at most one pending timer per job id on a
//! [`DelayQueue`]. A timer fires once; the reconciler re-arms it when the
//! job should keep polling. Dropping the scheduler cancels every timer.

use std::collections::HashMap;
use std::time::Duration;

use codeflow_core::types::JobId;
use futures::StreamExt;
use tokio_util::time::delay_queue::{self, DelayQueue};

pub struct PollScheduler {
    interval: Duration,
    timers: DelayQueue<JobId>,
    keys: HashMap<JobId, delay_queue::Key>,
}

impl PollScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            timers: DelayQueue::new(),
            keys: HashMap::new(),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arm a timer for `job_id` one interval from now.
    ///
    /// Returns `false` if a timer for this job is already pending.
    pub fn start(&mut self, job_id: &str) -> bool {
        if self.keys.contains_key(job_id) {
            return false;
        }
        let key = self.timers.insert(job_id.to_string(), self.interval);
        self.keys.insert(job_id.to_string(), key);
        true
    }

    /// Cancel the pending timer for `job_id`, if any.
    pub fn stop(&mut self, job_id: &str) -> bool {
        match self.keys.remove(job_id) {
            Some(key) => {
                self.timers.remove(&key);
                true
            }
            None => false,
        }
    }

    pub fn active_count(&self) -> usize {
        self.keys.len()
    }

    /// Cancel every pending timer.
    pub fn clear(&mut self) {
        self.timers.clear();
        self.keys.clear();
    }

    /// Wait for the next timer to fire.
    ///
    /// Resolves to `None` immediately when nothing is armed, so callers in
    /// a `select!` loop should treat `None` as "no branch this round".
    pub async fn next_due(&mut self) -> Option<JobId> {
        let expired = self.timers.next().await?;
        let job_id = expired.into_inner();
        self.keys.remove(&job_id);
        Some(job_id)
    }
}
