//! Tunables for a dashboard session.

use std::time::Duration;

use crate::reconnect::ReconnectConfig;

/// Default interval between fallback polls of one job.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Default outage after which push-confirmed jobs go back to polling.
pub const DEFAULT_RESUME_AFTER: Duration = Duration::from_secs(30);

/// Whether polling restarts for push-confirmed jobs while the push
/// channel stays down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePolicy {
    /// Push-confirmed jobs never poll again; they wait for the next
    /// reconnect resync.
    Never,
    /// Resume polling once the push channel has been disconnected this long.
    After(Duration),
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    pub reconnect: ReconnectConfig,
    pub resume_policy: ResumePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            reconnect: ReconnectConfig::default(),
            resume_policy: ResumePolicy::After(DEFAULT_RESUME_AFTER),
        }
    }
}
