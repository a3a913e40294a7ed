#![forbid(unsafe_code)]

use std::time::Duration;

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_IDLE_THRESHOLD: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkspaceConfig {
    /// Sliding TTL of session records and schema entries.
    pub session_ttl: Duration,
    /// Fixed TTL of memoized query and translation results.
    pub result_ttl: Duration,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            result_ttl: DEFAULT_RESULT_TTL,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SweeperConfig {
    pub interval: Duration,
    /// A workspace idle for strictly longer than this is reclaimed.
    pub idle_threshold: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
            idle_threshold: DEFAULT_IDLE_THRESHOLD,
        }
    }
}
