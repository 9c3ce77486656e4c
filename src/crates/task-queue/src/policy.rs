//! Worker runtime policy (§4.3 "Runtime policy"), loadable the way other
//! `rt_tooling::config`-backed structs in this workspace are: programmatically
//! or via `from_env`.

use std::time::Duration;

use rt_tooling::config::{get_env_parse_or, ConfigBuilder};
use rt_tooling::{Result as ToolingResult, ToolingError};

/// Tunables for a [`crate::worker::Worker`]'s claim/heartbeat/backoff
/// behavior. `lock_ttl` must exceed `2 * heartbeat_interval` so a single
/// missed heartbeat can't let the lock lapse underneath a still-alive
/// worker.
#[derive(Debug, Clone, Copy)]
pub struct RuntimePolicy {
    pub poll_interval: Duration,
    pub claim_block: Duration,
    pub heartbeat_interval: Duration,
    pub lock_ttl: Duration,
    pub max_backoff: Duration,
    pub base_backoff: Duration,
    pub max_concurrent: usize,
}

impl Default for RuntimePolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            claim_block: Duration::from_secs(2),
            heartbeat_interval: Duration::from_secs(5),
            lock_ttl: Duration::from_secs(15),
            max_backoff: Duration::from_secs(30),
            base_backoff: Duration::from_millis(500),
            max_concurrent: 4,
        }
    }
}

impl RuntimePolicy {
    /// `delay = min(base * 2^(attempt-1), maxBackoff)` — the worker's own
    /// backoff cap, independent of the evaluation runner's 16x-base cap.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor).min(self.max_backoff)
    }
}

impl ConfigBuilder for RuntimePolicy {
    fn validate(&self) -> ToolingResult<()> {
        if self.lock_ttl <= self.heartbeat_interval * 2 {
            return Err(ToolingError::General(
                "lock_ttl must be greater than 2 * heartbeat_interval".to_string(),
            ));
        }
        if self.max_concurrent == 0 {
            return Err(ToolingError::General("max_concurrent must be at least 1".to_string()));
        }
        Ok(())
    }

    fn from_env(prefix: &str) -> ToolingResult<Self> {
        let defaults = Self::default();
        Ok(Self {
            poll_interval: Duration::from_millis(get_env_parse_or(&format!("{prefix}POLL_INTERVAL_MS"), defaults.poll_interval.as_millis() as u64)?),
            claim_block: Duration::from_millis(get_env_parse_or(&format!("{prefix}CLAIM_BLOCK_MS"), defaults.claim_block.as_millis() as u64)?),
            heartbeat_interval: Duration::from_millis(get_env_parse_or(
                &format!("{prefix}HEARTBEAT_INTERVAL_MS"),
                defaults.heartbeat_interval.as_millis() as u64,
            )?),
            lock_ttl: Duration::from_millis(get_env_parse_or(&format!("{prefix}LOCK_TTL_MS"), defaults.lock_ttl.as_millis() as u64)?),
            max_backoff: Duration::from_millis(get_env_parse_or(&format!("{prefix}MAX_BACKOFF_MS"), defaults.max_backoff.as_millis() as u64)?),
            base_backoff: Duration::from_millis(get_env_parse_or(&format!("{prefix}BASE_BACKOFF_MS"), defaults.base_backoff.as_millis() as u64)?),
            max_concurrent: get_env_parse_or(&format!("{prefix}MAX_CONCURRENT"), defaults.max_concurrent)?,
        })
    }

    fn merge(&mut self, _other: Self) -> &mut Self {
        self
    }
}
