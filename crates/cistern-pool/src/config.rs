//! Pool configuration types

use std::time::Duration;

use cistern_core::{CisternError, Result};
use serde::{Deserialize, Serialize};

/// Floor for the derived sweep interval so a small expiration threshold does
/// not turn the sweeper into a busy loop.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(50);

/// Configuration for a connection pool.
///
/// Controls pool sizing and the optional idle-expiration and lease-count
/// retirement features. Defaults: min size 1, max size 10, expiration and
/// retirement disabled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Minimum number of connections the pool keeps open
    min_size: usize,
    /// Maximum number of connections the pool will ever own
    max_size: usize,
    /// Idle time in milliseconds after which a connection is closed;
    /// `None` disables expiration
    expire_after_ms: Option<u64>,
    /// Number of leases after which a connection is retired;
    /// `None` disables retirement
    retire_limit: Option<u64>,
}

impl PoolConfig {
    /// Create a configuration with the given minimum and maximum sizes
    pub fn new(min_size: usize, max_size: usize) -> Self {
        Self {
            min_size,
            max_size,
            expire_after_ms: None,
            retire_limit: None,
        }
    }

    /// Create a fixed-size configuration where minimum and maximum are equal.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero; a fixed pool must hold at least one
    /// connection.
    pub fn fixed(size: usize) -> Self {
        assert!(size >= 1, "fixed pool size must be at least 1");
        Self::new(size, size)
    }

    /// Set the idle time in milliseconds after which connections expire
    pub fn with_expire_after_ms(mut self, expire_after_ms: u64) -> Self {
        self.expire_after_ms = Some(expire_after_ms);
        self
    }

    /// Set the number of leases after which a connection is retired
    pub fn with_retire_limit(mut self, retire_limit: u64) -> Self {
        self.retire_limit = Some(retire_limit);
        self
    }

    /// Get the minimum pool size
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    /// Get the maximum pool size
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the idle expiration threshold, if expiration is enabled
    pub fn expire_after(&self) -> Option<Duration> {
        self.expire_after_ms.map(Duration::from_millis)
    }

    /// Get the retirement lease limit, if retirement is enabled
    pub fn retire_limit(&self) -> Option<u64> {
        self.retire_limit
    }

    /// Interval between expiration sweeps, if expiration is enabled.
    ///
    /// Half the expiration threshold, floored at 50ms: an idle connection is
    /// closed within 1.5x the threshold without over-polling.
    pub(crate) fn sweep_interval(&self) -> Option<Duration> {
        self.expire_after().map(|d| (d / 2).max(MIN_SWEEP_INTERVAL))
    }

    /// Validate the configuration.
    ///
    /// Rejects a maximum below the minimum and explicitly supplied zero
    /// expiration or retirement values.
    pub fn validate(&self) -> Result<()> {
        if self.max_size < self.min_size {
            return Err(CisternError::Configuration(format!(
                "min_size ({}) cannot exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.expire_after_ms == Some(0) {
            return Err(CisternError::Configuration(
                "expire_after must be positive when set".to_string(),
            ));
        }
        if self.retire_limit == Some(0) {
            return Err(CisternError::Configuration(
                "retire_limit must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new(1, 10)
    }
}
