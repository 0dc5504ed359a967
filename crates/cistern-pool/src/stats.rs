//! Pool statistics collection and snapshots

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PoolConfig;

/// Running total/greatest accumulator for a series of durations
#[derive(Debug, Default)]
pub(crate) struct TimingAccumulator {
    samples: u64,
    total: Duration,
    greatest: Duration,
}

impl TimingAccumulator {
    pub(crate) fn record(&mut self, sample: Duration) {
        self.samples += 1;
        self.total += sample;
        if sample > self.greatest {
            self.greatest = sample;
        }
    }

    fn average(&self) -> Option<Duration> {
        if self.samples == 0 {
            return None;
        }
        Some(Duration::from_nanos(
            (self.total.as_nanos() / u128::from(self.samples)) as u64,
        ))
    }

    fn greatest(&self) -> Option<Duration> {
        (self.samples > 0).then_some(self.greatest)
    }
}

/// Mutable statistics state, updated under the pool lock
#[derive(Debug)]
pub(crate) struct StatsRecorder {
    greatest_pool_size: usize,
    greatest_leased_count: usize,
    leased_samples: u64,
    leased_sample_sum: u64,
    acquire_times: TimingAccumulator,
    lease_times: TimingAccumulator,
    expired_connections: u64,
    retired_connections: u64,
    /// Instant the pool last left the fully-idle state
    last_idle_at: Instant,
}

impl StatsRecorder {
    pub(crate) fn new() -> Self {
        Self {
            greatest_pool_size: 0,
            greatest_leased_count: 0,
            leased_samples: 0,
            leased_sample_sum: 0,
            acquire_times: TimingAccumulator::default(),
            lease_times: TimingAccumulator::default(),
            expired_connections: 0,
            retired_connections: 0,
            last_idle_at: Instant::now(),
        }
    }

    /// Track the pool size high-water mark
    pub(crate) fn note_pool_size(&mut self, current: usize) {
        if current > self.greatest_pool_size {
            self.greatest_pool_size = current;
        }
    }

    /// Sample the simultaneous-lease count; called on every acquire and release
    pub(crate) fn sample_leased(&mut self, outstanding: usize) {
        self.leased_samples += 1;
        self.leased_sample_sum += outstanding as u64;
        if outstanding > self.greatest_leased_count {
            self.greatest_leased_count = outstanding;
        }
    }

    /// Record how long a successful acquisition waited
    pub(crate) fn record_acquire(&mut self, waited: Duration) {
        self.acquire_times.record(waited);
    }

    /// Record how long a finished lease was held
    pub(crate) fn record_lease_end(&mut self, held: Duration) {
        self.lease_times.record(held);
    }

    pub(crate) fn record_expired(&mut self, count: usize) {
        self.expired_connections += count as u64;
    }

    pub(crate) fn record_retired(&mut self) {
        self.retired_connections += 1;
    }

    /// The pool just went from zero outstanding leases to one
    pub(crate) fn mark_busy(&mut self, now: Instant) {
        self.last_idle_at = now;
    }

    /// Build a point-in-time snapshot under the pool lock
    pub(crate) fn snapshot(
        &self,
        config: &PoolConfig,
        available: usize,
        outstanding: &HashMap<Uuid, Instant>,
    ) -> PoolStats {
        let now = Instant::now();

        let mut outstanding_times = TimingAccumulator::default();
        for acquired_at in outstanding.values() {
            outstanding_times.record(now.duration_since(*acquired_at));
        }

        let average_leased_count = if self.leased_samples == 0 {
            0.0
        } else {
            self.leased_sample_sum as f64 / self.leased_samples as f64
        };

        // Idle time only accrues while at least one lease is outstanding.
        let idle_time = if outstanding.is_empty() {
            Duration::ZERO
        } else {
            now.duration_since(self.last_idle_at)
        };

        PoolStats {
            minimum_size: config.min_size(),
            maximum_size: config.max_size(),
            retire_limit: config.retire_limit(),
            expire_after: config.expire_after(),
            current_pool_size: available + outstanding.len(),
            available_connections: available,
            outstanding_leases: outstanding.len(),
            greatest_pool_size: self.greatest_pool_size,
            greatest_leased_count: self.greatest_leased_count,
            average_leased_count,
            expired_connections: config.expire_after().map(|_| self.expired_connections),
            retired_connections: config.retire_limit().map(|_| self.retired_connections),
            average_acquire_time: self.acquire_times.average(),
            greatest_acquire_time: self.acquire_times.greatest(),
            average_lease_time: self.lease_times.average(),
            greatest_lease_time: self.lease_times.greatest(),
            average_outstanding_lease_time: outstanding_times.average(),
            greatest_outstanding_lease_time: outstanding_times.greatest(),
            idle_time,
        }
    }
}

/// Point-in-time statistics snapshot of a connection pool.
///
/// Optional fields are `None` when the corresponding feature is disabled or
/// no sample exists yet; serialized output omits them rather than reporting
/// zeros that were never measured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolStats {
    minimum_size: usize,
    maximum_size: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retire_limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expire_after: Option<Duration>,
    current_pool_size: usize,
    available_connections: usize,
    outstanding_leases: usize,
    greatest_pool_size: usize,
    greatest_leased_count: usize,
    average_leased_count: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expired_connections: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retired_connections: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    average_acquire_time: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    greatest_acquire_time: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    average_lease_time: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    greatest_lease_time: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    average_outstanding_lease_time: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    greatest_outstanding_lease_time: Option<Duration>,
    idle_time: Duration,
}

impl PoolStats {
    /// Configured minimum pool size
    pub fn minimum_size(&self) -> usize {
        self.minimum_size
    }

    /// Configured maximum pool size
    pub fn maximum_size(&self) -> usize {
        self.maximum_size
    }

    /// Configured retirement lease limit, if retirement is enabled
    pub fn retire_limit(&self) -> Option<u64> {
        self.retire_limit
    }

    /// Configured idle expiration threshold, if expiration is enabled
    pub fn expire_after(&self) -> Option<Duration> {
        self.expire_after
    }

    /// Connections currently owned by the pool, leased or idle
    pub fn current_pool_size(&self) -> usize {
        self.current_pool_size
    }

    /// Idle connections ready to be leased
    pub fn available_connections(&self) -> usize {
        self.available_connections
    }

    /// Leases currently held by callers
    pub fn outstanding_leases(&self) -> usize {
        self.outstanding_leases
    }

    /// Largest pool size ever reached
    pub fn greatest_pool_size(&self) -> usize {
        self.greatest_pool_size
    }

    /// Largest number of simultaneous leases ever reached
    pub fn greatest_leased_count(&self) -> usize {
        self.greatest_leased_count
    }

    /// Mean simultaneous-lease count, sampled at every acquire and release
    pub fn average_leased_count(&self) -> f64 {
        self.average_leased_count
    }

    /// Connections closed by the expiration sweeper, if expiration is enabled
    pub fn expired_connections(&self) -> Option<u64> {
        self.expired_connections
    }

    /// Connections retired after reaching the lease limit, if retirement is
    /// enabled
    pub fn retired_connections(&self) -> Option<u64> {
        self.retired_connections
    }

    /// Mean wait for a successful acquisition, once at least one completed
    pub fn average_acquire_time(&self) -> Option<Duration> {
        self.average_acquire_time
    }

    /// Longest wait for a successful acquisition
    pub fn greatest_acquire_time(&self) -> Option<Duration> {
        self.greatest_acquire_time
    }

    /// Mean duration of finished leases
    pub fn average_lease_time(&self) -> Option<Duration> {
        self.average_lease_time
    }

    /// Longest finished lease
    pub fn greatest_lease_time(&self) -> Option<Duration> {
        self.greatest_lease_time
    }

    /// Mean age of leases outstanding at the time of the snapshot
    pub fn average_outstanding_lease_time(&self) -> Option<Duration> {
        self.average_outstanding_lease_time
    }

    /// Age of the oldest lease outstanding at the time of the snapshot
    pub fn greatest_outstanding_lease_time(&self) -> Option<Duration> {
        self.greatest_outstanding_lease_time
    }

    /// Time since the pool last had zero outstanding leases, or zero if it
    /// is idle right now
    pub fn idle_time(&self) -> Duration {
        self.idle_time
    }

    /// Fraction of owned connections currently leased (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.current_pool_size == 0 {
            0.0
        } else {
            self.outstanding_leases as f64 / self.current_pool_size as f64
        }
    }

    /// Whether every owned connection is currently leased
    pub fn is_full(&self) -> bool {
        self.current_pool_size > 0 && self.outstanding_leases == self.current_pool_size
    }
}
