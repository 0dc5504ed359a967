//! Connection pool implementation

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use cistern_core::{CisternError, Connection, Connector, Result};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::PoolConfig;
use crate::lease::{Lease, PooledConnection};
use crate::stats::{PoolStats, StatsRecorder};
use crate::sweeper;

/// One physical connection owned by the pool
pub(crate) struct PoolEntry {
    pub(crate) id: Uuid,
    pub(crate) raw: Arc<dyn Connection>,
    pub(crate) created_at: Instant,
    /// Start of the current idle period; meaningful only while available
    pub(crate) last_released_at: Instant,
    /// Completed plus in-progress leases of this entry
    pub(crate) lease_count: u64,
}

impl PoolEntry {
    pub(crate) fn new(raw: Arc<dyn Connection>) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            raw,
            created_at: now,
            last_released_at: now,
            lease_count: 0,
        }
    }
}

/// Mutable pool state, all guarded by a single mutex
pub(crate) struct PoolState {
    /// Idle entries ready to lease, oldest release first
    pub(crate) available: VecDeque<PoolEntry>,
    /// Outstanding leases, entry id to acquisition instant
    pub(crate) outstanding: HashMap<Uuid, Instant>,
    /// Slots transiently outside both sets: opens in flight and entries
    /// reserved by an acquisition in progress
    pub(crate) pending: usize,
    pub(crate) shutdown: bool,
    pub(crate) stats: StatsRecorder,
}

impl PoolState {
    /// Physical connections currently owned by the pool
    pub(crate) fn current_size(&self) -> usize {
        self.available.len() + self.outstanding.len()
    }

    /// Size for capacity decisions, counting slots in flight
    pub(crate) fn tracked_size(&self) -> usize {
        self.current_size() + self.pending
    }
}

/// Shared pool internals behind the [`Pool`] handle
pub(crate) struct PoolInner {
    pub(crate) config: PoolConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) state: Mutex<PoolState>,
    /// Lease rights; idle entries hold no permits
    lease_permits: Arc<Semaphore>,
    pub(crate) shutdown_token: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// In-flight acquisition slot.
///
/// Returns a popped entry to the pool and settles the pending count if the
/// acquiring future is dropped mid-acquisition.
struct Reservation<'a> {
    pool: &'a PoolInner,
    entry: Option<PoolEntry>,
}

impl Reservation<'_> {
    fn entry(&self) -> &PoolEntry {
        self.entry.as_ref().expect("reservation holds an entry")
    }

    /// Take the entry out and settle the pending count, skipping Drop
    fn into_entry(mut self) -> PoolEntry {
        let entry = self.entry.take().expect("reservation holds an entry");
        self.pool.state.lock().pending -= 1;
        std::mem::forget(self);
        entry
    }

    /// Take the entry and settle the pending count under the caller's lock,
    /// so the slot stays counted until the same lock section places it
    fn settle(mut self, state: &mut PoolState) -> PoolEntry {
        let entry = self.entry.take().expect("reservation holds an entry");
        state.pending -= 1;
        std::mem::forget(self);
        entry
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        let mut state = self.pool.state.lock();
        state.pending -= 1;
        if let Some(entry) = self.entry.take() {
            if state.shutdown {
                tracing::debug!(entry_id = %entry.id, "dropping reserved entry after shutdown");
            } else {
                state.available.push_back(entry);
            }
        }
    }
}

/// Pending-count guard for a slot with a background open or a return in
/// flight.
///
/// The count is settled under the lock that resolves the slot; Drop covers
/// the owning future being cancelled first.
pub(crate) struct PendingGuard<'a> {
    pool: &'a PoolInner,
}

impl<'a> PendingGuard<'a> {
    pub(crate) fn new(pool: &'a PoolInner) -> Self {
        Self { pool }
    }

    /// Settle the count under an already-held lock, skipping Drop
    pub(crate) fn settle(self, state: &mut PoolState) {
        state.pending -= 1;
        std::mem::forget(self);
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pool.state.lock().pending -= 1;
    }
}

/// A bounded pool of reusable database connections.
///
/// The pool opens its minimum size eagerly, grows on demand up to its
/// maximum, and hands out [`PooledConnection`] wrappers that return their
/// connection on `close` or drop. Cloning the handle is cheap; all clones
/// share one pool.
#[derive(Clone)]
pub struct Pool {
    inner: Arc<PoolInner>,
}

impl Pool {
    /// Create a new pool, opening `min_size` connections eagerly.
    ///
    /// Fails on invalid configuration or if any eager open fails; connections
    /// opened before the failure are closed again first. Starts the
    /// expiration sweeper when `expire_after` is configured.
    pub async fn new<C: Connector>(config: PoolConfig, connector: C) -> Result<Self> {
        config.validate()?;
        let connector: Arc<dyn Connector> = Arc::new(connector);

        let mut warm = Vec::with_capacity(config.min_size());
        for _ in 0..config.min_size() {
            match connector.open().await {
                Ok(raw) => warm.push(PoolEntry::new(raw)),
                Err(error) => {
                    tracing::error!(error = %error, "failed to open connection during pool construction");
                    for entry in warm {
                        if let Err(close_error) = entry.raw.close().await {
                            tracing::warn!(
                                entry_id = %entry.id,
                                error = %close_error,
                                "failed to close connection while unwinding construction"
                            );
                        }
                    }
                    return Err(error);
                }
            }
        }

        let mut stats = StatsRecorder::new();
        stats.note_pool_size(warm.len());

        let inner = Arc::new(PoolInner {
            lease_permits: Arc::new(Semaphore::new(config.max_size())),
            connector,
            state: Mutex::new(PoolState {
                available: warm.into(),
                outstanding: HashMap::new(),
                pending: 0,
                shutdown: false,
                stats,
            }),
            shutdown_token: CancellationToken::new(),
            sweeper: Mutex::new(None),
            config,
        });

        if let Some(interval) = inner.config.sweep_interval() {
            let handle = sweeper::spawn(&inner, interval);
            *inner.sweeper.lock() = Some(handle);
        }

        tracing::info!(
            min_size = inner.config.min_size(),
            max_size = inner.config.max_size(),
            "connection pool created"
        );

        Ok(Self { inner })
    }

    /// Acquire a connection, waiting indefinitely for one to free up.
    ///
    /// Fails with `PoolClosed` once the pool is shut down, including for
    /// callers already waiting when shutdown begins.
    #[tracing::instrument(skip(self))]
    pub async fn acquire(&self) -> Result<PooledConnection> {
        let started = Instant::now();
        let permit = self
            .inner
            .lease_permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CisternError::PoolClosed)?;
        self.lease_with_permit(permit, started).await
    }

    /// Acquire a connection, or give up once `timeout` elapses.
    ///
    /// A zero timeout does not wait for a release at all. Running out of
    /// time yields `AcquireTimeout`, distinct from any connector failure.
    #[tracing::instrument(skip(self))]
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledConnection> {
        let started = Instant::now();
        let permit = if timeout.is_zero() {
            match self.inner.lease_permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(TryAcquireError::Closed) => return Err(CisternError::PoolClosed),
                Err(TryAcquireError::NoPermits) => {
                    return Err(CisternError::AcquireTimeout(timeout));
                }
            }
        } else {
            let wait = self.inner.lease_permits.clone().acquire_owned();
            match tokio::time::timeout(timeout, wait).await {
                Ok(Ok(permit)) => permit,
                Ok(Err(_)) => return Err(CisternError::PoolClosed),
                Err(_) => return Err(CisternError::AcquireTimeout(timeout)),
            }
        };
        self.lease_with_permit(permit, started).await
    }

    /// Acquire only if a connection or open slot is immediately available
    pub async fn try_acquire(&self) -> Result<PooledConnection> {
        self.acquire_timeout(Duration::ZERO).await
    }

    /// Finish an acquisition for which a lease permit is already held
    async fn lease_with_permit(
        &self,
        permit: OwnedSemaphorePermit,
        started: Instant,
    ) -> Result<PooledConnection> {
        let inner = &self.inner;
        let mut reservation = {
            let mut state = inner.state.lock();
            if state.shutdown {
                return Err(CisternError::PoolClosed);
            }
            state.pending += 1;
            Reservation {
                pool: inner,
                entry: state.available.pop_front(),
            }
        };

        if reservation.entry.is_none() {
            // Nothing idle; the permit guarantees room to open one more.
            let raw = inner.connector.open().await?;
            let entry = PoolEntry::new(raw);
            tracing::debug!(entry_id = %entry.id, "opened new connection");
            reservation.entry = Some(entry);
        }

        // Every lease starts with auto-commit off, in its own transaction.
        let raw = reservation.entry().raw.clone();
        if let Err(error) = raw.set_auto_commit(false).await {
            let entry = reservation.into_entry();
            tracing::warn!(
                entry_id = %entry.id,
                error = %error,
                "failed to reset connection for lease; discarding"
            );
            if let Err(close_error) = entry.raw.close().await {
                tracing::warn!(
                    entry_id = %entry.id,
                    error = %close_error,
                    "failed to close discarded connection"
                );
            }
            return Err(error);
        }

        let leased_at = Instant::now();
        let (entry, outstanding) = {
            let mut state = inner.state.lock();
            let mut entry = reservation.settle(&mut state);
            entry.lease_count += 1;
            if state.outstanding.is_empty() {
                state.stats.mark_busy(leased_at);
            }
            state.outstanding.insert(entry.id, leased_at);
            let current = state.current_size();
            state.stats.note_pool_size(current);
            let outstanding = state.outstanding.len();
            state.stats.sample_leased(outstanding);
            state.stats.record_acquire(started.elapsed());
            (entry, outstanding)
        };

        tracing::debug!(
            entry_id = %entry.id,
            lease_count = entry.lease_count,
            outstanding,
            "connection leased"
        );

        Ok(PooledConnection::new(inner.clone(), entry, permit, leased_at))
    }

    /// Point-in-time statistics snapshot
    pub fn stats(&self) -> PoolStats {
        let state = self.inner.state.lock();
        state
            .stats
            .snapshot(&self.inner.config, state.available.len(), &state.outstanding)
    }

    /// The configuration this pool was created with
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Whether `shutdown` has been called
    pub fn is_shut_down(&self) -> bool {
        self.inner.state.lock().shutdown
    }

    /// Shut the pool down.
    ///
    /// Terminal and idempotent: stops the sweeper, fails all waiting and
    /// future acquisitions, and closes every idle connection. Outstanding
    /// leases stay usable until their callers release them; those releases
    /// close the connection instead of recycling it.
    #[tracing::instrument(skip(self))]
    pub async fn shutdown(&self) {
        let drained = {
            let mut state = self.inner.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
            state.available.drain(..).collect::<Vec<_>>()
        };

        self.inner.shutdown_token.cancel();
        self.inner.lease_permits.close();

        let sweeper = self.inner.sweeper.lock().take();
        if let Some(handle) = sweeper {
            let _ = handle.await;
        }

        let closed = drained.len();
        for entry in drained {
            if let Err(error) = entry.raw.close().await {
                tracing::warn!(
                    entry_id = %entry.id,
                    error = %error,
                    "failed to close connection during shutdown"
                );
            }
        }

        tracing::info!(closed, "connection pool shut down");
    }
}

impl PoolInner {
    /// Return a lease to the pool.
    ///
    /// Rolls back uncommitted work, then recycles, retires, or discards the
    /// entry. The slot counts as pending for the whole return, and the
    /// permit is released only after the entry has settled, so a woken
    /// waiter observes the updated state.
    pub(crate) async fn release(
        &self,
        lease: Lease,
        dirty: bool,
        acquired_at: Instant,
    ) -> Result<()> {
        let Lease { mut entry, permit } = lease;
        let held = acquired_at.elapsed();
        let entry_id = entry.id;
        let lease_count = entry.lease_count;

        // Settle the lease bookkeeping first so a dropped release future
        // cannot leave the lease half-returned. The slot stays counted as
        // pending while the rollback runs, so the sweeper never opens a
        // replacement for an entry that is merely returning.
        let pending = {
            let mut state = self.state.lock();
            state.outstanding.remove(&entry_id);
            state.stats.record_lease_end(held);
            let outstanding = state.outstanding.len();
            state.stats.sample_leased(outstanding);
            state.pending += 1;
            PendingGuard::new(self)
        };

        let mut rollback_error = None;
        if dirty {
            match entry.raw.rollback().await {
                Ok(()) => {
                    tracing::debug!(entry_id = %entry_id, "rolled back uncommitted work on release");
                }
                Err(error) => {
                    tracing::warn!(
                        entry_id = %entry_id,
                        error = %error,
                        "rollback on release failed; discarding connection"
                    );
                    rollback_error = Some(error);
                }
            }
        }

        let mut to_close = None;
        let mut replacement = None;
        let mut retired = false;
        {
            let mut state = self.state.lock();
            pending.settle(&mut state);
            let retire = self
                .config
                .retire_limit()
                .is_some_and(|limit| lease_count >= limit);

            if state.shutdown || rollback_error.is_some() {
                to_close = Some(entry);
            } else if retire {
                retired = true;
                state.stats.record_retired();
                if state.tracked_size() < self.config.min_size() {
                    state.pending += 1;
                    replacement = Some(PendingGuard::new(self));
                }
                to_close = Some(entry);
            } else {
                entry.last_released_at = Instant::now();
                state.available.push_back(entry);
            }
        }

        // Wake a waiter only after the entry has settled above.
        drop(permit);

        if retired {
            tracing::info!(entry_id = %entry_id, lease_count, "connection retired");
        }

        let mut close_result = Ok(());
        if let Some(entry) = to_close {
            if let Err(error) = entry.raw.close().await {
                tracing::warn!(
                    entry_id = %entry_id,
                    error = %error,
                    "failed to close connection on release"
                );
                close_result = Err(error);
            }
        }

        if let Some(replacement) = replacement {
            self.open_replacement(replacement).await;
        }

        match rollback_error {
            Some(error) => Err(error),
            None => close_result,
        }
    }

    /// Write off a lease dropped outside a runtime: fix the bookkeeping
    /// without closing the raw connection, which would need async I/O.
    pub(crate) fn forget_lease(&self, lease: &Lease, acquired_at: Instant) {
        let mut state = self.state.lock();
        state.outstanding.remove(&lease.entry.id);
        state.stats.record_lease_end(acquired_at.elapsed());
        let outstanding = state.outstanding.len();
        state.stats.sample_leased(outstanding);
    }

    /// Open one replacement connection after a retirement left the pool
    /// below its minimum size. The caller counted the slot in `pending`;
    /// the guard settles it whatever the outcome.
    async fn open_replacement(&self, pending: PendingGuard<'_>) {
        match self.connector.open().await {
            Ok(raw) => {
                let entry = PoolEntry::new(raw);
                let entry_id = entry.id;
                let surplus = {
                    let mut state = self.state.lock();
                    pending.settle(&mut state);
                    if state.shutdown || state.tracked_size() >= self.config.max_size() {
                        Some(entry)
                    } else {
                        state.available.push_back(entry);
                        let current = state.current_size();
                        state.stats.note_pool_size(current);
                        None
                    }
                };
                match surplus {
                    Some(entry) => {
                        tracing::debug!(entry_id = %entry_id, "discarding surplus replacement connection");
                        if let Err(error) = entry.raw.close().await {
                            tracing::warn!(
                                entry_id = %entry_id,
                                error = %error,
                                "failed to close surplus replacement connection"
                            );
                        }
                    }
                    None => {
                        tracing::debug!(entry_id = %entry_id, "opened replacement connection");
                    }
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to open replacement connection");
            }
        }
    }
}
