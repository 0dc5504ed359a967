//! Leased connection wrapper

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use cistern_core::{CisternError, Connection, QueryResult, Result, Value};
use parking_lot::Mutex;
use tokio::sync::OwnedSemaphorePermit;

use crate::pool::{PoolEntry, PoolInner};

/// The pool-side half of an outstanding lease.
///
/// Holds the physical entry and the semaphore permit backing the lease; both
/// travel back to the pool together on release.
pub(crate) struct Lease {
    pub(crate) entry: PoolEntry,
    pub(crate) permit: OwnedSemaphorePermit,
}

/// A pooled connection leased to a caller.
///
/// Implements [`Connection`] and forwards every operation to the underlying
/// raw connection while the lease is live. `close` returns the connection to
/// the pool instead of closing it; afterwards every operation fails with
/// `ConnectionClosed` and a second `close` is a silent no-op. Dropping the
/// wrapper without closing it returns the connection too.
pub struct PooledConnection {
    pool: Arc<PoolInner>,
    lease: Mutex<Option<Lease>>,
    driver_name: String,
    acquired_at: Instant,
    closed: AtomicBool,
    /// Statements ran with auto-commit off and no commit has followed
    dirty: AtomicBool,
    auto_commit: AtomicBool,
    operations: AtomicU64,
}

impl PooledConnection {
    pub(crate) fn new(
        pool: Arc<PoolInner>,
        entry: PoolEntry,
        permit: OwnedSemaphorePermit,
        acquired_at: Instant,
    ) -> Self {
        let driver_name = entry.raw.driver_name().to_string();
        Self {
            pool,
            lease: Mutex::new(Some(Lease { entry, permit })),
            driver_name,
            acquired_at,
            closed: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            auto_commit: AtomicBool::new(false),
            operations: AtomicU64::new(0),
        }
    }

    /// Number of statements executed through this lease
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Clone out the raw connection, failing once the lease is closed
    fn raw(&self) -> Result<Arc<dyn Connection>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(CisternError::ConnectionClosed);
        }
        self.lease
            .lock()
            .as_ref()
            .map(|lease| lease.entry.raw.clone())
            .ok_or(CisternError::ConnectionClosed)
    }

    fn mark_dirty_on_success<T>(&self, result: &Result<T>) {
        if result.is_ok() && !self.auto_commit.load(Ordering::SeqCst) {
            self.dirty.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Connection for PooledConnection {
    fn driver_name(&self) -> &str {
        &self.driver_name
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let raw = self.raw()?;
        self.operations.fetch_add(1, Ordering::SeqCst);
        let result = raw.execute(sql, params).await;
        self.mark_dirty_on_success(&result);
        result
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let raw = self.raw()?;
        self.operations.fetch_add(1, Ordering::SeqCst);
        let result = raw.query(sql, params).await;
        self.mark_dirty_on_success(&result);
        result
    }

    async fn set_auto_commit(&self, auto_commit: bool) -> Result<()> {
        let raw = self.raw()?;
        raw.set_auto_commit(auto_commit).await?;
        self.auto_commit.store(auto_commit, Ordering::SeqCst);
        if auto_commit {
            // Switching auto-commit on commits the open transaction.
            self.dirty.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    fn auto_commit(&self) -> bool {
        self.auto_commit.load(Ordering::SeqCst)
    }

    async fn commit(&self) -> Result<()> {
        let raw = self.raw()?;
        raw.commit().await?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&self) -> Result<()> {
        let raw = self.raw()?;
        raw.rollback().await?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Release the connection back to the pool.
    ///
    /// Uncommitted work is rolled back before the connection is recycled; a
    /// rollback failure discards the connection and surfaces here.
    async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let lease = self.lease.lock().take();
        match lease {
            Some(lease) => {
                self.pool
                    .release(lease, self.dirty.load(Ordering::SeqCst), self.acquired_at)
                    .await
            }
            None => Ok(()),
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(lease) = self.lease.get_mut().take() else {
            return;
        };
        let pool = self.pool.clone();
        let dirty = self.dirty.load(Ordering::SeqCst);
        let acquired_at = self.acquired_at;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(error) = pool.release(lease, dirty, acquired_at).await {
                        tracing::warn!(error = %error, "failed to release dropped connection");
                    }
                });
            }
            Err(_) => {
                // No runtime to run the release on; fix the bookkeeping and
                // let the raw connection drop unclosed.
                tracing::warn!("pooled connection dropped outside a runtime; discarding");
                pool.forget_lease(&lease, acquired_at);
            }
        }
    }
}
