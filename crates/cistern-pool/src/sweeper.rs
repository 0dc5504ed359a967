//! Background expiration sweeper

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::pool::{PendingGuard, PoolEntry, PoolInner};

/// Spawn the sweeper task for a pool with expiration enabled.
///
/// The task holds only a weak reference to the pool, so dropping every pool
/// handle without calling shutdown still lets the task exit.
pub(crate) fn spawn(inner: &Arc<PoolInner>, interval: Duration) -> JoinHandle<()> {
    let weak = Arc::downgrade(inner);
    let token = inner.shutdown_token.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if !sweep(&weak).await {
                        break;
                    }
                }
            }
        }
        tracing::debug!("expiration sweeper stopped");
    })
}

/// One sweep cycle: close idle connections past the expiration threshold,
/// then replenish to the minimum size. Returns false once the pool is gone.
async fn sweep(weak: &Weak<PoolInner>) -> bool {
    let Some(inner) = weak.upgrade() else {
        return false;
    };
    let Some(expire_after) = inner.config.expire_after() else {
        return false;
    };

    let now = Instant::now();
    let expired = {
        let mut state = inner.state.lock();
        if state.shutdown {
            return false;
        }
        let mut expired = Vec::new();
        let mut kept = VecDeque::with_capacity(state.available.len());
        while let Some(entry) = state.available.pop_front() {
            if now.duration_since(entry.last_released_at) >= expire_after {
                expired.push(entry);
            } else {
                kept.push_back(entry);
            }
        }
        state.available = kept;
        if !expired.is_empty() {
            state.stats.record_expired(expired.len());
        }
        expired
    };

    if !expired.is_empty() {
        tracing::info!(expired = expired.len(), "closing expired connections");
        for entry in expired {
            tracing::debug!(
                entry_id = %entry.id,
                idle_ms = now.duration_since(entry.last_released_at).as_millis() as u64,
                age_ms = now.duration_since(entry.created_at).as_millis() as u64,
                "connection expired"
            );
            if let Err(error) = entry.raw.close().await {
                tracing::warn!(
                    entry_id = %entry.id,
                    error = %error,
                    "failed to close expired connection"
                );
            }
        }
    }

    replenish(&inner).await;
    true
}

/// Open connections until the pool is back at its minimum size. Best-effort:
/// an open failure ends the attempt until the next cycle.
async fn replenish(inner: &Arc<PoolInner>) {
    loop {
        let pending = {
            let mut state = inner.state.lock();
            if state.shutdown || state.tracked_size() >= inner.config.min_size() {
                return;
            }
            state.pending += 1;
            PendingGuard::new(inner)
        };

        match inner.connector.open().await {
            Ok(raw) => {
                let entry = PoolEntry::new(raw);
                let entry_id = entry.id;
                // Demand may have filled the pool while the open ran, so the
                // bound is re-checked before the entry is inserted.
                let rejected = {
                    let mut state = inner.state.lock();
                    pending.settle(&mut state);
                    if state.shutdown || state.tracked_size() >= inner.config.max_size() {
                        Some(entry)
                    } else {
                        state.available.push_back(entry);
                        let current = state.current_size();
                        state.stats.note_pool_size(current);
                        None
                    }
                };
                match rejected {
                    Some(entry) => {
                        tracing::debug!(entry_id = %entry_id, "discarding surplus replenished connection");
                        if let Err(error) = entry.raw.close().await {
                            tracing::warn!(
                                entry_id = %entry_id,
                                error = %error,
                                "failed to close surplus replenished connection"
                            );
                        }
                        return;
                    }
                    None => {
                        tracing::debug!(entry_id = %entry_id, "replenished connection");
                    }
                }
            }
            Err(error) => {
                tracing::warn!(error = %error, "failed to replenish pool to minimum size");
                return;
            }
        }
    }
}
