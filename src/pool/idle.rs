//! The idle-set entry and the policy that decides which end of the deque
//! to take from and insert at.
//!
//! Physical sessions are carried internally as `Arc<S>` rather than bare
//! `S`: a handle's proxied operations are `&self` methods (matching
//! JDBC-style `Connection` semantics, where `close()` is callable
//! repeatedly on a still-live object), so the handle needs to clone a
//! reference out from under a short-lived `std::sync::Mutex` guard before
//! awaiting on it. `Arc` is the vehicle for that; by construction exactly
//! one logical owner (idle set, handle, or maintenance) ever holds the
//! live clone at a time, so `Arc::try_unwrap` always succeeds when a
//! session is destroyed.

use std::sync::Arc;
use std::time::Instant;

use crate::config::PoolConfig;
use crate::session::Session;

pub(crate) type Physical<S> = Arc<S>;

/// A physical session currently sitting in the idle reservoir.
pub(crate) struct IdleEntry<S> {
    pub(crate) physical: Physical<S>,
    pub(crate) inserted_at: Instant,
    pub(crate) created_at: Instant,
    pub(crate) last_validated_at: Instant,
}

impl<S: Session> IdleEntry<S> {
    pub(crate) fn fresh(physical: Physical<S>, created_at: Instant) -> Self {
        let now = Instant::now();
        IdleEntry {
            physical,
            inserted_at: now,
            created_at,
            last_validated_at: now,
        }
    }

    pub(crate) fn over_age(&self, config: &PoolConfig) -> bool {
        self.created_at.elapsed() > config.max_lifetime
    }

    pub(crate) fn idle_expired(&self, config: &PoolConfig) -> bool {
        self.inserted_at.elapsed() > config.idle_timeout
    }

    pub(crate) fn needs_idle_validation(&self, config: &PoolConfig) -> bool {
        self.last_validated_at.elapsed() > config.eviction_interval
    }
}

/// Tears down a physical session exactly once. `Arc::try_unwrap` succeeds
/// because by the time a session reaches here its last other owner (the
/// idle-set slot or the handle) has already released its clone.
pub(crate) async fn destroy<S: Session>(physical: Physical<S>) {
    match Arc::try_unwrap(physical) {
        Ok(session) => session.close().await,
        Err(_still_shared) => {
            tracing::warn!("destroying a physical session with outstanding references");
        }
    }
}
