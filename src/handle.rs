//! The pooled session handle (spec.md §4.3). Borrowed from
//! [`crate::pool::Pool::acquire`], returned to the pool on
//! [`PooledHandle::close`].
//!
//! `PooledHandle` exposes the same operation names as [`Session`] by
//! delegation rather than `Deref` — see Design Notes §9 and SPEC_FULL.md
//! §4.3 for why this diverges from hyper-util's `Pooled<T, K>` — but it
//! does not implement the `Session` trait itself: that trait's `close`
//! consumes `self`, which is incompatible with the idempotent, repeatedly-
//! callable `&self` close a pooled handle needs (`java.sql.Connection`
//! semantics). Giving the handle its own inherent methods of the same
//! names sidesteps that clash entirely.

use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{Cause, PoolError};
use crate::pool::Pool;
use crate::session::{BatchWriteError, Item, Session, SessionFactory, Validator, WriteIntent};

/// A borrowed physical session. Every relational operation is forwarded to
/// the underlying session after a `closed` check and a `lastAccessAt`
/// stamp. Dropping a handle without calling [`PooledHandle::close`] leaks
/// the slot from the pool's point of view until the handle itself is
/// dropped, at which point [`Drop`] performs a best-effort forced abort —
/// callers are still expected to call `close` explicitly, the same way a
/// `java.sql.Connection` is expected to be closed rather than merely
/// garbage-collected.
pub struct PooledHandle<S, Fac, Val>
where
    S: Session,
    Fac: SessionFactory<Session = S>,
    Val: Validator<S>,
{
    pool: Pool<S, Fac, Val>,
    physical: Mutex<Option<Arc<S>>>,
    closed: AtomicBool,
    created_at: Instant,
    last_access_at: Mutex<Instant>,
}

impl<S, Fac, Val> PooledHandle<S, Fac, Val>
where
    S: Session,
    Fac: SessionFactory<Session = S>,
    Val: Validator<S>,
{
    pub(crate) fn new(pool: Pool<S, Fac, Val>, physical: Arc<S>, created_at: Instant) -> Self {
        let now = Instant::now();
        PooledHandle {
            pool,
            physical: Mutex::new(Some(physical)),
            closed: AtomicBool::new(false),
            created_at,
            last_access_at: Mutex::new(now),
        }
    }

    /// When this physical session was created, independent of how many
    /// times it has been borrowed and returned.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_access_at(&self) -> Instant {
        *self.last_access_at.lock().unwrap()
    }

    /// Idempotent, callable any number of times — repeat calls after the
    /// first are a no-op, matching `java.sql.Connection::close`. Returns
    /// the underlying session to the pool's idle set (subject to
    /// `testOnReturn`) exactly once.
    pub async fn close(&self) {
        if self.closed.compare_exchange(
            false,
            true,
            AtomicOrdering::AcqRel,
            AtomicOrdering::Acquire,
        ) != Ok(false)
        {
            return;
        }
        let physical = self.physical.lock().unwrap().take();
        if let Some(physical) = physical {
            self.pool.return_session(physical, self.created_at).await;
        }
    }

    /// Marks the handle closed and destroys the underlying session
    /// unconditionally instead of returning it to the pool. Used when a
    /// caller knows the session is no longer trustworthy (e.g. a protocol
    /// error on the wire) and wants to guarantee it is never reused.
    pub async fn discard(&self) {
        if self.closed.compare_exchange(
            false,
            true,
            AtomicOrdering::AcqRel,
            AtomicOrdering::Acquire,
        ) != Ok(false)
        {
            return;
        }
        let physical = self.physical.lock().unwrap().take();
        if let Some(physical) = physical {
            self.pool.discard_session(physical).await;
        }
    }

    fn touch(&self) {
        *self.last_access_at.lock().unwrap() = Instant::now();
    }

    fn live(&self) -> Result<Arc<S>, PoolError> {
        if self.closed.load(AtomicOrdering::Acquire) {
            return Err(PoolError::SessionClosed);
        }
        self.physical
            .lock()
            .unwrap()
            .clone()
            .ok_or(PoolError::SessionClosed)
    }

    /// Unwraps this handle to its underlying physical session (spec.md
    /// §4.3's "unwrap operations are transparent"): the caller asking for
    /// the concrete session type gets the physical session directly,
    /// bypassing `closed`/`lastAccessAt` bookkeeping, the way
    /// `java.sql.Wrapper::unwrap` hands back a driver-specific connection
    /// type. Fails with `SessionClosed` once the handle is closed.
    pub fn unwrap_session(&self) -> Result<Arc<S>, PoolError> {
        self.live()
    }

    /// Unwraps this handle to itself — the identity half of the same
    /// contract, for a caller that asks for the handle type rather than
    /// the physical session type.
    pub fn unwrap_handle(&self) -> &Self {
        self
    }

    /// Runs an explicit liveness probe against the underlying session,
    /// independent of `testOnBorrow`/`testOnReturn`/`testWhileIdle`. Unlike
    /// those, a failed probe does not destroy the session or retry
    /// anything — it only reports `ValidationFailed`, leaving the decision
    /// to keep using, `discard`, or re-probe the handle to the caller.
    pub async fn validate(&self, timeout: Duration) -> Result<(), PoolError> {
        let physical = self.live()?;
        if self.pool.probe(&physical, timeout).await {
            Ok(())
        } else {
            Err(PoolError::ValidationFailed)
        }
    }

    /// Opens a write-transaction coordinator borrowing this handle's
    /// session. The returned coordinator holds its own clone of the
    /// session for as long as it lives, so it must be dropped (after
    /// `commit` or `rollback`) before the handle is closed — closing a
    /// handle with a transaction still outstanding leaves the session
    /// undestroyed until that coordinator is also dropped.
    pub fn transaction(&self) -> Result<crate::txn::TransactionCoordinator<S>, PoolError> {
        self.live().map(crate::txn::TransactionCoordinator::new)
    }

    pub async fn execute_statement(&self, statement: &str) -> Result<Vec<Item>, Cause> {
        let physical = self.live().map_err(|e| Box::new(e) as Cause)?;
        self.touch();
        physical.execute_statement(statement).await
    }

    pub async fn batch_write(&self, intents: &[WriteIntent]) -> Result<(), BatchWriteError> {
        let physical = self
            .live()
            .map_err(|e| BatchWriteError::Other(Box::new(e)))?;
        self.touch();
        physical.batch_write(intents).await
    }

    pub fn is_closed(&self) -> bool {
        if self.closed.load(AtomicOrdering::Acquire) {
            return true;
        }
        match self.physical.lock().unwrap().as_ref() {
            Some(physical) => physical.is_closed(),
            None => true,
        }
    }
}

impl<S, Fac, Val> Drop for PooledHandle<S, Fac, Val>
where
    S: Session,
    Fac: SessionFactory<Session = S>,
    Val: Validator<S>,
{
    fn drop(&mut self) {
        if self.closed.load(AtomicOrdering::Acquire) {
            return;
        }
        let Some(physical) = self.physical.lock().unwrap().take() else {
            return;
        };
        let pool = self.pool.clone();
        tokio::spawn(async move {
            pool.discard_session(physical).await;
        });
    }
}
