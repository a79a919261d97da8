//! Pool core: owns counts, the idle set, and the waiter queue behind a
//! single leaf mutex (spec.md §4.1). Grounded in hyper-util's
//! `client::legacy::pool::{Pool, PoolInner}` — same split between a
//! synchronous, lock-held bookkeeping layer and the async code that calls
//! the factory/validator outside the lock and merges the result back in.

pub(crate) mod idle;
pub(crate) mod inner;
mod maintenance;
pub(crate) mod shared;

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;

use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::handle::PooledHandle;
use crate::session::{Session, SessionFactory, Validator};

use idle::{destroy, IdleEntry, Physical};
use inner::PoolInner;
use shared::PoolShared;

/// Guards one registered waiter slot for the duration of an `rx.await`.
/// Its `Drop` always runs `clean_waiters`, so a waiter that stops being
/// polled for any reason — its own timeout, pool closure, or the enclosing
/// `acquire`/`acquire_deadline` future being dropped outright by task
/// cancellation — never leaves a stale, already-cancelled sender sitting in
/// `PoolInner::waiters` until some unrelated release/discard/timeout
/// happens to scan for it.
struct WaiterSlot<'p, S, Fac, Val>
where
    S: Session,
    Fac: SessionFactory<Session = S>,
    Val: Validator<S>,
{
    pool: &'p Pool<S, Fac, Val>,
}

impl<S, Fac, Val> Drop for WaiterSlot<'_, S, Fac, Val>
where
    S: Session,
    Fac: SessionFactory<Session = S>,
    Val: Validator<S>,
{
    fn drop(&mut self) {
        self.pool.shared.inner.lock().unwrap().clean_waiters();
    }
}

/// A snapshot of pool occupancy, taken under the pool lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub idle: usize,
    pub in_use: usize,
    pub waiters: usize,
}

/// A bounded pool of physical sessions, multiplexed over a factory and a
/// validator. Cheap to clone — clones share the same underlying state, the
/// same way `hyper_util`'s `Pool<T, K>` does.
pub struct Pool<S, Fac, Val>
where
    S: Session,
    Fac: SessionFactory<Session = S>,
    Val: Validator<S>,
{
    shared: Arc<PoolShared<S, Fac, Val>>,
}

impl<S, Fac, Val> Clone for Pool<S, Fac, Val>
where
    S: Session,
    Fac: SessionFactory<Session = S>,
    Val: Validator<S>,
{
    fn clone(&self) -> Self {
        Pool {
            shared: self.shared.clone(),
        }
    }
}

impl<S, Fac, Val> Pool<S, Fac, Val>
where
    S: Session,
    Fac: SessionFactory<Session = S>,
    Val: Validator<S>,
{
    /// Builds a pool and prewarms it to `initialSize`, then starts the
    /// background maintenance loop.
    pub async fn new(config: PoolConfig, factory: Fac, validator: Val) -> Result<Self, PoolError> {
        let max_size = config.max_size;
        let ordering = config.ordering;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let shared = Arc::new(PoolShared {
            inner: std::sync::Mutex::new(PoolInner::new(max_size, ordering)),
            config,
            factory,
            validator,
            shutdown_tx,
        });

        let pool = Pool { shared };
        pool.prewarm().await?;

        tokio::spawn(maintenance::run(
            Arc::downgrade(&pool.shared),
            shutdown_rx,
        ));

        Ok(pool)
    }

    async fn prewarm(&self) -> Result<(), PoolError> {
        for _ in 0..self.shared.config.initial_size {
            {
                let mut inner = self.shared.inner.lock().unwrap();
                inner.begin_create();
            }
            let timeout = self.shared.config.connect_timeout;
            let created = tokio::time::timeout(
                timeout,
                self.shared.factory.create(&self.shared.config.connection_properties),
            )
            .await;
            match created {
                Ok(Ok(physical)) => {
                    let entry = IdleEntry::fresh(Arc::new(physical), Instant::now());
                    let mut inner = self.shared.inner.lock().unwrap();
                    inner.release(entry);
                }
                Ok(Err(cause)) => {
                    let mut inner = self.shared.inner.lock().unwrap();
                    inner.abort_create();
                    return Err(PoolError::AcquisitionFailed(cause));
                }
                Err(_elapsed) => {
                    let mut inner = self.shared.inner.lock().unwrap();
                    inner.abort_create();
                    return Err(PoolError::Timeout);
                }
            }
        }
        Ok(())
    }

    /// Acquires a handle, waiting at most `maxWait` from now.
    pub async fn acquire(&self) -> Result<PooledHandle<S, Fac, Val>, PoolError> {
        let deadline = Instant::now() + self.shared.config.max_wait;
        self.acquire_deadline(deadline).await
    }

    /// Acquires a handle, honoring an explicit deadline even if it is
    /// longer or shorter than `maxWait`.
    pub async fn acquire_deadline(
        &self,
        deadline: Instant,
    ) -> Result<PooledHandle<S, Fac, Val>, PoolError> {
        loop {
            if Instant::now() >= deadline {
                return Err(PoolError::Timeout);
            }

            enum Decision<S> {
                Idle(IdleEntry<S>),
                Create,
                Wait(inner::WaiterRx<S>),
                Exhausted,
                Closed,
            }

            let decision = {
                let mut guard = self.shared.inner.lock().unwrap();
                if guard.is_shutdown() {
                    Decision::Closed
                } else if let Some(entry) = guard.take_idle() {
                    Decision::Idle(entry)
                } else if guard.can_grow() {
                    guard.begin_create();
                    Decision::Create
                } else if !self.shared.config.block_when_exhausted {
                    Decision::Exhausted
                } else {
                    Decision::Wait(guard.register_waiter())
                }
            };

            match decision {
                Decision::Closed => return Err(PoolError::PoolClosed),
                Decision::Exhausted => return Err(PoolError::PoolExhausted),

                Decision::Idle(entry) => match self.borrow_validate(entry).await? {
                    Some((physical, created_at)) => {
                        return Ok(self.wrap_handle(physical, created_at))
                    }
                    None => continue,
                },

                Decision::Create => {
                    let budget = deadline
                        .saturating_duration_since(Instant::now())
                        .min(self.shared.config.connect_timeout);
                    let created = tokio::time::timeout(
                        budget,
                        self.shared
                            .factory
                            .create(&self.shared.config.connection_properties),
                    )
                    .await;
                    match created {
                        Ok(Ok(physical)) => {
                            let entry = IdleEntry::fresh(Arc::new(physical), Instant::now());
                            match self.borrow_validate(entry).await? {
                                Some((physical, created_at)) => {
                                    return Ok(self.wrap_handle(physical, created_at))
                                }
                                None => continue,
                            }
                        }
                        Ok(Err(cause)) => {
                            self.shared.inner.lock().unwrap().abort_create();
                            return Err(PoolError::AcquisitionFailed(cause));
                        }
                        Err(_elapsed) => {
                            self.shared.inner.lock().unwrap().abort_create();
                            return Err(PoolError::Timeout);
                        }
                    }
                }

                Decision::Wait(rx) => {
                    let slot = WaiterSlot { pool: self };
                    let budget = deadline.saturating_duration_since(Instant::now());
                    let outcome = tokio::time::timeout(budget, rx).await;
                    drop(slot);
                    match outcome {
                        Ok(Ok(Ok(delivered))) => {
                            let entry = IdleEntry {
                                physical: delivered.physical,
                                inserted_at: Instant::now(),
                                created_at: delivered.created_at,
                                last_validated_at: Instant::now(),
                            };
                            match self.borrow_validate(entry).await? {
                                Some((physical, created_at)) => {
                                    return Ok(self.wrap_handle(physical, created_at))
                                }
                                None => continue,
                            }
                        }
                        Ok(Ok(Err(pool_closed))) => return Err(pool_closed),
                        Ok(Err(_canceled)) => return Err(PoolError::PoolClosed),
                        Err(_elapsed) => return Err(PoolError::Timeout),
                    }
                }
            }
        }
    }

    /// Applies `testOnBorrow`. `Ok(None)` means the session failed
    /// validation and was destroyed — the caller should retry from the top
    /// of its acquire loop.
    async fn borrow_validate(
        &self,
        entry: IdleEntry<S>,
    ) -> Result<Option<(Physical<S>, Instant)>, PoolError> {
        if !self.shared.config.test_on_borrow {
            return Ok(Some((entry.physical, entry.created_at)));
        }

        let ok = self
            .shared
            .validator
            .validate(&entry.physical, self.shared.config.validation_timeout)
            .await;
        if ok {
            return Ok(Some((entry.physical, entry.created_at)));
        }

        tracing::debug!("borrowed session failed testOnBorrow, destroying");
        destroy(entry.physical).await;
        self.shared.inner.lock().unwrap().retire();
        self.maybe_replenish_for_waiters();
        Ok(None)
    }

    fn wrap_handle(&self, physical: Physical<S>, created_at: Instant) -> PooledHandle<S, Fac, Val> {
        PooledHandle::new(self.clone(), physical, created_at)
    }

    /// Runs the validator against a session with no other side effects —
    /// no destroy, no retry, no bookkeeping update. Backs
    /// [`PooledHandle::validate`]'s explicit, caller-initiated liveness
    /// probe, as distinct from the automatic `testOnBorrow`/`testOnReturn`/
    /// `testWhileIdle` checks the pool runs on its own.
    pub(crate) async fn probe(&self, physical: &Physical<S>, timeout: std::time::Duration) -> bool {
        self.shared.validator.validate(physical, timeout).await
    }

    /// Returns a session to the pool. Called by [`PooledHandle::close`].
    pub(crate) async fn return_session(&self, physical: Physical<S>, created_at: Instant) {
        if self.shared.inner.lock().unwrap().is_shutdown() {
            destroy(physical).await;
            self.shared.inner.lock().unwrap().retire();
            return;
        }

        if self.shared.config.test_on_return {
            let ok = self
                .shared
                .validator
                .validate(&physical, self.shared.config.validation_timeout)
                .await;
            if !ok {
                tracing::debug!("returned session failed testOnReturn, destroying");
                destroy(physical).await;
                self.shared.inner.lock().unwrap().retire();
                self.maybe_replenish_for_waiters();
                return;
            }
        }

        let entry = IdleEntry {
            physical,
            inserted_at: Instant::now(),
            created_at,
            last_validated_at: Instant::now(),
        };
        let mut guard = self.shared.inner.lock().unwrap();
        if guard.is_shutdown() {
            drop(guard);
            destroy(entry.physical).await;
            self.shared.inner.lock().unwrap().retire();
            return;
        }
        guard.release(entry);
    }

    /// Unconditionally destroys a session. Called by
    /// [`PooledHandle`] forced-abort operations.
    pub(crate) async fn discard_session(&self, physical: Physical<S>) {
        destroy(physical).await;
        self.shared.inner.lock().unwrap().retire();
        self.maybe_replenish_for_waiters();
    }

    /// If capacity just freed up and callers are still queued, kicks off
    /// one factory call outside the lock and hands the result straight to
    /// the longest-waiting caller via `release`'s waiter-priority path.
    fn maybe_replenish_for_waiters(&self) {
        let should = {
            let mut guard = self.shared.inner.lock().unwrap();
            if !guard.is_shutdown() && guard.can_grow() && guard.has_waiters() {
                guard.begin_create();
                true
            } else {
                false
            }
        };
        if !should {
            return;
        }

        let pool = self.clone();
        tokio::spawn(async move {
            let created = pool
                .shared
                .factory
                .create(&pool.shared.config.connection_properties)
                .await;
            match created {
                Ok(physical) => {
                    let entry = IdleEntry::fresh(Arc::new(physical), Instant::now());
                    pool.shared.inner.lock().unwrap().release(entry);
                }
                Err(cause) => {
                    tracing::warn!(error = %cause, "replenish-for-waiter: factory failed");
                    pool.shared.inner.lock().unwrap().abort_create();
                }
            }
        });
    }

    /// Shuts the pool down: no new handles are produced afterward, every
    /// idle session is destroyed, and every queued waiter is woken with
    /// [`PoolError::PoolClosed`]. Live handles continue to function until
    /// their own close.
    pub async fn close(&self) {
        let (idle, waiters) = {
            let mut guard = self.shared.inner.lock().unwrap();
            guard.begin_shutdown()
        };

        for waiter in waiters {
            let _ = waiter.send(Err(PoolError::PoolClosed));
        }

        for entry in idle {
            destroy(entry.physical).await;
        }

        let _ = self.shared.shutdown_tx.send(true);
    }

    /// A snapshot of current occupancy.
    pub fn stats(&self) -> PoolStats {
        let s = self.shared.inner.lock().unwrap().stats();
        PoolStats {
            total: s.total,
            idle: s.idle,
            in_use: s.in_use,
            waiters: s.waiters,
        }
    }
}
