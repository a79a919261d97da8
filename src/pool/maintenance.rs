//! Background evictor. One task per pool, holding only a `Weak`
//! back-reference so it exits once the pool and every live handle are
//! gone; also exits promptly when [`crate::pool::Pool::close`] flips the
//! shutdown signal, checked at every tick boundary.

use std::sync::Weak;
use std::time::Instant;

use tokio::sync::watch;

use crate::pool::idle::{destroy, IdleEntry};
use crate::pool::shared::PoolShared;
use crate::session::{Session, SessionFactory, Validator};

pub(crate) async fn run<S, Fac, Val>(
    shared: Weak<PoolShared<S, Fac, Val>>,
    mut shutdown_rx: watch::Receiver<bool>,
) where
    S: Session,
    Fac: SessionFactory<Session = S>,
    Val: Validator<S>,
{
    let mut interval = {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        tokio::time::interval(shared.config.eviction_interval)
    };
    // The first tick fires immediately; that's not a useful eviction pass.
    interval.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::trace!("maintenance loop observed shutdown, exiting");
                    return;
                }
            }
            _ = interval.tick() => {
                let Some(shared) = shared.upgrade() else {
                    tracing::trace!("pool dropped, maintenance loop exiting");
                    return;
                };
                run_once(&shared).await;
            }
        }
    }
}

async fn run_once<S, Fac, Val>(shared: &PoolShared<S, Fac, Val>)
where
    S: Session,
    Fac: SessionFactory<Session = S>,
    Val: Validator<S>,
{
    let config = &shared.config;

    let (candidates, mut allowed_idle_evictions) = {
        let mut inner = shared.inner.lock().unwrap();
        if inner.is_shutdown() {
            return;
        }
        let allowed = inner
            .idle_len()
            .saturating_sub(config.min_size);
        (
            inner.take_for_eviction_scan(config.num_tests_per_eviction_run),
            allowed,
        )
    };

    let mut survivors = Vec::with_capacity(candidates.len());
    let mut evicted = 0usize;

    for mut entry in candidates {
        if entry.over_age(config) {
            tracing::debug!("evicting idle session past maxLifetime");
            destroy(entry.physical).await;
            evicted += 1;
            continue;
        }

        if entry.idle_expired(config) && allowed_idle_evictions > 0 {
            tracing::debug!("evicting idle session past idleTimeout");
            destroy(entry.physical).await;
            evicted += 1;
            allowed_idle_evictions -= 1;
            continue;
        }

        if config.test_while_idle && entry.needs_idle_validation(config) {
            let ok = shared
                .validator
                .validate(&entry.physical, config.validation_timeout)
                .await;
            if ok {
                entry.last_validated_at = Instant::now();
                survivors.push(entry);
            } else {
                tracing::debug!("evicting idle session that failed testWhileIdle validation");
                destroy(entry.physical).await;
                evicted += 1;
            }
            continue;
        }

        survivors.push(entry);
    }

    {
        let mut inner = shared.inner.lock().unwrap();
        inner.mark_evicted(evicted);
        inner.restore_survivors(survivors);
    }

    refill_to_floor(shared).await;
}

/// After the eviction pass, tops the pool back up to `minSize` if the
/// combined idle + in-use count fell below it.
async fn refill_to_floor<S, Fac, Val>(shared: &PoolShared<S, Fac, Val>)
where
    S: Session,
    Fac: SessionFactory<Session = S>,
    Val: Validator<S>,
{
    let config = &shared.config;
    loop {
        let should_create = {
            let mut inner = shared.inner.lock().unwrap();
            if inner.is_shutdown() {
                return;
            }
            if inner.total() < config.min_size && inner.can_grow() {
                inner.begin_create();
                true
            } else {
                false
            }
        };
        if !should_create {
            return;
        }

        match shared.factory.create(&config.connection_properties).await {
            Ok(physical) => {
                let entry = IdleEntry::fresh(std::sync::Arc::new(physical), Instant::now());
                let mut inner = shared.inner.lock().unwrap();
                inner.release(entry);
            }
            Err(error) => {
                tracing::warn!(error = %error, "maintenance refill: session factory failed");
                let mut inner = shared.inner.lock().unwrap();
                inner.abort_create();
                return;
            }
        }
    }
}
