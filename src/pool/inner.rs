//! `PoolInner` is the leaf-lock-guarded core: counts, idle set, and waiter
//! queue. Every method here is synchronous and never awaits — the factory
//! and validator are always invoked outside the lock by the caller, which
//! merges the result back in with a second, separate borrow of this type.

use std::collections::VecDeque;
use std::time::Instant;

use futures_channel::oneshot;

use crate::config::Ordering;
use crate::error::PoolError;
use crate::pool::idle::{IdleEntry, Physical};
use crate::session::Session;

/// What a waiter is ultimately handed: a session plus the `createdAt` it
/// was born with, so the handle wrapping it still knows its true age for
/// `maxLifetime` purposes.
pub(crate) struct Delivered<S> {
    pub(crate) physical: Physical<S>,
    pub(crate) created_at: Instant,
}

pub(crate) type WaiterTx<S> = oneshot::Sender<Result<Delivered<S>, PoolError>>;
pub(crate) type WaiterRx<S> = oneshot::Receiver<Result<Delivered<S>, PoolError>>;

pub(crate) struct PoolInner<S> {
    idle: VecDeque<IdleEntry<S>>,
    waiters: VecDeque<WaiterTx<S>>,
    total: usize,
    shutdown: bool,
    max_size: usize,
    ordering: Ordering,
}

pub(crate) struct Stats {
    pub(crate) total: usize,
    pub(crate) idle: usize,
    pub(crate) in_use: usize,
    pub(crate) waiters: usize,
}

impl<S: Session> PoolInner<S> {
    pub(crate) fn new(max_size: usize, ordering: Ordering) -> Self {
        PoolInner {
            idle: VecDeque::new(),
            waiters: VecDeque::new(),
            total: 0,
            shutdown: false,
            max_size,
            ordering,
        }
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    pub(crate) fn idle_len(&self) -> usize {
        self.idle.len()
    }

    pub(crate) fn total(&self) -> usize {
        self.total
    }

    pub(crate) fn can_grow(&self) -> bool {
        self.total < self.max_size
    }

    pub(crate) fn begin_create(&mut self) {
        self.total += 1;
    }

    /// Undoes `begin_create` when the factory call fails or times out.
    pub(crate) fn abort_create(&mut self) {
        self.total -= 1;
    }

    /// Removes a session from the idle set per the ordering policy. LIFO
    /// takes the most-recently-inserted end; FIFO the oldest. Insertion
    /// always happens at the same (back) end, so both operations are O(1)
    /// regardless of policy.
    pub(crate) fn take_idle(&mut self) -> Option<IdleEntry<S>> {
        match self.ordering {
            Ordering::Lifo => self.idle.pop_back(),
            Ordering::Fifo => self.idle.pop_front(),
        }
    }

    pub(crate) fn register_waiter(&mut self) -> WaiterRx<S> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(tx);
        rx
    }

    /// Drops any waiter senders whose receivers were already dropped
    /// (the caller's `acquire` future was cancelled or timed out), so a
    /// cancelled wait never leaks a slot in the queue.
    pub(crate) fn clean_waiters(&mut self) {
        self.waiters.retain(|tx| !tx.is_canceled());
    }

    pub(crate) fn has_waiters(&mut self) -> bool {
        self.clean_waiters();
        !self.waiters.is_empty()
    }

    /// Returns a session to the pool: handed directly to the longest-
    /// waiting caller if one is queued (so a returned session never sits
    /// idle while anyone is waiting), otherwise inserted into the idle set.
    pub(crate) fn release(&mut self, entry: IdleEntry<S>) {
        let mut pending = Delivered {
            physical: entry.physical,
            created_at: entry.created_at,
        };
        while let Some(tx) = self.waiters.pop_front() {
            match tx.send(Ok(pending)) {
                Ok(()) => return,
                Err(Ok(returned)) => {
                    pending = returned;
                    continue;
                }
                Err(Err(_)) => unreachable!("inner never sends Err through this path"),
            }
        }
        self.idle.push_back(IdleEntry {
            physical: pending.physical,
            inserted_at: Instant::now(),
            created_at: pending.created_at,
            last_validated_at: Instant::now(),
        });
    }

    /// A session was destroyed (eviction, validation failure, or
    /// forced-abort); decrements the live count.
    pub(crate) fn retire(&mut self) {
        self.total -= 1;
    }

    /// Scans up to `limit` idle entries, oldest first, for the maintenance
    /// loop. Removes and returns them; the caller decides each entry's
    /// fate and must call [`PoolInner::restore_survivors`] with whatever
    /// it keeps.
    pub(crate) fn take_for_eviction_scan(&mut self, limit: usize) -> Vec<IdleEntry<S>> {
        let take = limit.min(self.idle.len());
        (0..take).filter_map(|_| self.idle.pop_front()).collect()
    }

    /// Re-inserts entries the maintenance loop decided to keep, preserving
    /// their relative (oldest-first) order at the front of the idle set.
    pub(crate) fn restore_survivors(&mut self, survivors: Vec<IdleEntry<S>>) {
        for entry in survivors.into_iter().rev() {
            self.idle.push_front(entry);
        }
    }

    pub(crate) fn mark_evicted(&mut self, count: usize) {
        self.total -= count;
    }

    /// Transitions the pool to shutdown. Returns every idle entry (for the
    /// caller to destroy outside the lock) and every queued waiter (to be
    /// notified with [`PoolError::PoolClosed`]).
    pub(crate) fn begin_shutdown(&mut self) -> (Vec<IdleEntry<S>>, Vec<WaiterTx<S>>) {
        self.shutdown = true;
        let idle = std::mem::take(&mut self.idle).into_iter().collect();
        let waiters = std::mem::take(&mut self.waiters).into_iter().collect();
        (idle, waiters)
    }

    pub(crate) fn stats(&self) -> Stats {
        Stats {
            total: self.total,
            idle: self.idle.len(),
            in_use: self.total.saturating_sub(self.idle.len()),
            waiters: self.waiters.len(),
        }
    }
}
