//! Error kinds surfaced by the pool core and the transaction coordinator.
//!
//! Two enums, not one: the pool and the coordinator are independently
//! testable units with non-overlapping failure domains, and a caller
//! handling "my transaction got cancelled" shouldn't need to match
//! pool-shutdown variants in the same arm set.

use std::fmt;

/// Boxed cause, type-erased so callers on the other side of the factory or
/// validator boundary don't leak their concrete error type into ours.
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by [`crate::pool::Pool`].
#[derive(thiserror::Error, Debug)]
pub enum PoolError {
    /// `PoolConfig` construction violated a size relation or a duration
    /// bound.
    #[error("invalid pool configuration: {0}")]
    ConfigurationInvalid(String),

    /// The pool has been shut down via [`crate::pool::Pool::close`]; no new
    /// handles are produced.
    #[error("pool is closed")]
    PoolClosed,

    /// The pool is saturated and `blockWhenExhausted` is `false`.
    #[error("pool is exhausted")]
    PoolExhausted,

    /// The session factory failed to produce a physical session.
    #[error("session factory failed")]
    AcquisitionFailed(#[source] Cause),

    /// The caller's deadline (or `maxWait`) elapsed before a session
    /// became available. A validator rejection during `testOnBorrow`/
    /// `testOnReturn` never surfaces this way — the offending session is
    /// destroyed and `acquire` retries from the top, so the caller only
    /// ever sees either a freshly validated session or `Timeout` once the
    /// deadline is spent retrying.
    #[error("timed out waiting for a session")]
    Timeout,

    /// A caller-initiated liveness probe ([`crate::handle::PooledHandle::validate`])
    /// rejected the session. Unlike `testOnBorrow`/`testOnReturn`, an
    /// explicit probe is not followed by an automatic destroy-and-retry —
    /// the handle is left exactly as it was, and it is the caller's choice
    /// whether to keep using it, `discard` it, or probe again later.
    #[error("session failed validation")]
    ValidationFailed,

    /// An operation was attempted on a handle after it was closed.
    #[error("session handle is closed")]
    SessionClosed,
}

/// Errors surfaced by [`crate::txn::TransactionCoordinator`].
#[derive(thiserror::Error, Debug)]
pub enum TxnError {
    /// `begin` called while already `Active`.
    #[error("transaction already active")]
    NestedTransaction,

    /// A mutation or `commit`/`rollback` was attempted while `Idle`.
    #[error("no active transaction")]
    NotInTransaction,

    /// The buffer is already at its 100-item capacity.
    #[error("transaction buffer is full")]
    TransactionFull,

    /// The upstream provider signalled cancellation with per-item reasons.
    #[error("transaction cancelled: {}", DisplayReasons(&.0))]
    TransactionCancelled(Vec<String>),

    /// Any other upstream failure during commit.
    #[error("transaction failed")]
    TransactionFailed(#[source] Cause),
}

impl TxnError {
    /// The per-item cancellation reasons, if this is a `TransactionCancelled`.
    pub fn reasons(&self) -> Option<&[String]> {
        match self {
            TxnError::TransactionCancelled(reasons) => Some(reasons),
            _ => None,
        }
    }
}

struct DisplayReasons<'a>(&'a [String]);

impl fmt::Display for DisplayReasons<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, reason) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_str(reason)?;
        }
        Ok(())
    }
}
