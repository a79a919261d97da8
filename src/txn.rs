//! Multi-item write-transaction coordinator (spec.md §4.4): buffers
//! `Put`/`Update`/`Delete` intents against one pooled session and flushes
//! them as a single atomic batch write on `commit`.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::TxnError;
use crate::session::{BatchWriteError, Item, Session, WriteIntent};

/// Hard cap on buffered intents per transaction (spec.md §6).
pub const MAX_TRANSACTION_SIZE: usize = 100;

enum TxnState {
    Idle,
    Active(Vec<WriteIntent>),
}

/// Exclusive to a single handle; never contended across tasks in normal
/// use, so the `tokio::sync::Mutex` here is about holding state across the
/// `commit` await, not about arbitrating concurrent callers.
pub struct TransactionCoordinator<S: Session> {
    session: Arc<S>,
    state: Mutex<TxnState>,
}

impl<S: Session> TransactionCoordinator<S> {
    pub fn new(session: Arc<S>) -> Self {
        TransactionCoordinator {
            session,
            state: Mutex::new(TxnState::Idle),
        }
    }

    /// Opens a transaction. Errors if one is already active.
    pub async fn begin(&self) -> Result<(), TxnError> {
        let mut state = self.state.lock().await;
        match *state {
            TxnState::Idle => {
                *state = TxnState::Active(Vec::new());
                Ok(())
            }
            TxnState::Active(_) => Err(TxnError::NestedTransaction),
        }
    }

    pub async fn add_put(&self, table: impl Into<String>, item: Item) -> Result<(), TxnError> {
        self.push(WriteIntent::put(table, item)).await
    }

    pub async fn add_update(
        &self,
        table: impl Into<String>,
        key: Item,
        update_expression: impl Into<String>,
        expression_attribute_names: std::collections::BTreeMap<String, String>,
        expression_attribute_values: Item,
    ) -> Result<(), TxnError> {
        self.push(WriteIntent::update(
            table,
            key,
            update_expression,
            expression_attribute_names,
            expression_attribute_values,
        ))
        .await
    }

    pub async fn add_delete(&self, table: impl Into<String>, key: Item) -> Result<(), TxnError> {
        self.push(WriteIntent::delete(table, key)).await
    }

    async fn push(&self, intent: WriteIntent) -> Result<(), TxnError> {
        let mut state = self.state.lock().await;
        match &mut *state {
            TxnState::Idle => Err(TxnError::NotInTransaction),
            TxnState::Active(intents) => {
                if intents.len() >= MAX_TRANSACTION_SIZE {
                    return Err(TxnError::TransactionFull);
                }
                intents.push(intent);
                Ok(())
            }
        }
    }

    /// Flushes every buffered intent as one atomic batch write. Whether it
    /// succeeds or fails, the transaction returns to `Idle` — a failed
    /// commit is not retryable by calling `commit` again, matching spec.md
    /// §4.4 ("commit ends the transaction regardless of outcome").
    pub async fn commit(&self) -> Result<(), TxnError> {
        let mut state = self.state.lock().await;
        let intents = match std::mem::replace(&mut *state, TxnState::Idle) {
            TxnState::Idle => return Err(TxnError::NotInTransaction),
            TxnState::Active(intents) => intents,
        };

        if intents.is_empty() {
            return Ok(());
        }

        match self.session.batch_write(&intents).await {
            Ok(()) => Ok(()),
            Err(BatchWriteError::Cancelled(reasons)) => Err(TxnError::TransactionCancelled(reasons)),
            Err(BatchWriteError::Other(cause)) => Err(TxnError::TransactionFailed(cause)),
        }
    }

    /// Discards every buffered intent without touching the upstream
    /// session.
    pub async fn rollback(&self) -> Result<(), TxnError> {
        let mut state = self.state.lock().await;
        match *state {
            TxnState::Idle => Err(TxnError::NotInTransaction),
            TxnState::Active(_) => {
                *state = TxnState::Idle;
                Ok(())
            }
        }
    }

    /// Observational; takes a non-blocking fast path and only falls back
    /// to a blocking lock if genuinely contended.
    pub async fn is_active(&self) -> bool {
        match self.state.try_lock() {
            Ok(state) => matches!(*state, TxnState::Active(_)),
            Err(_) => matches!(*self.state.lock().await, TxnState::Active(_)),
        }
    }

    /// Number of intents currently buffered; `0` when idle.
    pub async fn size(&self) -> usize {
        match self.state.try_lock() {
            Ok(state) => match &*state {
                TxnState::Active(intents) => intents.len(),
                TxnState::Idle => 0,
            },
            Err(_) => match &*self.state.lock().await {
                TxnState::Active(intents) => intents.len(),
                TxnState::Idle => 0,
            },
        }
    }
}
