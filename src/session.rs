//! The collaborator contracts this crate consumes: a physical session
//! factory, a liveness validator, and the relational-style operation
//! surface itself. The SQL/PartiQL layer behind `Session` is out of scope
//! (spec.md §1) — this trait stands in for it with a representative slice
//! of operations so the pool, handle, and transaction coordinator have
//! something concrete to forward to.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Cause;

/// One item's worth of attribute values, as a driver would hand back from
/// a PartiQL `SELECT` or accept for a `PUT`.
pub type Item = BTreeMap<String, String>;

/// A live, authenticated client to the upstream service. Owned by exactly
/// one party at any instant: the idle set, a live handle, or the
/// maintenance loop mid-eviction.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Executes a single PartiQL statement and returns the affected or
    /// selected items.
    async fn execute_statement(&self, statement: &str) -> Result<Vec<Item>, Cause>;

    /// Issues one atomic batch-write request carrying every buffered
    /// write intent. On partial failure the provider is expected to
    /// report per-item cancellation reasons via [`BatchWriteError::Cancelled`].
    async fn batch_write(&self, intents: &[WriteIntent]) -> Result<(), BatchWriteError>;

    /// Best-effort local check; `false` means the session is definitely
    /// unusable and should never be returned to the idle set even without
    /// running the validator.
    fn is_closed(&self) -> bool;

    /// Gracefully tears down the underlying transport. Called exactly once,
    /// by whichever owner (idle set, handle, or maintenance loop) destroys
    /// this session. The default is a silent drop.
    async fn close(self)
    where
        Self: Sized,
    {
    }
}

/// Outcome of a failed [`Session::batch_write`], distinguishing a
/// provider-signalled partial-failure cancellation from any other error.
#[derive(Debug)]
pub enum BatchWriteError {
    /// The provider rejected the batch with one reason per item, in
    /// buffer order.
    Cancelled(Vec<String>),
    /// Any other transport/provider failure.
    Other(Cause),
}

/// One pending write, tagged by kind, targeting one item of one table.
#[derive(Debug, Clone)]
pub struct WriteIntent {
    pub kind: IntentKind,
    pub table: String,
    pub key: Item,
    /// Full item payload for `Put`; update expression attribute values for
    /// `Update`. Unused for `Delete`.
    pub payload: Option<UpdatePayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    Put,
    Update,
    Delete,
}

#[derive(Debug, Clone)]
pub struct UpdatePayload {
    pub item: Item,
    pub update_expression: Option<String>,
    pub expression_attribute_names: BTreeMap<String, String>,
    pub expression_attribute_values: Item,
}

impl WriteIntent {
    pub fn put(table: impl Into<String>, item: Item) -> Self {
        WriteIntent {
            kind: IntentKind::Put,
            table: table.into(),
            key: Item::new(),
            payload: Some(UpdatePayload {
                item,
                update_expression: None,
                expression_attribute_names: BTreeMap::new(),
                expression_attribute_values: Item::new(),
            }),
        }
    }

    pub fn update(
        table: impl Into<String>,
        key: Item,
        update_expression: impl Into<String>,
        expression_attribute_names: BTreeMap<String, String>,
        expression_attribute_values: Item,
    ) -> Self {
        WriteIntent {
            kind: IntentKind::Update,
            table: table.into(),
            key,
            payload: Some(UpdatePayload {
                item: Item::new(),
                update_expression: Some(update_expression.into()),
                expression_attribute_names,
                expression_attribute_values,
            }),
        }
    }

    pub fn delete(table: impl Into<String>, key: Item) -> Self {
        WriteIntent {
            kind: IntentKind::Delete,
            table: table.into(),
            key,
            payload: None,
        }
    }
}

/// Produces a fresh physical session on demand. Injected so tests can
/// substitute a fake. Must be safe to call concurrently.
#[async_trait]
pub trait SessionFactory: Send + Sync + 'static {
    type Session: Session;

    async fn create(&self, properties: &crate::config::ConnectionProperties) -> Result<Self::Session, Cause>;
}

/// Probes a physical session for liveness within a bounded time budget.
/// Never propagates an error across the pool boundary — a failed probe is
/// `Ok(false)`, not `Err`.
#[async_trait]
pub trait Validator<S: Session>: Send + Sync + 'static {
    async fn validate(&self, session: &S, timeout: Duration) -> bool;
}
