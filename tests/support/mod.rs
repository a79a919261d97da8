//! Fakes shared by the integration suites: an in-memory `Session` plus a
//! `SessionFactory`/`Validator` pair whose behavior tests can steer.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use ddb_pool::config::ConnectionProperties;
use ddb_pool::error::Cause;
use ddb_pool::session::{BatchWriteError, Item, Session, SessionFactory, Validator, WriteIntent};

pub struct FakeSession {
    id: usize,
    closed: AtomicBool,
    /// Set by a test to make the next `validate` call (and the one after
    /// borrow, if `test_on_borrow`) report unhealthy.
    pub unhealthy: AtomicBool,
    /// Reasons to fail a `batch_write` with `Cancelled`; empty means
    /// succeed.
    pub cancel_reasons: std::sync::Mutex<Vec<String>>,
}

impl FakeSession {
    pub fn id(&self) -> usize {
        self.id
    }
}

#[async_trait]
impl Session for FakeSession {
    async fn execute_statement(&self, _statement: &str) -> Result<Vec<Item>, Cause> {
        Ok(vec![])
    }

    async fn batch_write(&self, intents: &[WriteIntent]) -> Result<(), BatchWriteError> {
        let reasons = self.cancel_reasons.lock().unwrap().clone();
        if !reasons.is_empty() {
            return Err(BatchWriteError::Cancelled(reasons));
        }
        let _ = intents;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    async fn close(self) {
        self.closed.store(true, Ordering::Release);
    }
}

pub struct FakeFactory {
    pub next_id: AtomicUsize,
    pub fail: AtomicBool,
}

impl Default for FakeFactory {
    fn default() -> Self {
        FakeFactory {
            next_id: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("fake factory failure")]
pub struct FakeFactoryError;

#[async_trait]
impl SessionFactory for FakeFactory {
    type Session = FakeSession;

    async fn create(&self, _properties: &ConnectionProperties) -> Result<FakeSession, Cause> {
        if self.fail.load(Ordering::Acquire) {
            return Err(Box::new(FakeFactoryError));
        }
        let id = self.next_id.fetch_add(1, Ordering::AcqRel);
        Ok(FakeSession {
            id,
            closed: AtomicBool::new(false),
            unhealthy: AtomicBool::new(false),
            cancel_reasons: std::sync::Mutex::new(Vec::new()),
        })
    }
}

#[derive(Default)]
pub struct FakeValidator;

#[async_trait]
impl Validator<FakeSession> for FakeValidator {
    async fn validate(&self, session: &FakeSession, _timeout: Duration) -> bool {
        !session.unhealthy.load(Ordering::Acquire)
    }
}

/// Fails validation on exactly the call index given at construction
/// (0-based), succeeds on every other call. Lets a test deterministically
/// simulate "this particular borrow finds a stale session" without
/// reaching into pool internals.
pub struct FailOnceValidator {
    fail_at: usize,
    calls: AtomicUsize,
}

impl FailOnceValidator {
    pub fn new(fail_at: usize) -> Self {
        FailOnceValidator {
            fail_at,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Validator<FakeSession> for FailOnceValidator {
    async fn validate(&self, _session: &FakeSession, _timeout: Duration) -> bool {
        let call = self.calls.fetch_add(1, Ordering::AcqRel);
        call != self.fail_at
    }
}

pub fn props(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn item(pairs: &[(&str, &str)]) -> Item {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub type SharedSession = Arc<FakeSession>;
