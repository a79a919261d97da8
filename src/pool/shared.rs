//! The `Arc`-shared state behind every [`crate::pool::Pool`] clone and the
//! maintenance task.

use std::sync::Mutex;

use tokio::sync::watch;

use crate::config::PoolConfig;
use crate::pool::inner::PoolInner;
use crate::session::{Session, SessionFactory, Validator};

pub(crate) struct PoolShared<S, Fac, Val>
where
    S: Session,
    Fac: SessionFactory<Session = S>,
    Val: Validator<S>,
{
    pub(crate) inner: Mutex<PoolInner<S>>,
    pub(crate) config: PoolConfig,
    pub(crate) factory: Fac,
    pub(crate) validator: Val,
    pub(crate) shutdown_tx: watch::Sender<bool>,
}
