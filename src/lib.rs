//! A bounded session pool and multi-item write-transaction coordinator for
//! a relational-style DynamoDB driver adapter.
//!
//! This crate covers the parts of such a driver that sit below the
//! SQL/PartiQL surface: acquiring and returning physical sessions under a
//! size- and lifetime-bounded pool, background eviction and liveness
//! checking, and batching `Put`/`Update`/`Delete` writes into a single
//! atomic commit against one borrowed session. Statement parsing,
//! result-set marshalling, and `java.sql.Driver`-style registration are
//! deliberately out of scope — callers plug those in on top of the
//! [`Session`](session::Session) trait.
//!
//! ```no_run
//! use ddb_pool::config::PoolConfig;
//! use ddb_pool::pool::Pool;
//!
//! # async fn build<F, V, S>(factory: F, validator: V) -> Result<(), ddb_pool::error::PoolError>
//! # where
//! #     S: ddb_pool::session::Session,
//! #     F: ddb_pool::session::SessionFactory<Session = S>,
//! #     V: ddb_pool::session::Validator<S>,
//! # {
//! let config = PoolConfig::builder().max_size(10).build()?;
//! let pool = Pool::new(config, factory, validator).await?;
//! let handle = pool.acquire().await?;
//! handle.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handle;
pub mod pool;
pub mod session;
pub mod txn;

pub use config::PoolConfig;
pub use error::{PoolError, TxnError};
pub use handle::PooledHandle;
pub use pool::{Pool, PoolStats};
pub use session::{Session, SessionFactory, Validator};
pub use txn::TransactionCoordinator;
