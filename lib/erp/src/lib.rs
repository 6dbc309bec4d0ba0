//! # Routewise ERP
//!
//! Read-only access to the four ERP views the recommender consumes:
//! `ITEM_MASTER`, `ROUTING`, `ROUTING_HISTORY` and `WORK_ORDER_RESULTS`.
//!
//! Connections come from a bounded [`ConnectionPool`]; transient failures are
//! retried with linear backoff ([`with_retry`]); column names are resolved
//! through [`ViewAliases`] so renamed columns keep working.

pub mod pool;
pub mod retry;
pub mod source;
pub mod sqlite;
pub mod views;

pub use pool::{ConnectionPool, Connector, PoolStatus, PooledConnection};
pub use retry::{with_retry, RetryPolicy};
pub use source::{ErpSource, MemorySource};
pub use sqlite::{SqliteConnector, SqliteErpSource};
pub use views::{ColumnSpec, ResolvedView, View, ViewAliases, ViewSpec};
