//! Raw connection capability

use async_trait::async_trait;

use crate::{QueryResult, Result, Value};

/// A raw database connection as the pool sees it.
///
/// Implementations are provided by database drivers. The pool relies only on
/// transaction control and close semantics; statement execution is forwarded
/// to callers untouched.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Name of the driver that produced this connection (e.g. "sqlite")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data, returning the affected row count
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute a query that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Enable or disable auto-commit.
    ///
    /// With auto-commit disabled, statements run inside the current
    /// transaction until `commit` or `rollback`. Switching auto-commit back
    /// on commits any open transaction.
    async fn set_auto_commit(&self, auto_commit: bool) -> Result<()>;

    /// Whether the connection is currently in auto-commit mode
    fn auto_commit(&self) -> bool;

    /// Commit the current transaction
    async fn commit(&self) -> Result<()>;

    /// Roll back the current transaction
    async fn rollback(&self) -> Result<()>;

    /// Close the connection, releasing its underlying resources
    async fn close(&self) -> Result<()>;

    /// Whether the connection has been closed
    fn is_closed(&self) -> bool;
}
