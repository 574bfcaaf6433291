//! Warehouse access
//!
//! The loader only talks to the warehouse through these traits, so the HTTP
//! client can be swapped for a scripted one in tests.
//! - `Warehouse` opens connections
//! - `WarehouseConnection` runs statements and must be closed by its owner
//! - `StatementApiWarehouse` is the SQL Statement Execution REST implementation

pub mod result;
pub mod statement_api;

#[cfg(test)]
pub(crate) mod scripted;

pub use result::ResultSet;
pub use statement_api::StatementApiWarehouse;

use crate::config::ConnectionConfig;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Short name used in logs (e.g. "statement-api")
    fn name(&self) -> &'static str;

    /// Open a connection. Performs whatever handshake the endpoint needs, so
    /// authentication and reachability problems surface here.
    async fn connect(&self, config: &ConnectionConfig) -> Result<Box<dyn WarehouseConnection>>;
}

#[async_trait]
pub trait WarehouseConnection: Send {
    /// Run one read-only statement to completion and return all of its rows.
    async fn execute(&mut self, sql: &str) -> Result<ResultSet>;

    /// Release everything the connection holds. Called exactly once by the
    /// owner on every exit path; calling it again is a no-op.
    async fn close(&mut self) -> Result<()>;
}
