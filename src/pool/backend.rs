//! Seams between the pool and the connections it manages

use crate::config::ConnectionConfig;
use crate::error::WireResult;
use async_trait::async_trait;
use bytes::Bytes;

/// Opens new sessions for a pool
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Session type produced by this connector
    type Connection: Session;

    /// Open and authenticate one session
    async fn connect(&self, config: &ConnectionConfig) -> WireResult<Self::Connection>;
}

/// One server session able to run simple text queries
///
/// A query is started with [`Session::start_query`] and its rows are then
/// pulled with [`Session::next_row`] until it returns `None`, at which point
/// the session is idle again.
#[async_trait]
pub trait Session: Send + Sized + 'static {
    /// Send `sql` and return the column names of its result set
    async fn start_query(&mut self, sql: &str) -> WireResult<Vec<String>>;

    /// Next row of the running query; `None` marks the end of the result
    async fn next_row(&mut self) -> WireResult<Option<Vec<Option<Bytes>>>>;

    /// True when no query is running and the session can be reused
    fn is_idle(&self) -> bool;

    /// Terminate the session
    async fn close(self) -> WireResult<()>;
}
