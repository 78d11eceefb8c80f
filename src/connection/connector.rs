//! Wire-protocol implementation of the pool seams

use super::conn::Connection;
use super::transport::Transport;
use crate::config::ConnectionConfig;
use crate::error::WireResult;
use crate::pool::{Connector, Session};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Instant;

/// Opens Postgres connections over TCP or a Unix socket
#[derive(Debug, Clone, Copy, Default)]
pub struct PgConnector;

#[async_trait]
impl Connector for PgConnector {
    type Connection = Connection;

    async fn connect(&self, config: &ConnectionConfig) -> WireResult<Connection> {
        let started = Instant::now();

        let transport = Transport::connect(&config.address).await?;
        let mut conn = Connection::new(transport);
        conn.startup(config).await?;

        crate::metrics::histograms::startup_duration(started.elapsed().as_millis() as u64);
        Ok(conn)
    }
}

#[async_trait]
impl Session for Connection {
    async fn start_query(&mut self, sql: &str) -> WireResult<Vec<String>> {
        let fields = Connection::start_query(self, sql).await?;
        Ok(fields.into_iter().map(|f| f.name).collect())
    }

    async fn next_row(&mut self) -> WireResult<Option<Vec<Option<Bytes>>>> {
        Connection::next_row(self).await
    }

    /// Sessions left inside a transaction block are not reused
    fn is_idle(&self) -> bool {
        self.is_reusable()
    }

    async fn close(self) -> WireResult<()> {
        Connection::close(self).await
    }
}
