//! Connection pool
//!
//! A bounded set of sessions built from one immutable [`ConnectionConfig`].
//! Connections are opened on demand; idle ones are reused first. A
//! [`PooledConnection`] goes back to the idle set when dropped, unless it is
//! mid-query or the pool has been closed, in which case it is discarded.

mod backend;
mod cursor;
mod manager;

pub use backend::{Connector, Session};
pub use cursor::{Row, RowCursor};
pub use manager::{open_pool, open_pool_with};

use crate::config::ConnectionConfig;
use crate::connection::PgConnector;
use crate::error::{WireError, WireResult};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Connection pool
///
/// Cheap to clone; clones share the same connections.
pub struct Pool<C: Connector = PgConnector> {
    inner: Arc<PoolInner<C>>,
}

struct PoolInner<C: Connector> {
    connector: C,
    config: Arc<ConnectionConfig>,
    idle: Mutex<VecDeque<C::Connection>>,
    /// One permit per checked-out connection
    slots: Arc<Semaphore>,
    closed: AtomicBool,
    validated: AtomicBool,
}

/// Snapshot of pool usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStatus {
    /// Connections parked and ready for reuse
    pub idle: usize,
    /// Connections currently checked out
    pub in_use: usize,
    /// Upper bound on live connections
    pub max: usize,
}

impl<C: Connector> Clone for Pool<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Connector> std::fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("config", &self.inner.config)
            .field("status", &self.status())
            .field("closed", &self.is_closed())
            .field("validated", &self.is_validated())
            .finish()
    }
}

impl<C: Connector> Pool<C> {
    /// Create a pool without touching the network
    pub fn new(connector: C, config: ConnectionConfig) -> Self {
        let max = config.max_connections.max(1);
        let inner = Arc::new(PoolInner {
            connector,
            config: Arc::new(config),
            idle: Mutex::new(VecDeque::with_capacity(max)),
            slots: Arc::new(Semaphore::new(max)),
            closed: AtomicBool::new(false),
            validated: AtomicBool::new(false),
        });

        tracing::debug!(max, "connection pool created");
        Self { inner }
    }

    /// Create a pool and, unless the config is lazy, open one connection
    ///
    /// The first connection is parked idle so the next checkout reuses it.
    pub async fn connect(connector: C, config: ConnectionConfig) -> WireResult<Self> {
        let lazy = config.lazy;
        let pool = Self::new(connector, config);
        if !lazy {
            let conn = pool.acquire().await?;
            drop(conn);
        }
        Ok(pool)
    }

    /// Check out a connection, opening one if none is idle
    ///
    /// Waits while `max_connections` are already checked out.
    pub async fn acquire(&self) -> WireResult<PooledConnection<C>> {
        if self.is_closed() {
            return Err(WireError::PoolClosed);
        }

        let started = Instant::now();
        let permit = Arc::clone(&self.inner.slots)
            .acquire_owned()
            .await
            .map_err(|_| WireError::PoolClosed)?;
        crate::metrics::histograms::acquire_wait(started.elapsed().as_millis() as u64);

        let reused = self.inner.idle.lock().pop_front();
        let conn = match reused {
            Some(conn) => {
                tracing::trace!("reusing idle connection");
                conn
            }
            None => match self.inner.connector.connect(&self.inner.config).await {
                Ok(conn) => {
                    crate::metrics::counters::connection_opened();
                    tracing::debug!(address = %self.inner.config.address, "opened connection");
                    conn
                }
                Err(e) => {
                    crate::metrics::counters::connection_failed(e.category());
                    tracing::debug!(error = %e, "failed to open connection");
                    return Err(e);
                }
            },
        };

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.inner),
            _permit: permit,
        })
    }

    /// Run a simple query on a pooled connection and stream its rows
    ///
    /// The connection stays checked out until the cursor is exhausted or dropped.
    pub async fn query(&self, sql: &str) -> WireResult<RowCursor<C>> {
        let mut conn = self.acquire().await?;
        let columns = conn.start_query(sql).await?;
        Ok(RowCursor::new(conn, columns))
    }

    /// Check the server's encoding and locale settings
    ///
    /// See [`crate::validate::validate`].
    pub async fn validate(&self) -> crate::Result<()> {
        crate::validate::validate(self).await
    }

    /// True once [`Pool::validate`] has succeeded
    pub fn is_validated(&self) -> bool {
        self.inner.validated.load(Ordering::Acquire)
    }

    pub(crate) fn mark_validated(&self) {
        self.inner.validated.store(true, Ordering::Release);
    }

    /// Current usage
    pub fn status(&self) -> PoolStatus {
        let max = self.inner.config.max_connections.max(1);
        let in_use = if self.is_closed() {
            0
        } else {
            max.saturating_sub(self.inner.slots.available_permits())
        };
        PoolStatus {
            idle: self.inner.idle.lock().len(),
            in_use,
            max,
        }
    }

    /// Configuration every connection is built from
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Close the pool
    ///
    /// Idle connections are terminated; checked-out ones are discarded when
    /// returned. Pending and future checkouts fail with [`WireError::PoolClosed`].
    /// Closing twice is a no-op.
    pub async fn close(&self) {
        // Returning connections check `closed` under this lock
        let idle: Vec<_> = {
            let mut idle = self.inner.idle.lock();
            if self.inner.closed.swap(true, Ordering::AcqRel) {
                return;
            }
            idle.drain(..).collect()
        };
        self.inner.slots.close();

        let count = idle.len();
        for conn in idle {
            if let Err(e) = conn.close().await {
                tracing::debug!(error = %e, "error terminating idle connection");
            }
        }

        tracing::info!(terminated = count, "connection pool closed");
    }

    /// Check if the pool is closed
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

/// A connection checked out of a [`Pool`]
pub struct PooledConnection<C: Connector> {
    conn: Option<C::Connection>,
    pool: Arc<PoolInner<C>>,
    _permit: OwnedSemaphorePermit,
}

impl<C: Connector> Deref for PooledConnection<C> {
    type Target = C::Connection;

    fn deref(&self) -> &Self::Target {
        // Only taken in Drop
        match self.conn.as_ref() {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: Connector> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self.conn.as_mut() {
            Some(conn) => conn,
            None => unreachable!("pooled connection used after release"),
        }
    }
}

impl<C: Connector> Drop for PooledConnection<C> {
    fn drop(&mut self) {
        let Some(conn) = self.conn.take() else {
            return;
        };

        if conn.is_idle() {
            let mut idle = self.pool.idle.lock();
            if !self.pool.closed.load(Ordering::Acquire) {
                idle.push_back(conn);
                return;
            }
        }

        // Dropping the session closes its socket
        crate::metrics::counters::connection_discarded();
        tracing::debug!("discarding connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Address;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counting {
        opened: AtomicUsize,
        fail: bool,
    }

    struct Idle(bool);

    #[async_trait]
    impl Session for Idle {
        async fn start_query(&mut self, _sql: &str) -> WireResult<Vec<String>> {
            self.0 = false;
            Ok(vec!["?column?".into()])
        }

        async fn next_row(&mut self) -> WireResult<Option<Vec<Option<Bytes>>>> {
            self.0 = true;
            Ok(None)
        }

        fn is_idle(&self) -> bool {
            self.0
        }

        async fn close(self) -> WireResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Connector for Arc<Counting> {
        type Connection = Idle;

        async fn connect(&self, _config: &ConnectionConfig) -> WireResult<Idle> {
            if self.fail {
                return Err(WireError::ConnectionClosed);
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Idle(true))
        }
    }

    fn config(max: usize, lazy: bool) -> ConnectionConfig {
        ConnectionConfig::builder(
            Address::Tcp {
                host: "localhost".into(),
                port: 5432,
            },
            "db",
            "user",
        )
        .max_connections(max)
        .lazy(lazy)
        .build()
    }

    #[tokio::test]
    async fn test_lazy_pool_opens_nothing() {
        let connector = Arc::new(Counting::default());
        let pool = Pool::connect(Arc::clone(&connector), config(2, true))
            .await
            .unwrap();

        assert_eq!(connector.opened.load(Ordering::SeqCst), 0);
        assert_eq!(
            pool.status(),
            PoolStatus {
                idle: 0,
                in_use: 0,
                max: 2
            }
        );
    }

    #[tokio::test]
    async fn test_eager_pool_parks_first_connection() {
        let connector = Arc::new(Counting::default());
        let pool = Pool::connect(Arc::clone(&connector), config(2, false))
            .await
            .unwrap();

        assert_eq!(connector.opened.load(Ordering::SeqCst), 1);
        assert_eq!(pool.status().idle, 1);

        let _conn = pool.acquire().await.unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 1);
        assert_eq!(pool.status().in_use, 1);
    }

    #[tokio::test]
    async fn test_eager_pool_reports_connect_failure() {
        let connector = Arc::new(Counting {
            fail: true,
            ..Default::default()
        });
        let result = Pool::connect(connector, config(2, false)).await;
        assert!(matches!(result, Err(WireError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_busy_connection_is_discarded() {
        let connector = Arc::new(Counting::default());
        let pool = Pool::new(Arc::clone(&connector), config(2, true));

        let mut conn = pool.acquire().await.unwrap();
        conn.start_query("SELECT 1").await.unwrap();
        drop(conn);

        assert_eq!(pool.status().idle, 0);
        assert_eq!(pool.status().in_use, 0);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_free_slot() {
        let connector = Arc::new(Counting::default());
        let pool = Pool::new(Arc::clone(&connector), config(1, true));

        let first = pool.acquire().await.unwrap();
        let pending = tokio::time::timeout(std::time::Duration::from_millis(50), pool.acquire());
        assert!(pending.await.is_err());

        drop(first);
        let _second = pool.acquire().await.unwrap();
        assert_eq!(connector.opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_rejects_acquire() {
        let connector = Arc::new(Counting::default());
        let pool = Pool::connect(Arc::clone(&connector), config(2, false))
            .await
            .unwrap();

        pool.close().await;
        pool.close().await;

        assert!(pool.is_closed());
        assert_eq!(pool.status().idle, 0);
        assert!(matches!(pool.acquire().await, Err(WireError::PoolClosed)));
    }

    #[tokio::test]
    async fn test_connection_returned_after_close_is_discarded() {
        let connector = Arc::new(Counting::default());
        let pool = Pool::new(Arc::clone(&connector), config(2, true));

        let conn = pool.acquire().await.unwrap();
        pool.close().await;
        drop(conn);

        assert_eq!(pool.status().idle, 0);
    }

    #[tokio::test]
    async fn test_close_racing_returns_parks_nothing() {
        for _ in 0..50 {
            let connector = Arc::new(Counting::default());
            let pool = Pool::new(Arc::clone(&connector), config(8, true));

            let mut held = Vec::new();
            for _ in 0..8 {
                held.push(pool.acquire().await.unwrap());
            }
            let returns = std::thread::spawn(move || drop(held));

            pool.close().await;
            returns.join().unwrap();

            assert_eq!(pool.status().idle, 0);
        }
    }
}
