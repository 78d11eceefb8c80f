//! pgready: a PostgreSQL connection pool that is certified before use
//!
//! [`open_pool`] parses a connection string, forces a fixed session
//! configuration on every connection (`timezone=UTC`, a fixed
//! `application_name`, an empty `search_path`) and, unless asked to be lazy,
//! checks once that the server runs with UTF8 encoding and a supported
//! locale. A pool that fails the check is closed and never handed out.
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = pgready::open_pool("postgres://app@localhost/orders", false, None).await?;
//!
//! let mut rows = pool.query("SELECT now()::text").await?;
//! while let Some(row) = rows.next().await? {
//!     println!("{}", row.get_text(0)?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Only the simple query protocol in text format is spoken, over TCP or a
//! Unix socket, with trust, cleartext or SCRAM-SHA-256 authentication.

#![warn(missing_docs)]

pub mod auth;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod pool;
pub mod protocol;
pub mod validate;

pub use config::{configure_session, ConnectionConfig};
pub use error::{Error, Result, WireError, WireResult};
pub use pool::{open_pool, open_pool_with, Pool, PoolStatus, PooledConnection, Row, RowCursor};
pub use validate::{is_acceptable_utf8_locale, validate, SettingObservation};
