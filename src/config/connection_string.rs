//! Connection string parsing
//!
//! Supports formats:
//! * postgres://[user[:password]@][host][:port][/database][?key=value&...]
//! * postgres:///database (Unix socket, local)
//! * postgres:///database?host=/path/to/socket (Unix socket, custom directory)
//!
//! Query keys that are not connection or client settings become session
//! runtime parameters.

use super::{default_max_connections, Address, ConnectionConfig, DEFAULT_PORT};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

const OP: &str = "configure_session";

/// Keys that configure the client side and are never sent to the server
const CLIENT_ONLY_KEYS: &[&str] = &[
    "connect_timeout",
    "target_session_attrs",
    "passfile",
    "service",
    "servicefile",
    "sslcert",
    "sslkey",
    "sslrootcert",
    "sslpassword",
    "sslsni",
    "krbsrvname",
    "krbspn",
    "min_read_buffer_size",
    "pool_min_conns",
    "pool_max_conn_lifetime",
    "pool_max_conn_lifetime_jitter",
    "pool_max_conn_idle_time",
    "pool_health_check_period",
];

fn config_error(reason: impl Into<String>) -> Error {
    Error::ConfigParse {
        op: OP,
        reason: reason.into(),
    }
}

/// Resolve the default Unix socket directory
fn resolve_default_socket_dir() -> Option<String> {
    // Try standard locations in order (Linux convention)
    for dir in &["/run/postgresql", "/var/run/postgresql", "/tmp"] {
        if Path::new(dir).is_dir() {
            return Some(dir.to_string());
        }
    }
    None
}

/// Construct the full Unix socket path
fn construct_socket_path(socket_dir: &str, port: u16) -> PathBuf {
    PathBuf::from(format!("{}/.s.PGSQL.{}", socket_dir, port))
}

/// Decode `%XX` escapes
fn percent_decode(s: &str) -> Result<String> {
    if !s.contains('%') {
        return Ok(s.to_string());
    }

    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .filter(|h| h.iter().all(u8::is_ascii_hexdigit))
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| config_error(format!("invalid percent escape in {:?}", s)))?;
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).map_err(|_| config_error(format!("{:?} is not valid UTF-8", s)))
}

/// Split a query string into decoded key/value pairs (later duplicates win)
fn parse_query(query_string: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for pair in query_string.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        if key.is_empty() {
            return Err(config_error(format!("empty parameter name in {:?}", pair)));
        }
        pairs.push((percent_decode(key)?, percent_decode(value)?));
    }
    Ok(pairs)
}

fn parse_port(s: &str) -> Result<u16> {
    s.parse()
        .map_err(|_| config_error(format!("invalid port {:?}", s)))
}

fn check_sslmode(mode: &str) -> Result<()> {
    match mode {
        "disable" | "allow" | "prefer" => Ok(()),
        "require" | "verify-ca" | "verify-full" => Err(config_error(format!(
            "sslmode={} requires TLS, which is not supported",
            mode
        ))),
        other => Err(config_error(format!(
            "invalid sslmode {:?}: expected disable, allow, prefer, require, verify-ca, or verify-full",
            other
        ))),
    }
}

/// Split `host[:port]`, accepting bracketed IPv6 literals
fn split_host_port(host_port: &str) -> Result<(String, Option<u16>)> {
    if let Some(rest) = host_port.strip_prefix('[') {
        let (host, after) = rest
            .split_once(']')
            .ok_or_else(|| config_error("unterminated IPv6 address"))?;
        let port = match after {
            "" => None,
            p => Some(parse_port(
                p.strip_prefix(':')
                    .ok_or_else(|| config_error(format!("unexpected {:?} after host", p)))?,
            )?),
        };
        return Ok((host.to_string(), port));
    }

    match host_port.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), Some(parse_port(port)?))),
        None => Ok((host_port.to_string(), None)),
    }
}

/// Parse a connection string into a [`ConnectionConfig`]
///
/// Session overrides are not applied here; see [`super::configure_session`].
pub fn parse_connection_string(s: &str) -> Result<ConnectionConfig> {
    let rest = s
        .strip_prefix("postgres://")
        .or_else(|| s.strip_prefix("postgresql://"))
        .ok_or_else(|| config_error("connection string must start with postgres://"))?;

    let (rest, query_string) = rest.split_once('?').unwrap_or((rest, ""));

    let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));

    // Format: [user[:password]@]host[:port]
    let (auth, host_port) = match authority.rsplit_once('@') {
        Some((auth, host_port)) => (Some(auth), host_port),
        None => (None, authority),
    };

    let (mut user, mut password) = match auth {
        Some(auth) => match auth.split_once(':') {
            Some((user, pass)) => (Some(percent_decode(user)?), Some(percent_decode(pass)?)),
            None => (Some(percent_decode(auth)?), None),
        },
        None => (None, None),
    };

    let (mut host, mut port) = split_host_port(host_port)?;
    let mut database = match path {
        "" => None,
        db => Some(percent_decode(db)?),
    };
    let mut max_connections = default_max_connections();
    let mut runtime_params = BTreeMap::new();

    for (key, value) in parse_query(query_string)? {
        match key.as_str() {
            "host" => host = value,
            "port" => port = Some(parse_port(&value)?),
            "user" => user = Some(value),
            "password" => password = Some(value),
            "dbname" | "database" => database = Some(value),
            "sslmode" => check_sslmode(&value)?,
            "pool_max_conns" => {
                max_connections = match value.parse::<usize>() {
                    Ok(n) if n > 0 => n,
                    _ => {
                        return Err(config_error(format!(
                            "pool_max_conns must be a positive integer, got {:?}",
                            value
                        )))
                    }
                };
            }
            k if CLIENT_ONLY_KEYS.contains(&k) => {
                tracing::trace!(key = k, "ignoring client setting");
            }
            _ => {
                runtime_params.insert(key, value);
            }
        }
    }

    let port = port.unwrap_or(DEFAULT_PORT);

    // Empty host or a directory means Unix socket
    let address = if host.is_empty() || host.starts_with('/') {
        let socket_dir = if host.is_empty() {
            resolve_default_socket_dir().ok_or_else(|| {
                config_error(
                    "could not locate Unix socket directory. Set host query parameter explicitly.",
                )
            })?
        } else {
            host
        };
        Address::Unix(construct_socket_path(&socket_dir, port))
    } else {
        Address::Tcp { host, port }
    };

    let user = user.unwrap_or_else(whoami::username);
    let database = database.unwrap_or_else(|| user.clone());

    Ok(ConnectionConfig {
        address,
        database,
        user,
        password,
        runtime_params,
        lazy: false,
        max_connections,
    })
}
