//! Fixed session settings forced onto every pooled connection

use super::{parse_connection_string, ConnectionConfig};
use crate::Result;
use std::collections::BTreeMap;

/// `application_name` reported to the server
pub const APPLICATION_NAME: &str = "pgready";

/// Runtime parameters that always win over the connection string
///
/// * `timezone`: rows are read in text format, so timestamps must render in a
///   zone every client agrees on.
/// * `application_name`: identifies our sessions in `pg_stat_activity`.
/// * `search_path`: empty, so every object must be schema-qualified.
pub const SESSION_OVERRIDES: [(&str, &str); 3] = [
    ("timezone", "UTC"),
    ("application_name", APPLICATION_NAME),
    ("search_path", ""),
];

/// Build the configuration for a pool from a connection string
///
/// The caller's `lazy` flag is passed through unchanged. Parameters other than
/// the [`SESSION_OVERRIDES`] are left as supplied.
///
/// # Examples
///
/// ```
/// let config = pgready::configure_session(
///     "postgres://app@localhost/orders?TimeZone=Europe/Paris&search_path=public",
///     true,
/// )?;
///
/// assert_eq!(config.runtime_param("timezone"), Some("UTC"));
/// assert_eq!(config.runtime_param("TimeZone"), None);
/// assert_eq!(config.runtime_param("search_path"), Some(""));
/// assert!(config.lazy);
/// # Ok::<(), pgready::Error>(())
/// ```
pub fn configure_session(connection_string: &str, lazy: bool) -> Result<ConnectionConfig> {
    let mut config = parse_connection_string(connection_string)?;
    apply_overrides(&mut config.runtime_params);
    config.lazy = lazy;
    Ok(config)
}

/// Server parameter names are case-insensitive, so drop every spelling first
fn apply_overrides(params: &mut BTreeMap<String, String>) {
    for (key, value) in SESSION_OVERRIDES {
        params.retain(|k, _| !k.eq_ignore_ascii_case(key));
        params.insert(key.to_string(), value.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_overridden(config: &ConnectionConfig) {
        assert_eq!(config.runtime_param("timezone"), Some("UTC"));
        assert_eq!(config.runtime_param("application_name"), Some(APPLICATION_NAME));
        assert_eq!(config.runtime_param("search_path"), Some(""));
    }

    #[test]
    fn test_overrides_applied_without_params() {
        let config = configure_session("postgres://localhost/db", false).unwrap();
        assert_overridden(&config);
        assert_eq!(config.runtime_params.len(), 3);
        assert!(!config.lazy);
    }

    #[test]
    fn test_overrides_replace_supplied_values() {
        let inputs = [
            "postgres://localhost/db?timezone=America/New_York",
            "postgres://localhost/db?application_name=psql&search_path=public,extensions",
            "postgres://localhost/db?TIMEZONE=Asia/Tokyo&Application_Name=x&Search_Path=y",
            "postgres:///db?host=/tmp&timezone=&search_path=%22%24user%22",
        ];
        for input in inputs {
            let config = configure_session(input, false).unwrap();
            assert_overridden(&config);
            assert_eq!(config.runtime_params.len(), 3, "{}", input);
        }
    }

    #[test]
    fn test_other_params_untouched() {
        let config = configure_session(
            "postgres://localhost/db?statement_timeout=1000&DateStyle=ISO",
            true,
        )
        .unwrap();
        assert_overridden(&config);
        assert_eq!(config.runtime_param("statement_timeout"), Some("1000"));
        assert_eq!(config.runtime_param("DateStyle"), Some("ISO"));
        assert!(config.lazy);
    }

    #[test]
    fn test_malformed_string_fails() {
        let err = configure_session("not a url", false).unwrap_err();
        assert!(matches!(err, crate::Error::ConfigParse { .. }));
    }
}
