//! Startup validation of server encoding and locale
//!
//! Runs `SHOW ALL` once and checks each row against the [`rules::RULES`]
//! table. The first rejected setting fails validation; a broken row stream
//! fails it even when every row seen so far was accepted.

mod locale;
pub mod rules;

pub use locale::is_acceptable_utf8_locale;

use crate::error::{Error, Result, WireError, WireResult};
use crate::pool::{Connector, Pool, Row, RowCursor};
use tracing::Instrument;

/// Query listing every runtime setting as `(name, setting, description)`
pub const SETTINGS_QUERY: &str = "SHOW ALL";

const OP: &str = "validate";

/// One row of [`SETTINGS_QUERY`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingObservation {
    /// Setting name
    pub name: String,
    /// Current value
    pub setting: String,
    /// Server-provided description
    pub description: String,
}

impl SettingObservation {
    /// Read a `(name, setting, description)` row
    pub fn from_row(row: &Row) -> WireResult<Self> {
        if row.len() != 3 {
            return Err(WireError::Decode(format!(
                "expected 3 columns in settings row, got {}",
                row.len()
            )));
        }
        Ok(Self {
            name: row.get_text(0)?.to_string(),
            setting: row.get_text(1)?.to_string(),
            description: row.get_text(2)?.to_string(),
        })
    }
}

/// Check that the server behind `pool` uses UTF8 and a supported locale
///
/// On success the pool is marked validated. Calling this again repeats the
/// check; it never changes server state.
pub async fn validate<C: Connector>(pool: &Pool<C>) -> Result<()> {
    let result = check_settings(pool)
        .instrument(tracing::debug_span!("validate"))
        .await;

    match &result {
        Ok(()) => {
            pool.mark_validated();
            crate::metrics::counters::validation_completed("ok");
            tracing::debug!("server settings validated");
        }
        Err(e) => {
            crate::metrics::counters::validation_completed(e.category());
            tracing::warn!(error = %e, "server settings rejected");
        }
    }
    result
}

async fn check_settings<C: Connector>(pool: &Pool<C>) -> Result<()> {
    let mut cursor = pool.query(SETTINGS_QUERY).await.map_err(io_error)?;

    loop {
        // An error here ends the stream and the cursor drops its connection
        let row = match cursor.next().await {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => return Err(io_error(e)),
        };

        let observation = match SettingObservation::from_row(&row) {
            Ok(observation) => observation,
            Err(e) => {
                release(cursor).await;
                return Err(io_error(e));
            }
        };

        let Some(rule) = rules::rule_for(&observation.name) else {
            continue;
        };
        if let Err(e) = rule.check(&observation) {
            release(cursor).await;
            return Err(e);
        }

        tracing::debug!(
            name = %observation.name,
            setting = %observation.setting,
            "PostgreSQL setting"
        );
    }

    Ok(())
}

/// Drain the rest of the result so the connection can be reused
async fn release<C: Connector>(cursor: RowCursor<C>) {
    if let Err(e) = cursor.close().await {
        tracing::debug!(error = %e, "error draining settings query");
    }
}

fn io_error(source: WireError) -> Error {
    Error::ValidationIo { op: OP, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Arc;

    fn row(values: &[Option<&'static str>]) -> Row {
        let columns: Arc<[String]> = vec![
            "name".to_string(),
            "setting".to_string(),
            "description".to_string(),
        ]
        .into();
        Row::new(
            columns,
            values
                .iter()
                .map(|v| v.map(|s| Bytes::from_static(s.as_bytes())))
                .collect(),
        )
    }

    #[test]
    fn test_observation_from_row() {
        let observation = SettingObservation::from_row(&row(&[
            Some("lc_ctype"),
            Some("en_US.UTF-8"),
            Some("Shows the character classification and case conversion locale."),
        ]))
        .unwrap();

        assert_eq!(observation.name, "lc_ctype");
        assert_eq!(observation.setting, "en_US.UTF-8");
        assert!(observation.description.starts_with("Shows"));
    }

    #[test]
    fn test_observation_rejects_wrong_shape() {
        assert!(matches!(
            SettingObservation::from_row(&row(&[Some("a"), Some("b")])),
            Err(WireError::Decode(_))
        ));
        assert!(matches!(
            SettingObservation::from_row(&row(&[Some("a"), None, Some("c")])),
            Err(WireError::Decode(_))
        ));
    }
}
