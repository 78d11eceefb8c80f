//! Row streaming over a pooled connection

use super::{Connector, PooledConnection, Session};
use crate::error::{WireError, WireResult};
use bytes::Bytes;
use std::sync::Arc;

/// Rows of one running query
///
/// Holds its connection until the last row has been read. Dropping a cursor
/// early discards the connection instead of returning it to the pool; call
/// [`RowCursor::close`] to drain the rest and keep the connection.
pub struct RowCursor<C: Connector> {
    conn: PooledConnection<C>,
    columns: Arc<[String]>,
    done: bool,
}

impl<C: Connector> RowCursor<C> {
    pub(crate) fn new(conn: PooledConnection<C>, columns: Vec<String>) -> Self {
        // A statement without a result set has already finished
        let done = columns.is_empty() && conn.is_idle();
        Self {
            conn,
            columns: columns.into(),
            done,
        }
    }

    /// Column names of the result set
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Next row, or `None` when the result is exhausted
    ///
    /// An error ends the stream; later calls return `None`.
    pub async fn next(&mut self) -> WireResult<Option<Row>> {
        if self.done {
            return Ok(None);
        }

        match self.conn.next_row().await {
            Ok(Some(values)) => Ok(Some(Row::new(Arc::clone(&self.columns), values))),
            Ok(None) => {
                self.done = true;
                Ok(None)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    /// Read and discard the remaining rows, then release the connection
    pub async fn close(mut self) -> WireResult<()> {
        while self.next().await?.is_some() {}
        Ok(())
    }
}

/// One row in text format
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Option<Bytes>>,
}

impl Row {
    /// Build a row from column names and raw values (`None` is NULL)
    pub fn new(columns: Arc<[String]>, values: Vec<Option<Bytes>>) -> Self {
        Self { columns, values }
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True for a row without values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Raw value at `idx`; `Ok(None)` is SQL NULL
    pub fn try_get(&self, idx: usize) -> WireResult<Option<&[u8]>> {
        self.values
            .get(idx)
            .map(|v| v.as_deref())
            .ok_or_else(|| {
                WireError::Decode(format!(
                    "column index {} out of range ({} values)",
                    idx,
                    self.values.len()
                ))
            })
    }

    /// Non-NULL text value at `idx`
    pub fn get_text(&self, idx: usize) -> WireResult<&str> {
        let raw = self.try_get(idx)?.ok_or_else(|| {
            WireError::Decode(format!("column {} is NULL", self.column_label(idx)))
        })?;
        std::str::from_utf8(raw).map_err(|e| {
            WireError::Decode(format!(
                "column {} is not valid UTF-8: {}",
                self.column_label(idx),
                e
            ))
        })
    }

    fn column_label(&self, idx: usize) -> String {
        match self.columns.get(idx) {
            Some(name) => format!("{:?}", name),
            None => idx.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Arc<[String]> {
        vec!["name".to_string(), "setting".to_string()].into()
    }

    fn row(values: Vec<Option<&'static str>>) -> Row {
        Row::new(
            columns(),
            values
                .into_iter()
                .map(|v| v.map(|s| Bytes::from_static(s.as_bytes())))
                .collect(),
        )
    }

    #[test]
    fn test_get_text() {
        let row = row(vec![Some("lc_ctype"), Some("C")]);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get_text(0).unwrap(), "lc_ctype");
        assert_eq!(row.get_text(1).unwrap(), "C");
        assert_eq!(row.columns()[1], "setting");
    }

    #[test]
    fn test_get_text_null() {
        let row = row(vec![Some("lc_ctype"), None]);
        assert_eq!(row.try_get(1).unwrap(), None);

        let err = row.get_text(1).unwrap_err();
        assert!(err.to_string().contains("\"setting\" is NULL"), "{}", err);
    }

    #[test]
    fn test_get_text_out_of_range() {
        let row = row(vec![Some("x")]);
        assert!(matches!(row.get_text(5), Err(WireError::Decode(_))));
    }

    #[test]
    fn test_get_text_invalid_utf8() {
        let row = Row::new(columns(), vec![Some(Bytes::from_static(&[0xff, 0xfe]))]);
        assert!(matches!(row.get_text(0), Err(WireError::Decode(_))));
    }
}
