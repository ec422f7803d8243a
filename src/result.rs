//! Result marshaling
//!
//! A `QueryResult` owns a copy of the statement's rows rendered as text, so
//! it outlives anything that happens in the engine afterwards. `RawRows`
//! reads typed values straight from the engine's row buffer instead, and
//! only until the next statement replaces that buffer.

use crate::backend::spi::{statement_generation, TupleTable};
use crate::backend::SpiStatus;
use crate::error::{EmbedError, Result};
use crate::fmgr::{Datum, TypeId};
use std::sync::Arc;

/// Outcome of one `execute` call.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Kind of the last statement executed
    pub status: SpiStatus,

    /// Rows returned, or rows affected for writes without RETURNING
    pub row_count: u64,

    pub column_count: usize,
    pub column_names: Vec<String>,

    /// Row-major; `None` is SQL NULL
    pub values: Vec<Vec<Option<String>>>,

    raw: Option<RawRows>,
}

impl QueryResult {
    pub(crate) fn from_engine(status: SpiStatus, processed: u64, tuptable: Option<Arc<TupleTable>>) -> Self {
        let Some(table) = tuptable else {
            return Self {
                status,
                row_count: processed,
                column_count: 0,
                column_names: Vec::new(),
                values: Vec::new(),
                raw: None,
            };
        };

        let column_names = table.desc.iter().map(|attr| attr.name.clone()).collect();
        let values = table
            .rows
            .iter()
            .map(|row| row.iter().map(|v| v.as_ref().map(Datum::output)).collect())
            .collect();
        Self {
            status,
            row_count: table.rows.len() as u64,
            column_count: table.natts(),
            column_names,
            values,
            raw: Some(RawRows {
                generation: statement_generation(),
                table,
            }),
        }
    }

    /// Status code as exposed across the C ABI.
    pub fn status_code(&self) -> i32 {
        self.status.code()
    }

    /// Text value at (`row`, `column`); `None` for NULL or out of range.
    pub fn get(&self, row: usize, column: usize) -> Option<&str> {
        self.values.get(row)?.get(column)?.as_deref()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|c| c == name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Typed access to the engine's row buffer, for row-returning statements.
    pub fn raw(&self) -> Option<&RawRows> {
        self.raw.as_ref()
    }
}

/// Typed view of the engine's row buffer for one statement.
#[derive(Debug, Clone)]
pub struct RawRows {
    generation: u64,
    table: Arc<TupleTable>,
}

impl RawRows {
    /// False once a later statement has run or the engine was shut down.
    pub fn is_valid(&self) -> bool {
        self.generation == statement_generation()
    }

    pub fn row_count(&self) -> usize {
        self.table.rows.len()
    }

    pub fn column_type(&self, column: usize) -> Option<TypeId> {
        self.table.desc.get(column).map(|attr| attr.type_id)
    }

    fn datum(&self, row: usize, column: usize) -> Result<Option<&Datum>> {
        if !self.is_valid() {
            return Err(EmbedError::ResultInvalidated);
        }
        let value = self
            .table
            .rows
            .get(row)
            .and_then(|r| r.get(column))
            .ok_or(EmbedError::OutOfRange { row, column })?;
        Ok(value.as_ref())
    }

    fn mismatch(&self, column: usize, wanted: &str) -> EmbedError {
        let actual = self.column_type(column).map(|t| t.name()).unwrap_or("unknown");
        EmbedError::TypeError(format!("column {} is of type {}, not {}", column, actual, wanted))
    }

    pub fn get_int32(&self, row: usize, column: usize) -> Result<Option<i32>> {
        match self.datum(row, column)? {
            None => Ok(None),
            Some(Datum::Int4(v)) => Ok(Some(*v)),
            Some(_) => Err(self.mismatch(column, "integer")),
        }
    }

    /// Integers of either width.
    pub fn get_int64(&self, row: usize, column: usize) -> Result<Option<i64>> {
        match self.datum(row, column)? {
            None => Ok(None),
            Some(Datum::Int4(v)) => Ok(Some(i64::from(*v))),
            Some(Datum::Int8(v)) => Ok(Some(*v)),
            Some(_) => Err(self.mismatch(column, "bigint")),
        }
    }

    pub fn get_float64(&self, row: usize, column: usize) -> Result<Option<f64>> {
        match self.datum(row, column)? {
            None => Ok(None),
            Some(Datum::Float8(v)) => Ok(Some(*v)),
            Some(_) => Err(self.mismatch(column, "double precision")),
        }
    }

    pub fn get_bool(&self, row: usize, column: usize) -> Result<Option<bool>> {
        match self.datum(row, column)? {
            None => Ok(None),
            Some(Datum::Bool(v)) => Ok(Some(*v)),
            Some(_) => Err(self.mismatch(column, "boolean")),
        }
    }

    /// Machine word of a by-value column.
    pub fn get_datum_raw(&self, row: usize, column: usize) -> Result<Option<u64>> {
        match self.datum(row, column)? {
            None => Ok(None),
            Some(datum) => datum.raw_word().map(Some).ok_or_else(|| self.mismatch(column, "a by-value type")),
        }
    }

    /// Payload of a by-reference column, borrowed from the row buffer.
    pub fn get_bytes(&self, row: usize, column: usize) -> Result<Option<&[u8]>> {
        match self.datum(row, column)? {
            None => Ok(None),
            Some(datum) => datum
                .as_bytes()
                .map(Some)
                .ok_or_else(|| self.mismatch(column, "a by-reference type")),
        }
    }

    /// Any column through its text output function.
    pub fn get_string(&self, row: usize, column: usize) -> Result<Option<String>> {
        Ok(self.datum(row, column)?.map(Datum::output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::spi::{bump_statement_generation, Attribute};

    fn sample() -> Arc<TupleTable> {
        let mut table = TupleTable::new(vec![
            Attribute::new("id", TypeId::Int4),
            Attribute::new("name", TypeId::Text),
            Attribute::new("score", TypeId::Float8),
        ]);
        table.rows.push(vec![
            Some(Datum::Int4(1)),
            Some(Datum::Text("ada".into())),
            Some(Datum::Float8(1.5)),
        ]);
        table.rows.push(vec![Some(Datum::Int4(2)), None, None]);
        Arc::new(table)
    }

    #[test]
    fn test_copy_renders_text_and_nulls() {
        let result = QueryResult::from_engine(SpiStatus::Select, 2, Some(sample()));
        assert_eq!(result.status_code(), 5);
        assert_eq!(result.row_count, 2);
        assert_eq!(result.column_count, 3);
        assert_eq!(result.column_names, vec!["id", "name", "score"]);
        assert_eq!(result.get(0, 1), Some("ada"));
        assert_eq!(result.get(1, 1), None);
        assert_eq!(result.get(5, 0), None);
        assert_eq!(result.column_index("score"), Some(2));
    }

    #[test]
    fn test_write_without_rows() {
        let result = QueryResult::from_engine(SpiStatus::Insert, 3, None);
        assert_eq!(result.row_count, 3);
        assert_eq!(result.column_count, 0);
        assert!(result.is_empty());
        assert!(result.raw().is_none());
    }

    #[test]
    fn test_raw_accessors_check_types_and_generation() {
        let _serial = crate::testutil::serial();
        bump_statement_generation();
        let result = QueryResult::from_engine(SpiStatus::Select, 2, Some(sample()));
        let raw = result.raw().unwrap().clone();
        assert!(raw.is_valid());
        assert_eq!(raw.get_int32(0, 0).unwrap(), Some(1));
        assert_eq!(raw.get_int64(1, 0).unwrap(), Some(2));
        assert_eq!(raw.get_bytes(0, 1).unwrap(), Some(&b"ada"[..]));
        assert_eq!(raw.get_float64(1, 2).unwrap(), None);
        assert!(matches!(raw.get_bool(0, 0), Err(EmbedError::TypeError(_))));
        assert!(matches!(raw.get_int32(9, 0), Err(EmbedError::OutOfRange { row: 9, column: 0 })));

        bump_statement_generation();
        assert!(matches!(raw.get_int32(0, 0), Err(EmbedError::ResultInvalidated)));
        // The text copy is unaffected
        assert_eq!(result.get(0, 0), Some("1"));
    }
}
