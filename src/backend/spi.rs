//! Statement interface
//!
//! Connect, execute a SQL string, read the resulting row buffer, finish.
//! The row buffer of the last execution stays readable until the next
//! `spi_execute`; every execution advances the process-wide statement
//! generation so holders of an older buffer can tell it was replaced.

use super::catalog::Row;
use super::error::{ereport, sqlstate, Result};
use super::memory::ContextId;
use super::process::Backend;
use super::sql::parse_sql;
use super::xact::TransactionState;
use crate::fmgr::TypeId;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Outcome of a successful execution, by statement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiStatus {
    Utility,
    Select,
    Insert,
    Delete,
    Update,
    InsertReturning,
    DeleteReturning,
    UpdateReturning,
}

impl SpiStatus {
    /// Numeric status code exposed to embedders.
    pub fn code(&self) -> i32 {
        match self {
            SpiStatus::Utility => 4,
            SpiStatus::Select => 5,
            SpiStatus::Insert => 7,
            SpiStatus::Delete => 8,
            SpiStatus::Update => 9,
            SpiStatus::InsertReturning => 11,
            SpiStatus::DeleteReturning => 12,
            SpiStatus::UpdateReturning => 13,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            4 => SpiStatus::Utility,
            5 => SpiStatus::Select,
            7 => SpiStatus::Insert,
            8 => SpiStatus::Delete,
            9 => SpiStatus::Update,
            11 => SpiStatus::InsertReturning,
            12 => SpiStatus::DeleteReturning,
            13 => SpiStatus::UpdateReturning,
            _ => return None,
        })
    }
}

/// One column of a row buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub name: String,
    pub type_id: TypeId,
}

impl Attribute {
    pub fn new(name: impl Into<String>, type_id: TypeId) -> Self {
        Self {
            name: name.into(),
            type_id,
        }
    }
}

/// Row buffer produced by a row-returning statement.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TupleTable {
    pub desc: Vec<Attribute>,
    pub rows: Vec<Row>,
}

impl TupleTable {
    pub fn new(desc: Vec<Attribute>) -> Self {
        Self { desc, rows: Vec::new() }
    }

    pub fn natts(&self) -> usize {
        self.desc.len()
    }
}

static STATEMENT_GENERATION: AtomicU64 = AtomicU64::new(0);

/// Current statement generation. Changes whenever a row buffer is replaced
/// or the engine shuts down.
pub fn statement_generation() -> u64 {
    STATEMENT_GENERATION.load(Ordering::Acquire)
}

pub fn bump_statement_generation() -> u64 {
    STATEMENT_GENERATION.fetch_add(1, Ordering::AcqRel) + 1
}

/// Per-process statement interface state.
#[derive(Debug, Default)]
pub struct SpiState {
    pub depth: u32,
    pub processed: u64,
    pub tuptable: Option<Arc<TupleTable>>,
    proc_context: Option<ContextId>,
}

impl Backend {
    pub fn spi_connect(&mut self) -> Result<()> {
        let parent = self.globals.top_transaction_context.ok_or_else(|| {
            ereport!(sqlstate::SPI_ERROR, "SPI_connect called outside a transaction")
        })?;
        let context = self.memory.create("SPI Proc", Some(parent))?;
        self.spi.proc_context = Some(context);
        self.spi.depth += 1;
        Ok(())
    }

    /// Run every statement of `sql`. The status, row count and row buffer
    /// are those of the last statement. `count > 0` caps returned rows.
    pub fn spi_execute(&mut self, sql: &str, read_only: bool, count: u64) -> Result<SpiStatus> {
        bump_statement_generation();
        self.spi.tuptable = None;
        self.spi.processed = 0;

        if self.spi.depth == 0 {
            return Err(ereport!(sqlstate::SPI_ERROR, "SPI_execute called while not connected"));
        }
        match self.xact.state {
            TransactionState::Failed => {
                return Err(ereport!(
                    sqlstate::IN_FAILED_SQL_TRANSACTION,
                    "current transaction is aborted, commands ignored until end of transaction block"
                ))
            }
            TransactionState::Idle => {
                return Err(ereport!(sqlstate::NO_ACTIVE_SQL_TRANSACTION, "SPI_execute called outside a transaction"))
            }
            TransactionState::InProgress => {}
        }

        let statements = parse_sql(sql)?;
        let mut status = SpiStatus::Utility;
        let mut processed = 0;
        let mut tuples = None;
        for statement in &statements {
            debug!(tag = statement.tag(), "executing statement");
            self.xact.command_id += 1;
            let result = self.execute_statement(statement, read_only)?;
            status = result.status;
            processed = result.processed;
            tuples = result.tuples;
        }

        if let Some(table) = tuples.as_mut() {
            if count > 0 && table.rows.len() as u64 > count {
                table.rows.truncate(count as usize);
                processed = count;
            }
        }
        self.spi.processed = processed;
        self.spi.tuptable = tuples.map(Arc::new);
        Ok(status)
    }

    pub fn spi_tuptable(&self) -> Option<Arc<TupleTable>> {
        self.spi.tuptable.clone()
    }

    pub fn spi_processed(&self) -> u64 {
        self.spi.processed
    }

    pub fn spi_finish(&mut self) -> Result<()> {
        if self.spi.depth == 0 {
            return Err(ereport!(sqlstate::SPI_ERROR, "SPI_finish called while not connected"));
        }
        self.spi.depth -= 1;
        if let Some(context) = self.spi.proc_context.take() {
            self.memory.delete(context);
        }
        Ok(())
    }

    /// End-of-transaction cleanup of connections left open by an error.
    pub(crate) fn at_eoxact_spi(&mut self) {
        if self.spi.depth > 0 {
            debug!(depth = self.spi.depth, "closing statement interface left open at transaction end");
        }
        self.spi.depth = 0;
        self.spi.proc_context = None;
    }

    pub fn reset_spi_state(&mut self) {
        self.spi = SpiState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(SpiStatus::Select.code(), 5);
        assert_eq!(SpiStatus::UpdateReturning.code(), 13);
        assert_eq!(SpiStatus::from_code(11), Some(SpiStatus::InsertReturning));
        assert_eq!(SpiStatus::from_code(-1), None);
    }

    #[test]
    fn test_generation_advances() {
        let _serial = crate::testutil::serial();
        let before = statement_generation();
        let after = bump_statement_generation();
        assert!(after > before);
        assert!(statement_generation() >= after);
    }
}
