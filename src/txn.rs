//! Transactional executor
//!
//! Runs SQL text through the engine's statement interface. Without an open
//! transaction each call is its own implicit transaction, committed on
//! success and aborted on error. Inside an explicit transaction an error
//! leaves the transaction failed until `rollback` (or `commit`, which rolls
//! back and reports it).

use crate::backend::error::Result as BackendResult;
use crate::backend::{self, Backend};
use crate::error::{EmbedError, Result};
use crate::result::QueryResult;
use crate::session::{self, with_backend};
use tracing::{debug, warn};

/// What one execution opened, so the error path closes exactly that.
#[derive(Debug, Default)]
struct ExecFlags {
    implicit_tx: bool,
    spi_connected: bool,
    snapshot_pushed: bool,
}

impl ExecFlags {
    fn unwind(&self, backend: &mut Backend) {
        if self.snapshot_pushed {
            if let Err(err) = backend.pop_active_snapshot() {
                warn!(error = %err, "could not pop snapshot after error");
            }
        }
        if self.spi_connected {
            if let Err(err) = backend.spi_finish() {
                warn!(error = %err, "could not finish statement interface after error");
            }
        }
        if self.implicit_tx {
            if let Err(err) = backend.abort_current_transaction() {
                warn!(error = %err, "could not abort implicit transaction");
            }
        } else {
            backend.mark_transaction_failed();
        }
    }
}

fn run_statements(backend: &mut Backend, sql: &str, flags: &mut ExecFlags) -> BackendResult<QueryResult> {
    if !backend.is_transaction_state() {
        backend.start_transaction_command()?;
        flags.implicit_tx = true;
    }

    backend.push_active_snapshot()?;
    flags.snapshot_pushed = true;

    backend.spi_connect()?;
    flags.spi_connected = true;

    let status = backend.spi_execute(sql, false, 0)?;
    let result = QueryResult::from_engine(status, backend.spi_processed(), backend.spi_tuptable());

    backend.spi_finish()?;
    flags.spi_connected = false;

    backend.pop_active_snapshot()?;
    flags.snapshot_pushed = false;

    if flags.implicit_tx {
        // A failed commit has already rolled back
        flags.implicit_tx = false;
        backend.commit_transaction_command()?;
    }
    Ok(result)
}

/// Execute `sql`, which may hold several `;`-separated statements. The
/// result describes the last one.
pub fn execute(sql: &str) -> Result<QueryResult> {
    session::record(execute_inner(sql))
}

fn execute_inner(sql: &str) -> Result<QueryResult> {
    session::check_initialized()?;
    debug!(sql, "execute");

    let mut flags = ExecFlags::default();
    match with_backend(|backend| run_statements(backend, sql, &mut flags)) {
        Ok(result) => Ok(result),
        Err(message) => {
            if let Err(cleanup) = with_backend(|backend| {
                flags.unwind(backend);
                Ok(())
            }) {
                warn!(error = %cleanup, "error cleanup failed");
            }
            Err(EmbedError::Query(message))
        }
    }
}

/// Run `op` in the open transaction, or in an implicit one committed on
/// success. Engine errors are wrapped with `wrap`.
pub(crate) fn autocommit<T>(
    op: impl FnOnce(&mut Backend) -> BackendResult<T>,
    wrap: fn(String) -> EmbedError,
) -> Result<T> {
    session::check_initialized()?;

    let mut implicit = false;
    let outcome = with_backend(|backend| {
        if !backend.is_transaction_state() {
            backend.start_transaction_command()?;
            implicit = true;
        }
        let value = op(backend)?;
        if implicit {
            implicit = false;
            backend.commit_transaction_command()?;
        }
        Ok(value)
    });

    outcome.map_err(|message| {
        let cleanup = with_backend(|backend| {
            if implicit {
                backend.abort_current_transaction()
            } else {
                backend.mark_transaction_failed();
                Ok(())
            }
        });
        if let Err(err) = cleanup {
            warn!(error = %err, "could not clean up after failed operation");
        }
        wrap(message)
    })
}

/// True while an explicit or implicit transaction is open.
pub fn in_transaction() -> bool {
    session::is_initialized() && backend::lock().is_transaction_state()
}

/// Open an explicit transaction.
pub fn begin() -> Result<()> {
    session::record(begin_inner())
}

fn begin_inner() -> Result<()> {
    session::check_initialized()?;
    if in_transaction() {
        return Err(EmbedError::AlreadyInTransaction);
    }
    with_backend(|backend| backend.start_transaction_command()).map_err(|message| {
        if let Err(err) = with_backend(|backend| backend.abort_current_transaction()) {
            warn!(error = %err, "could not abort after failed BEGIN");
        }
        EmbedError::Begin(message)
    })
}

/// Commit the explicit transaction. A failed transaction is rolled back and
/// reported as an error.
pub fn commit() -> Result<()> {
    session::record(commit_inner())
}

fn commit_inner() -> Result<()> {
    session::check_initialized()?;
    if !in_transaction() {
        return Err(EmbedError::NotInTransaction);
    }
    with_backend(|backend| backend.commit_transaction_command()).map_err(|message| {
        if let Err(err) = with_backend(|backend| backend.abort_current_transaction()) {
            warn!(error = %err, "could not abort after failed COMMIT");
        }
        EmbedError::Commit(message)
    })
}

/// Roll back the explicit transaction.
pub fn rollback() -> Result<()> {
    session::record(rollback_inner())
}

fn rollback_inner() -> Result<()> {
    session::check_initialized()?;
    if !in_transaction() {
        return Err(EmbedError::NotInTransaction);
    }
    with_backend(|backend| backend.abort_current_transaction()).map_err(EmbedError::Rollback)
}
