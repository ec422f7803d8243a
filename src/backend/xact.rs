//! Transactions
//!
//! A transaction keeps a copy of the state it may change (the connected
//! database image, the shared catalogs, the settings table) and restores it
//! on abort. Serial sequence positions survive the restore. Commit writes
//! whatever was dirtied.

use super::catalog::{DatabaseImage, GlobalCatalog};
use super::error::{ereport, sqlstate, Result};
use super::process::Backend;
use super::settings::Settings;
use super::storage;
use std::path::PathBuf;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    #[default]
    Idle,
    InProgress,
    /// An error occurred inside an explicit transaction; only rollback helps
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    pub xid: u64,
    pub command_id: u32,
}

#[derive(Debug)]
struct UndoImage {
    database: Option<DatabaseImage>,
    catalog: Option<GlobalCatalog>,
    settings: Option<Settings>,
    created_dirs: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct XactState {
    pub state: TransactionState,
    pub xid: Option<u64>,
    pub command_id: u32,
    pub database_dirty: bool,
    pub catalog_dirty: bool,
    undo: Option<Box<UndoImage>>,
    snapshots: Vec<Snapshot>,
}

impl Backend {
    /// True while a transaction is open, including a failed one.
    pub fn is_transaction_state(&self) -> bool {
        self.xact.state != TransactionState::Idle
    }

    pub fn start_transaction_command(&mut self) -> Result<()> {
        if self.is_transaction_state() {
            return Err(ereport!(
                sqlstate::ACTIVE_SQL_TRANSACTION,
                "there is already a transaction in progress"
            ));
        }
        let top = self.globals.top_memory_context.ok_or_else(|| {
            ereport!(sqlstate::INTERNAL_ERROR, "cannot start a transaction before memory context initialization")
        })?;
        let context = self.memory.create("TopTransactionContext", Some(top))?;

        let shared = self.shared_mut()?;
        let xid = shared.control.next_xid;
        shared.control.next_xid += 1;
        let catalog = shared.catalog.clone();

        self.xact.undo = Some(Box::new(UndoImage {
            database: self.database.as_ref().map(|db| db.image.clone()),
            catalog: Some(catalog),
            settings: self.settings.clone(),
            created_dirs: Vec::new(),
        }));
        self.globals.top_transaction_context = Some(context);
        self.globals.top_transaction_resource_owner = Some(xid);
        self.globals.current_resource_owner = Some(xid);
        self.xact.xid = Some(xid);
        self.xact.command_id = 0;
        self.xact.state = TransactionState::InProgress;
        debug!(xid, "transaction started");
        Ok(())
    }

    /// Put an explicit transaction into the failed state after an error.
    pub fn mark_transaction_failed(&mut self) {
        if self.xact.state == TransactionState::InProgress {
            debug!(xid = self.xact.xid, "transaction marked failed");
            self.xact.state = TransactionState::Failed;
        }
    }

    /// Commit the open transaction. A failed transaction is rolled back
    /// instead and reported as an error; so is a commit whose writes fail.
    pub fn commit_transaction_command(&mut self) -> Result<()> {
        match self.xact.state {
            TransactionState::Idle => {
                return Err(ereport!(sqlstate::NO_ACTIVE_SQL_TRANSACTION, "there is no transaction in progress"))
            }
            TransactionState::Failed => {
                self.abort_current_transaction()?;
                return Err(ereport!(
                    sqlstate::IN_FAILED_SQL_TRANSACTION,
                    "current transaction is aborted, transaction was rolled back"
                ));
            }
            TransactionState::InProgress => {}
        }

        if !self.xact.snapshots.is_empty() {
            warn!(count = self.xact.snapshots.len(), "snapshot reference leak at commit");
            self.xact.snapshots.clear();
        }

        let outcome = self.pre_commit_notify().and_then(|_| self.persist_transaction());
        if let Err(err) = outcome {
            if let Err(abort_err) = self.abort_current_transaction() {
                warn!(error = %abort_err, "abort after failed commit also failed");
            }
            return Err(err);
        }

        self.at_commit_notify();
        debug!(xid = self.xact.xid, "transaction committed");
        self.end_transaction();
        Ok(())
    }

    fn persist_transaction(&mut self) -> Result<()> {
        if !self.xact.database_dirty && !self.xact.catalog_dirty {
            return Ok(());
        }
        let data_dir = self.data_dir()?;
        let settings = self.settings()?;
        let fsync = settings.get_bool("fsync") && settings.get_bool("synchronous_commit");

        if self.xact.catalog_dirty {
            storage::write_global_catalog(&data_dir, &self.shared()?.catalog, fsync)?;
        }
        if self.xact.database_dirty {
            if let Some(db) = self.database.as_ref() {
                storage::write_database_image(&data_dir, db.oid, &db.image, fsync)?;
            }
        }
        Ok(())
    }

    /// Roll back the open transaction. No-op when none is open.
    pub fn abort_current_transaction(&mut self) -> Result<()> {
        if !self.is_transaction_state() {
            return Ok(());
        }

        if let Some(undo) = self.xact.undo.take() {
            let UndoImage {
                database,
                catalog,
                settings,
                created_dirs,
            } = *undo;
            if let (Some(db), Some(mut image)) = (self.database.as_mut(), database) {
                for (name, relation) in image.relations.iter_mut() {
                    if let Some(current) = db.image.relations.get(name) {
                        relation.sequence = relation.sequence.max(current.sequence);
                    }
                }
                db.image = image;
            }
            if let (Some(shared), Some(catalog)) = (self.shared.as_mut(), catalog) {
                shared.catalog = catalog;
            }
            if settings.is_some() {
                self.settings = settings;
            }
            for dir in created_dirs {
                if let Err(err) = std::fs::remove_dir_all(&dir) {
                    warn!(path = %dir.display(), error = %err, "could not remove directory on abort");
                }
            }
        }

        self.at_abort_notify();
        self.at_eoxact_spi();
        self.xact.snapshots.clear();
        debug!(xid = self.xact.xid, "transaction aborted");
        self.end_transaction();
        Ok(())
    }

    fn end_transaction(&mut self) {
        if let Some(context) = self.globals.top_transaction_context.take() {
            self.memory.delete(context);
        }
        self.globals.top_transaction_resource_owner = None;
        self.globals.current_resource_owner = None;
        self.xact.state = TransactionState::Idle;
        self.xact.xid = None;
        self.xact.undo = None;
        self.xact.database_dirty = false;
        self.xact.catalog_dirty = false;
    }

    pub fn push_active_snapshot(&mut self) -> Result<()> {
        let xid = self.xact.xid.ok_or_else(|| {
            ereport!(sqlstate::NO_ACTIVE_SQL_TRANSACTION, "cannot take query snapshot outside a transaction")
        })?;
        self.xact.snapshots.push(Snapshot {
            xid,
            command_id: self.xact.command_id,
        });
        Ok(())
    }

    pub fn pop_active_snapshot(&mut self) -> Result<()> {
        self.xact
            .snapshots
            .pop()
            .map(|_| ())
            .ok_or_else(|| ereport!(sqlstate::INTERNAL_ERROR, "no active snapshot"))
    }

    /// Remember a directory created by this transaction, removed on abort.
    pub(crate) fn register_created_dir(&mut self, path: PathBuf) {
        if let Some(undo) = self.xact.undo.as_mut() {
            undo.created_dirs.push(path);
        }
    }

    /// Fail unless a transaction is open and usable.
    pub(crate) fn require_transaction(&self, what: &str) -> Result<()> {
        match self.xact.state {
            TransactionState::InProgress => Ok(()),
            TransactionState::Failed => Err(ereport!(
                sqlstate::IN_FAILED_SQL_TRANSACTION,
                "current transaction is aborted, commands ignored until end of transaction block"
            )),
            TransactionState::Idle => Err(ereport!(
                sqlstate::NO_ACTIVE_SQL_TRANSACTION,
                "{} can only be used in transaction blocks",
                what
            )),
        }
    }

    pub fn reset_xact_state(&mut self) {
        self.xact = XactState::default();
    }
}
