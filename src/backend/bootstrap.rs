//! Catalog bootstrap and database creation
//!
//! `run_catalog_bootstrap` writes the initial control file, the shared
//! catalogs and the empty `template1` image into a prepared directory
//! skeleton. It runs once per process.

use super::catalog::{
    DatabaseEntry, DatabaseImage, GlobalCatalog, RoleEntry, BOOTSTRAP_SUPERUSER_OID, TEMPLATE1_OID,
};
use super::control::ControlFile;
use super::error::{ereport, sqlstate, Result};
use super::process::Backend;
use super::storage;
use crate::fmgr::Oid;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

static BOOTSTRAP_DONE: AtomicBool = AtomicBool::new(false);

/// Create the initial catalogs under `data_dir`.
pub fn run_catalog_bootstrap(data_dir: &Path, user: &str, encoding: i32, locale: &str, fsync: bool) -> Result<()> {
    if BOOTSTRAP_DONE.swap(true, Ordering::AcqRel) {
        return Err(ereport!(
            sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
            "bootstrap mode can only run once per process"
        ));
    }

    let control = ControlFile::new(ControlFile::generate_system_identifier(), encoding, locale);
    control.write(data_dir, fsync)?;

    let catalog = GlobalCatalog {
        databases: vec![DatabaseEntry {
            oid: TEMPLATE1_OID,
            name: "template1".to_string(),
            is_template: true,
            allow_connections: true,
            encoding,
            collate: locale.to_string(),
            description: Some("default template for new databases".to_string()),
        }],
        roles: vec![RoleEntry {
            oid: BOOTSTRAP_SUPERUSER_OID,
            name: user.to_string(),
            superuser: true,
        }],
    };
    storage::write_global_catalog(data_dir, &catalog, fsync)?;
    storage::write_database_image(data_dir, TEMPLATE1_OID, &DatabaseImage::default(), fsync)?;
    debug!(user, encoding, locale, "catalog bootstrap complete");
    Ok(())
}

impl Backend {
    /// Create database `name` as a copy of `template1`, in the open transaction.
    pub fn create_database(&mut self, name: &str, oid: Option<Oid>, is_template: bool, allow_connections: bool) -> Result<Oid> {
        self.require_transaction("CREATE DATABASE")?;
        let data_dir = self.data_dir()?;
        let catalog = &self.shared()?.catalog;
        if catalog.database(name).is_some() {
            return Err(ereport!(sqlstate::DUPLICATE_DATABASE, "database \"{}\" already exists", name));
        }
        let template = catalog
            .database_by_oid(TEMPLATE1_OID)
            .cloned()
            .ok_or_else(|| ereport!(sqlstate::INVALID_CATALOG_NAME, "template database \"template1\" does not exist"))?;
        let oid = oid.unwrap_or_else(|| catalog.next_database_oid());
        if catalog.database_by_oid(oid).is_some() {
            return Err(ereport!(sqlstate::DUPLICATE_OBJECT, "database OID {} is already in use", oid));
        }

        // The copy reflects what template1 holds on disk, so flush it first
        if let Some(db) = self.database.as_ref().filter(|db| db.oid == TEMPLATE1_OID) {
            storage::write_database_image(&data_dir, TEMPLATE1_OID, &db.image, false)?;
        }
        storage::copy_database_dir(&data_dir, TEMPLATE1_OID, oid)?;
        self.register_created_dir(storage::database_path(&data_dir, oid));

        self.shared_mut()?.catalog.databases.push(DatabaseEntry {
            oid,
            name: name.to_string(),
            is_template,
            allow_connections,
            encoding: template.encoding,
            collate: template.collate,
            description: None,
        });
        self.xact.catalog_dirty = true;
        debug!(database = name, oid, "created database");
        Ok(oid)
    }
}
