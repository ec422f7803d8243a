//! pgembed: an in-process relational engine
//!
//! Runs the engine inside the host process with no server, no sockets and no
//! child processes (apart from the one-shot catalog bootstrap).
//!
//! ## Parts
//! - `session`: lifecycle (bootstrap, initialize, shutdown, global reset)
//! - `txn`: SQL execution with implicit or explicit transactions
//! - `notify`: LISTEN/NOTIFY capture queue
//! - `result`: owned query results and typed raw accessors
//! - `extension`: static extension registry and embedded file VFS
//! - `api` / `ffi`: Rust handle and C ABI
//! - `backend`: the hosted engine

pub mod api;
pub mod backend;
pub mod config;
pub mod extension;
pub mod ffi;
pub mod fmgr;
pub mod notify;
pub mod result;
pub mod session;
pub mod txn;

mod error;

pub use api::{Embedded, EmbeddedBuilder};
pub use config::{BootstrapOptions, Encoding, PerformanceConfig};
pub use error::{EmbedError, Result};
pub use extension::vfs;
pub use extension::{
    load_external_function, lookup_external_function, register_static_extension, EmbeddedFile,
    ExtensionLibrary, StaticFinfo, StaticFunction,
};
pub use notify::{listen, notify, pending_notifications, poll_notification, unlisten, Notification};
pub use result::{QueryResult, RawRows};
pub use session::bootstrap::{bootstrap, BootstrapOutcome};
pub use session::{
    initialize, initialize_with_catalog_writes, is_initialized, last_error_message,
    set_performance_config, shutdown,
};
pub use txn::{begin, commit, execute, in_transaction, rollback};

#[cfg(test)]
pub(crate) mod testutil {
    //! Shared fixtures. The engine is process-global, so every test that
    //! touches it holds `serial()`.

    use crate::config::{BootstrapOptions, PerformanceConfig};
    use crate::extension::{register_static_extension, EmbeddedFile, ExtensionLibrary, StaticFinfo, StaticFunction};
    use crate::fmgr::{finfo_v1, Datum, FunctionCallInfo, FunctionResult};
    use once_cell::sync::Lazy;
    use parking_lot::{Mutex, MutexGuard};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    pub const USER: &str = "tester";

    fn add_one(fcinfo: &FunctionCallInfo<'_>) -> FunctionResult {
        Ok(Some(Datum::Int4(fcinfo.get_arg_i32(0)? + 1)))
    }

    fn shout(fcinfo: &FunctionCallInfo<'_>) -> FunctionResult {
        Ok(Some(Datum::Text(format!("{}!", fcinfo.get_arg_text(0)?.to_uppercase()))))
    }

    static DEMO_FUNCS: &[StaticFunction] = &[
        StaticFunction { name: "add_one", func: add_one },
        StaticFunction { name: "shout", func: shout },
    ];
    static DEMO_FINFO: &[StaticFinfo] = &[
        StaticFinfo { name: "pg_finfo_add_one", finfo: finfo_v1 },
        StaticFinfo { name: "pg_finfo_shout", finfo: finfo_v1 },
    ];
    static DEMO_CONTROL: &[u8] = b"default_version = '1.0'\ncomment = 'test functions'\n";
    static DEMO_SCRIPT: &[u8] = b"\\echo Use \"CREATE EXTENSION demo\" to load this file. \\quit\n\
CREATE FUNCTION demo_shout(text) RETURNS text AS 'MODULE_PATHNAME', 'shout' LANGUAGE C STRICT;\n";

    /// Registered once, before anything can freeze the registry.
    static DEMO_EXTENSION: Lazy<()> = Lazy::new(|| {
        let library = ExtensionLibrary::new("demo")
            .with_functions(DEMO_FUNCS, DEMO_FINFO)
            .with_files(
                EmbeddedFile::new("extension/demo.control", DEMO_CONTROL),
                EmbeddedFile::new("extension/demo--1.0.sql", DEMO_SCRIPT),
            );
        if let Err(err) = register_static_extension(library) {
            panic!("demo extension registration failed: {err}");
        }
    });

    static SERIAL: Mutex<()> = parking_lot::const_mutex(());

    pub fn serial() -> MutexGuard<'static, ()> {
        Lazy::force(&DEMO_EXTENSION);
        let guard = SERIAL.lock();
        // A test that failed while initialized leaves the engine running
        crate::session::shutdown();
        guard
    }

    /// A cluster bootstrapped once per test process.
    static TEMPLATE: Lazy<TempDir> = Lazy::new(|| {
        let dir = tempfile::tempdir().unwrap();
        crate::session::set_performance_config(PerformanceConfig::for_testing());
        crate::session::bootstrap::bootstrap(dir.path(), &BootstrapOptions::new(USER)).unwrap();
        dir
    });

    fn copy_tree(from: &Path, to: &Path) {
        fs::create_dir_all(to).unwrap();
        for entry in fs::read_dir(from).unwrap() {
            let entry = entry.unwrap();
            let name = entry.file_name();
            if name == crate::backend::storage::LOCK_FILE {
                continue;
            }
            let target = to.join(&name);
            if entry.file_type().unwrap().is_dir() {
                copy_tree(&entry.path(), &target);
            } else {
                fs::copy(entry.path(), &target).unwrap();
            }
        }
    }

    /// A fresh copy of the template cluster. Caller holds `serial()`.
    pub fn cluster() -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        copy_tree(TEMPLATE.path(), dir.path());
        dir
    }

    /// Initialize on the `postgres` database of `cluster` with fsync off.
    pub fn start(cluster: &TempDir) {
        crate::session::set_performance_config(PerformanceConfig::for_testing());
        crate::session::initialize(cluster.path(), "postgres", USER).unwrap();
    }
}
