//! Cluster bootstrap
//!
//! Builds a fresh data directory: skeleton, catalog bootstrap in a separate
//! worker, setup scripts on `template1`, then `template0` and `postgres`.

use super::{initialize, initialize_with_catalog_writes, record, shutdown, with_backend};
use crate::backend::bootstrap::run_catalog_bootstrap;
use crate::backend::catalog::{POSTGRES_OID, TEMPLATE0_OID};
use crate::backend::storage::{self, CONFIG_FILE, SUBDIRS, VERSION_FILE};
use crate::backend::Backend;
use crate::config::{BootstrapOptions, Encoding};
use crate::error::{EmbedError, Result};
use crate::fmgr::Oid;
use crate::txn;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Setup scripts run against `template1`, in order.
const SETUP_SCRIPTS: &[(&str, &str)] = &[
    ("system_constraints", include_str!("../../scripts/system_constraints.sql")),
    ("system_functions", include_str!("../../scripts/system_functions.sql")),
    ("system_views", include_str!("../../scripts/system_views.sql")),
    ("information_schema", include_str!("../../scripts/information_schema.sql")),
];

struct DatabaseSpec {
    name: &'static str,
    oid: Oid,
    is_template: bool,
    allow_connections: bool,
    comment: &'static str,
}

const INITIAL_DATABASES: &[DatabaseSpec] = &[
    DatabaseSpec {
        name: "template0",
        oid: TEMPLATE0_OID,
        is_template: true,
        allow_connections: false,
        comment: "unmodifiable empty database",
    },
    DatabaseSpec {
        name: "postgres",
        oid: POSTGRES_OID,
        is_template: false,
        allow_connections: true,
        comment: "default administrative connection database",
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Created,
    /// `PG_VERSION` was already present; nothing was touched
    AlreadyInitialized,
}

/// Create a new cluster in `data_dir`.
///
/// A failure leaves whatever was already written in place.
pub fn bootstrap(data_dir: impl AsRef<Path>, options: &BootstrapOptions) -> Result<BootstrapOutcome> {
    record(run(data_dir.as_ref(), options))
}

fn run(data_dir: &Path, options: &BootstrapOptions) -> Result<BootstrapOutcome> {
    if data_dir.as_os_str().is_empty() || options.user.is_empty() {
        return Err(EmbedError::InvalidArgument("data directory and user are required".to_string()));
    }
    if data_dir.join(VERSION_FILE).exists() {
        info!(data_dir = %data_dir.display(), "data directory already initialized");
        return Ok(BootstrapOutcome::AlreadyInitialized);
    }
    if super::is_initialized() {
        return Err(EmbedError::InvalidArgument(
            "cannot bootstrap while the engine is initialized".to_string(),
        ));
    }
    let encoding = Encoding::from_name(options.encoding_name()).ok_or_else(|| {
        EmbedError::InvalidArgument(format!("\"{}\" is not a valid encoding name", options.encoding_name()))
    })?;
    let locale = options.locale_name().to_string();

    super::reset::reset_state();

    create_skeleton(data_dir)?;
    info!(data_dir = %data_dir.display(), "created directory skeleton");

    catalog_bootstrap(data_dir, &options.user, encoding.id(), &locale)?;
    info!("catalog bootstrap finished");

    run_setup_scripts(data_dir, &options.user)?;
    create_initial_databases(data_dir, &options.user)?;

    info!(data_dir = %data_dir.display(), encoding = encoding.name(), locale, "cluster created");
    Ok(BootstrapOutcome::Created)
}

fn create_skeleton(data_dir: &Path) -> Result<()> {
    fs::create_dir_all(data_dir)?;
    for sub in SUBDIRS {
        fs::create_dir_all(data_dir.join(sub))?;
    }
    let version = storage::version_string();
    fs::write(data_dir.join(VERSION_FILE), &version)?;
    fs::write(data_dir.join("base").join("1").join(VERSION_FILE), &version)?;
    fs::write(data_dir.join(CONFIG_FILE), "")?;
    Ok(())
}

/// Run the catalog bootstrap in a forked child and check its exit status.
#[cfg(unix)]
fn catalog_bootstrap(data_dir: &Path, user: &str, encoding: i32, locale: &str) -> Result<()> {
    let fsync = super::performance_config().fsync;

    // SAFETY: the child writes files and then calls `_exit`. It allocates,
    // serializes with serde_json and may emit tracing events, so it relies on
    // glibc's fork handlers leaving malloc usable and on the host installing
    // no blocking subscriber while a bootstrap runs.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(EmbedError::Bootstrap(format!(
            "could not fork bootstrap process: {}",
            std::io::Error::last_os_error()
        )));
    }
    if pid == 0 {
        let code = match std::panic::catch_unwind(|| run_catalog_bootstrap(data_dir, user, encoding, locale, fsync)) {
            Ok(Ok(())) => 0,
            Ok(Err(_)) => 1,
            Err(_) => 2,
        };
        // SAFETY: terminates the child without running the parent's atexit handlers
        unsafe { libc::_exit(code) };
    }

    let mut status: libc::c_int = 0;
    loop {
        // SAFETY: `pid` is our child and `status` outlives the call
        let rc = unsafe { libc::waitpid(pid, &mut status, 0) };
        if rc == pid {
            break;
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(EmbedError::Bootstrap(format!("waitpid failed: {err}")));
        }
    }

    if libc::WIFEXITED(status) && libc::WEXITSTATUS(status) == 0 {
        Ok(())
    } else if libc::WIFEXITED(status) {
        Err(EmbedError::Bootstrap(format!(
            "bootstrap process exited with status {}",
            libc::WEXITSTATUS(status)
        )))
    } else {
        Err(EmbedError::Bootstrap("bootstrap process terminated abnormally".to_string()))
    }
}

/// Run the catalog bootstrap on a worker thread. Works once per process.
#[cfg(not(unix))]
fn catalog_bootstrap(data_dir: &Path, user: &str, encoding: i32, locale: &str) -> Result<()> {
    let fsync = super::performance_config().fsync;
    let data_dir = data_dir.to_path_buf();
    let user = user.to_string();
    let locale = locale.to_string();
    let worker = std::thread::Builder::new()
        .name("pgembed-bootstrap".to_string())
        .spawn(move || run_catalog_bootstrap(&data_dir, &user, encoding, &locale, fsync))?;
    match worker.join() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(EmbedError::Bootstrap(err.full_message())),
        Err(_) => Err(EmbedError::Bootstrap("bootstrap worker panicked".to_string())),
    }
}

fn run_setup_scripts(data_dir: &Path, user: &str) -> Result<()> {
    initialize_with_catalog_writes(data_dir, "template1", user)
        .map_err(|err| EmbedError::Bootstrap(err.to_string()))?;
    for (name, sql) in SETUP_SCRIPTS {
        match txn::execute(sql) {
            Ok(_) => info!(script = name, "setup script applied"),
            Err(err) => warn!(script = name, error = %err, "setup script failed"),
        }
    }
    shutdown();
    Ok(())
}

fn create_database(backend: &mut Backend, spec: &DatabaseSpec) -> crate::backend::error::Result<Oid> {
    backend.start_transaction_command()?;
    match backend.create_database(spec.name, Some(spec.oid), spec.is_template, spec.allow_connections) {
        Ok(oid) => {
            backend.commit_transaction_command()?;
            Ok(oid)
        }
        Err(err) => {
            if let Err(abort) = backend.abort_current_transaction() {
                warn!(error = %abort, "could not abort after CREATE DATABASE failure");
            }
            Err(err)
        }
    }
}

fn create_initial_databases(data_dir: &Path, user: &str) -> Result<()> {
    initialize(data_dir, "template1", user).map_err(|err| EmbedError::Bootstrap(err.to_string()))?;

    let created = INITIAL_DATABASES.iter().try_for_each(|spec| {
        let oid = with_backend(|backend| create_database(backend, spec))
            .map_err(|message| EmbedError::Bootstrap(format!("could not create database \"{}\": {message}", spec.name)))?;
        info!(database = spec.name, oid, "database created");
        Ok::<(), EmbedError>(())
    });
    if let Err(err) = created {
        shutdown();
        return Err(err);
    }

    for spec in INITIAL_DATABASES {
        let sql = format!("COMMENT ON DATABASE {} IS '{}'", spec.name, spec.comment);
        if let Err(err) = txn::execute(&sql) {
            warn!(database = spec.name, error = %err, "could not set database comment");
        }
    }
    shutdown();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[test]
    fn test_existing_cluster_is_left_alone() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        let before = fs::read(cluster.path().join("global/pg_database")).unwrap();
        let outcome = bootstrap(cluster.path(), &BootstrapOptions::new(testutil::USER)).unwrap();
        assert_eq!(outcome, BootstrapOutcome::AlreadyInitialized);
        assert_eq!(fs::read(cluster.path().join("global/pg_database")).unwrap(), before);
    }

    #[test]
    fn test_unknown_encoding_writes_nothing() {
        let _serial = testutil::serial();
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("cluster");
        let options = BootstrapOptions::new(testutil::USER).with_encoding("klingon");
        let err = bootstrap(&target, &options).unwrap_err();
        assert!(matches!(err, EmbedError::InvalidArgument(_)));
        assert!(!target.exists());
    }

    #[test]
    fn test_refused_while_initialized() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        testutil::start(&cluster);
        let dir = tempfile::tempdir().unwrap();
        let err = bootstrap(dir.path().join("other"), &BootstrapOptions::new(testutil::USER)).unwrap_err();
        assert!(err.is_precondition());
        shutdown();
    }

    #[test]
    fn test_initial_databases_and_setup_objects() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        assert!(cluster.path().join("base/1").join(VERSION_FILE).is_file());
        assert!(cluster.path().join("pg_logical/mappings").is_dir());

        testutil::start(&cluster);
        let dbs = txn::execute("SELECT datname, datistemplate, datallowconn FROM pg_database ORDER BY oid").unwrap();
        let names: Vec<_> = (0..dbs.row_count as usize).map(|r| dbs.get(r, 0).unwrap_or("")).collect();
        assert_eq!(names, vec!["template1", "template0", "postgres"]);
        assert_eq!(dbs.get(1, 1), Some("t"));
        assert_eq!(dbs.get(1, 2), Some("f"));

        let users = txn::execute("SELECT usename, usesuper FROM pg_user").unwrap();
        assert_eq!(users.get(0, 0), Some(testutil::USER));

        let version = txn::execute("SELECT pg_engine_version()").unwrap();
        assert!(version.get(0, 0).unwrap().contains(crate::backend::ENGINE_VERSION));

        let comment = txn::execute("SELECT shobj_description(5, 'pg_database')").unwrap();
        assert_eq!(comment.get(0, 0), Some("default administrative connection database"));
        shutdown();
    }
}
