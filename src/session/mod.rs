//! Lifecycle controller
//!
//! Brings the engine up inside the calling process and takes it down again,
//! as many times as the host likes. The process-wide `EngineSession` tracks
//! whether the engine is running, what the host configured before starting
//! it, and the text of the last failure.

pub mod bootstrap;
mod guard;
pub(crate) mod reset;
mod signals;

pub(crate) use guard::with_backend;

use crate::backend::globals::{OutputDest, ProcessingMode};
use crate::backend::settings::SettingSource;
use crate::backend::spi::bump_statement_generation;
use crate::backend::storage::VERSION_FILE;
use crate::backend::Backend;
use crate::config::PerformanceConfig;
use crate::error::{EmbedError, Result};
use crate::notify;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use signals::SavedDispositions;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub(crate) struct EngineSession {
    initialized: bool,
    original_working_directory: Option<PathBuf>,
    data_directory: Option<PathBuf>,
    preinit_config: PerformanceConfig,
    last_error: Option<String>,
    signals: Option<SavedDispositions>,
}

static SESSION: Lazy<Mutex<EngineSession>> = Lazy::new(|| Mutex::new(EngineSession::default()));

fn session() -> MutexGuard<'static, EngineSession> {
    SESSION.lock()
}

/// Store the text of a failed call as the last error.
pub(crate) fn record<T>(result: Result<T>) -> Result<T> {
    if let Err(err) = &result {
        session().last_error = Some(err.to_string());
    }
    result
}

pub(crate) fn check_initialized() -> Result<()> {
    if session().initialized {
        Ok(())
    } else {
        Err(EmbedError::NotInitialized)
    }
}

pub fn is_initialized() -> bool {
    session().initialized
}

/// Text of the most recent failure, overwritten by the next one.
pub fn last_error_message() -> Option<String> {
    session().last_error.clone()
}

/// Durability settings for the next `initialize`. They take priority over
/// `postgresql.conf`.
pub fn set_performance_config(config: PerformanceConfig) {
    session().preinit_config = config;
}

pub fn performance_config() -> PerformanceConfig {
    session().preinit_config
}

/// Data directory of the running session.
pub fn data_directory() -> Option<PathBuf> {
    session().data_directory.clone()
}

/// Start the engine on `data_dir` and connect to `db_name` as `user`.
///
/// Succeeds without doing anything when already initialized.
pub fn initialize(data_dir: impl AsRef<Path>, db_name: &str, user: &str) -> Result<()> {
    record(start(data_dir.as_ref(), db_name, user, false))
}

/// Like [`initialize`], with `allow_system_table_mods` on so setup scripts
/// can create objects in the system namespace.
pub fn initialize_with_catalog_writes(data_dir: impl AsRef<Path>, db_name: &str, user: &str) -> Result<()> {
    record(start(data_dir.as_ref(), db_name, user, true))
}

fn check_arguments(data_dir: &Path, db_name: &str, user: &str) -> Result<()> {
    if data_dir.as_os_str().is_empty() || db_name.is_empty() || user.is_empty() {
        return Err(EmbedError::InvalidArgument(
            "data directory, database and user are required".to_string(),
        ));
    }
    if !data_dir.is_dir() {
        return Err(EmbedError::InvalidArgument(format!(
            "data directory \"{}\" does not exist",
            data_dir.display()
        )));
    }
    if !data_dir.join(VERSION_FILE).is_file() {
        return Err(EmbedError::InvalidArgument(format!(
            "\"{}\" is not a database cluster directory",
            data_dir.display()
        )));
    }
    Ok(())
}

fn start(data_dir: &Path, db_name: &str, user: &str, catalog_writes: bool) -> Result<()> {
    let mut session = session();
    if session.initialized {
        session.last_error = Some("Already initialized".to_string());
        return Ok(());
    }
    check_arguments(data_dir, db_name, user)?;

    let cwd = std::env::current_dir()?;
    let config = session.preinit_config;
    let saved_signals = signals::ignore_coordination_signals();

    let booted = with_backend(|backend| boot(backend, data_dir, db_name, user, config, catalog_writes));
    match booted {
        Ok(data_directory) => {
            session.initialized = true;
            session.original_working_directory = Some(cwd);
            session.data_directory = Some(data_directory);
            session.signals = Some(saved_signals);
            info!(data_dir = %data_dir.display(), database = db_name, user, "engine initialized");
            Ok(())
        }
        Err(message) => {
            warn!(error = %message, "initialization failed; tearing down");
            if let Err(err) = with_backend(|backend| backend.shmem_exit()) {
                warn!(error = %err, "teardown after failed initialization");
            }
            reset::reset_state();
            signals::restore(saved_signals);
            restore_working_directory(&cwd);
            Err(EmbedError::Initialization(message))
        }
    }
}

fn boot(
    backend: &mut Backend,
    data_dir: &Path,
    db_name: &str,
    user: &str,
    config: PerformanceConfig,
    catalog_writes: bool,
) -> crate::backend::error::Result<PathBuf> {
    backend.memory_context_init()?;
    backend.initialize_settings()?;
    for (name, value) in config.as_settings() {
        backend.set_config_option(name, value, SettingSource::Argv)?;
    }
    if catalog_writes {
        backend.set_config_option("allow_system_table_mods", "on", SettingSource::Argv)?;
    }

    backend.set_data_dir(data_dir)?;
    backend.select_config_files()?;
    backend.check_data_dir()?;
    backend.change_to_data_dir()?;
    backend.create_data_dir_lock_file()?;
    backend.load_control_file()?;

    backend.create_shared_memory()?;
    backend.init_standalone_process()?;
    backend.init_process()?;

    backend.set_processing_mode(ProcessingMode::Normal);
    backend.connect_database(db_name, user)?;
    backend.create_message_context()?;

    backend.set_output_dest(OutputDest::None);
    backend.install_notify_hook(Some(notify::capture_notification));
    backend.data_dir()
}

fn restore_working_directory(dir: &Path) {
    if let Err(err) = std::env::set_current_dir(dir) {
        warn!(path = %dir.display(), error = %err, "could not restore working directory");
    }
}

/// Shut the engine down and return the process to its pre-initialize state.
/// Does nothing when not initialized; shutdown errors are logged.
pub fn shutdown() {
    let mut session = session();
    if !session.initialized {
        return;
    }

    if let Err(err) = with_backend(|backend| backend.shmem_exit()) {
        warn!(error = %err, "error during engine shutdown");
    }
    reset::reset_state();
    bump_statement_generation();

    if let Some(saved) = session.signals.take() {
        signals::restore(saved);
    }
    if let Some(cwd) = session.original_working_directory.take() {
        restore_working_directory(&cwd);
    }
    session.data_directory = None;
    session.initialized = false;
    info!("engine shut down and reset");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use crate::txn::{begin, commit, execute, in_transaction, rollback};

    #[test]
    fn test_preconditions_before_engine() {
        let _serial = testutil::serial();
        let dir = tempfile::tempdir().unwrap();

        assert!(matches!(execute("SELECT 1"), Err(EmbedError::NotInitialized)));
        assert_eq!(last_error_message().as_deref(), Some("Not initialized"));
        assert!(matches!(begin(), Err(EmbedError::NotInitialized)));

        let err = initialize(dir.path(), "", "postgres").unwrap_err();
        assert!(err.is_precondition());
        let err = initialize(dir.path().join("missing"), "postgres", "postgres").unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        let err = initialize(dir.path(), "postgres", "postgres").unwrap_err();
        assert!(err.to_string().contains("not a database cluster directory"));
        assert!(!is_initialized());
    }

    #[test]
    fn test_reinitialize_is_noop() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        testutil::start(&cluster);

        initialize(cluster.path(), "postgres", testutil::USER).unwrap();
        assert_eq!(last_error_message().as_deref(), Some("Already initialized"));
        assert!(is_initialized());
        shutdown();
        assert!(!is_initialized());
        shutdown();
    }

    #[test]
    fn test_repeated_cycles_behave_alike() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        let cwd = std::env::current_dir().unwrap();

        for cycle in 0..3 {
            testutil::start(&cluster);
            execute("CREATE TABLE IF NOT EXISTS cycles (n integer)").unwrap();
            execute(&format!("INSERT INTO cycles VALUES ({})", cycle)).unwrap();
            let result = execute("SELECT count(*) FROM cycles").unwrap();
            assert_eq!(result.get(0, 0), Some((cycle + 1).to_string().as_str()));
            shutdown();
            assert!(crate::backend::lock().is_pristine());
            assert_eq!(std::env::current_dir().unwrap(), cwd);
        }
    }

    /// One scripted session on `cluster`, rendered as text.
    fn scripted_run(cluster: &tempfile::TempDir) -> Vec<String> {
        let mut out = Vec::new();
        let rows = |sql: &str| -> String {
            let result = execute(sql).unwrap();
            format!("{:?}", result.values)
        };

        testutil::start(cluster);
        execute("CREATE TABLE t (id integer, name text)").unwrap();
        execute("INSERT INTO t VALUES (1, 'a'), (2, 'b')").unwrap();
        crate::notify::listen("ch").unwrap();
        crate::notify::notify("ch", Some("x")).unwrap();
        out.push(rows("SELECT id, name FROM t ORDER BY id"));
        while let Some(n) = crate::notify::poll_notification() {
            out.push(format!("{}:{}", n.channel, n.payload));
        }

        // Left open across shutdown
        begin().unwrap();
        execute("INSERT INTO t VALUES (3, 'c')").unwrap();
        shutdown();
        assert!(crate::backend::lock().is_pristine());

        testutil::start(cluster);
        out.push(rows("SELECT count(*) FROM t"));
        out.push(in_transaction().to_string());
        crate::notify::notify("ch", Some("unheard")).unwrap();
        out.push(format!("{:?}", crate::notify::poll_notification().map(|n| n.payload)));
        shutdown();
        out
    }

    #[test]
    fn test_fresh_clusters_give_identical_runs() {
        let _serial = testutil::serial();
        let runs: Vec<Vec<String>> = (0..3).map(|_| scripted_run(&testutil::cluster())).collect();
        assert_eq!(runs[0], runs[1]);
        assert_eq!(runs[1], runs[2]);
        assert!(runs[0].contains(&"ch:x".to_string()));
        assert!(runs[0].contains(&"false".to_string()));
        assert_eq!(runs[0].last().map(String::as_str), Some("None"));
    }

    #[test]
    fn test_preinit_config_visible() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        set_performance_config(PerformanceConfig::for_testing());
        testutil::start(&cluster);
        let result = execute("SHOW synchronous_commit").unwrap();
        assert_eq!(result.get(0, 0), Some("off"));
        shutdown();
        set_performance_config(PerformanceConfig::durable());
    }

    #[test]
    fn test_autocommit_and_explicit_transactions() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        testutil::start(&cluster);

        execute("CREATE TABLE items (id serial PRIMARY KEY, name text)").unwrap();
        assert!(execute("INSERT INTO items (id, name) VALUES (1, 'a'), (1, 'b')").is_err());
        assert_eq!(execute("SELECT count(*) FROM items").unwrap().get(0, 0), Some("0"));
        assert!(!in_transaction());

        begin().unwrap();
        assert!(matches!(begin(), Err(EmbedError::AlreadyInTransaction)));
        execute("INSERT INTO items (name) VALUES ('kept')").unwrap();
        commit().unwrap();

        begin().unwrap();
        execute("INSERT INTO items (name) VALUES ('dropped')").unwrap();
        rollback().unwrap();
        assert!(matches!(rollback(), Err(EmbedError::NotInTransaction)));

        let result = execute("SELECT name FROM items ORDER BY id").unwrap();
        assert_eq!(result.values, vec![vec![Some("kept".to_string())]]);
        shutdown();
    }

    #[test]
    fn test_failed_explicit_transaction() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        testutil::start(&cluster);
        execute("CREATE TABLE t (n integer NOT NULL)").unwrap();

        begin().unwrap();
        execute("INSERT INTO t VALUES (1)").unwrap();
        assert!(execute("INSERT INTO t VALUES (NULL)").is_err());
        assert!(in_transaction());
        let err = execute("SELECT 1").unwrap_err();
        assert!(err.to_string().contains("current transaction is aborted"));
        assert!(matches!(commit(), Err(EmbedError::Commit(_))));
        assert!(!in_transaction());
        assert_eq!(execute("SELECT count(*) FROM t").unwrap().get(0, 0), Some("0"));

        begin().unwrap();
        assert!(execute("SELECT * FROM nowhere").is_err());
        rollback().unwrap();
        assert!(execute("SELECT 1").is_ok());
        shutdown();
    }

    #[test]
    fn test_raw_rows_invalidated_by_next_statement() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        testutil::start(&cluster);

        let result = execute("SELECT 41 + 1 AS answer, 'x' AS tag").unwrap();
        let raw = result.raw().unwrap();
        assert_eq!(raw.get_int32(0, 0).unwrap(), Some(42));
        assert_eq!(raw.get_bytes(0, 1).unwrap(), Some(&b"x"[..]));

        execute("SELECT 1").unwrap();
        assert!(matches!(raw.get_int32(0, 0), Err(EmbedError::ResultInvalidated)));
        assert_eq!(result.get(0, 0), Some("42"));
        shutdown();
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_lock_conflict() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        let foreign = crate::backend::storage::DataDirLock::acquire(cluster.path()).unwrap();

        let err = initialize(cluster.path(), "postgres", testutil::USER).unwrap_err();
        assert!(matches!(err, EmbedError::Initialization(_)));
        assert!(crate::backend::lock().is_pristine());

        foreign.release();
        testutil::start(&cluster);
        shutdown();
    }
}
