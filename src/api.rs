//! Embedded engine handle
//!
//! The engine is a process-wide singleton; [`Embedded`] owns it for the
//! lifetime of the handle and shuts it down on drop.
//!
//! # Quick start
//!
//! ```no_run
//! use pgembed::{BootstrapOptions, Embedded, PerformanceConfig};
//!
//! let db = Embedded::builder("/tmp/pgdata")
//!     .bootstrap(BootstrapOptions::new("postgres"))
//!     .performance(PerformanceConfig::for_testing())
//!     .open()?;
//!
//! db.execute("CREATE TABLE items (id integer PRIMARY KEY, name text)")?;
//! db.execute("INSERT INTO items VALUES (1, 'lamp')")?;
//! let rows = db.execute("SELECT name FROM items")?;
//! assert_eq!(rows.get(0, 0), Some("lamp"));
//! # Ok::<(), pgembed::EmbedError>(())
//! ```
//!
//! # Operations
//!
//! ## 1. SQL
//! - `execute()`: run one or more statements, autocommitting outside a transaction
//!
//! ## 2. Transactions
//! - `begin()` / `commit()` / `rollback()`
//! - `transaction()`: run a closure, commit on `Ok`, roll back on `Err`
//!
//! ## 3. Notifications
//! - `listen()` / `unlisten()` / `unlisten_all()` / `notify()`
//! - `poll()` / `drain_notifications()`

use crate::config::{BootstrapOptions, PerformanceConfig};
use crate::error::{EmbedError, Result};
use crate::notify::{self, Notification};
use crate::result::QueryResult;
use crate::session::{self, bootstrap::bootstrap};
use crate::txn;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Options for opening the engine.
#[derive(Debug, Clone)]
pub struct EmbeddedBuilder {
    data_dir: PathBuf,
    database: String,
    user: String,
    performance: Option<PerformanceConfig>,
    bootstrap: Option<BootstrapOptions>,
}

impl EmbeddedBuilder {
    /// Database to connect to, `postgres` by default.
    pub fn database(mut self, name: impl Into<String>) -> Self {
        self.database = name.into();
        self
    }

    /// Role to connect as, `postgres` by default.
    pub fn user(mut self, name: impl Into<String>) -> Self {
        self.user = name.into();
        self
    }

    pub fn performance(mut self, config: PerformanceConfig) -> Self {
        self.performance = Some(config);
        self
    }

    /// Create the cluster first when the data directory has none. The
    /// bootstrap superuser also becomes the connecting user.
    pub fn bootstrap(mut self, options: BootstrapOptions) -> Self {
        self.user = options.user.clone();
        self.bootstrap = Some(options);
        self
    }

    pub fn open(self) -> Result<Embedded> {
        if session::is_initialized() {
            return Err(EmbedError::InvalidArgument(
                "the engine is already open in this process".to_string(),
            ));
        }
        if let Some(config) = self.performance {
            session::set_performance_config(config);
        }
        if let Some(options) = &self.bootstrap {
            bootstrap(&self.data_dir, options)?;
        }
        session::initialize(&self.data_dir, &self.database, &self.user)?;
        debug!(data_dir = %self.data_dir.display(), database = %self.database, "embedded handle opened");
        Ok(Embedded { _private: () })
    }
}

/// Owner of the running engine.
///
/// At most one exists per process. Dropping it shuts the engine down and
/// restores the process to its pre-open state, after which a new handle may
/// be opened.
#[derive(Debug)]
pub struct Embedded {
    _private: (),
}

impl Embedded {
    pub fn builder(data_dir: impl AsRef<Path>) -> EmbeddedBuilder {
        EmbeddedBuilder {
            data_dir: data_dir.as_ref().to_path_buf(),
            database: "postgres".to_string(),
            user: "postgres".to_string(),
            performance: None,
            bootstrap: None,
        }
    }

    /// Open an existing cluster.
    pub fn open(data_dir: impl AsRef<Path>, database: &str, user: &str) -> Result<Self> {
        Self::builder(data_dir).database(database).user(user).open()
    }

    pub fn execute(&self, sql: &str) -> Result<QueryResult> {
        txn::execute(sql)
    }

    pub fn begin(&self) -> Result<()> {
        txn::begin()
    }

    pub fn commit(&self) -> Result<()> {
        txn::commit()
    }

    pub fn rollback(&self) -> Result<()> {
        txn::rollback()
    }

    pub fn in_transaction(&self) -> bool {
        txn::in_transaction()
    }

    /// Run `f` in an explicit transaction: commit when it returns `Ok`,
    /// roll back when it returns `Err`.
    pub fn transaction<T>(&self, f: impl FnOnce(&Self) -> Result<T>) -> Result<T> {
        txn::begin()?;
        match f(self) {
            Ok(value) => {
                txn::commit()?;
                Ok(value)
            }
            Err(err) => {
                if txn::in_transaction() {
                    // The closure's error is the one worth reporting
                    let _ = txn::rollback();
                }
                Err(err)
            }
        }
    }

    pub fn listen(&self, channel: &str) -> Result<()> {
        notify::listen(channel)
    }

    pub fn unlisten(&self, channel: &str) -> Result<()> {
        notify::unlisten(Some(channel))
    }

    pub fn unlisten_all(&self) -> Result<()> {
        notify::unlisten(None)
    }

    pub fn notify(&self, channel: &str, payload: Option<&str>) -> Result<()> {
        notify::notify(channel, payload)
    }

    /// Oldest pending notification, without blocking.
    pub fn poll(&self) -> Option<Notification> {
        notify::poll_notification()
    }

    /// Every pending notification, oldest first.
    pub fn drain_notifications(&self) -> Vec<Notification> {
        std::iter::from_fn(notify::poll_notification).collect()
    }

    pub fn data_directory(&self) -> Option<PathBuf> {
        session::data_directory()
    }

    pub fn last_error(&self) -> Option<String> {
        session::last_error_message()
    }

    /// Shut down now rather than at drop.
    pub fn close(self) {}
}

impl Drop for Embedded {
    fn drop(&mut self) {
        session::shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn open(cluster: &tempfile::TempDir) -> Embedded {
        Embedded::builder(cluster.path())
            .user(testutil::USER)
            .performance(PerformanceConfig::for_testing())
            .open()
            .unwrap()
    }

    #[test]
    fn test_drop_shuts_down() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        {
            let db = open(&cluster);
            db.execute("CREATE TABLE t (id integer)").unwrap();
            assert!(session::is_initialized());
        }
        assert!(!session::is_initialized());

        let db = open(&cluster);
        let rows = db.execute("SELECT count(*) FROM t").unwrap();
        assert_eq!(rows.get(0, 0), Some("0"));
        db.close();
        assert!(!session::is_initialized());
    }

    #[test]
    fn test_second_handle_refused() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        let _db = open(&cluster);
        let err = Embedded::open(cluster.path(), "postgres", testutil::USER).unwrap_err();
        assert!(err.is_precondition());
    }

    #[test]
    fn test_transaction_closure() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        let db = open(&cluster);
        db.execute("CREATE TABLE t (id integer)").unwrap();

        db.transaction(|db| db.execute("INSERT INTO t VALUES (1)").map(|_| ()))
            .unwrap();
        let failed: Result<()> = db.transaction(|db| {
            db.execute("INSERT INTO t VALUES (2)")?;
            db.execute("INSERT INTO missing VALUES (3)")?;
            Ok(())
        });
        assert!(matches!(failed, Err(EmbedError::Query(_))));
        assert!(!db.in_transaction());

        let rows = db.execute("SELECT id FROM t").unwrap();
        assert_eq!(rows.row_count, 1);
        assert_eq!(rows.get(0, 0), Some("1"));
    }

    #[test]
    fn test_notifications_round_trip() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        let db = open(&cluster);
        db.listen("jobs").unwrap();
        db.notify("jobs", Some("first")).unwrap();
        db.notify("jobs", None).unwrap();
        db.notify("other", Some("ignored")).unwrap();

        let got = db.drain_notifications();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].payload, "first");
        assert_eq!(got[1].payload, "");
        assert!(got.iter().all(|n| n.channel == "jobs"));

        // Aborted notifications are never delivered
        db.begin().unwrap();
        db.notify("jobs", Some("lost")).unwrap();
        db.rollback().unwrap();
        assert!(db.poll().is_none());

        db.unlisten_all().unwrap();
        db.notify("jobs", Some("after")).unwrap();
        assert!(db.poll().is_none());
    }
}
