//! Standalone backend process state
//!
//! The engine's process-wide state lives in one `Backend` behind a mutex.
//! Boot steps fill it in order; `shmem_exit` shuts the engine down but leaves
//! the globals, the settings table and the connected database in place, the
//! way a process that is about to exit would. Every boot step refuses to run
//! over such leftovers, so a missing reset fails loudly on the next start.

use super::async_notify::{ListenState, NotifyQueue, DEFAULT_QUEUE_CAPACITY};
use super::catalog::{DatabaseImage, GlobalCatalog};
use super::control::{ClusterState, ControlFile};
use super::error::{ereport, sqlstate, BackendError, Result};
use super::funcs::FmgrCache;
use super::globals::{BackendType, NotifyHook, OutputDest, ProcSlotId, ProcessGlobals, ProcessingMode};
use super::memory::MemoryArenas;
use super::settings::{SettingSource, Settings};
use super::spi::SpiState;
use super::storage::{self, DataDirLock};
use super::timezone::TimezoneAbbrevs;
use super::xact::XactState;
use crate::fmgr::Oid;
use once_cell::sync::Lazy;
use parking_lot::{Mutex, MutexGuard};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;
use tracing::{debug, info, warn};

const DEFAULT_TABLESPACE_OID: Oid = 1663;

static NEXT_SEGMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Entry of the shared process array.
#[derive(Debug, Clone)]
pub struct ProcSlot {
    pub pid: u32,
    pub backend_type: BackendType,
    pub database_id: Option<Oid>,
}

/// Structures a multi-process server would keep in shared memory.
#[derive(Debug)]
pub struct SharedState {
    pub segment_id: u64,
    pub control: ControlFile,
    pub procs: Vec<Option<ProcSlot>>,
    pub notify_queue: NotifyQueue,
    pub catalog: GlobalCatalog,
}

#[derive(Debug)]
pub struct ConnectedDatabase {
    pub oid: Oid,
    pub name: String,
    pub image: DatabaseImage,
}

#[derive(Debug)]
pub struct Backend {
    pub globals: ProcessGlobals,
    pub(crate) memory: MemoryArenas,
    pub(crate) settings: Option<Settings>,
    pub(crate) lock_file: Option<DataDirLock>,
    pub(crate) local_control: Option<ControlFile>,
    pub(crate) shared: Option<SharedState>,
    pub(crate) database: Option<ConnectedDatabase>,
    pub(crate) session_user: Option<String>,
    pub(crate) session_superuser: bool,
    pub(crate) xact: XactState,
    pub(crate) spi: SpiState,
    pub(crate) listen: ListenState,
    pub(crate) fmgr: FmgrCache,
    pub(crate) timezone: Option<TimezoneAbbrevs>,
    /// Extension whose install script is running
    pub(crate) creating_extension: Option<String>,
}

static BACKEND: Lazy<Mutex<Backend>> = Lazy::new(|| Mutex::new(Backend::new()));

/// The process's backend. Held for the duration of each harness call.
pub fn lock() -> MutexGuard<'static, Backend> {
    BACKEND.lock()
}

fn stale(what: &str) -> BackendError {
    ereport!(
        sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
        "{} is left over from a previous start",
        what
    )
    .with_hint("The process state must be reset after shutdown before starting again.")
}

impl Default for Backend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend {
    pub fn new() -> Self {
        Self {
            globals: ProcessGlobals::pristine(),
            memory: MemoryArenas::new(),
            settings: None,
            lock_file: None,
            local_control: None,
            shared: None,
            database: None,
            session_user: None,
            session_superuser: false,
            xact: XactState::default(),
            spi: SpiState::default(),
            listen: ListenState::default(),
            fmgr: FmgrCache::default(),
            timezone: None,
            creating_extension: None,
        }
    }

    pub fn settings(&self) -> Result<&Settings> {
        self.settings
            .as_ref()
            .ok_or_else(|| BackendError::internal("configuration parameters are not initialized"))
    }

    pub fn settings_mut(&mut self) -> Result<&mut Settings> {
        self.settings
            .as_mut()
            .ok_or_else(|| BackendError::internal("configuration parameters are not initialized"))
    }

    pub fn shared(&self) -> Result<&SharedState> {
        self.shared
            .as_ref()
            .ok_or_else(|| BackendError::internal("shared memory is not initialized"))
    }

    pub fn shared_mut(&mut self) -> Result<&mut SharedState> {
        self.shared
            .as_mut()
            .ok_or_else(|| BackendError::internal("shared memory is not initialized"))
    }

    pub fn database(&self) -> Result<&ConnectedDatabase> {
        self.database
            .as_ref()
            .ok_or_else(|| ereport!(sqlstate::CONNECTION_EXCEPTION, "not connected to a database"))
    }

    pub fn database_mut(&mut self) -> Result<&mut ConnectedDatabase> {
        self.database
            .as_mut()
            .ok_or_else(|| ereport!(sqlstate::CONNECTION_EXCEPTION, "not connected to a database"))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        self.globals
            .data_dir
            .clone()
            .ok_or_else(|| BackendError::internal("data directory is not set"))
    }

    pub fn is_superuser(&self) -> bool {
        self.session_superuser
    }

    fn fsync_enabled(&self) -> bool {
        self.settings().map(|s| s.get_bool("fsync")).unwrap_or(true)
    }

    // ---- boot steps, in startup order ----

    pub fn memory_context_init(&mut self) -> Result<()> {
        if self.globals.top_memory_context.is_some() || self.globals.error_context.is_some() {
            return Err(stale("TopMemoryContext"));
        }
        let top = self.memory.create("TopMemoryContext", None)?;
        let error = self.memory.create("ErrorContext", Some(top))?;
        self.globals.top_memory_context = Some(top);
        self.globals.error_context = Some(error);
        Ok(())
    }

    pub fn initialize_settings(&mut self) -> Result<()> {
        if self.settings.is_some() {
            return Err(stale("the configuration parameter table"));
        }
        self.settings = Some(Settings::with_defaults());
        Ok(())
    }

    pub fn set_config_option(&mut self, name: &str, value: &str, source: SettingSource) -> Result<()> {
        debug!(parameter = name, value, source = source.name(), "set config option");
        self.settings_mut()?.set_from(name, value, source).map(|_| ())
    }

    /// Record the data directory, made absolute against the current directory.
    pub fn set_data_dir(&mut self, dir: &Path) -> Result<()> {
        if self.globals.data_dir.is_some() {
            return Err(stale("DataDir"));
        }
        let absolute = if dir.is_absolute() {
            dir.to_path_buf()
        } else {
            std::env::current_dir()?.join(dir)
        };
        let text = absolute.to_string_lossy().into_owned();
        self.set_config_option("data_directory", &text, SettingSource::Argv)?;
        self.globals.data_dir = Some(absolute);
        Ok(())
    }

    pub fn select_config_files(&mut self) -> Result<()> {
        if self.globals.config_file_name.is_some() {
            return Err(stale("ConfigFileName"));
        }
        let path = self.data_dir()?.join(storage::CONFIG_FILE);
        let contents = std::fs::read_to_string(&path).map_err(|e| {
            ereport!(
                sqlstate::CONFIG_FILE_ERROR,
                "could not access the server configuration file \"{}\": {}",
                path.display(),
                e
            )
        })?;
        self.settings_mut()?.apply_config_file(&path, &contents)?;
        self.globals.config_file_name = Some(path);
        self.globals.pg_reload_time = Some(SystemTime::now());
        Ok(())
    }

    pub fn check_data_dir(&self) -> Result<()> {
        storage::check_data_dir(&self.data_dir()?)
    }

    pub fn change_to_data_dir(&self) -> Result<()> {
        let dir = self.data_dir()?;
        std::env::set_current_dir(&dir).map_err(|e| {
            ereport!(
                sqlstate::IO_ERROR,
                "could not change directory to \"{}\": {}",
                dir.display(),
                e
            )
        })
    }

    pub fn create_data_dir_lock_file(&mut self) -> Result<()> {
        if self.lock_file.is_some() {
            return Err(stale("the data directory lock"));
        }
        self.lock_file = Some(DataDirLock::acquire(&self.data_dir()?)?);
        Ok(())
    }

    pub fn load_control_file(&mut self) -> Result<()> {
        self.local_control = Some(ControlFile::read(&self.data_dir()?)?);
        Ok(())
    }

    pub fn create_shared_memory(&mut self) -> Result<()> {
        if self.shared.is_some() || self.globals.used_shmem_seg_id != 0 {
            return Err(stale("the shared memory segment"));
        }
        let control = self
            .local_control
            .take()
            .ok_or_else(|| BackendError::internal("control file has not been loaded"))?;
        let catalog = storage::read_global_catalog(&self.data_dir()?)?;
        let max_connections = self.settings()?.get_int("max_connections").unwrap_or(100) as usize;
        let segment_id = NEXT_SEGMENT_ID.fetch_add(1, Ordering::AcqRel);

        self.shared = Some(SharedState {
            segment_id,
            control,
            procs: vec![None; max_connections],
            notify_queue: NotifyQueue::new(DEFAULT_QUEUE_CAPACITY),
            catalog,
        });
        self.globals.used_shmem_seg_id = segment_id;
        debug!(segment_id, max_connections, "created shared memory");
        Ok(())
    }

    pub fn init_standalone_process(&mut self) -> Result<()> {
        if self.globals.my_proc_pid != 0 || self.globals.backend_type != BackendType::Invalid {
            return Err(stale("MyProcPid"));
        }
        let now = SystemTime::now();
        self.globals.backend_type = BackendType::Standalone;
        self.globals.my_proc_pid = std::process::id();
        self.globals.my_start_time = Some(now);
        self.globals.pg_start_time = Some(now);
        Ok(())
    }

    pub fn init_process(&mut self) -> Result<()> {
        if self.globals.my_proc.is_some() {
            return Err(stale("MyProc"));
        }
        let pid = self.globals.my_proc_pid;
        let backend_type = self.globals.backend_type;
        let shared = self.shared_mut()?;
        let index = shared.procs.iter().position(Option::is_none).ok_or_else(|| {
            ereport!(sqlstate::TOO_MANY_CONNECTIONS, "sorry, too many clients already")
        })?;
        shared.procs[index] = Some(ProcSlot {
            pid,
            backend_type,
            database_id: None,
        });
        self.globals.my_proc = Some(ProcSlotId(index));
        Ok(())
    }

    /// Connect the process to `db_name` as `user`.
    pub fn connect_database(&mut self, db_name: &str, user: &str) -> Result<()> {
        if self.database.is_some() || self.globals.my_database_id.is_some() {
            return Err(stale("the database connection"));
        }
        let slot = self
            .globals
            .my_proc
            .ok_or_else(|| BackendError::internal("process slot is not initialized"))?;
        let data_dir = self.data_dir()?;
        let fsync = self.fsync_enabled();

        let shared = self.shared()?;
        let role = shared.catalog.role(user).cloned().ok_or_else(|| {
            ereport!(sqlstate::INVALID_AUTHORIZATION_SPECIFICATION, "role \"{}\" does not exist", user)
        })?;
        let entry = shared.catalog.database(db_name).cloned().ok_or_else(|| {
            ereport!(sqlstate::INVALID_CATALOG_NAME, "database \"{}\" does not exist", db_name)
        })?;
        if !entry.allow_connections {
            return Err(ereport!(
                sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
                "database \"{}\" is not currently accepting connections",
                db_name
            ));
        }

        if shared.control.state != ClusterState::ShutDown {
            info!("database system was not properly shut down; automatic recovery in progress");
            for db in &shared.catalog.databases {
                storage::read_database_image(&data_dir, db.oid)?;
            }
            info!(databases = shared.catalog.databases.len(), "recovery validation complete");
        }
        let image = storage::read_database_image(&data_dir, entry.oid)?;

        let shared = self.shared_mut()?;
        shared.control.state = ClusterState::InProduction;
        shared.control.write(&data_dir, fsync)?;
        if let Some(Some(proc_slot)) = shared.procs.get_mut(slot.0) {
            proc_slot.database_id = Some(entry.oid);
        }

        let set_name = self.settings()?.get("timezone_abbreviations")?.to_string();
        self.timezone = Some(TimezoneAbbrevs::load(Path::new(super::SHARE_DIR), &set_name)?);

        let top = self
            .globals
            .top_memory_context
            .ok_or_else(|| BackendError::internal("TopMemoryContext is not initialized"))?;
        self.globals.cache_memory_context = Some(self.memory.create("CacheMemoryContext", Some(top))?);
        self.globals.critical_shared_relcaches_built = true;
        self.globals.critical_relcaches_built = true;
        self.globals.my_database_id = Some(entry.oid);
        self.globals.my_database_tablespace = Some(DEFAULT_TABLESPACE_OID);

        self.session_user = Some(role.name.clone());
        self.session_superuser = role.superuser;
        self.database = Some(ConnectedDatabase {
            oid: entry.oid,
            name: entry.name.clone(),
            image,
        });
        info!(database = %entry.name, user = %role.name, "connected");
        Ok(())
    }

    pub fn set_processing_mode(&mut self, mode: ProcessingMode) {
        self.globals.processing_mode = mode;
    }

    pub fn set_output_dest(&mut self, dest: OutputDest) {
        self.globals.where_to_send_output = dest;
    }

    pub fn install_notify_hook(&mut self, hook: Option<NotifyHook>) {
        self.globals.notify_hook = hook;
    }

    pub fn create_message_context(&mut self) -> Result<()> {
        if self.globals.message_context.is_some() {
            return Err(stale("MessageContext"));
        }
        let top = self
            .globals
            .top_memory_context
            .ok_or_else(|| BackendError::internal("TopMemoryContext is not initialized"))?;
        self.globals.message_context = Some(self.memory.create("MessageContext", Some(top))?);
        Ok(())
    }

    /// Graceful shutdown without process exit: abort, checkpoint, release
    /// shared structures and the directory lock, free all arenas. Returns
    /// the first error; later steps still run.
    pub fn shmem_exit(&mut self) -> Result<()> {
        let mut first_error = None;
        let mut note = |err: BackendError| {
            warn!(error = %err, "error during shutdown");
            first_error.get_or_insert(err);
        };

        if let Err(err) = self.abort_current_transaction() {
            note(err);
        }

        let fsync = self.fsync_enabled();
        let data_dir = self.globals.data_dir.clone();
        if let (Some(shared), Some(dir)) = (self.shared.as_mut(), data_dir) {
            shared.control.mark_shut_down();
            if let Err(err) = shared.control.write(&dir, fsync) {
                note(err);
            } else {
                debug!("shutdown checkpoint written");
            }
            if let Some(slot) = self.globals.my_proc {
                if let Some(entry) = shared.procs.get_mut(slot.0) {
                    *entry = None;
                }
            }
        }
        self.shared = None;

        if let Some(lock) = self.lock_file.take() {
            lock.release();
        }
        self.memory.delete_all();
        info!("engine shut down");

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ---- per-subsystem resets ----

    /// Drop shared structures and the directory lock of an interrupted start.
    pub fn reset_ipc_state(&mut self) {
        self.shared = None;
        if let Some(lock) = self.lock_file.take() {
            lock.release();
        }
    }

    pub fn reset_guc_state(&mut self) {
        self.settings = None;
    }

    pub fn reset_catalog_caches(&mut self) {
        self.database = None;
        self.creating_extension = None;
        self.local_control = None;
    }

    pub fn reset_userid_state(&mut self) {
        self.session_user = None;
        self.session_superuser = false;
    }

    pub fn reset_timezone_state(&mut self) {
        self.timezone = None;
    }

    pub fn reset_memory_state(&mut self) {
        self.memory = MemoryArenas::new();
    }

    /// True when no state from a previous start remains.
    pub fn is_pristine(&self) -> bool {
        self.globals.is_pristine()
            && self.settings.is_none()
            && self.lock_file.is_none()
            && self.shared.is_none()
            && self.database.is_none()
            && self.session_user.is_none()
            && self.timezone.is_none()
            && !self.is_transaction_state()
            && self.listen.channels.is_empty()
            && self.fmgr.is_empty()
            && self.memory.live_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_steps_refuse_leftovers() {
        let mut backend = Backend::new();
        backend.memory_context_init().unwrap();
        assert!(backend.memory_context_init().is_err());

        backend.initialize_settings().unwrap();
        let err = backend.initialize_settings().unwrap_err();
        assert_eq!(err.code, sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE);

        backend.init_standalone_process().unwrap();
        assert!(backend.init_standalone_process().is_err());
    }

    #[test]
    fn test_accessors_before_start() {
        let backend = Backend::new();
        assert!(backend.is_pristine());
        assert!(backend.settings().is_err());
        assert!(backend.shared().is_err());
        assert_eq!(backend.database().unwrap_err().code, sqlstate::CONNECTION_EXCEPTION);
    }

    #[test]
    fn test_relative_data_dir_is_made_absolute() {
        let mut backend = Backend::new();
        backend.initialize_settings().unwrap();
        backend.set_data_dir(Path::new("some/dir")).unwrap();
        let dir = backend.data_dir().unwrap();
        assert!(dir.is_absolute());
        assert!(dir.ends_with("some/dir"));
    }
}
