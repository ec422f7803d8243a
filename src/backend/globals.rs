//! Process-wide engine globals
//!
//! These are the handles the engine sets during startup and leaves dangling
//! after `shmem_exit`. Only the harness reset returns them to pristine values.

use super::memory::ContextId;
use crate::fmgr::Oid;
use std::path::PathBuf;
use std::time::SystemTime;

/// Delivery callback for notifications received on listened channels:
/// `(channel, payload, sender_pid)`.
pub type NotifyHook = fn(&str, &str, u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingMode {
    Bootstrap,
    Init,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Invalid,
    Standalone,
}

/// Where query output and notifications go when no hook is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDest {
    None,
    Debug,
    Remote,
}

/// Index into the shared process array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcSlotId(pub usize);

#[derive(Debug, Clone)]
pub struct ProcessGlobals {
    pub top_memory_context: Option<ContextId>,
    pub error_context: Option<ContextId>,
    pub message_context: Option<ContextId>,
    pub cache_memory_context: Option<ContextId>,
    pub top_transaction_context: Option<ContextId>,
    pub current_resource_owner: Option<u64>,
    pub top_transaction_resource_owner: Option<u64>,
    pub processing_mode: ProcessingMode,
    pub backend_type: BackendType,
    pub my_database_id: Option<Oid>,
    pub my_database_tablespace: Option<Oid>,
    pub my_proc_pid: u32,
    pub my_proc: Option<ProcSlotId>,
    pub my_start_time: Option<SystemTime>,
    pub data_dir: Option<PathBuf>,
    pub config_file_name: Option<PathBuf>,
    pub where_to_send_output: OutputDest,
    pub pg_start_time: Option<SystemTime>,
    pub pg_reload_time: Option<SystemTime>,
    pub used_shmem_seg_id: u64,
    pub critical_relcaches_built: bool,
    pub critical_shared_relcaches_built: bool,
    pub notify_hook: Option<NotifyHook>,
}

impl Default for ProcessGlobals {
    fn default() -> Self {
        Self::pristine()
    }
}

impl ProcessGlobals {
    /// Values before the first startup in this process.
    pub fn pristine() -> Self {
        Self {
            top_memory_context: None,
            error_context: None,
            message_context: None,
            cache_memory_context: None,
            top_transaction_context: None,
            current_resource_owner: None,
            top_transaction_resource_owner: None,
            processing_mode: ProcessingMode::Init,
            backend_type: BackendType::Invalid,
            my_database_id: None,
            my_database_tablespace: None,
            my_proc_pid: 0,
            my_proc: None,
            my_start_time: None,
            data_dir: None,
            config_file_name: None,
            where_to_send_output: OutputDest::Debug,
            pg_start_time: None,
            pg_reload_time: None,
            used_shmem_seg_id: 0,
            critical_relcaches_built: false,
            critical_shared_relcaches_built: false,
            notify_hook: None,
        }
    }

    pub fn is_pristine(&self) -> bool {
        self.top_memory_context.is_none()
            && self.error_context.is_none()
            && self.message_context.is_none()
            && self.cache_memory_context.is_none()
            && self.top_transaction_context.is_none()
            && self.current_resource_owner.is_none()
            && self.processing_mode == ProcessingMode::Init
            && self.backend_type == BackendType::Invalid
            && self.my_database_id.is_none()
            && self.my_proc_pid == 0
            && self.my_proc.is_none()
            && self.data_dir.is_none()
            && self.config_file_name.is_none()
            && self.where_to_send_output == OutputDest::Debug
            && self.pg_start_time.is_none()
            && self.used_shmem_seg_id == 0
            && !self.critical_relcaches_built
            && self.notify_hook.is_none()
    }
}
