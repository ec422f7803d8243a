//! Return every engine global to its pre-start value
//!
//! `shmem_exit` frees what the engine allocated but leaves the handles
//! pointing at it. This is the one place that clears them; a handle added to
//! the engine without a line here shows up as a failed boot step on the next
//! `initialize`.

use crate::backend::globals::{BackendType, OutputDest, ProcessingMode};
use crate::backend::{self, Backend};
use crate::notify;
use tracing::debug;

pub(crate) fn reset_state() {
    let mut backend = backend::lock();
    reset_backend(&mut backend);
    drop(backend);
    notify::drain_queue();
}

pub(crate) fn reset_backend(backend: &mut Backend) {
    let globals = &mut backend.globals;

    // Memory arena handles
    globals.top_memory_context = None;
    globals.error_context = None;
    globals.message_context = None;
    globals.cache_memory_context = None;
    globals.top_transaction_context = None;

    // Resource owners
    globals.current_resource_owner = None;
    globals.top_transaction_resource_owner = None;

    globals.processing_mode = ProcessingMode::Init;
    globals.backend_type = BackendType::Invalid;

    // Database and process identity
    globals.my_database_id = None;
    globals.my_database_tablespace = None;
    globals.my_proc_pid = 0;
    globals.my_proc = None;
    globals.data_dir = None;
    globals.config_file_name = None;

    globals.where_to_send_output = OutputDest::Debug;

    globals.my_start_time = None;
    globals.pg_start_time = None;
    globals.pg_reload_time = None;

    // Shared memory and relcache
    globals.used_shmem_seg_id = 0;
    globals.critical_relcaches_built = false;
    globals.critical_shared_relcaches_built = false;

    globals.notify_hook = None;

    // Subsystem-private state
    backend.reset_ipc_state();
    backend.reset_guc_state();
    backend.reset_xact_state();
    backend.reset_spi_state();
    backend.reset_async_state();
    backend.reset_userid_state();
    backend.reset_catalog_caches();
    backend.reset_fmgr_state();
    backend.reset_timezone_state();
    backend.reset_memory_state();

    debug!(pristine = backend.is_pristine(), "engine globals reset");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::settings::SettingSource;
    use std::path::Path;

    fn ignore(_: &str, _: &str, _: u32) {}

    #[test]
    fn test_reset_restores_pristine_backend() {
        let mut backend = Backend::new();
        backend.memory_context_init().unwrap();
        backend.initialize_settings().unwrap();
        backend
            .set_config_option("fsync", "off", SettingSource::Argv)
            .unwrap();
        backend.set_data_dir(Path::new("/tmp/not-started")).unwrap();
        backend.init_standalone_process().unwrap();
        backend.set_output_dest(OutputDest::None);
        backend.install_notify_hook(Some(ignore));
        assert!(!backend.is_pristine());

        reset_backend(&mut backend);
        assert!(backend.is_pristine());

        // Boot steps accept the reset state
        backend.memory_context_init().unwrap();
        backend.initialize_settings().unwrap();
    }
}
