//! Cluster control file (`global/pg_control`)
//!
//! JSON body plus a CRC32 of that body. Written at bootstrap, at startup
//! (state "in production") and by the shutdown checkpoint.

use super::error::{ereport, sqlstate, Result};
use super::storage;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

pub const CONTROL_FILE: &str = "global/pg_control";
pub const CONTROL_VERSION: u32 = 1300;
pub const CATALOG_VERSION: u32 = 202_307_071;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterState {
    ShutDown,
    InProduction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlFile {
    pub system_identifier: u64,
    pub control_version: u32,
    pub catalog_version: u32,
    pub state: ClusterState,
    /// Unix seconds of the last checkpoint
    pub checkpoint_time: u64,
    pub next_xid: u64,
    pub encoding: i32,
    pub locale: String,
    pub full_page_writes: bool,
}

#[derive(Serialize, Deserialize)]
struct OnDisk {
    crc: u32,
    body: ControlFile,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl ControlFile {
    pub fn new(system_identifier: u64, encoding: i32, locale: &str) -> Self {
        Self {
            system_identifier,
            control_version: CONTROL_VERSION,
            catalog_version: CATALOG_VERSION,
            state: ClusterState::ShutDown,
            checkpoint_time: now_secs(),
            next_xid: 3,
            encoding,
            locale: locale.to_string(),
            full_page_writes: true,
        }
    }

    /// Identifier derived from the creation time and process id.
    pub fn generate_system_identifier() -> u64 {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        (now.as_secs() << 32) | ((now.subsec_micros() as u64) << 12) | (std::process::id() as u64 & 0xFFF)
    }

    pub fn checksum(&self) -> Result<u32> {
        let body = serde_json::to_vec(self)?;
        Ok(crc32fast::hash(&body))
    }

    pub fn read(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONTROL_FILE);
        let bytes = std::fs::read(&path).map_err(|e| {
            ereport!(sqlstate::UNDEFINED_FILE, "could not open file \"{}\": {}", path.display(), e)
        })?;
        let on_disk: OnDisk = serde_json::from_slice(&bytes)?;
        if on_disk.body.checksum()? != on_disk.crc {
            return Err(ereport!(sqlstate::DATA_CORRUPTED, "incorrect checksum in control file"));
        }
        if on_disk.body.control_version != CONTROL_VERSION || on_disk.body.catalog_version != CATALOG_VERSION {
            return Err(ereport!(
                sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
                "database files are incompatible with server"
            )
            .with_detail(format!(
                "The database cluster was initialized with catalog version {}, but the server was compiled with catalog version {}.",
                on_disk.body.catalog_version, CATALOG_VERSION
            )));
        }
        Ok(on_disk.body)
    }

    pub fn write(&self, data_dir: &Path, fsync: bool) -> Result<()> {
        let on_disk = OnDisk {
            crc: self.checksum()?,
            body: self.clone(),
        };
        let bytes = serde_json::to_vec_pretty(&on_disk)?;
        storage::write_atomic(&data_dir.join(CONTROL_FILE), &bytes, fsync)
    }

    /// Shutdown checkpoint: mark clean and stamp the time.
    pub fn mark_shut_down(&mut self) {
        self.state = ClusterState::ShutDown;
        self.checkpoint_time = now_secs();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_file_write_read() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("global")).unwrap();
        let control = ControlFile::new(ControlFile::generate_system_identifier(), 6, "C");
        control.write(dir.path(), false).unwrap();
        let loaded = ControlFile::read(dir.path()).unwrap();
        assert_eq!(loaded, control);
    }

    #[test]
    fn test_corrupt_control_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("global")).unwrap();
        let control = ControlFile::new(42, 6, "C");
        control.write(dir.path(), false).unwrap();

        let path = dir.path().join(CONTROL_FILE);
        let text = std::fs::read_to_string(&path).unwrap().replace("\"next_xid\": 3", "\"next_xid\": 4");
        std::fs::write(&path, text).unwrap();
        let err = ControlFile::read(dir.path()).unwrap_err();
        assert_eq!(err.message, "incorrect checksum in control file");
    }
}
