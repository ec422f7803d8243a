//! On-disk layout of a data directory
//!
//! ```text
//! <data_dir>/
//!   PG_VERSION              major version marker
//!   postgresql.conf         configuration (TOML)
//!   postmaster.pid          exclusive directory lock while running
//!   global/pg_control       control file
//!   global/pg_database      database catalog (JSON)
//!   global/pg_authid        role catalog (JSON)
//!   base/<oid>/PG_VERSION
//!   base/<oid>/relations.bin  database image (bincode + CRC32 trailer)
//! ```
//!
//! Every rewrite goes through [`write_atomic`]: temp file, optional fsync,
//! rename, directory fsync.

use super::catalog::{DatabaseImage, GlobalCatalog};
use super::error::{ereport, sqlstate, Result};
use crate::fmgr::Oid;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub const VERSION_FILE: &str = "PG_VERSION";
pub const CONFIG_FILE: &str = "postgresql.conf";
pub const LOCK_FILE: &str = "postmaster.pid";
pub const DATABASE_CATALOG_FILE: &str = "global/pg_database";
pub const ROLE_CATALOG_FILE: &str = "global/pg_authid";
pub const RELATIONS_FILE: &str = "relations.bin";

/// Subdirectories created for a new cluster, parents before children.
pub const SUBDIRS: &[&str] = &[
    "global",
    "pg_wal",
    "pg_wal/archive_status",
    "pg_commit_ts",
    "pg_dynshmem",
    "pg_notify",
    "pg_serial",
    "pg_snapshots",
    "pg_subtrans",
    "pg_twophase",
    "pg_multixact",
    "pg_multixact/members",
    "pg_multixact/offsets",
    "base",
    "base/1",
    "pg_replslot",
    "pg_tblspc",
    "pg_stat",
    "pg_stat_tmp",
    "pg_xact",
    "pg_logical",
    "pg_logical/snapshots",
    "pg_logical/mappings",
];

/// Replace `path` with `bytes` so that readers see the old or the new
/// contents, never a mix.
pub fn write_atomic(path: &Path, bytes: &[u8], fsync: bool) -> Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        if fsync {
            file.sync_all()?;
        }
    }
    fs::rename(&tmp, path)?;
    if fsync {
        if let Some(parent) = path.parent() {
            fsync_dir(parent);
        }
    }
    Ok(())
}

#[cfg(unix)]
fn fsync_dir(dir: &Path) {
    use std::os::unix::io::AsRawFd;
    if let Ok(handle) = File::open(dir) {
        unsafe {
            libc::fsync(handle.as_raw_fd());
        }
    }
}

#[cfg(not(unix))]
fn fsync_dir(_dir: &Path) {}

pub fn version_string() -> String {
    format!("{}\n", super::MAJOR_VERSION)
}

pub fn database_path(data_dir: &Path, oid: Oid) -> PathBuf {
    data_dir.join("base").join(oid.to_string())
}

/// Validate an existing data directory before switching into it.
pub fn check_data_dir(data_dir: &Path) -> Result<()> {
    let meta = fs::metadata(data_dir).map_err(|_| {
        ereport!(
            sqlstate::UNDEFINED_FILE,
            "data directory \"{}\" does not exist",
            data_dir.display()
        )
    })?;
    if !meta.is_dir() {
        return Err(ereport!(
            sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
            "specified data directory \"{}\" is not a directory",
            data_dir.display()
        ));
    }
    let version_path = data_dir.join(VERSION_FILE);
    let version = fs::read_to_string(&version_path).map_err(|_| {
        ereport!(
            sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
            "\"{}\" is not a valid data directory",
            data_dir.display()
        )
        .with_detail(format!("File \"{}\" is missing.", version_path.display()))
    })?;
    if version.trim() != super::MAJOR_VERSION {
        return Err(ereport!(
            sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
            "database files are incompatible with server"
        )
        .with_detail(format!(
            "The data directory was initialized by version {}, which is not compatible with this version {}.",
            version.trim(),
            super::MAJOR_VERSION
        )));
    }
    Ok(())
}

const LOCK_ATTEMPTS: u32 = 100;

/// True when `path` still names the open `file`.
#[cfg(unix)]
fn still_linked(file: &File, path: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;
    match (file.metadata(), fs::metadata(path)) {
        (Ok(open), Ok(named)) => open.dev() == named.dev() && open.ino() == named.ino(),
        _ => false,
    }
}

#[cfg(not(unix))]
fn still_linked(_file: &File, path: &Path) -> bool {
    path.exists()
}

/// Exclusive lock on a data directory, held for the life of one engine start.
#[derive(Debug)]
pub struct DataDirLock {
    file: Option<File>,
    path: PathBuf,
}

impl DataDirLock {
    pub fn acquire(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(LOCK_FILE);
        let mut attempts = 0;
        let mut file = loop {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&path)?;
            lock_exclusive(&file).map_err(|_| {
                ereport!(sqlstate::LOCK_FILE_EXISTS, "lock file \"{}\" already exists", LOCK_FILE).with_hint(format!(
                    "Is another instance running in data directory \"{}\"?",
                    data_dir.display()
                ))
            })?;
            // The previous holder may have unlinked the file we opened
            if still_linked(&file, &path) {
                break file;
            }
            attempts += 1;
            if attempts == LOCK_ATTEMPTS {
                return Err(ereport!(
                    sqlstate::LOCK_FILE_EXISTS,
                    "could not lock file \"{}\": it keeps being replaced",
                    LOCK_FILE
                ));
            }
        };
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        writeln!(file, "{}", data_dir.display())?;
        file.sync_all()?;
        Ok(Self { file: Some(file), path })
    }

    /// Unlock and remove the lock file.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(file) = self.file.take() {
            unlock(&file);
            drop(file);
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(unix)]
fn lock_exclusive(file: &File) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File) -> std::io::Result<()> {
    Ok(())
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}

pub fn read_global_catalog(data_dir: &Path) -> Result<GlobalCatalog> {
    let databases = fs::read(data_dir.join(DATABASE_CATALOG_FILE))?;
    let roles = fs::read(data_dir.join(ROLE_CATALOG_FILE))?;
    Ok(GlobalCatalog {
        databases: serde_json::from_slice(&databases)?,
        roles: serde_json::from_slice(&roles)?,
    })
}

pub fn write_global_catalog(data_dir: &Path, catalog: &GlobalCatalog, fsync: bool) -> Result<()> {
    write_atomic(
        &data_dir.join(DATABASE_CATALOG_FILE),
        &serde_json::to_vec_pretty(&catalog.databases)?,
        fsync,
    )?;
    write_atomic(
        &data_dir.join(ROLE_CATALOG_FILE),
        &serde_json::to_vec_pretty(&catalog.roles)?,
        fsync,
    )
}

pub fn read_database_image(data_dir: &Path, oid: Oid) -> Result<DatabaseImage> {
    let path = database_path(data_dir, oid).join(RELATIONS_FILE);
    let bytes = fs::read(&path).map_err(|e| {
        ereport!(sqlstate::UNDEFINED_FILE, "could not open file \"{}\": {}", path.display(), e)
    })?;
    if bytes.len() < 4 {
        return Err(ereport!(sqlstate::DATA_CORRUPTED, "file \"{}\" is truncated", path.display()));
    }
    let (body, trailer) = bytes.split_at(bytes.len() - 4);
    let expected = u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    if crc32fast::hash(body) != expected {
        return Err(ereport!(
            sqlstate::DATA_CORRUPTED,
            "invalid checksum in relation file \"{}\"",
            path.display()
        ));
    }
    Ok(bincode::deserialize(body)?)
}

pub fn write_database_image(data_dir: &Path, oid: Oid, image: &DatabaseImage, fsync: bool) -> Result<()> {
    let mut bytes = bincode::serialize(image)?;
    let crc = crc32fast::hash(&bytes);
    bytes.extend_from_slice(&crc.to_le_bytes());
    write_atomic(&database_path(data_dir, oid).join(RELATIONS_FILE), &bytes, fsync)
}

/// Copy a database directory file by file (the template strategy of
/// `CREATE DATABASE`).
pub fn copy_database_dir(data_dir: &Path, from: Oid, to: Oid) -> Result<()> {
    let src = database_path(data_dir, from);
    let dst = database_path(data_dir, to);
    if dst.exists() {
        return Err(ereport!(
            sqlstate::DUPLICATE_OBJECT,
            "directory \"{}\" already exists",
            dst.display()
        ));
    }
    fs::create_dir_all(&dst)?;
    for entry in fs::read_dir(&src)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::copy(entry.path(), dst.join(entry.file_name()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_cluster_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(VERSION_FILE), version_string()).unwrap();
        for sub in SUBDIRS {
            fs::create_dir_all(dir.path().join(sub)).unwrap();
        }
        dir
    }

    #[test]
    fn test_check_data_dir() {
        let dir = make_cluster_dir();
        check_data_dir(dir.path()).unwrap();

        let missing = dir.path().join("nope");
        assert!(check_data_dir(&missing).unwrap_err().message.contains("does not exist"));

        fs::write(dir.path().join(VERSION_FILE), "9\n").unwrap();
        let err = check_data_dir(dir.path()).unwrap_err();
        assert_eq!(err.message, "database files are incompatible with server");
    }

    #[test]
    fn test_lock_is_exclusive() {
        let dir = make_cluster_dir();
        let lock = DataDirLock::acquire(dir.path()).unwrap();
        assert!(dir.path().join(LOCK_FILE).exists());
        if cfg!(unix) {
            let err = DataDirLock::acquire(dir.path()).unwrap_err();
            assert_eq!(err.code, sqlstate::LOCK_FILE_EXISTS);
        }
        lock.release();
        assert!(!dir.path().join(LOCK_FILE).exists());
        DataDirLock::acquire(dir.path()).unwrap();
    }

    #[test]
    fn test_release_unlocks_before_unlinking() {
        let dir = make_cluster_dir();
        let path = dir.path().join(LOCK_FILE);
        let lock = DataDirLock::acquire(dir.path()).unwrap();
        let stale = File::open(&path).unwrap();
        assert!(still_linked(&stale, &path));

        lock.release();
        assert!(!still_linked(&stale, &path));
        // A waiter on the old file must not count as holding the new one
        let fresh = DataDirLock::acquire(dir.path()).unwrap();
        assert!(path.exists());
        drop(stale);
        fresh.release();
    }

    #[test]
    fn test_database_image_checksum() {
        let dir = make_cluster_dir();
        let mut image = DatabaseImage::default();
        image.allocate_oid();
        write_database_image(dir.path(), 1, &image, false).unwrap();
        assert_eq!(read_database_image(dir.path(), 1).unwrap(), image);

        let path = database_path(dir.path(), 1).join(RELATIONS_FILE);
        let mut bytes = fs::read(&path).unwrap();
        bytes[0] ^= 0xFF;
        fs::write(&path, bytes).unwrap();
        assert_eq!(read_database_image(dir.path(), 1).unwrap_err().code, sqlstate::DATA_CORRUPTED);
    }

    #[test]
    fn test_copy_database_dir() {
        let dir = make_cluster_dir();
        write_database_image(dir.path(), 1, &DatabaseImage::default(), false).unwrap();
        fs::write(database_path(dir.path(), 1).join(VERSION_FILE), version_string()).unwrap();
        copy_database_dir(dir.path(), 1, 5).unwrap();
        assert!(database_path(dir.path(), 5).join(RELATIONS_FILE).exists());
        assert!(copy_database_dir(dir.path(), 1, 5).is_err());
    }
}
