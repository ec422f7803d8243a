//! Embedded virtual filesystem
//!
//! The engine opens extension control/script files and the timezone
//! abbreviation set by path. Paths ending in a registered blob's file name are
//! served from memory; everything else falls through to the real filesystem.

use super::registry::{self, ExtensionRegistry};
use super::EmbeddedFile;
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::Path;

/// Timezone abbreviation set shipped with the binary.
pub const DEFAULT_TIMEZONE_SET: EmbeddedFile =
    EmbeddedFile::new("timezonesets/Default", include_bytes!("data/Default"));

fn suffix_matches(path: &str, filename: &str) -> bool {
    match path.strip_suffix(filename) {
        Some(prefix) => prefix.is_empty() || prefix.ends_with('/') || prefix.ends_with('\\'),
        None => false,
    }
}

fn lookup_in(registry: &ExtensionRegistry, path: &str) -> Option<&'static [u8]> {
    registry
        .embedded_files()
        .into_iter()
        .chain(std::iter::once(DEFAULT_TIMEZONE_SET))
        .find(|file| suffix_matches(path, file.filename))
        .map(|file| file.data)
}

/// Bytes of the embedded file answering to `path`, if any.
pub fn embedded_file_data(path: &str) -> Option<&'static [u8]> {
    lookup_in(registry::global(), path)
}

pub fn has_embedded_file(path: &str) -> bool {
    embedded_file_data(path).is_some()
}

fn read_via(registry: &ExtensionRegistry, path: &Path) -> io::Result<Cow<'static, [u8]>> {
    match lookup_in(registry, &path.to_string_lossy()) {
        Some(data) => Ok(Cow::Borrowed(data)),
        None => fs::read(path).map(Cow::Owned),
    }
}

/// Read `path`, preferring embedded blobs over the real filesystem.
pub fn read_file(path: &Path) -> io::Result<Cow<'static, [u8]>> {
    read_via(registry::global(), path)
}

/// Like [`read_file`], decoded as UTF-8.
pub fn read_to_string(path: &Path) -> io::Result<String> {
    let bytes = read_file(path)?;
    String::from_utf8(bytes.into_owned())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::ExtensionLibrary;

    static CONTROL: &[u8] = b"default_version = '1.0'\n";
    static SCRIPT: &[u8] = b"SELECT 1;\n";

    fn registry_with_files() -> ExtensionRegistry {
        let registry = ExtensionRegistry::new();
        registry
            .register(ExtensionLibrary::new("demo").with_files(
                EmbeddedFile::new("extension/demo.control", CONTROL),
                EmbeddedFile::new("extension/demo--1.0.sql", SCRIPT),
            ))
            .unwrap();
        registry
    }

    #[test]
    fn test_suffix_match_requires_component_boundary() {
        assert!(suffix_matches("/usr/share/extension/demo.control", "extension/demo.control"));
        assert!(suffix_matches("extension/demo.control", "extension/demo.control"));
        assert!(!suffix_matches("/usr/share/extension/xdemo.control", "demo.control"));
        assert!(!suffix_matches("/usr/share/extension/demo.control.bak", "demo.control"));
    }

    #[test]
    fn test_registered_blobs_are_served() {
        let registry = registry_with_files();
        assert_eq!(lookup_in(&registry, "/share/extension/demo.control"), Some(CONTROL));
        assert_eq!(lookup_in(&registry, "/share/extension/demo--1.0.sql"), Some(SCRIPT));
        assert_eq!(lookup_in(&registry, "/share/extension/other.control"), None);
    }

    #[test]
    fn test_timezone_set_is_always_present() {
        let registry = ExtensionRegistry::new();
        let data = lookup_in(&registry, "/share/timezonesets/Default").unwrap();
        assert!(std::str::from_utf8(data).unwrap().contains("UTC"));
    }

    #[test]
    fn test_unknown_paths_fall_through_to_disk() {
        let registry = registry_with_files();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.txt");
        fs::write(&path, b"on disk").unwrap();
        assert_eq!(read_via(&registry, &path).unwrap().as_ref(), b"on disk");
        assert!(read_via(&registry, &dir.path().join("missing.txt")).is_err());
        let embedded = read_via(&registry, &dir.path().join("extension/demo.control")).unwrap();
        assert_eq!(embedded.as_ref(), CONTROL);
    }
}
