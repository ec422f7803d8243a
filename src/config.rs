//! Harness configuration
//!
//! Performance settings applied before engine start, and bootstrap options
//! for fresh data directories.

use serde::{Deserialize, Serialize};

/// Durability knobs applied at command-line priority before the engine reads
/// its configuration file, so `postgresql.conf` cannot override them.
///
/// All three default to `true` (fully durable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Force relation and control file writes to stable storage
    pub fsync: bool,

    /// Wait for the commit record to reach disk before reporting success
    pub synchronous_commit: bool,

    /// Write full page images after each checkpoint
    pub full_page_writes: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self::durable()
    }
}

impl PerformanceConfig {
    /// Every durability guarantee on.
    pub fn durable() -> Self {
        Self {
            fsync: true,
            synchronous_commit: true,
            full_page_writes: true,
        }
    }

    /// Everything off. Crash safety is gone; use for tests and throwaway data.
    pub fn for_testing() -> Self {
        Self {
            fsync: false,
            synchronous_commit: false,
            full_page_writes: false,
        }
    }

    /// Settings as (parameter name, value) pairs in application order.
    pub fn as_settings(&self) -> [(&'static str, &'static str); 3] {
        let flag = |b: bool| if b { "on" } else { "off" };
        [
            ("fsync", flag(self.fsync)),
            ("synchronous_commit", flag(self.synchronous_commit)),
            ("full_page_writes", flag(self.full_page_writes)),
        ]
    }
}

/// Server encodings accepted by bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Encoding {
    SqlAscii,
    Utf8,
    Latin1,
}

impl Encoding {
    /// Parse an encoding name, case-insensitively, ignoring `-` and `_`.
    pub fn from_name(name: &str) -> Option<Self> {
        let norm: String = name
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match norm.as_str() {
            "sqlascii" => Some(Encoding::SqlAscii),
            "utf8" | "unicode" => Some(Encoding::Utf8),
            "latin1" | "iso88591" => Some(Encoding::Latin1),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::SqlAscii => "SQL_ASCII",
            Encoding::Utf8 => "UTF8",
            Encoding::Latin1 => "LATIN1",
        }
    }

    /// Numeric id recorded in the database catalog.
    pub fn id(&self) -> i32 {
        match self {
            Encoding::SqlAscii => 0,
            Encoding::Utf8 => 6,
            Encoding::Latin1 => 8,
        }
    }
}

/// Options for creating a new data directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapOptions {
    /// Name of the bootstrap superuser
    pub user: String,

    /// Server encoding, `UTF8` when unset
    pub encoding: Option<String>,

    /// Collation/ctype locale, `C` when unset
    pub locale: Option<String>,
}

impl BootstrapOptions {
    pub const DEFAULT_ENCODING: &'static str = "UTF8";
    pub const DEFAULT_LOCALE: &'static str = "C";

    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            encoding: None,
            locale: None,
        }
    }

    pub fn with_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.encoding = Some(encoding.into());
        self
    }

    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    pub fn encoding_name(&self) -> &str {
        self.encoding.as_deref().unwrap_or(Self::DEFAULT_ENCODING)
    }

    pub fn locale_name(&self) -> &str {
        self.locale.as_deref().unwrap_or(Self::DEFAULT_LOCALE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_durable() {
        let cfg = PerformanceConfig::default();
        assert!(cfg.fsync && cfg.synchronous_commit && cfg.full_page_writes);
        assert_eq!(cfg.as_settings()[0], ("fsync", "on"));
    }

    #[test]
    fn test_testing_preset_settings() {
        let settings = PerformanceConfig::for_testing().as_settings();
        assert!(settings.iter().all(|(_, v)| *v == "off"));
    }

    #[test]
    fn test_encoding_names() {
        assert_eq!(Encoding::from_name("utf-8"), Some(Encoding::Utf8));
        assert_eq!(Encoding::from_name("UTF8"), Some(Encoding::Utf8));
        assert_eq!(Encoding::from_name("sql_ascii"), Some(Encoding::SqlAscii));
        assert_eq!(Encoding::from_name("klingon"), None);
    }

    #[test]
    fn test_bootstrap_defaults() {
        let opts = BootstrapOptions::new("postgres");
        assert_eq!(opts.encoding_name(), "UTF8");
        assert_eq!(opts.locale_name(), "C");
        let opts = opts.with_locale("en_US.UTF-8");
        assert_eq!(opts.locale_name(), "en_US.UTF-8");
    }
}
