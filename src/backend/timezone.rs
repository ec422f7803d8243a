//! Timezone abbreviation sets
//!
//! Loaded at connection time from `<share>/timezonesets/<name>`, which the
//! embedded filesystem normally serves from memory.

use super::error::{ereport, sqlstate, Result};
use crate::extension::vfs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TzAbbrev {
    pub abbrev: String,
    /// Seconds east of UTC
    pub utc_offset: i32,
    pub is_dst: bool,
}

#[derive(Debug, Clone, Default)]
pub struct TimezoneAbbrevs {
    pub set_name: String,
    pub entries: Vec<TzAbbrev>,
}

impl TimezoneAbbrevs {
    pub fn load(share_dir: &Path, set_name: &str) -> Result<Self> {
        let path = share_dir.join("timezonesets").join(set_name);
        let text = vfs::read_to_string(&path).map_err(|e| {
            ereport!(
                sqlstate::CONFIG_FILE_ERROR,
                "could not read time zone file \"{}\": {}",
                set_name,
                e
            )
        })?;
        Self::parse(set_name, &text)
    }

    pub fn parse(set_name: &str, text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split_whitespace();
            let (Some(abbrev), Some(offset)) = (fields.next(), fields.next()) else {
                return Err(missing_field(set_name, lineno));
            };
            let utc_offset: i32 = offset.parse().map_err(|_| {
                ereport!(
                    sqlstate::CONFIG_FILE_ERROR,
                    "invalid number for time zone offset in time zone file \"{}\", line {}",
                    set_name,
                    lineno + 1
                )
            })?;
            if utc_offset % 900 != 0 {
                return Err(ereport!(
                    sqlstate::CONFIG_FILE_ERROR,
                    "time zone offset {} is not a multiple of 900 sec (15 min) in time zone file \"{}\", line {}",
                    utc_offset,
                    set_name,
                    lineno + 1
                ));
            }
            let is_dst = matches!(fields.next(), Some(flag) if flag.eq_ignore_ascii_case("D"));
            entries.push(TzAbbrev {
                abbrev: abbrev.to_ascii_uppercase(),
                utc_offset,
                is_dst,
            });
        }
        entries.sort_by(|a, b| a.abbrev.cmp(&b.abbrev));
        Ok(Self {
            set_name: set_name.to_string(),
            entries,
        })
    }

    pub fn lookup(&self, abbrev: &str) -> Option<&TzAbbrev> {
        let key = abbrev.to_ascii_uppercase();
        self.entries
            .binary_search_by(|e| e.abbrev.as_str().cmp(key.as_str()))
            .ok()
            .map(|idx| &self.entries[idx])
    }
}

fn missing_field(set_name: &str, lineno: usize) -> super::error::BackendError {
    ereport!(
        sqlstate::CONFIG_FILE_ERROR,
        "missing time zone offset in time zone file \"{}\", line {}",
        set_name,
        lineno + 1
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_lookup() {
        let set = TimezoneAbbrevs::parse("t", "# comment\nEST -18000\nedt -14400 D\n\nUTC 0 # zulu\n").unwrap();
        assert_eq!(set.entries.len(), 3);
        assert_eq!(set.lookup("est").unwrap().utc_offset, -18000);
        assert!(set.lookup("EDT").unwrap().is_dst);
        assert!(set.lookup("XYZ").is_none());
    }

    #[test]
    fn test_parse_errors() {
        assert!(TimezoneAbbrevs::parse("t", "EST\n").is_err());
        assert!(TimezoneAbbrevs::parse("t", "EST abc\n").is_err());
        let err = TimezoneAbbrevs::parse("t", "ODD 100\n").unwrap_err();
        assert!(err.message.contains("not a multiple of 900"));
    }

    #[test]
    fn test_embedded_default_set_parses() {
        let text = std::str::from_utf8(vfs::DEFAULT_TIMEZONE_SET.data).unwrap();
        let set = TimezoneAbbrevs::parse("Default", text).unwrap();
        assert_eq!(set.lookup("UTC").unwrap().utc_offset, 0);
        assert_eq!(set.lookup("JST").unwrap().utc_offset, 32400);
    }
}
