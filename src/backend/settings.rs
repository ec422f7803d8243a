//! Run-time configuration parameters
//!
//! Each parameter has a context that limits when it may change and a source
//! recording who set it. A value set from a higher-priority source is never
//! overridden by a lower one, which is how pre-init options beat the
//! configuration file.

use super::error::{ereport, sqlstate, Result};
use ahash::AHashMap;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SettingSource {
    Default,
    File,
    Argv,
    Session,
}

impl SettingSource {
    pub fn name(&self) -> &'static str {
        match self {
            SettingSource::Default => "default",
            SettingSource::File => "configuration file",
            SettingSource::Argv => "command line",
            SettingSource::Session => "session",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingContext {
    /// Fixed at compile/bootstrap time
    Internal,
    /// Only at server start
    Postmaster,
    /// At start or from the configuration file
    Sighup,
    /// By superusers at run time
    Superuser,
    /// By anyone at run time
    User,
}

impl SettingContext {
    pub fn name(&self) -> &'static str {
        match self {
            SettingContext::Internal => "internal",
            SettingContext::Postmaster => "postmaster",
            SettingContext::Sighup => "sighup",
            SettingContext::Superuser => "superuser",
            SettingContext::User => "user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SettingKind {
    Bool,
    Int { min: i64, max: i64 },
    Str,
}

struct ParamDef {
    name: &'static str,
    context: SettingContext,
    kind: SettingKind,
    default: &'static str,
}

const PARAMS: &[ParamDef] = &[
    ParamDef { name: "allow_system_table_mods", context: SettingContext::Superuser, kind: SettingKind::Bool, default: "off" },
    ParamDef { name: "application_name", context: SettingContext::User, kind: SettingKind::Str, default: "" },
    ParamDef { name: "client_encoding", context: SettingContext::User, kind: SettingKind::Str, default: "UTF8" },
    ParamDef { name: "data_directory", context: SettingContext::Postmaster, kind: SettingKind::Str, default: "" },
    ParamDef { name: "fsync", context: SettingContext::Sighup, kind: SettingKind::Bool, default: "on" },
    ParamDef { name: "full_page_writes", context: SettingContext::Sighup, kind: SettingKind::Bool, default: "on" },
    ParamDef { name: "lc_collate", context: SettingContext::Internal, kind: SettingKind::Str, default: "C" },
    ParamDef { name: "max_connections", context: SettingContext::Postmaster, kind: SettingKind::Int { min: 1, max: 262_143 }, default: "100" },
    ParamDef { name: "search_path", context: SettingContext::User, kind: SettingKind::Str, default: "\"$user\", public" },
    ParamDef { name: "server_encoding", context: SettingContext::Internal, kind: SettingKind::Str, default: "UTF8" },
    ParamDef { name: "server_version", context: SettingContext::Internal, kind: SettingKind::Str, default: super::ENGINE_VERSION },
    ParamDef { name: "synchronous_commit", context: SettingContext::User, kind: SettingKind::Bool, default: "on" },
    ParamDef { name: "timezone", context: SettingContext::User, kind: SettingKind::Str, default: "UTC" },
    ParamDef { name: "timezone_abbreviations", context: SettingContext::User, kind: SettingKind::Str, default: "Default" },
    ParamDef { name: "work_mem", context: SettingContext::User, kind: SettingKind::Int { min: 64, max: 2_147_483_647 }, default: "4096" },
];

fn param_def(name: &str) -> Option<&'static ParamDef> {
    PARAMS.iter().find(|p| p.name == name)
}

fn unrecognized(name: &str) -> super::error::BackendError {
    ereport!(sqlstate::UNDEFINED_OBJECT, "unrecognized configuration parameter \"{}\"", name)
}

/// Normalize a boolean spelling to `on`/`off`.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" | "t" | "y" => Some(true),
        "off" | "false" | "no" | "0" | "f" | "n" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct Setting {
    pub name: &'static str,
    pub value: String,
    pub source: SettingSource,
    pub context: SettingContext,
}

/// The parameter table of one engine start.
#[derive(Debug, Clone)]
pub struct Settings {
    values: AHashMap<&'static str, Setting>,
}

impl Settings {
    /// Every parameter at its built-in default.
    pub fn with_defaults() -> Self {
        let values = PARAMS
            .iter()
            .map(|p| {
                (
                    p.name,
                    Setting {
                        name: p.name,
                        value: p.default.to_string(),
                        source: SettingSource::Default,
                        context: p.context,
                    },
                )
            })
            .collect();
        Self { values }
    }

    fn canonical(def: &ParamDef, value: &str) -> Result<String> {
        match def.kind {
            SettingKind::Bool => parse_bool(value)
                .map(|b| if b { "on" } else { "off" }.to_string())
                .ok_or_else(|| {
                    ereport!(
                        sqlstate::INVALID_PARAMETER_VALUE,
                        "parameter \"{}\" requires a Boolean value",
                        def.name
                    )
                }),
            SettingKind::Int { min, max } => {
                let parsed: i64 = value.trim().parse().map_err(|_| {
                    ereport!(
                        sqlstate::INVALID_PARAMETER_VALUE,
                        "invalid value for parameter \"{}\": \"{}\"",
                        def.name,
                        value
                    )
                })?;
                if parsed < min || parsed > max {
                    return Err(ereport!(
                        sqlstate::INVALID_PARAMETER_VALUE,
                        "{} is outside the valid range for parameter \"{}\" ({} .. {})",
                        parsed,
                        def.name,
                        min,
                        max
                    ));
                }
                Ok(parsed.to_string())
            }
            SettingKind::Str => Ok(value.to_string()),
        }
    }

    /// Set a parameter from a startup source (defaults, file, command line).
    ///
    /// Returns `false` when a higher-priority source already set the value.
    pub fn set_from(&mut self, name: &str, value: &str, source: SettingSource) -> Result<bool> {
        let key = name.to_ascii_lowercase();
        let def = param_def(&key).ok_or_else(|| unrecognized(name))?;
        let canonical = Self::canonical(def, value)?;
        let slot = self.values.get_mut(def.name).ok_or_else(|| unrecognized(name))?;
        if slot.source > source {
            debug!(parameter = def.name, "keeping value from {}", slot.source.name());
            return Ok(false);
        }
        slot.value = canonical;
        slot.source = source;
        Ok(true)
    }

    /// `SET name = value` at run time. Returns the previous setting.
    pub fn set_session(&mut self, name: &str, value: &str, is_superuser: bool) -> Result<Setting> {
        let key = name.to_ascii_lowercase();
        let def = param_def(&key).ok_or_else(|| unrecognized(name))?;
        match def.context {
            SettingContext::Internal => {
                return Err(ereport!(
                    sqlstate::CANT_CHANGE_RUNTIME_PARAM,
                    "parameter \"{}\" cannot be changed",
                    def.name
                ))
            }
            SettingContext::Postmaster => {
                return Err(ereport!(
                    sqlstate::CANT_CHANGE_RUNTIME_PARAM,
                    "parameter \"{}\" cannot be changed without restarting the server",
                    def.name
                ))
            }
            SettingContext::Sighup => {
                return Err(ereport!(
                    sqlstate::CANT_CHANGE_RUNTIME_PARAM,
                    "parameter \"{}\" cannot be changed now",
                    def.name
                ))
            }
            SettingContext::Superuser if !is_superuser => {
                return Err(ereport!(
                    sqlstate::INSUFFICIENT_PRIVILEGE,
                    "permission denied to set parameter \"{}\"",
                    def.name
                ))
            }
            _ => {}
        }
        let canonical = Self::canonical(def, value)?;
        let slot = self.values.get_mut(def.name).ok_or_else(|| unrecognized(name))?;
        let previous = slot.clone();
        slot.value = canonical;
        slot.source = SettingSource::Session;
        Ok(previous)
    }

    /// Put back a setting captured by [`Settings::set_session`].
    pub fn restore(&mut self, previous: Setting) {
        self.values.insert(previous.name, previous);
    }

    pub fn get(&self, name: &str) -> Result<&str> {
        let key = name.to_ascii_lowercase();
        self.values
            .get(key.as_str())
            .map(|s| s.value.as_str())
            .ok_or_else(|| unrecognized(name))
    }

    pub fn get_bool(&self, name: &str) -> bool {
        self.get(name).ok().and_then(parse_bool).unwrap_or(false)
    }

    pub fn get_int(&self, name: &str) -> Option<i64> {
        self.get(name).ok().and_then(|v| v.parse().ok())
    }

    /// All settings in name order.
    pub fn all(&self) -> Vec<&Setting> {
        let mut all: Vec<&Setting> = self.values.values().collect();
        all.sort_by_key(|s| s.name);
        all
    }

    /// Apply `postgresql.conf`, parsed as TOML. Values set from the command
    /// line keep priority; unknown parameters are errors.
    pub fn apply_config_file(&mut self, path: &Path, contents: &str) -> Result<()> {
        let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| {
            ereport!(
                sqlstate::CONFIG_FILE_ERROR,
                "syntax error in file \"{}\": {}",
                path.display(),
                e.message()
            )
        })?;
        for (name, value) in &table {
            let text = match value {
                toml::Value::String(s) => s.clone(),
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Boolean(b) => if *b { "on" } else { "off" }.to_string(),
                toml::Value::Float(f) => f.to_string(),
                other => {
                    return Err(ereport!(
                        sqlstate::CONFIG_FILE_ERROR,
                        "parameter \"{}\" in file \"{}\" has unsupported value {}",
                        name,
                        path.display(),
                        other
                    ))
                }
            };
            if param_def(&name.to_ascii_lowercase()).is_none() {
                return Err(ereport!(
                    sqlstate::CONFIG_FILE_ERROR,
                    "unrecognized configuration parameter \"{}\" in file \"{}\"",
                    name,
                    path.display()
                ));
            }
            self.set_from(name, &text, SettingSource::File)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::with_defaults();
        assert_eq!(settings.get("fsync").unwrap(), "on");
        assert_eq!(settings.get("FSYNC").unwrap(), "on");
        assert!(!settings.get_bool("allow_system_table_mods"));
        assert_eq!(settings.get_int("max_connections"), Some(100));
    }

    #[test]
    fn test_command_line_beats_file() {
        let mut settings = Settings::with_defaults();
        settings.set_from("fsync", "false", SettingSource::Argv).unwrap();
        settings
            .apply_config_file(Path::new("postgresql.conf"), "fsync = true\nwork_mem = 8192\n")
            .unwrap();
        assert_eq!(settings.get("fsync").unwrap(), "off");
        assert_eq!(settings.get("work_mem").unwrap(), "8192");
    }

    #[test]
    fn test_unknown_file_parameter_is_error() {
        let mut settings = Settings::with_defaults();
        let err = settings
            .apply_config_file(Path::new("postgresql.conf"), "no_such_thing = 1\n")
            .unwrap_err();
        assert!(err.message.contains("unrecognized configuration parameter \"no_such_thing\""));
    }

    #[test]
    fn test_session_contexts() {
        let mut settings = Settings::with_defaults();
        assert!(settings.set_session("fsync", "off", true).unwrap_err().message.contains("cannot be changed now"));
        assert!(settings.set_session("max_connections", "5", true).is_err());
        assert!(settings.set_session("server_version", "1", true).is_err());
        let previous = settings.set_session("application_name", "cli", false).unwrap();
        assert_eq!(settings.get("application_name").unwrap(), "cli");
        settings.restore(previous);
        assert_eq!(settings.get("application_name").unwrap(), "");
    }

    #[test]
    fn test_value_validation() {
        let mut settings = Settings::with_defaults();
        assert!(settings.set_from("fsync", "maybe", SettingSource::Argv).is_err());
        assert!(settings.set_from("max_connections", "0", SettingSource::File).is_err());
        assert!(settings.set_from("work_mem", "abc", SettingSource::File).is_err());
    }
}
