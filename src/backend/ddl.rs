//! Schema commands
//!
//! CREATE/DROP for tables, views, functions and extensions, plus
//! `COMMENT ON DATABASE`. Objects created while an extension script runs are
//! owned by that extension and dropped with it.

use super::catalog::{ColumnDef, ExtensionEntry, FunctionDef, FunctionLanguage, Relation, ViewDef};
use super::error::{ereport, sqlstate, BackendError, Result};
use super::funcs;
use super::process::Backend;
use super::sql::ast::{CreateFunctionStmt, CreateTableStmt, SelectStmt};
use super::sql::eval::lookup_type;
use super::sql::parse_sql;
use crate::extension::vfs;
use crate::fmgr::TypeId;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Contents of an `<extension>.control` file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtensionControl {
    pub default_version: Option<String>,
    pub comment: Option<String>,
    pub module_pathname: Option<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub relocatable: bool,
}

impl ExtensionControl {
    pub fn parse(name: &str, data: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(data).map_err(|_| {
            ereport!(sqlstate::CONFIG_FILE_ERROR, "extension control file for \"{}\" is not valid UTF-8", name)
        })?;
        toml::from_str(text).map_err(|e: toml::de::Error| {
            ereport!(
                sqlstate::CONFIG_FILE_ERROR,
                "invalid extension control file for \"{}\": {}",
                name,
                e.message()
            )
        })
    }
}

fn extension_dir() -> PathBuf {
    Path::new(super::SHARE_DIR).join("extension")
}

/// Prepare an install script: drop psql-only lines, substitute placeholders.
pub fn preprocess_script(script: &str, extension: &str, control: &ExtensionControl) -> String {
    let module = control
        .module_pathname
        .clone()
        .unwrap_or_else(|| format!("$libdir/{}", extension));
    script
        .lines()
        .filter(|line| !line.trim_start().starts_with("\\echo"))
        .map(|line| line.replace("MODULE_PATHNAME", &module).replace("@extschema@", "public"))
        .collect::<Vec<_>>()
        .join("\n")
}

impl Backend {
    fn check_system_name(&self, name: &str) -> Result<()> {
        if name.starts_with("pg_") && !self.settings()?.get_bool("allow_system_table_mods") {
            return Err(ereport!(sqlstate::INSUFFICIENT_PRIVILEGE, "permission denied to create \"{}\"", name)
                .with_detail("System catalog modifications are currently disallowed."));
        }
        Ok(())
    }

    pub(crate) fn create_table(&mut self, stmt: &CreateTableStmt) -> Result<()> {
        self.check_system_name(&stmt.table)?;
        if self.database()?.image.has_relation_name(&stmt.table) {
            if stmt.if_not_exists {
                info!(relation = %stmt.table, "relation already exists, skipping");
                return Ok(());
            }
            return Err(ereport!(sqlstate::DUPLICATE_TABLE, "relation \"{}\" already exists", stmt.table));
        }

        let mut columns: Vec<ColumnDef> = Vec::with_capacity(stmt.columns.len());
        let mut primary_key = None;
        for (idx, spec) in stmt.columns.iter().enumerate() {
            if columns.iter().any(|c| c.name == spec.name) {
                return Err(ereport!(
                    sqlstate::DUPLICATE_COLUMN,
                    "column \"{}\" specified more than once",
                    spec.name
                ));
            }
            let type_name = spec.type_name.to_ascii_lowercase();
            let type_id = lookup_type(&type_name)?;
            if type_id == TypeId::Void {
                return Err(ereport!(
                    sqlstate::INVALID_TABLE_DEFINITION,
                    "column \"{}\" has pseudo-type void",
                    spec.name
                ));
            }
            let serial = matches!(type_name.as_str(), "serial" | "bigserial");
            if spec.primary_key {
                if primary_key.is_some() {
                    return Err(multiple_primary_keys(&stmt.table));
                }
                primary_key = Some(idx);
            }
            columns.push(ColumnDef {
                name: spec.name.clone(),
                type_id,
                not_null: spec.not_null || spec.primary_key || serial,
                serial,
            });
        }
        if let Some(pk_name) = &stmt.primary_key {
            if primary_key.is_some() {
                return Err(multiple_primary_keys(&stmt.table));
            }
            let idx = columns.iter().position(|c| &c.name == pk_name).ok_or_else(|| {
                ereport!(
                    sqlstate::UNDEFINED_COLUMN,
                    "column \"{}\" named in key does not exist",
                    pk_name
                )
            })?;
            columns[idx].not_null = true;
            primary_key = Some(idx);
        }

        let owner = self.creating_extension.clone();
        let image = &mut self.database_mut()?.image;
        let oid = image.allocate_oid();
        let mut relation = Relation::new(oid, &stmt.table, columns, primary_key);
        relation.owner_extension = owner;
        image.relations.insert(stmt.table.clone(), relation);
        self.xact.database_dirty = true;
        debug!(relation = %stmt.table, oid, "created table");
        Ok(())
    }

    pub(crate) fn drop_table(&mut self, name: &str, if_exists: bool) -> Result<()> {
        let image = &self.database()?.image;
        let Some(relation) = image.relations.get(name) else {
            if image.views.contains_key(name) {
                return Err(ereport!(sqlstate::WRONG_OBJECT_TYPE, "\"{}\" is not a table", name)
                    .with_hint("Use DROP VIEW to remove a view."));
            }
            if if_exists {
                info!(relation = name, "table does not exist, skipping");
                return Ok(());
            }
            return Err(ereport!(sqlstate::UNDEFINED_TABLE, "table \"{}\" does not exist", name));
        };
        self.check_extension_member("table", name, relation.owner_extension.as_deref())?;
        self.database_mut()?.image.relations.remove(name);
        self.xact.database_dirty = true;
        Ok(())
    }

    fn check_extension_member(&self, kind: &str, name: &str, owner: Option<&str>) -> Result<()> {
        match owner {
            Some(ext) if self.creating_extension.as_deref() != Some(ext) => Err(ereport!(
                sqlstate::DEPENDENT_OBJECTS_STILL_EXIST,
                "cannot drop {} {} because extension {} requires it",
                kind,
                name,
                ext
            )
            .with_hint(format!("You can drop extension {} instead.", ext))),
            _ => Ok(()),
        }
    }

    pub(crate) fn create_view(&mut self, name: &str, or_replace: bool, query: &SelectStmt) -> Result<()> {
        self.check_system_name(name)?;
        let image = &self.database()?.image;
        if image.relations.contains_key(name) {
            return Err(ereport!(sqlstate::DUPLICATE_TABLE, "relation \"{}\" already exists", name));
        }
        let existing = image.views.get(name).map(|v| v.oid);
        if existing.is_some() && !or_replace {
            return Err(ereport!(sqlstate::DUPLICATE_TABLE, "relation \"{}\" already exists", name));
        }

        // The query must run now; errors surface at creation
        self.run_select(query, 1)?;

        let owner = self.creating_extension.clone();
        let image = &mut self.database_mut()?.image;
        let oid = match existing {
            Some(oid) => oid,
            None => image.allocate_oid(),
        };
        image.views.insert(
            name.to_string(),
            ViewDef {
                oid,
                name: name.to_string(),
                query: query.clone(),
                owner_extension: owner,
            },
        );
        self.xact.database_dirty = true;
        Ok(())
    }

    pub(crate) fn drop_view(&mut self, name: &str, if_exists: bool) -> Result<()> {
        let image = &self.database()?.image;
        let Some(view) = image.views.get(name) else {
            if image.relations.contains_key(name) {
                return Err(ereport!(sqlstate::WRONG_OBJECT_TYPE, "\"{}\" is not a view", name)
                    .with_hint("Use DROP TABLE to remove a table."));
            }
            if if_exists {
                info!(view = name, "view does not exist, skipping");
                return Ok(());
            }
            return Err(ereport!(sqlstate::UNDEFINED_TABLE, "view \"{}\" does not exist", name));
        };
        self.check_extension_member("view", name, view.owner_extension.as_deref())?;
        self.database_mut()?.image.views.remove(name);
        self.xact.database_dirty = true;
        Ok(())
    }

    pub(crate) fn create_function(&mut self, stmt: &CreateFunctionStmt) -> Result<()> {
        self.check_system_name(&stmt.name)?;
        let arg_types = stmt
            .arg_types
            .iter()
            .map(|t| lookup_type(t))
            .collect::<Result<Vec<_>>>()?;
        let return_type = lookup_type(&stmt.return_type)?;

        let language = match stmt.language.as_str() {
            "c" => {
                let (library, symbol) = match stmt.definition.as_slice() {
                    [library] => (library.clone(), stmt.name.clone()),
                    [library, symbol] => (library.clone(), symbol.clone()),
                    _ => {
                        return Err(ereport!(
                            sqlstate::INVALID_PARAMETER_VALUE,
                            "only one AS item needed for language \"c\" besides the link symbol"
                        ))
                    }
                };
                // Fail now rather than at first call
                funcs::resolve_c_function(&library, &symbol)?;
                FunctionLanguage::C { library, symbol }
            }
            "internal" => {
                let symbol = match stmt.definition.as_slice() {
                    [] => stmt.name.clone(),
                    [symbol] => symbol.clone(),
                    _ => {
                        return Err(ereport!(
                            sqlstate::INVALID_PARAMETER_VALUE,
                            "only one AS item needed for language \"internal\""
                        ))
                    }
                };
                if funcs::builtin_by_symbol(&symbol).is_none() {
                    return Err(ereport!(
                        sqlstate::UNDEFINED_FUNCTION,
                        "there is no built-in function named \"{}\"",
                        symbol
                    ));
                }
                FunctionLanguage::Internal { symbol }
            }
            "" => {
                return Err(ereport!(sqlstate::INVALID_TABLE_DEFINITION, "no language specified"))
            }
            other => {
                return Err(ereport!(sqlstate::UNDEFINED_OBJECT, "language \"{}\" does not exist", other))
            }
        };

        let existing = self.database()?.image.functions.get(&stmt.name).cloned();
        if let Some(old) = &existing {
            if !stmt.or_replace {
                return Err(ereport!(
                    sqlstate::DUPLICATE_FUNCTION,
                    "function \"{}\" already exists with same argument types",
                    old.signature()
                ));
            }
            self.fmgr.invalidate(old.oid);
        }

        let owner = self.creating_extension.clone();
        let image = &mut self.database_mut()?.image;
        let oid = match &existing {
            Some(old) => old.oid,
            None => image.allocate_oid(),
        };
        let def = FunctionDef {
            oid,
            name: stmt.name.clone(),
            arg_types,
            return_type,
            language,
            strict: stmt.strict,
            owner_extension: owner.or_else(|| existing.and_then(|old| old.owner_extension)),
        };
        debug!(function = %def.signature(), language = def.language.name(), "created function");
        image.functions.insert(stmt.name.clone(), def);
        self.xact.database_dirty = true;
        Ok(())
    }

    pub(crate) fn drop_function(&mut self, name: &str, if_exists: bool) -> Result<()> {
        let Some(def) = self.database()?.image.functions.get(name).cloned() else {
            if if_exists {
                info!(function = name, "function does not exist, skipping");
                return Ok(());
            }
            return Err(ereport!(sqlstate::UNDEFINED_FUNCTION, "function {} does not exist", name));
        };
        self.check_extension_member("function", &def.signature(), def.owner_extension.as_deref())?;
        self.database_mut()?.image.functions.remove(name);
        self.fmgr.invalidate(def.oid);
        self.xact.database_dirty = true;
        Ok(())
    }

    pub(crate) fn create_extension(&mut self, name: &str, if_not_exists: bool, version: Option<&str>) -> Result<()> {
        if self.database()?.image.extensions.contains_key(name) {
            if if_not_exists {
                info!(extension = name, "extension already exists, skipping");
                return Ok(());
            }
            return Err(ereport!(sqlstate::DUPLICATE_OBJECT, "extension \"{}\" already exists", name));
        }
        if self.creating_extension.is_some() {
            return Err(ereport!(
                sqlstate::FEATURE_NOT_SUPPORTED,
                "nested CREATE EXTENSION is not supported"
            ));
        }

        let control_path = extension_dir().join(format!("{}.control", name));
        let control_data = vfs::read_file(&control_path).map_err(|e| {
            ereport!(sqlstate::UNDEFINED_FILE, "extension \"{}\" is not available", name)
                .with_detail(format!(
                    "Could not open extension control file \"{}\": {}.",
                    control_path.display(),
                    e
                ))
                .with_hint("The extension must first be registered with register_static_extension().")
        })?;
        let control = ExtensionControl::parse(name, &control_data)?;

        for required in &control.requires {
            if !self.database()?.image.extensions.contains_key(required) {
                return Err(ereport!(
                    sqlstate::UNDEFINED_OBJECT,
                    "required extension \"{}\" is not installed",
                    required
                ));
            }
        }

        let version = version
            .map(str::to_string)
            .or_else(|| control.default_version.clone())
            .ok_or_else(|| {
                ereport!(
                    sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
                    "no default version specified for extension \"{}\"",
                    name
                )
            })?;
        let script_path = extension_dir().join(format!("{}--{}.sql", name, version));
        let script = vfs::read_to_string(&script_path).map_err(|_| {
            ereport!(
                sqlstate::INVALID_PARAMETER_VALUE,
                "extension \"{}\" has no installation script nor update path for version \"{}\"",
                name,
                version
            )
        })?;
        let script = preprocess_script(&script, name, &control);
        let statements = parse_sql(&script).map_err(|e| script_error(name, e))?;

        self.creating_extension = Some(name.to_string());
        let outcome = statements.iter().try_for_each(|statement| {
            self.xact.command_id += 1;
            self.execute_statement(statement, false).map(|_| ())
        });
        self.creating_extension = None;
        outcome.map_err(|e| script_error(name, e))?;

        let image = &mut self.database_mut()?.image;
        let oid = image.allocate_oid();
        image.extensions.insert(
            name.to_string(),
            ExtensionEntry {
                oid,
                name: name.to_string(),
                version: version.clone(),
            },
        );
        self.xact.database_dirty = true;
        info!(extension = name, version = %version, "created extension");
        Ok(())
    }

    pub(crate) fn drop_extension(&mut self, name: &str, if_exists: bool) -> Result<()> {
        if !self.database()?.image.extensions.contains_key(name) {
            if if_exists {
                info!(extension = name, "extension does not exist, skipping");
                return Ok(());
            }
            return Err(ereport!(sqlstate::UNDEFINED_OBJECT, "extension \"{}\" does not exist", name));
        }

        let owned = |owner: &Option<String>| owner.as_deref() == Some(name);
        let image = &mut self.database_mut()?.image;
        let dropped_functions: Vec<u32> = image
            .functions
            .values()
            .filter(|f| owned(&f.owner_extension))
            .map(|f| f.oid)
            .collect();
        image.functions.retain(|_, f| !owned(&f.owner_extension));
        image.views.retain(|_, v| !owned(&v.owner_extension));
        image.relations.retain(|_, r| !owned(&r.owner_extension));
        image.extensions.remove(name);
        for oid in dropped_functions {
            self.fmgr.invalidate(oid);
        }
        self.xact.database_dirty = true;
        info!(extension = name, "dropped extension");
        Ok(())
    }

    pub(crate) fn comment_on_database(&mut self, name: &str, comment: Option<&str>) -> Result<()> {
        let entry = self
            .shared_mut()?
            .catalog
            .databases
            .iter_mut()
            .find(|d| d.name == name)
            .ok_or_else(|| ereport!(sqlstate::INVALID_CATALOG_NAME, "database \"{}\" does not exist", name))?;
        entry.description = comment.filter(|c| !c.is_empty()).map(str::to_string);
        self.xact.catalog_dirty = true;
        Ok(())
    }
}

fn multiple_primary_keys(table: &str) -> BackendError {
    ereport!(
        sqlstate::INVALID_TABLE_DEFINITION,
        "multiple primary keys for table \"{}\" are not allowed",
        table
    )
}

fn script_error(extension: &str, err: BackendError) -> BackendError {
    let context = format!("extension script for \"{}\"", extension);
    let detail = match err.detail.clone() {
        Some(d) => format!("{} (in {})", d, context),
        None => format!("While running the {}.", context),
    };
    BackendError { detail: Some(detail), ..err }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_file_parse() {
        let control = ExtensionControl::parse(
            "demo",
            b"default_version = '1.0'\ncomment = 'demo functions'\nrequires = ['base']\n",
        )
        .unwrap();
        assert_eq!(control.default_version.as_deref(), Some("1.0"));
        assert_eq!(control.requires, vec!["base".to_string()]);
        assert!(control.module_pathname.is_none());

        assert!(ExtensionControl::parse("bad", b"default_version = ").is_err());
    }

    #[test]
    fn test_preprocess_script() {
        let script = "\\echo Use \"CREATE EXTENSION demo\" to load this file. \\quit\n\
                      CREATE FUNCTION add_one(integer) RETURNS integer AS 'MODULE_PATHNAME', 'add_one' LANGUAGE C;";
        let out = preprocess_script(script, "demo", &ExtensionControl::default());
        assert!(!out.contains("\\echo"));
        assert!(out.contains("'$libdir/demo', 'add_one'"));

        let control = ExtensionControl {
            module_pathname: Some("$libdir/demo_impl".into()),
            ..Default::default()
        };
        assert!(preprocess_script(script, "demo", &control).contains("'$libdir/demo_impl'"));
    }
}
