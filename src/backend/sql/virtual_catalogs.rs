//! Read-only catalog relations built on demand from engine state.

use crate::backend::catalog::FunctionLanguage;
use crate::backend::ddl::ExtensionControl;
use crate::backend::error::Result;
use crate::backend::process::Backend;
use crate::backend::spi::{Attribute, TupleTable};
use crate::extension::registry;
use crate::fmgr::{Datum, TypeId};

fn text(s: impl Into<String>) -> Option<Datum> {
    Some(Datum::Text(s.into()))
}

fn oid(v: u32) -> Option<Datum> {
    Some(Datum::Int8(v as i64))
}

fn table(columns: &[(&str, TypeId)]) -> TupleTable {
    TupleTable::new(columns.iter().map(|(n, t)| Attribute::new(*n, *t)).collect())
}

fn format_offset(seconds: i32) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let s = seconds.unsigned_abs();
    format!("{}{:02}:{:02}:{:02}", sign, s / 3600, (s % 3600) / 60, s % 60)
}

impl Backend {
    /// Contents of the catalog relation `name`, or `None` if there is none.
    pub(crate) fn virtual_catalog(&self, name: &str) -> Result<Option<TupleTable>> {
        let out = match name {
            "pg_database" => {
                let mut t = table(&[
                    ("oid", TypeId::Int8),
                    ("datname", TypeId::Text),
                    ("datistemplate", TypeId::Bool),
                    ("datallowconn", TypeId::Bool),
                    ("encoding", TypeId::Int4),
                    ("datcollate", TypeId::Text),
                ]);
                for db in &self.shared()?.catalog.databases {
                    t.rows.push(vec![
                        oid(db.oid),
                        text(&db.name),
                        Some(Datum::Bool(db.is_template)),
                        Some(Datum::Bool(db.allow_connections)),
                        Some(Datum::Int4(db.encoding)),
                        text(&db.collate),
                    ]);
                }
                t
            }
            "pg_authid" | "pg_roles" => {
                let mut t = table(&[("oid", TypeId::Int8), ("rolname", TypeId::Text), ("rolsuper", TypeId::Bool)]);
                for role in &self.shared()?.catalog.roles {
                    t.rows.push(vec![oid(role.oid), text(&role.name), Some(Datum::Bool(role.superuser))]);
                }
                t
            }
            "pg_tables" => {
                let mut t = table(&[
                    ("schemaname", TypeId::Text),
                    ("tablename", TypeId::Text),
                    ("tableowner", TypeId::Text),
                ]);
                let owner = self.session_user.clone().unwrap_or_default();
                for relation in self.database()?.image.relations.values() {
                    t.rows.push(vec![text("public"), text(&relation.name), text(&owner)]);
                }
                t
            }
            "pg_views" => {
                let mut t = table(&[("schemaname", TypeId::Text), ("viewname", TypeId::Text)]);
                for view in self.database()?.image.views.values() {
                    t.rows.push(vec![text("public"), text(&view.name)]);
                }
                t
            }
            "pg_proc" => {
                let mut t = table(&[
                    ("oid", TypeId::Int8),
                    ("proname", TypeId::Text),
                    ("pronargs", TypeId::Int4),
                    ("prorettype", TypeId::Text),
                    ("prolang", TypeId::Text),
                    ("prosrc", TypeId::Text),
                    ("probin", TypeId::Text),
                    ("proisstrict", TypeId::Bool),
                ]);
                for f in self.database()?.image.functions.values() {
                    let (src, bin) = match &f.language {
                        FunctionLanguage::Internal { symbol } => (symbol.clone(), None),
                        FunctionLanguage::C { library, symbol } => (symbol.clone(), Some(library.clone())),
                    };
                    t.rows.push(vec![
                        oid(f.oid),
                        text(&f.name),
                        Some(Datum::Int4(f.arg_types.len() as i32)),
                        text(f.return_type.name()),
                        text(f.language.name()),
                        text(src),
                        bin.map(Datum::Text),
                        Some(Datum::Bool(f.strict)),
                    ]);
                }
                t
            }
            "pg_extension" => {
                let mut t = table(&[("oid", TypeId::Int8), ("extname", TypeId::Text), ("extversion", TypeId::Text)]);
                for ext in self.database()?.image.extensions.values() {
                    t.rows.push(vec![oid(ext.oid), text(&ext.name), text(&ext.version)]);
                }
                t
            }
            "pg_available_extensions" => {
                let mut t = table(&[
                    ("name", TypeId::Text),
                    ("default_version", TypeId::Text),
                    ("installed_version", TypeId::Text),
                    ("comment", TypeId::Text),
                ]);
                let installed = &self.database()?.image.extensions;
                for file in registry::global().embedded_files() {
                    let Some(name) = file
                        .filename
                        .rsplit('/')
                        .next()
                        .and_then(|base| base.strip_suffix(".control"))
                    else {
                        continue;
                    };
                    let Ok(control) = ExtensionControl::parse(name, file.data) else {
                        continue;
                    };
                    t.rows.push(vec![
                        text(name),
                        control.default_version.map(Datum::Text),
                        installed.get(name).map(|e| Datum::Text(e.version.clone())),
                        control.comment.map(Datum::Text),
                    ]);
                }
                t
            }
            "pg_settings" => {
                let mut t = table(&[
                    ("name", TypeId::Text),
                    ("setting", TypeId::Text),
                    ("context", TypeId::Text),
                    ("source", TypeId::Text),
                ]);
                for s in self.settings()?.all() {
                    t.rows.push(vec![
                        text(s.name),
                        text(&s.value),
                        text(s.context.name()),
                        text(s.source.name()),
                    ]);
                }
                t
            }
            "pg_timezone_abbrevs" => {
                let mut t = table(&[
                    ("abbrev", TypeId::Text),
                    ("utc_offset", TypeId::Text),
                    ("is_dst", TypeId::Bool),
                ]);
                if let Some(set) = &self.timezone {
                    for entry in &set.entries {
                        t.rows.push(vec![
                            text(&entry.abbrev),
                            text(format_offset(entry.utc_offset)),
                            Some(Datum::Bool(entry.is_dst)),
                        ]);
                    }
                }
                t
            }
            _ => return Ok(None),
        };
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_offset() {
        assert_eq!(format_offset(19_800), "05:30:00");
        assert_eq!(format_offset(-18_000), "-05:00:00");
        assert_eq!(format_offset(0), "00:00:00");
    }
}
