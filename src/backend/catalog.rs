//! System catalogs
//!
//! `GlobalCatalog` holds the shared catalogs (databases, roles).
//! `DatabaseImage` holds one database: its relations with their rows, views,
//! functions and installed extensions.

use super::sql::ast::SelectStmt;
use crate::fmgr::{Datum, Oid, TypeId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TEMPLATE1_OID: Oid = 1;
pub const TEMPLATE0_OID: Oid = 4;
pub const POSTGRES_OID: Oid = 5;
pub const BOOTSTRAP_SUPERUSER_OID: Oid = 10;
pub const FIRST_NORMAL_OBJECT_ID: Oid = 16384;

pub type Row = Vec<Option<Datum>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseEntry {
    pub oid: Oid,
    pub name: String,
    pub is_template: bool,
    pub allow_connections: bool,
    pub encoding: i32,
    pub collate: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleEntry {
    pub oid: Oid,
    pub name: String,
    pub superuser: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalCatalog {
    pub databases: Vec<DatabaseEntry>,
    pub roles: Vec<RoleEntry>,
}

impl GlobalCatalog {
    pub fn database(&self, name: &str) -> Option<&DatabaseEntry> {
        self.databases.iter().find(|d| d.name == name)
    }

    pub fn database_by_oid(&self, oid: Oid) -> Option<&DatabaseEntry> {
        self.databases.iter().find(|d| d.oid == oid)
    }

    pub fn database_by_oid_mut(&mut self, oid: Oid) -> Option<&mut DatabaseEntry> {
        self.databases.iter_mut().find(|d| d.oid == oid)
    }

    pub fn role(&self, name: &str) -> Option<&RoleEntry> {
        self.roles.iter().find(|r| r.name == name)
    }

    pub fn next_database_oid(&self) -> Oid {
        self.databases
            .iter()
            .map(|d| d.oid + 1)
            .max()
            .unwrap_or(FIRST_NORMAL_OBJECT_ID)
            .max(FIRST_NORMAL_OBJECT_ID)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub type_id: TypeId,
    pub not_null: bool,
    /// Filled from the relation's sequence when omitted on insert
    pub serial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub oid: Oid,
    pub name: String,
    pub columns: Vec<ColumnDef>,
    pub primary_key: Option<usize>,
    pub rows: BTreeMap<u64, Row>,
    pub next_row_id: u64,
    /// Last value handed out by the serial sequence; not rolled back on abort
    pub sequence: i64,
    pub owner_extension: Option<String>,
}

impl Relation {
    pub fn new(oid: Oid, name: &str, columns: Vec<ColumnDef>, primary_key: Option<usize>) -> Self {
        Self {
            oid,
            name: name.to_string(),
            columns,
            primary_key,
            rows: BTreeMap::new(),
            next_row_id: 1,
            sequence: 0,
            owner_extension: None,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn constraint_name(&self) -> String {
        format!("{}_pkey", self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDef {
    pub oid: Oid,
    pub name: String,
    pub query: SelectStmt,
    pub owner_extension: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FunctionLanguage {
    /// Implemented by the engine's builtin table
    Internal { symbol: String },
    /// Resolved through the static extension registry
    C { library: String, symbol: String },
}

impl FunctionLanguage {
    pub fn name(&self) -> &'static str {
        match self {
            FunctionLanguage::Internal { .. } => "internal",
            FunctionLanguage::C { .. } => "c",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDef {
    pub oid: Oid,
    pub name: String,
    pub arg_types: Vec<TypeId>,
    pub return_type: TypeId,
    pub language: FunctionLanguage,
    pub strict: bool,
    pub owner_extension: Option<String>,
}

impl FunctionDef {
    /// `name(type, ...)` as shown in error messages.
    pub fn signature(&self) -> String {
        signature(&self.name, &self.arg_types)
    }
}

pub fn signature(name: &str, args: &[TypeId]) -> String {
    let args: Vec<&str> = args.iter().map(|t| t.name()).collect();
    format!("{}({})", name, args.join(", "))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionEntry {
    pub oid: Oid,
    pub name: String,
    pub version: String,
}

/// One database's persistent contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseImage {
    pub relations: BTreeMap<String, Relation>,
    pub views: BTreeMap<String, ViewDef>,
    pub functions: BTreeMap<String, FunctionDef>,
    pub extensions: BTreeMap<String, ExtensionEntry>,
    pub next_oid: Oid,
}

impl Default for DatabaseImage {
    fn default() -> Self {
        Self {
            relations: BTreeMap::new(),
            views: BTreeMap::new(),
            functions: BTreeMap::new(),
            extensions: BTreeMap::new(),
            next_oid: FIRST_NORMAL_OBJECT_ID,
        }
    }
}

impl DatabaseImage {
    pub fn allocate_oid(&mut self) -> Oid {
        let oid = self.next_oid;
        self.next_oid += 1;
        oid
    }

    /// True when `name` is taken by a relation or a view.
    pub fn has_relation_name(&self, name: &str) -> bool {
        self.relations.contains_key(name) || self.views.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_database_oid_skips_reserved_range() {
        let mut catalog = GlobalCatalog::default();
        assert_eq!(catalog.next_database_oid(), FIRST_NORMAL_OBJECT_ID);
        catalog.databases.push(DatabaseEntry {
            oid: FIRST_NORMAL_OBJECT_ID,
            name: "app".into(),
            is_template: false,
            allow_connections: true,
            encoding: 6,
            collate: "C".into(),
            description: None,
        });
        assert_eq!(catalog.next_database_oid(), FIRST_NORMAL_OBJECT_ID + 1);
    }

    #[test]
    fn test_signature_format() {
        assert_eq!(signature("add_one", &[TypeId::Int4]), "add_one(integer)");
        assert_eq!(signature("version", &[]), "version()");
    }
}
