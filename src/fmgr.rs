//! Function manager ABI
//!
//! The calling convention shared by the engine and statically linked
//! extension functions: typed datums, a call-info record, and the
//! `pg_finfo_*` metadata record every externally callable function exports.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Object identifier
pub type Oid = u32;

/// SQL data types understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeId {
    Bool,
    Int4,
    Int8,
    Float8,
    Text,
    Void,
}

impl TypeId {
    pub fn oid(&self) -> Oid {
        match self {
            TypeId::Bool => 16,
            TypeId::Int8 => 20,
            TypeId::Int4 => 23,
            TypeId::Text => 25,
            TypeId::Float8 => 701,
            TypeId::Void => 2278,
        }
    }

    /// SQL-level name, as used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            TypeId::Bool => "boolean",
            TypeId::Int4 => "integer",
            TypeId::Int8 => "bigint",
            TypeId::Float8 => "double precision",
            TypeId::Text => "text",
            TypeId::Void => "void",
        }
    }

    /// Resolve a type name as written in DDL.
    pub fn from_sql_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "bool" | "boolean" => Some(TypeId::Bool),
            "int" | "int4" | "integer" | "serial" => Some(TypeId::Int4),
            "int8" | "bigint" | "bigserial" => Some(TypeId::Int8),
            "float" | "float8" | "double" | "real" => Some(TypeId::Float8),
            "text" | "varchar" | "name" | "cstring" => Some(TypeId::Text),
            "void" => Some(TypeId::Void),
            _ => None,
        }
    }

    /// Fixed-width types are passed by value in a single machine word.
    pub fn by_value(&self) -> bool {
        !matches!(self, TypeId::Text)
    }
}

/// A non-null value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Datum {
    Bool(bool),
    Int4(i32),
    Int8(i64),
    Float8(f64),
    Text(String),
}

impl Datum {
    pub fn type_id(&self) -> TypeId {
        match self {
            Datum::Bool(_) => TypeId::Bool,
            Datum::Int4(_) => TypeId::Int4,
            Datum::Int8(_) => TypeId::Int8,
            Datum::Float8(_) => TypeId::Float8,
            Datum::Text(_) => TypeId::Text,
        }
    }

    /// Text output form, as the engine's type output functions render it.
    pub fn output(&self) -> String {
        match self {
            Datum::Bool(true) => "t".to_string(),
            Datum::Bool(false) => "f".to_string(),
            Datum::Int4(v) => v.to_string(),
            Datum::Int8(v) => v.to_string(),
            Datum::Float8(v) => float8_out(*v),
            Datum::Text(s) => s.clone(),
        }
    }

    /// Machine word for by-value types; `None` for by-reference types.
    pub fn raw_word(&self) -> Option<u64> {
        match self {
            Datum::Bool(b) => Some(*b as u64),
            Datum::Int4(v) => Some(*v as i64 as u64),
            Datum::Int8(v) => Some(*v as u64),
            Datum::Float8(v) => Some(v.to_bits()),
            Datum::Text(_) => None,
        }
    }

    /// Payload bytes of a by-reference value.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Datum::Text(s) => Some(s.as_bytes()),
            _ => None,
        }
    }
}

fn float8_out(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        format!("{}", v)
    }
}

/// Error raised by a function body.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct FunctionError {
    pub message: String,
}

impl FunctionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Arguments of one function call.
pub struct FunctionCallInfo<'a> {
    args: &'a [Option<Datum>],
}

impl<'a> FunctionCallInfo<'a> {
    pub fn new(args: &'a [Option<Datum>]) -> Self {
        Self { args }
    }

    pub fn nargs(&self) -> usize {
        self.args.len()
    }

    pub fn arg(&self, n: usize) -> Option<&Datum> {
        self.args.get(n).and_then(|a| a.as_ref())
    }

    pub fn arg_is_null(&self, n: usize) -> bool {
        self.arg(n).is_none()
    }

    pub fn get_arg_i32(&self, n: usize) -> Result<i32, FunctionError> {
        match self.arg(n) {
            Some(Datum::Int4(v)) => Ok(*v),
            other => Err(arg_mismatch(n, "integer", other)),
        }
    }

    pub fn get_arg_i64(&self, n: usize) -> Result<i64, FunctionError> {
        match self.arg(n) {
            Some(Datum::Int8(v)) => Ok(*v),
            Some(Datum::Int4(v)) => Ok(*v as i64),
            other => Err(arg_mismatch(n, "bigint", other)),
        }
    }

    pub fn get_arg_f64(&self, n: usize) -> Result<f64, FunctionError> {
        match self.arg(n) {
            Some(Datum::Float8(v)) => Ok(*v),
            other => Err(arg_mismatch(n, "double precision", other)),
        }
    }

    pub fn get_arg_text(&self, n: usize) -> Result<&str, FunctionError> {
        match self.arg(n) {
            Some(Datum::Text(s)) => Ok(s),
            other => Err(arg_mismatch(n, "text", other)),
        }
    }
}

fn arg_mismatch(n: usize, expected: &str, got: Option<&Datum>) -> FunctionError {
    let got = got.map(|d| d.type_id().name()).unwrap_or("null");
    FunctionError::new(format!("argument {} must be {}, got {}", n + 1, expected, got))
}

/// `Ok(None)` returns SQL NULL.
pub type FunctionResult = Result<Option<Datum>, FunctionError>;

/// Signature of every callable function.
pub type PgFunction = fn(&FunctionCallInfo<'_>) -> FunctionResult;

/// Calling-convention record returned by `pg_finfo_<name>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionInfo {
    pub api_version: i32,
}

/// Signature of a `pg_finfo_<name>` accessor.
pub type FinfoFunction = fn() -> &'static FunctionInfo;

/// The only supported calling convention.
pub const FUNCTION_API_VERSION: i32 = 1;

static FINFO_V1: FunctionInfo = FunctionInfo {
    api_version: FUNCTION_API_VERSION,
};

/// Metadata accessor for version-1 functions; register it as `pg_finfo_<name>`.
pub fn finfo_v1() -> &'static FunctionInfo {
    &FINFO_V1
}

/// Prefix of metadata accessor names.
pub const FINFO_PREFIX: &str = "pg_finfo_";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_formats() {
        assert_eq!(Datum::Bool(true).output(), "t");
        assert_eq!(Datum::Int8(-7).output(), "-7");
        assert_eq!(Datum::Float8(2.0).output(), "2");
        assert_eq!(Datum::Float8(1.5).output(), "1.5");
        assert_eq!(Datum::Float8(f64::INFINITY).output(), "Infinity");
    }

    #[test]
    fn test_raw_word() {
        assert_eq!(Datum::Int4(-1).raw_word(), Some(u64::MAX));
        assert_eq!(Datum::Float8(1.0).raw_word(), Some(1.0f64.to_bits()));
        assert_eq!(Datum::Text("x".into()).raw_word(), None);
        assert_eq!(Datum::Text("xy".into()).as_bytes(), Some(&b"xy"[..]));
    }

    #[test]
    fn test_call_info_args() {
        let args = vec![Some(Datum::Int4(3)), None, Some(Datum::Text("a".into()))];
        let fcinfo = FunctionCallInfo::new(&args);
        assert_eq!(fcinfo.nargs(), 3);
        assert_eq!(fcinfo.get_arg_i32(0).unwrap(), 3);
        assert_eq!(fcinfo.get_arg_i64(0).unwrap(), 3);
        assert!(fcinfo.arg_is_null(1));
        assert!(fcinfo.get_arg_i32(2).is_err());
        assert_eq!(fcinfo.get_arg_text(2).unwrap(), "a");
    }

    #[test]
    fn test_type_names() {
        assert_eq!(TypeId::from_sql_name("INTEGER"), Some(TypeId::Int4));
        assert_eq!(TypeId::from_sql_name("bigserial"), Some(TypeId::Int8));
        assert_eq!(TypeId::from_sql_name("geometry"), None);
        assert!(!TypeId::Text.by_value());
    }
}
