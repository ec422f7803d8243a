//! Function manager
//!
//! Builtin function table, type input and coercion rules, and the lookup
//! cache that binds catalog functions to callable code. C-language
//! functions resolve through the static extension registry and must export
//! a version-1 `pg_finfo_<name>` record.

use super::catalog::{FunctionDef, FunctionLanguage};
use super::error::{ereport, sqlstate, Result};
use super::process::Backend;
use crate::extension::registry::{self, ExternalSymbol};
use crate::fmgr::{
    Datum, FunctionCallInfo, FunctionError, FunctionResult, Oid, PgFunction, TypeId, FINFO_PREFIX,
    FUNCTION_API_VERSION,
};
use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::debug;

const FMGR_CACHE_SIZE: usize = 256;

/// A function compiled into the engine.
pub struct BuiltinFunction {
    /// SQL-visible name
    pub name: &'static str,
    /// Symbol used by `LANGUAGE internal` definitions
    pub symbol: &'static str,
    pub args: &'static [TypeId],
    pub ret: TypeId,
    pub strict: bool,
    pub func: PgFunction,
}

fn pgsql_version(_: &FunctionCallInfo<'_>) -> FunctionResult {
    Ok(Some(Datum::Text(format!(
        "PostgreSQL {} (pgembed {})",
        super::ENGINE_VERSION,
        env!("CARGO_PKG_VERSION")
    ))))
}

fn text_upper(fcinfo: &FunctionCallInfo<'_>) -> FunctionResult {
    Ok(Some(Datum::Text(fcinfo.get_arg_text(0)?.to_uppercase())))
}

fn text_lower(fcinfo: &FunctionCallInfo<'_>) -> FunctionResult {
    Ok(Some(Datum::Text(fcinfo.get_arg_text(0)?.to_lowercase())))
}

fn textlen(fcinfo: &FunctionCallInfo<'_>) -> FunctionResult {
    let len = fcinfo.get_arg_text(0)?.chars().count();
    Ok(Some(Datum::Int4(len as i32)))
}

fn int8abs(fcinfo: &FunctionCallInfo<'_>) -> FunctionResult {
    let v = fcinfo.get_arg_i64(0)?;
    v.checked_abs()
        .map(|a| Some(Datum::Int8(a)))
        .ok_or_else(|| FunctionError::new("bigint out of range"))
}

fn text_substr(fcinfo: &FunctionCallInfo<'_>) -> FunctionResult {
    let s = fcinfo.get_arg_text(0)?;
    let start = fcinfo.get_arg_i32(1)? as i64;
    let len = fcinfo.get_arg_i32(2)? as i64;
    if len < 0 {
        return Err(FunctionError::new("negative substring length not allowed"));
    }
    // 1-based start; positions before 1 eat into the length
    let from = start.max(1);
    let to = (start + len).max(from);
    let out: String = s
        .chars()
        .skip((from - 1) as usize)
        .take((to - from) as usize)
        .collect();
    Ok(Some(Datum::Text(out)))
}

fn replace_text(fcinfo: &FunctionCallInfo<'_>) -> FunctionResult {
    let s = fcinfo.get_arg_text(0)?;
    let from = fcinfo.get_arg_text(1)?;
    let to = fcinfo.get_arg_text(2)?;
    if from.is_empty() {
        return Ok(Some(Datum::Text(s.to_string())));
    }
    Ok(Some(Datum::Text(s.replace(from, to))))
}

/// Largest text value a function may build, in bytes.
const MAX_TEXT_SIZE: usize = 0x3fff_ffff;

fn repeat(fcinfo: &FunctionCallInfo<'_>) -> FunctionResult {
    let s = fcinfo.get_arg_text(0)?;
    let n = fcinfo.get_arg_i32(1)?.max(0) as usize;
    match s.len().checked_mul(n) {
        Some(len) if len <= MAX_TEXT_SIZE => Ok(Some(Datum::Text(s.repeat(n)))),
        _ => Err(FunctionError::new("requested length too large")),
    }
}

fn dsqrt(fcinfo: &FunctionCallInfo<'_>) -> FunctionResult {
    let v = fcinfo.get_arg_f64(0)?;
    if v < 0.0 {
        return Err(FunctionError::new("cannot take square root of a negative number"));
    }
    Ok(Some(Datum::Float8(v.sqrt())))
}

fn dround(fcinfo: &FunctionCallInfo<'_>) -> FunctionResult {
    Ok(Some(Datum::Float8(fcinfo.get_arg_f64(0)?.round())))
}

/// CRC-32 of the text, as eight hex digits.
fn text_checksum(fcinfo: &FunctionCallInfo<'_>) -> FunctionResult {
    let s = fcinfo.get_arg_text(0)?;
    Ok(Some(Datum::Text(format!("{:08x}", crc32fast::hash(s.as_bytes())))))
}

pub static BUILTINS: &[BuiltinFunction] = &[
    BuiltinFunction { name: "version", symbol: "pgsql_version", args: &[], ret: TypeId::Text, strict: true, func: pgsql_version },
    BuiltinFunction { name: "upper", symbol: "upper", args: &[TypeId::Text], ret: TypeId::Text, strict: true, func: text_upper },
    BuiltinFunction { name: "lower", symbol: "lower", args: &[TypeId::Text], ret: TypeId::Text, strict: true, func: text_lower },
    BuiltinFunction { name: "length", symbol: "textlen", args: &[TypeId::Text], ret: TypeId::Int4, strict: true, func: textlen },
    BuiltinFunction { name: "abs", symbol: "int8abs", args: &[TypeId::Int8], ret: TypeId::Int8, strict: true, func: int8abs },
    BuiltinFunction { name: "substr", symbol: "text_substr", args: &[TypeId::Text, TypeId::Int4, TypeId::Int4], ret: TypeId::Text, strict: true, func: text_substr },
    BuiltinFunction { name: "replace", symbol: "replace_text", args: &[TypeId::Text, TypeId::Text, TypeId::Text], ret: TypeId::Text, strict: true, func: replace_text },
    BuiltinFunction { name: "repeat", symbol: "repeat", args: &[TypeId::Text, TypeId::Int4], ret: TypeId::Text, strict: true, func: repeat },
    BuiltinFunction { name: "sqrt", symbol: "dsqrt", args: &[TypeId::Float8], ret: TypeId::Float8, strict: true, func: dsqrt },
    BuiltinFunction { name: "round", symbol: "dround", args: &[TypeId::Float8], ret: TypeId::Float8, strict: true, func: dround },
    BuiltinFunction { name: "checksum_text", symbol: "checksum_text", args: &[TypeId::Text], ret: TypeId::Text, strict: true, func: text_checksum },
];

pub fn builtin_by_name(name: &str, nargs: usize) -> Option<&'static BuiltinFunction> {
    BUILTINS.iter().find(|b| b.name == name && b.args.len() == nargs)
}

pub fn builtin_by_symbol(symbol: &str) -> Option<&'static BuiltinFunction> {
    BUILTINS.iter().find(|b| b.symbol == symbol)
}

/// Parse the text form of a value of type `target`.
pub fn input_datum(text: &str, target: TypeId) -> Result<Datum> {
    let invalid = || {
        ereport!(
            sqlstate::INVALID_TEXT_REPRESENTATION,
            "invalid input syntax for type {}: \"{}\"",
            target.name(),
            text
        )
    };
    let trimmed = text.trim();
    match target {
        TypeId::Text => Ok(Datum::Text(text.to_string())),
        TypeId::Bool => super::settings::parse_bool(trimmed)
            .map(Datum::Bool)
            .ok_or_else(invalid),
        TypeId::Int4 => {
            let v: i64 = trimmed.parse().map_err(|_| invalid())?;
            i32::try_from(v)
                .map(Datum::Int4)
                .map_err(|_| ereport!(sqlstate::NUMERIC_VALUE_OUT_OF_RANGE, "value \"{}\" is out of range for type integer", text))
        }
        TypeId::Int8 => trimmed.parse().map(Datum::Int8).map_err(|_| invalid()),
        TypeId::Float8 => match trimmed.to_ascii_lowercase().as_str() {
            "infinity" | "inf" => Ok(Datum::Float8(f64::INFINITY)),
            "-infinity" | "-inf" => Ok(Datum::Float8(f64::NEG_INFINITY)),
            "nan" => Ok(Datum::Float8(f64::NAN)),
            _ => trimmed.parse().map(Datum::Float8).map_err(|_| invalid()),
        },
        TypeId::Void => Err(ereport!(sqlstate::FEATURE_NOT_SUPPORTED, "cannot accept a value of type void")),
    }
}

fn int_out_of_range(target: TypeId) -> super::error::BackendError {
    let what = if target == TypeId::Int4 { "integer" } else { "bigint" };
    ereport!(sqlstate::NUMERIC_VALUE_OUT_OF_RANGE, "{} out of range", what)
}

/// Convert `datum` to `target` the way an explicit cast does.
pub fn coerce_datum(datum: Datum, target: TypeId) -> Result<Datum> {
    if datum.type_id() == target {
        return Ok(datum);
    }
    match (datum, target) {
        (Datum::Text(s), t) => input_datum(&s, t),
        (d, TypeId::Text) => Ok(Datum::Text(d.output())),
        (Datum::Int4(v), TypeId::Int8) => Ok(Datum::Int8(v as i64)),
        (Datum::Int4(v), TypeId::Float8) => Ok(Datum::Float8(v as f64)),
        (Datum::Int8(v), TypeId::Float8) => Ok(Datum::Float8(v as f64)),
        (Datum::Int8(v), TypeId::Int4) => i32::try_from(v)
            .map(Datum::Int4)
            .map_err(|_| int_out_of_range(TypeId::Int4)),
        (Datum::Float8(v), TypeId::Int4) => {
            let r = v.round();
            if r.is_finite() && r >= i32::MIN as f64 && r <= i32::MAX as f64 {
                Ok(Datum::Int4(r as i32))
            } else {
                Err(int_out_of_range(TypeId::Int4))
            }
        }
        (Datum::Float8(v), TypeId::Int8) => {
            let r = v.round();
            if r.is_finite() && r >= i64::MIN as f64 && r < i64::MAX as f64 {
                Ok(Datum::Int8(r as i64))
            } else {
                Err(int_out_of_range(TypeId::Int8))
            }
        }
        (Datum::Int4(v), TypeId::Bool) => Ok(Datum::Bool(v != 0)),
        (Datum::Bool(b), TypeId::Int4) => Ok(Datum::Int4(b as i32)),
        (d, t) => Err(ereport!(
            sqlstate::DATATYPE_MISMATCH,
            "cannot cast type {} to {}",
            d.type_id().name(),
            t.name()
        )),
    }
}

/// Call a builtin with arguments already coerced to its signature.
pub fn call_builtin(builtin: &BuiltinFunction, args: Vec<Option<Datum>>) -> Result<Option<Datum>> {
    let args = coerce_args(args, builtin.args)?;
    if builtin.strict && args.iter().any(Option::is_none) {
        return Ok(None);
    }
    let result = (builtin.func)(&FunctionCallInfo::new(&args))?;
    finish_result(result, builtin.ret)
}

fn coerce_args(args: Vec<Option<Datum>>, types: &[TypeId]) -> Result<Vec<Option<Datum>>> {
    args.into_iter()
        .zip(types.iter())
        .map(|(arg, ty)| arg.map(|d| coerce_datum(d, *ty)).transpose())
        .collect()
}

fn finish_result(result: Option<Datum>, ret: TypeId) -> Result<Option<Datum>> {
    match (result, ret) {
        (_, TypeId::Void) => Ok(Some(Datum::Text(String::new()))),
        (Some(d), t) => coerce_datum(d, t).map(Some),
        (None, _) => Ok(None),
    }
}

/// Resolve `library`/`symbol` through the static registry and check the
/// function's calling-convention record.
pub fn resolve_c_function(library: &str, symbol: &str) -> Result<PgFunction> {
    let (func, handle) = registry::load_external_function(library, symbol, false)?.ok_or_else(|| {
        ereport!(
            sqlstate::UNDEFINED_FUNCTION,
            "could not find function \"{}\" in file \"{}\"",
            symbol,
            library
        )
    })?;
    let finfo_name = format!("{}{}", FINFO_PREFIX, symbol);
    match registry::lookup_external_function(&handle, &finfo_name) {
        Some(ExternalSymbol::Finfo(finfo)) => {
            let info = finfo();
            if info.api_version != FUNCTION_API_VERSION {
                return Err(ereport!(
                    sqlstate::INVALID_PARAMETER_VALUE,
                    "unrecognized API version {} reported by info function \"{}\"",
                    info.api_version,
                    finfo_name
                ));
            }
            Ok(func)
        }
        _ => Err(ereport!(
            sqlstate::UNDEFINED_FUNCTION,
            "could not find function information for function \"{}\"",
            symbol
        )
        .with_hint("SQL-callable functions need an accompanying PG_FUNCTION_INFO_V1(funcname).")),
    }
}

/// Catalog function oid -> bound code.
pub struct FmgrCache {
    entries: LruCache<Oid, PgFunction>,
}

impl Default for FmgrCache {
    fn default() -> Self {
        let size = NonZeroUsize::new(FMGR_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(size),
        }
    }
}

impl std::fmt::Debug for FmgrCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FmgrCache").field("len", &self.entries.len()).finish()
    }
}

impl FmgrCache {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn invalidate(&mut self, oid: Oid) {
        self.entries.pop(&oid);
    }
}

impl Backend {
    /// Bind a catalog function to code, using the cache.
    pub fn fmgr_info(&mut self, def: &FunctionDef) -> Result<PgFunction> {
        if let Some(func) = self.fmgr.entries.get(&def.oid) {
            return Ok(*func);
        }
        let func = match &def.language {
            FunctionLanguage::Internal { symbol } => builtin_by_symbol(symbol)
                .map(|b| b.func)
                .ok_or_else(|| {
                    ereport!(sqlstate::UNDEFINED_FUNCTION, "internal function \"{}\" is not in internal lookup table", symbol)
                })?,
            FunctionLanguage::C { library, symbol } => resolve_c_function(library, symbol)?,
        };
        debug!(function = %def.name, oid = def.oid, "bound function");
        self.fmgr.entries.put(def.oid, func);
        Ok(func)
    }

    pub fn call_function(&mut self, def: &FunctionDef, args: Vec<Option<Datum>>) -> Result<Option<Datum>> {
        let func = self.fmgr_info(def)?;
        let args = coerce_args(args, &def.arg_types)?;
        if def.strict && args.iter().any(Option::is_none) {
            return Ok(None);
        }
        let result = func(&FunctionCallInfo::new(&args))?;
        finish_result(result, def.return_type)
    }

    pub fn reset_fmgr_state(&mut self) {
        self.fmgr = FmgrCache::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(builtin_by_name("upper", 1).unwrap().symbol, "upper");
        assert!(builtin_by_name("upper", 2).is_none());
        assert_eq!(builtin_by_symbol("pgsql_version").unwrap().name, "version");
    }

    #[test]
    fn test_call_builtin_coerces_and_respects_strict() {
        let abs = builtin_by_name("abs", 1).unwrap();
        assert_eq!(call_builtin(abs, vec![Some(Datum::Int4(-5))]).unwrap(), Some(Datum::Int8(5)));
        assert_eq!(call_builtin(abs, vec![None]).unwrap(), None);

        let substr = builtin_by_name("substr", 3).unwrap();
        let out = call_builtin(
            substr,
            vec![Some(Datum::Text("embedded".into())), Some(Datum::Int4(3)), Some(Datum::Int4(3))],
        )
        .unwrap();
        assert_eq!(out, Some(Datum::Text("bed".into())));
    }

    #[test]
    fn test_repeat_rejects_huge_results() {
        let repeat = builtin_by_name("repeat", 2).unwrap();
        let out = call_builtin(repeat, vec![Some(Datum::Text("ab".into())), Some(Datum::Int4(3))]).unwrap();
        assert_eq!(out, Some(Datum::Text("ababab".into())));

        let err = call_builtin(repeat, vec![Some(Datum::Text("ab".into())), Some(Datum::Int4(i32::MAX))]).unwrap_err();
        assert!(err.message.contains("requested length too large"));
    }

    #[test]
    fn test_input_and_coercion() {
        assert_eq!(input_datum(" 42 ", TypeId::Int4).unwrap(), Datum::Int4(42));
        assert_eq!(input_datum("yes", TypeId::Bool).unwrap(), Datum::Bool(true));
        let err = input_datum("abc", TypeId::Int4).unwrap_err();
        assert_eq!(err.message, "invalid input syntax for type integer: \"abc\"");
        assert_eq!(input_datum("99999999999", TypeId::Int4).unwrap_err().code, sqlstate::NUMERIC_VALUE_OUT_OF_RANGE);

        assert_eq!(coerce_datum(Datum::Int4(2), TypeId::Float8).unwrap(), Datum::Float8(2.0));
        assert_eq!(coerce_datum(Datum::Float8(2.5), TypeId::Int8).unwrap(), Datum::Int8(3));
        assert_eq!(coerce_datum(Datum::Bool(true), TypeId::Text).unwrap(), Datum::Text("t".into()));
        assert_eq!(
            coerce_datum(Datum::Int8(i64::MAX), TypeId::Int4).unwrap_err().message,
            "integer out of range"
        );
    }

    #[test]
    fn test_void_result_is_empty_text() {
        assert_eq!(finish_result(None, TypeId::Void).unwrap(), Some(Datum::Text(String::new())));
    }
}
