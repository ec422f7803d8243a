//! Expression evaluation
//!
//! Evaluates parsed expressions against one row of a materialized source.
//! NULL is `None` throughout; logic is three-valued.

use super::ast::{BinaryOperator, Expr, Literal, SqlValueFunction, UnaryOperator};
use crate::backend::catalog::{self, Row};
use crate::backend::error::{ereport, sqlstate, BackendError, Result};
use crate::backend::funcs::{self, coerce_datum};
use crate::backend::process::Backend;
use crate::backend::spi::Attribute;
use crate::fmgr::{Datum, TypeId};
use std::cmp::Ordering;

/// What column references resolve against.
pub struct RowScope<'a> {
    /// Table name or alias of the source, if any
    pub relation: Option<&'a str>,
    pub columns: &'a [Attribute],
    /// `None` while evaluating the output of an aggregate query
    pub row: Option<&'a Row>,
    /// Precomputed aggregate values of an aggregate query
    pub aggregates: &'a [(Expr, Option<Datum>)],
}

impl<'a> RowScope<'a> {
    /// Scope with no source at all, for `SELECT 1` and `VALUES`.
    pub fn empty() -> RowScope<'static> {
        RowScope {
            relation: None,
            columns: &[],
            row: None,
            aggregates: &[],
        }
    }

    pub fn for_row(relation: Option<&'a str>, columns: &'a [Attribute], row: &'a Row) -> Self {
        Self {
            relation,
            columns,
            row: Some(row),
            aggregates: &[],
        }
    }

    fn resolve(&self, table: Option<&str>, name: &str) -> Result<Option<Datum>> {
        if let Some(table) = table {
            if self.relation != Some(table) {
                return Err(ereport!(
                    sqlstate::UNDEFINED_TABLE,
                    "missing FROM-clause entry for table \"{}\"",
                    table
                ));
            }
        }
        let index = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| undefined_column(table, name))?;
        match self.row {
            Some(row) => Ok(row.get(index).cloned().flatten()),
            None => Err(ereport!(
                sqlstate::GROUPING_ERROR,
                "column \"{}.{}\" must appear in the GROUP BY clause or be used in an aggregate function",
                self.relation.unwrap_or("?"),
                name
            )),
        }
    }
}

fn undefined_column(table: Option<&str>, name: &str) -> BackendError {
    match table {
        Some(t) => ereport!(sqlstate::UNDEFINED_COLUMN, "column {}.{} does not exist", t, name),
        None => ereport!(sqlstate::UNDEFINED_COLUMN, "column \"{}\" does not exist", name),
    }
}

fn literal_datum(literal: &Literal) -> Option<Datum> {
    match literal {
        Literal::Null => None,
        Literal::Bool(b) => Some(Datum::Bool(*b)),
        Literal::Integer(v) => Some(match i32::try_from(*v) {
            Ok(small) => Datum::Int4(small),
            Err(_) => Datum::Int8(*v),
        }),
        Literal::Float(v) => Some(Datum::Float8(*v)),
        Literal::String(s) => Some(Datum::Text(s.clone())),
    }
}

/// Resolve a type name as written in a cast.
pub fn lookup_type(name: &str) -> Result<TypeId> {
    TypeId::from_sql_name(name)
        .ok_or_else(|| ereport!(sqlstate::UNDEFINED_OBJECT, "type \"{}\" does not exist", name))
}

/// Interpret a value as a boolean condition.
pub fn datum_to_bool(datum: &Datum, context: &str) -> Result<bool> {
    match datum {
        Datum::Bool(b) => Ok(*b),
        Datum::Text(s) => crate::backend::settings::parse_bool(s).ok_or_else(|| {
            ereport!(sqlstate::INVALID_TEXT_REPRESENTATION, "invalid input syntax for type boolean: \"{}\"", s)
        }),
        other => Err(ereport!(
            sqlstate::DATATYPE_MISMATCH,
            "argument of {} must be type boolean, not type {}",
            context,
            other.type_id().name()
        )),
    }
}

fn numeric_rank(ty: TypeId) -> Option<u8> {
    match ty {
        TypeId::Int4 => Some(1),
        TypeId::Int8 => Some(2),
        TypeId::Float8 => Some(3),
        _ => None,
    }
}

/// Bring two operands to a common type. A text operand adopts the other side's
/// type, like an untyped literal does.
fn unify(left: Datum, right: Datum) -> Result<(Datum, Datum)> {
    let (lt, rt) = (left.type_id(), right.type_id());
    if lt == rt {
        return Ok((left, right));
    }
    match (numeric_rank(lt), numeric_rank(rt)) {
        (Some(a), Some(b)) => {
            let target = if a >= b { lt } else { rt };
            Ok((coerce_datum(left, target)?, coerce_datum(right, target)?))
        }
        _ if lt == TypeId::Text => Ok((coerce_datum(left, rt)?, right)),
        _ if rt == TypeId::Text => {
            let right = coerce_datum(right, lt)?;
            Ok((left, right))
        }
        _ => Err(ereport!(
            sqlstate::UNDEFINED_FUNCTION,
            "operator does not exist: {} = {}",
            lt.name(),
            rt.name()
        )),
    }
}

/// Total order over two non-null values of compatible types.
pub fn compare_datums(left: &Datum, right: &Datum) -> Result<Ordering> {
    let (left, right) = unify(left.clone(), right.clone())?;
    Ok(match (&left, &right) {
        (Datum::Bool(a), Datum::Bool(b)) => a.cmp(b),
        (Datum::Int4(a), Datum::Int4(b)) => a.cmp(b),
        (Datum::Int8(a), Datum::Int8(b)) => a.cmp(b),
        // NaN sorts above every other value
        (Datum::Float8(a), Datum::Float8(b)) => a.partial_cmp(b).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan())),
        (Datum::Text(a), Datum::Text(b)) => a.cmp(b),
        _ => Ordering::Equal,
    })
}

/// Sort order for nullable values: NULLs sort as larger than any value.
pub fn compare_nullable(left: &Option<Datum>, right: &Option<Datum>) -> Result<Ordering> {
    match (left, right) {
        (None, None) => Ok(Ordering::Equal),
        (None, Some(_)) => Ok(Ordering::Greater),
        (Some(_), None) => Ok(Ordering::Less),
        (Some(a), Some(b)) => compare_datums(a, b),
    }
}

fn arithmetic(op: BinaryOperator, left: Datum, right: Datum) -> Result<Datum> {
    let (lt, rt) = (left.type_id(), right.type_id());
    if numeric_rank(lt).is_none() && numeric_rank(rt).is_none() {
        return Err(ereport!(
            sqlstate::UNDEFINED_FUNCTION,
            "operator does not exist: {} {} {}",
            lt.name(),
            op.symbol(),
            rt.name()
        ));
    }
    let (left, right) = unify(left, right)?;
    let division_by_zero = || ereport!(sqlstate::DIVISION_BY_ZERO, "division by zero");
    match (left, right) {
        (Datum::Int4(a), Datum::Int4(b)) => {
            let out = match op {
                BinaryOperator::Plus => a.checked_add(b),
                BinaryOperator::Minus => a.checked_sub(b),
                BinaryOperator::Multiply => a.checked_mul(b),
                BinaryOperator::Divide | BinaryOperator::Modulo if b == 0 => return Err(division_by_zero()),
                BinaryOperator::Divide => a.checked_div(b),
                BinaryOperator::Modulo => Some(a.wrapping_rem(b)),
                _ => None,
            };
            out.map(Datum::Int4)
                .ok_or_else(|| ereport!(sqlstate::NUMERIC_VALUE_OUT_OF_RANGE, "integer out of range"))
        }
        (Datum::Int8(a), Datum::Int8(b)) => {
            let out = match op {
                BinaryOperator::Plus => a.checked_add(b),
                BinaryOperator::Minus => a.checked_sub(b),
                BinaryOperator::Multiply => a.checked_mul(b),
                BinaryOperator::Divide | BinaryOperator::Modulo if b == 0 => return Err(division_by_zero()),
                BinaryOperator::Divide => a.checked_div(b),
                BinaryOperator::Modulo => Some(a.wrapping_rem(b)),
                _ => None,
            };
            out.map(Datum::Int8)
                .ok_or_else(|| ereport!(sqlstate::NUMERIC_VALUE_OUT_OF_RANGE, "bigint out of range"))
        }
        (Datum::Float8(a), Datum::Float8(b)) => {
            let out = match op {
                BinaryOperator::Plus => a + b,
                BinaryOperator::Minus => a - b,
                BinaryOperator::Multiply => a * b,
                BinaryOperator::Divide | BinaryOperator::Modulo if b == 0.0 => return Err(division_by_zero()),
                BinaryOperator::Divide => a / b,
                BinaryOperator::Modulo => a % b,
                _ => return Err(BackendError::internal("unexpected arithmetic operator")),
            };
            if out.is_infinite() && a.is_finite() && b.is_finite() {
                return Err(ereport!(sqlstate::NUMERIC_VALUE_OUT_OF_RANGE, "value out of range: overflow"));
            }
            Ok(Datum::Float8(out))
        }
        (l, r) => Err(ereport!(
            sqlstate::UNDEFINED_FUNCTION,
            "operator does not exist: {} {} {}",
            l.type_id().name(),
            op.symbol(),
            r.type_id().name()
        )),
    }
}

fn compare_op(op: BinaryOperator, left: &Datum, right: &Datum) -> Result<bool> {
    let ord = compare_datums(left, right)?;
    Ok(match op {
        BinaryOperator::Eq => ord == Ordering::Equal,
        BinaryOperator::NotEq => ord != Ordering::Equal,
        BinaryOperator::Lt => ord == Ordering::Less,
        BinaryOperator::LtEq => ord != Ordering::Greater,
        BinaryOperator::Gt => ord == Ordering::Greater,
        BinaryOperator::GtEq => ord != Ordering::Less,
        _ => false,
    })
}

fn no_such_function(name: &str, args: &[Option<Datum>]) -> BackendError {
    let types: Vec<TypeId> = args
        .iter()
        .map(|a| a.as_ref().map(Datum::type_id).unwrap_or(TypeId::Text))
        .collect();
    ereport!(
        sqlstate::UNDEFINED_FUNCTION,
        "function {} does not exist",
        catalog::signature(name, &types)
    )
    .with_hint("No function matches the given name and argument types. You might need to add explicit type casts.")
}

fn datum_to_oid(datum: &Datum) -> Result<u32> {
    let raw = match datum {
        Datum::Int4(v) => *v as i64,
        Datum::Int8(v) => *v,
        Datum::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| ereport!(sqlstate::INVALID_TEXT_REPRESENTATION, "invalid input syntax for type oid: \"{}\"", s))?,
        other => {
            return Err(ereport!(
                sqlstate::DATATYPE_MISMATCH,
                "cannot use type {} as oid",
                other.type_id().name()
            ))
        }
    };
    u32::try_from(raw).map_err(|_| ereport!(sqlstate::NUMERIC_VALUE_OUT_OF_RANGE, "OID out of range"))
}

impl Backend {
    pub fn eval_expr(&mut self, expr: &Expr, scope: &RowScope<'_>) -> Result<Option<Datum>> {
        match expr {
            Expr::Literal(literal) => Ok(literal_datum(literal)),
            Expr::Column { table, name } => scope.resolve(table.as_deref(), name),
            Expr::SqlValue(kind) => Ok(match kind {
                SqlValueFunction::CurrentUser | SqlValueFunction::SessionUser => {
                    self.session_user.clone().map(Datum::Text)
                }
                SqlValueFunction::CurrentCatalog => self.database.as_ref().map(|db| Datum::Text(db.name.clone())),
            }),
            Expr::IsNull { expr, negated } => {
                let value = self.eval_expr(expr, scope)?;
                Ok(Some(Datum::Bool(value.is_none() != *negated)))
            }
            Expr::Cast { expr, type_name } => {
                let target = lookup_type(type_name)?;
                self.eval_expr(expr, scope)?
                    .map(|d| coerce_datum(d, target))
                    .transpose()
            }
            Expr::UnaryOp { op, expr } => {
                let Some(value) = self.eval_expr(expr, scope)? else {
                    return Ok(None);
                };
                match op {
                    UnaryOperator::Not => Ok(Some(Datum::Bool(!datum_to_bool(&value, "NOT")?))),
                    UnaryOperator::Plus => Ok(Some(value)),
                    UnaryOperator::Minus => match value {
                        Datum::Int4(v) => v
                            .checked_neg()
                            .map(|v| Some(Datum::Int4(v)))
                            .ok_or_else(|| ereport!(sqlstate::NUMERIC_VALUE_OUT_OF_RANGE, "integer out of range")),
                        Datum::Int8(v) => v
                            .checked_neg()
                            .map(|v| Some(Datum::Int8(v)))
                            .ok_or_else(|| ereport!(sqlstate::NUMERIC_VALUE_OUT_OF_RANGE, "bigint out of range")),
                        Datum::Float8(v) => Ok(Some(Datum::Float8(-v))),
                        other => Err(ereport!(
                            sqlstate::UNDEFINED_FUNCTION,
                            "operator does not exist: - {}",
                            other.type_id().name()
                        )),
                    },
                }
            }
            Expr::BinaryOp { left, op, right } => self.eval_binary(left, *op, right, scope),
            Expr::FunctionCall { name, args, star } => {
                if crate::backend::sql::ast::is_aggregate(name) {
                    return scope
                        .aggregates
                        .iter()
                        .find(|(agg, _)| agg == expr)
                        .map(|(_, value)| value.clone())
                        .ok_or_else(|| {
                            ereport!(sqlstate::GROUPING_ERROR, "aggregate functions are not allowed in this context")
                        });
                }
                if *star {
                    return Err(ereport!(
                        sqlstate::SYNTAX_ERROR,
                        "{}(*) specified, but {} is not an aggregate function",
                        name,
                        name
                    ));
                }
                self.eval_function(name, args, scope)
            }
        }
    }

    fn eval_binary(
        &mut self,
        left: &Expr,
        op: BinaryOperator,
        right: &Expr,
        scope: &RowScope<'_>,
    ) -> Result<Option<Datum>> {
        match op {
            BinaryOperator::And | BinaryOperator::Or => {
                let is_and = op == BinaryOperator::And;
                let l = self
                    .eval_expr(left, scope)?
                    .map(|d| datum_to_bool(&d, op.symbol()))
                    .transpose()?;
                // Short circuit: FALSE AND x, TRUE OR x
                if l == Some(!is_and) {
                    return Ok(Some(Datum::Bool(!is_and)));
                }
                let r = self
                    .eval_expr(right, scope)?
                    .map(|d| datum_to_bool(&d, op.symbol()))
                    .transpose()?;
                Ok(match (l, r) {
                    (_, Some(v)) if v == !is_and => Some(Datum::Bool(v)),
                    (Some(_), Some(v)) => Some(Datum::Bool(v)),
                    _ => None,
                })
            }
            _ => {
                let l = self.eval_expr(left, scope)?;
                let r = self.eval_expr(right, scope)?;
                let (Some(l), Some(r)) = (l, r) else {
                    return Ok(None);
                };
                match op {
                    BinaryOperator::Concat => Ok(Some(Datum::Text(format!("{}{}", l.output(), r.output())))),
                    BinaryOperator::Eq
                    | BinaryOperator::NotEq
                    | BinaryOperator::Lt
                    | BinaryOperator::LtEq
                    | BinaryOperator::Gt
                    | BinaryOperator::GtEq => Ok(Some(Datum::Bool(compare_op(op, &l, &r)?))),
                    _ => arithmetic(op, l, r).map(Some),
                }
            }
        }
    }

    fn eval_function(&mut self, name: &str, args: &[Expr], scope: &RowScope<'_>) -> Result<Option<Datum>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg, scope)?);
        }

        match (name, values.len()) {
            ("coalesce", n) if n > 0 => return Ok(values.into_iter().flatten().next()),
            ("current_database", 0) => {
                return Ok(self.database.as_ref().map(|db| Datum::Text(db.name.clone())))
            }
            ("current_setting", 1) => {
                let Some(setting) = &values[0] else { return Ok(None) };
                let value = self.settings()?.get(&setting.output())?.to_string();
                return Ok(Some(Datum::Text(value)));
            }
            ("pg_backend_pid", 0) => return Ok(Some(Datum::Int4(self.globals.my_proc_pid as i32))),
            ("shobj_description", 2) => {
                let (Some(oid), Some(catalog_name)) = (&values[0], &values[1]) else {
                    return Ok(None);
                };
                if catalog_name.output() != "pg_database" {
                    return Ok(None);
                }
                let oid = datum_to_oid(oid)?;
                return Ok(self
                    .shared()?
                    .catalog
                    .database_by_oid(oid)
                    .and_then(|d| d.description.clone())
                    .map(Datum::Text));
            }
            _ => {}
        }

        let catalog_def = self
            .database
            .as_ref()
            .and_then(|db| db.image.functions.get(name))
            .filter(|def| def.arg_types.len() == values.len())
            .cloned();
        if let Some(def) = catalog_def {
            return self.call_function(&def, values);
        }
        match funcs::builtin_by_name(name, values.len()) {
            Some(builtin) => funcs::call_builtin(builtin, values),
            None => Err(no_such_function(name, &values)),
        }
    }

    /// Static result type of `expr` over a source with columns `columns`.
    pub fn infer_type(&self, expr: &Expr, columns: &[Attribute]) -> TypeId {
        match expr {
            Expr::Literal(Literal::Integer(v)) if i32::try_from(*v).is_ok() => TypeId::Int4,
            Expr::Literal(Literal::Integer(_)) => TypeId::Int8,
            Expr::Literal(Literal::Float(_)) => TypeId::Float8,
            Expr::Literal(Literal::Bool(_)) => TypeId::Bool,
            Expr::Literal(_) => TypeId::Text,
            Expr::Column { name, .. } => columns
                .iter()
                .find(|c| &c.name == name)
                .map(|c| c.type_id)
                .unwrap_or(TypeId::Text),
            Expr::SqlValue(_) => TypeId::Text,
            Expr::IsNull { .. } => TypeId::Bool,
            Expr::Cast { type_name, .. } => TypeId::from_sql_name(type_name).unwrap_or(TypeId::Text),
            Expr::UnaryOp { op: UnaryOperator::Not, .. } => TypeId::Bool,
            Expr::UnaryOp { expr, .. } => self.infer_type(expr, columns),
            Expr::BinaryOp { left, op, right } => match op {
                BinaryOperator::Concat => TypeId::Text,
                BinaryOperator::Plus
                | BinaryOperator::Minus
                | BinaryOperator::Multiply
                | BinaryOperator::Divide
                | BinaryOperator::Modulo => {
                    let (l, r) = (self.infer_type(left, columns), self.infer_type(right, columns));
                    match (numeric_rank(l), numeric_rank(r)) {
                        (Some(a), Some(b)) => if a >= b { l } else { r },
                        (Some(_), None) => l,
                        (None, Some(_)) => r,
                        (None, None) => TypeId::Text,
                    }
                }
                _ => TypeId::Bool,
            },
            Expr::FunctionCall { name, args, .. } => {
                let first = || args.first().map(|a| self.infer_type(a, columns)).unwrap_or(TypeId::Text);
                match name.as_str() {
                    "count" => TypeId::Int8,
                    "sum" => match first() {
                        TypeId::Float8 => TypeId::Float8,
                        _ => TypeId::Int8,
                    },
                    "min" | "max" | "coalesce" => first(),
                    "current_database" | "current_setting" | "shobj_description" => TypeId::Text,
                    "pg_backend_pid" => TypeId::Int4,
                    _ => {
                        let ret = self
                            .database
                            .as_ref()
                            .and_then(|db| db.image.functions.get(name))
                            .map(|def| def.return_type)
                            .or_else(|| funcs::builtin_by_name(name, args.len()).map(|b| b.ret))
                            .unwrap_or(TypeId::Text);
                        if ret == TypeId::Void {
                            TypeId::Text
                        } else {
                            ret
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_overflow_and_division() {
        let err = arithmetic(BinaryOperator::Plus, Datum::Int4(i32::MAX), Datum::Int4(1)).unwrap_err();
        assert_eq!(err.message, "integer out of range");
        let err = arithmetic(BinaryOperator::Multiply, Datum::Int8(i64::MAX), Datum::Int4(2)).unwrap_err();
        assert_eq!(err.message, "bigint out of range");
        let err = arithmetic(BinaryOperator::Divide, Datum::Int4(1), Datum::Int4(0)).unwrap_err();
        assert_eq!(err.code, sqlstate::DIVISION_BY_ZERO);

        assert_eq!(
            arithmetic(BinaryOperator::Divide, Datum::Int4(7), Datum::Int4(2)).unwrap(),
            Datum::Int4(3)
        );
        assert_eq!(
            arithmetic(BinaryOperator::Plus, Datum::Int4(1), Datum::Float8(0.5)).unwrap(),
            Datum::Float8(1.5)
        );
        assert_eq!(
            arithmetic(BinaryOperator::Plus, Datum::Text("2".into()), Datum::Int4(1)).unwrap(),
            Datum::Int4(3)
        );
    }

    #[test]
    fn test_comparisons_across_types() {
        assert_eq!(compare_datums(&Datum::Int4(2), &Datum::Int8(10)).unwrap(), Ordering::Less);
        assert_eq!(compare_datums(&Datum::Text("5".into()), &Datum::Int4(5)).unwrap(), Ordering::Equal);
        assert_eq!(
            compare_datums(&Datum::Text("b".into()), &Datum::Text("a".into())).unwrap(),
            Ordering::Greater
        );
        assert!(compare_datums(&Datum::Bool(true), &Datum::Int4(1)).is_err());
    }

    #[test]
    fn test_nulls_sort_last() {
        assert_eq!(compare_nullable(&None, &Some(Datum::Int4(1))).unwrap(), Ordering::Greater);
        assert_eq!(compare_nullable(&None, &None).unwrap(), Ordering::Equal);
    }

    #[test]
    fn test_scope_resolution() {
        let columns = vec![Attribute::new("id", TypeId::Int4)];
        let row = vec![Some(Datum::Int4(9))];
        let scope = RowScope::for_row(Some("t"), &columns, &row);
        assert_eq!(scope.resolve(Some("t"), "id").unwrap(), Some(Datum::Int4(9)));
        assert_eq!(scope.resolve(None, "nope").unwrap_err().code, sqlstate::UNDEFINED_COLUMN);
        assert_eq!(scope.resolve(Some("u"), "id").unwrap_err().code, sqlstate::UNDEFINED_TABLE);
    }

    #[test]
    fn test_condition_types() {
        assert!(datum_to_bool(&Datum::Bool(true), "WHERE").unwrap());
        assert!(datum_to_bool(&Datum::Text("f".into()), "WHERE").is_ok());
        let err = datum_to_bool(&Datum::Int4(1), "WHERE").unwrap_err();
        assert_eq!(err.message, "argument of WHERE must be type boolean, not type integer");
    }
}
