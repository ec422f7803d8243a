//! Statement execution
//!
//! Row sources are materialized before evaluation: a scan copies the rows of
//! a relation, runs a view's query, or builds a virtual catalog. Filtering,
//! aggregation, sorting and projection then work on the copy.

use super::ast::{
    is_aggregate, DeleteStmt, Expr, InsertStmt, SelectColumn, SelectStmt, Statement, TableRef, UpdateStmt,
};
use super::eval::{compare_datums, compare_nullable, datum_to_bool, RowScope};
use crate::backend::catalog::{ColumnDef, Relation, Row};
use crate::backend::error::{ereport, sqlstate, BackendError, Result};
use crate::backend::funcs::coerce_datum;
use crate::backend::process::Backend;
use crate::backend::spi::{Attribute, SpiStatus, TupleTable};
use crate::fmgr::{Datum, TypeId};
use std::cmp::Ordering;
use tracing::debug;

/// Views may reference views this deep.
const MAX_VIEW_DEPTH: usize = 16;

/// Outcome of one statement.
#[derive(Debug)]
pub struct ExecResult {
    pub status: SpiStatus,
    pub processed: u64,
    pub tuples: Option<TupleTable>,
}

impl ExecResult {
    pub fn utility() -> Self {
        Self {
            status: SpiStatus::Utility,
            processed: 0,
            tuples: None,
        }
    }

    fn rows(status: SpiStatus, table: TupleTable) -> Self {
        Self {
            status,
            processed: table.rows.len() as u64,
            tuples: Some(table),
        }
    }
}

/// A materialized row source.
struct Source {
    name: Option<String>,
    desc: Vec<Attribute>,
    rows: Vec<Row>,
}

fn attributes(columns: &[ColumnDef]) -> Vec<Attribute> {
    columns.iter().map(|c| Attribute::new(c.name.clone(), c.type_id)).collect()
}

fn format_row(row: &Row) -> String {
    let values: Vec<String> = row
        .iter()
        .map(|v| v.as_ref().map(Datum::output).unwrap_or_else(|| "null".to_string()))
        .collect();
    format!("({})", values.join(", "))
}

/// Check NOT NULL and primary key constraints of `candidate` rows, which
/// replace the rows with ids in `replaced`.
fn check_constraints(relation: &Relation, candidate: &[(u64, Row)]) -> Result<()> {
    for (_, row) in candidate {
        for (idx, column) in relation.columns.iter().enumerate() {
            if column.not_null && row.get(idx).map_or(true, Option::is_none) {
                return Err(ereport!(
                    sqlstate::NOT_NULL_VIOLATION,
                    "null value in column \"{}\" of relation \"{}\" violates not-null constraint",
                    column.name,
                    relation.name
                )
                .with_detail(format!("Failing row contains {}.", format_row(row))));
            }
        }
    }

    let Some(pk) = relation.primary_key else {
        return Ok(());
    };
    let candidate_ids: Vec<u64> = candidate.iter().map(|(id, _)| *id).collect();
    let existing = relation
        .rows
        .iter()
        .filter(|(id, _)| !candidate_ids.contains(id))
        .map(|(_, row)| row);
    let mut seen: Vec<&Datum> = existing.filter_map(|row| row.get(pk).and_then(Option::as_ref)).collect();
    for (_, row) in candidate {
        let Some(key) = row.get(pk).and_then(Option::as_ref) else {
            continue;
        };
        for other in &seen {
            if compare_datums(key, other)? == Ordering::Equal {
                return Err(ereport!(
                    sqlstate::UNIQUE_VIOLATION,
                    "duplicate key value violates unique constraint \"{}\"",
                    relation.constraint_name()
                )
                .with_detail(format!(
                    "Key ({})=({}) already exists.",
                    relation.columns[pk].name,
                    key.output()
                )));
            }
        }
        seen.push(key);
    }
    Ok(())
}

fn collect_aggregates(expr: &Expr, out: &mut Vec<Expr>) -> Result<()> {
    match expr {
        Expr::FunctionCall { name, args, .. } if is_aggregate(name) => {
            if args.iter().any(Expr::contains_aggregate) {
                return Err(ereport!(sqlstate::GROUPING_ERROR, "aggregate function calls cannot be nested"));
            }
            if !out.contains(expr) {
                out.push(expr.clone());
            }
            Ok(())
        }
        Expr::FunctionCall { args, .. } => args.iter().try_for_each(|a| collect_aggregates(a, out)),
        Expr::BinaryOp { left, right, .. } => {
            collect_aggregates(left, out)?;
            collect_aggregates(right, out)
        }
        Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } | Expr::Cast { expr, .. } => {
            collect_aggregates(expr, out)
        }
        _ => Ok(()),
    }
}

fn sum_values(values: Vec<Datum>) -> Result<Option<Datum>> {
    let mut int_sum: Option<i64> = None;
    let mut float_sum: Option<f64> = None;
    for value in values {
        match value {
            Datum::Int4(v) => int_sum = Some(add_int(int_sum, v as i64)?),
            Datum::Int8(v) => int_sum = Some(add_int(int_sum, v)?),
            Datum::Float8(v) => float_sum = Some(float_sum.unwrap_or(0.0) + v),
            other => {
                return Err(ereport!(
                    sqlstate::UNDEFINED_FUNCTION,
                    "function sum({}) does not exist",
                    other.type_id().name()
                ))
            }
        }
    }
    Ok(match (int_sum, float_sum) {
        (None, None) => None,
        (Some(i), None) => Some(Datum::Int8(i)),
        (i, Some(f)) => Some(Datum::Float8(f + i.unwrap_or(0) as f64)),
    })
}

fn add_int(acc: Option<i64>, v: i64) -> Result<i64> {
    acc.unwrap_or(0)
        .checked_add(v)
        .ok_or_else(|| ereport!(sqlstate::NUMERIC_VALUE_OUT_OF_RANGE, "bigint out of range"))
}

fn not_allowed_read_only(tag: &str) -> BackendError {
    ereport!(sqlstate::FEATURE_NOT_SUPPORTED, "{} is not allowed in a non-volatile function", tag)
}

impl Backend {
    /// Execute one parsed statement inside the open transaction.
    pub fn execute_statement(&mut self, statement: &Statement, read_only: bool) -> Result<ExecResult> {
        if read_only && !matches!(statement, Statement::Select(_) | Statement::Show { .. }) {
            return Err(not_allowed_read_only(statement.tag()));
        }
        match statement {
            Statement::Select(select) => {
                let table = self.run_select(select, 0)?;
                Ok(ExecResult::rows(SpiStatus::Select, table))
            }
            Statement::Insert(insert) => self.exec_insert(insert),
            Statement::Update(update) => self.exec_update(update),
            Statement::Delete(delete) => self.exec_delete(delete),
            Statement::CreateTable(create) => self.create_table(create).map(|_| ExecResult::utility()),
            Statement::DropTable { name, if_exists } => {
                self.drop_table(name, *if_exists).map(|_| ExecResult::utility())
            }
            Statement::CreateView { name, or_replace, query } => {
                self.create_view(name, *or_replace, query).map(|_| ExecResult::utility())
            }
            Statement::DropView { name, if_exists } => self.drop_view(name, *if_exists).map(|_| ExecResult::utility()),
            Statement::CreateFunction(create) => self.create_function(create).map(|_| ExecResult::utility()),
            Statement::DropFunction { name, if_exists } => {
                self.drop_function(name, *if_exists).map(|_| ExecResult::utility())
            }
            Statement::CreateExtension {
                name,
                if_not_exists,
                version,
            } => self
                .create_extension(name, *if_not_exists, version.as_deref())
                .map(|_| ExecResult::utility()),
            Statement::DropExtension { name, if_exists } => {
                self.drop_extension(name, *if_exists).map(|_| ExecResult::utility())
            }
            Statement::CommentOnDatabase { name, comment } => {
                self.comment_on_database(name, comment.as_deref()).map(|_| ExecResult::utility())
            }
            Statement::Notify { channel, payload } => {
                self.async_notify(channel, payload.as_deref()).map(|_| ExecResult::utility())
            }
            Statement::Listen { channel } => self.async_listen(channel).map(|_| ExecResult::utility()),
            Statement::Unlisten { channel: Some(channel) } => {
                self.async_unlisten(channel).map(|_| ExecResult::utility())
            }
            Statement::Unlisten { channel: None } => self.async_unlisten_all().map(|_| ExecResult::utility()),
            Statement::Show { name } => self.exec_show(name.as_deref()),
            Statement::Set { name, value } => {
                let superuser = self.is_superuser();
                self.settings_mut()?.set_session(name, value, superuser)?;
                Ok(ExecResult::utility())
            }
            Statement::TransactionControl(kind) => Err(ereport!(
                sqlstate::FEATURE_NOT_SUPPORTED,
                "{} cannot be executed through the statement interface",
                kind.tag()
            )
            .with_hint("Use begin(), commit() and rollback() to control transactions.")),
            Statement::CreateDatabase { .. } => Err(ereport!(
                sqlstate::ACTIVE_SQL_TRANSACTION,
                "CREATE DATABASE cannot be executed from a function"
            )),
        }
    }

    fn scan_source(&mut self, table: &TableRef, depth: usize) -> Result<Source> {
        let label = Some(table.alias.clone().unwrap_or_else(|| table.name.clone()));
        let image = &self.database()?.image;

        if let Some(relation) = image.relations.get(&table.name) {
            return Ok(Source {
                name: label,
                desc: attributes(&relation.columns),
                rows: relation.rows.values().cloned().collect(),
            });
        }
        if let Some(view) = image.views.get(&table.name) {
            if depth >= MAX_VIEW_DEPTH {
                return Err(ereport!(
                    sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
                    "infinite recursion detected in rules for relation \"{}\"",
                    table.name
                ));
            }
            let query = view.query.clone();
            let result = self.run_select(&query, depth + 1)?;
            return Ok(Source {
                name: label,
                desc: result.desc,
                rows: result.rows,
            });
        }
        if let Some(table_data) = self.virtual_catalog(&table.name)? {
            return Ok(Source {
                name: label,
                desc: table_data.desc,
                rows: table_data.rows,
            });
        }
        Err(ereport!(sqlstate::UNDEFINED_TABLE, "relation \"{}\" does not exist", table.name))
    }

    pub(crate) fn run_select(&mut self, select: &SelectStmt, depth: usize) -> Result<TupleTable> {
        let source = match &select.from {
            Some(table) => self.scan_source(table, depth)?,
            None => Source {
                name: None,
                desc: Vec::new(),
                rows: vec![Vec::new()],
            },
        };

        let mut rows = Vec::with_capacity(source.rows.len());
        match &select.where_clause {
            Some(predicate) => {
                if predicate.contains_aggregate() {
                    return Err(ereport!(sqlstate::GROUPING_ERROR, "aggregate functions are not allowed in WHERE"));
                }
                for row in source.rows {
                    let scope = RowScope::for_row(source.name.as_deref(), &source.desc, &row);
                    let keep = match self.eval_expr(predicate, &scope)? {
                        Some(value) => datum_to_bool(&value, "WHERE")?,
                        None => false,
                    };
                    if keep {
                        rows.push(row);
                    }
                }
            }
            None => rows = source.rows,
        }

        // Expand the target list
        let mut targets: Vec<(String, Expr)> = Vec::new();
        for column in &select.columns {
            match column {
                SelectColumn::Star => {
                    if select.from.is_none() {
                        return Err(ereport!(sqlstate::SYNTAX_ERROR, "SELECT * with no tables specified is not valid"));
                    }
                    for attr in &source.desc {
                        targets.push((
                            attr.name.clone(),
                            Expr::Column {
                                table: None,
                                name: attr.name.clone(),
                            },
                        ));
                    }
                }
                SelectColumn::Expr(expr, alias) => {
                    targets.push((alias.clone().unwrap_or_else(|| expr.default_name()), expr.clone()));
                }
            }
        }
        let desc: Vec<Attribute> = targets
            .iter()
            .map(|(name, expr)| Attribute::new(name.clone(), self.infer_type(expr, &source.desc)))
            .collect();

        let aggregate_query = targets.iter().any(|(_, e)| e.contains_aggregate())
            || select.order_by.iter().any(|o| o.expr.contains_aggregate());

        // (output row, sort keys)
        let mut output: Vec<(Row, Vec<Option<Datum>>)> = Vec::new();
        if aggregate_query {
            let mut aggregates = Vec::new();
            for (_, expr) in &targets {
                collect_aggregates(expr, &mut aggregates)?;
            }
            for order in &select.order_by {
                collect_aggregates(&order.expr, &mut aggregates)?;
            }
            let mut values = Vec::with_capacity(aggregates.len());
            for aggregate in aggregates {
                let value = self.compute_aggregate(&aggregate, source.name.as_deref(), &source.desc, &rows)?;
                values.push((aggregate, value));
            }
            let scope = RowScope {
                relation: source.name.as_deref(),
                columns: &source.desc,
                row: None,
                aggregates: &values,
            };
            let row = self.project(&targets, &scope)?;
            output.push((row, Vec::new()));
        } else {
            for row in &rows {
                let scope = RowScope::for_row(source.name.as_deref(), &source.desc, row);
                let projected = self.project(&targets, &scope)?;
                let mut keys = Vec::with_capacity(select.order_by.len());
                for order in &select.order_by {
                    keys.push(self.sort_key(&order.expr, &targets, &projected, &scope)?);
                }
                output.push((projected, keys));
            }
        }

        if !select.order_by.is_empty() && output.len() > 1 {
            let mut failure = None;
            output.sort_by(|(_, a), (_, b)| {
                for (idx, order) in select.order_by.iter().enumerate() {
                    match compare_nullable(&a[idx], &b[idx]) {
                        Ok(Ordering::Equal) => continue,
                        Ok(ord) => return if order.asc { ord } else { ord.reverse() },
                        Err(err) => {
                            failure.get_or_insert(err);
                            return Ordering::Equal;
                        }
                    }
                }
                Ordering::Equal
            });
            if let Some(err) = failure {
                return Err(err);
            }
        }

        let offset = select.offset.unwrap_or(0) as usize;
        let limit = select.limit.map(|l| l as usize).unwrap_or(usize::MAX);
        let mut table = TupleTable::new(desc);
        table.rows = output.into_iter().skip(offset).take(limit).map(|(row, _)| row).collect();
        Ok(table)
    }

    fn project(&mut self, targets: &[(String, Expr)], scope: &RowScope<'_>) -> Result<Row> {
        let mut row = Vec::with_capacity(targets.len());
        for (_, expr) in targets {
            row.push(self.eval_expr(expr, scope)?);
        }
        Ok(row)
    }

    /// ORDER BY accepts output ordinals and output column names besides
    /// arbitrary expressions over the source row.
    fn sort_key(
        &mut self,
        expr: &Expr,
        targets: &[(String, Expr)],
        projected: &Row,
        scope: &RowScope<'_>,
    ) -> Result<Option<Datum>> {
        match expr {
            Expr::Literal(super::ast::Literal::Integer(n)) => {
                let idx = usize::try_from(*n)
                    .ok()
                    .filter(|n| *n >= 1 && *n <= targets.len())
                    .ok_or_else(|| {
                        ereport!(
                            sqlstate::INVALID_COLUMN_REFERENCE,
                            "ORDER BY position {} is not in select list",
                            n
                        )
                    })?;
                Ok(projected[idx - 1].clone())
            }
            Expr::Column { table: None, name } => {
                match targets.iter().position(|(out, _)| out == name) {
                    Some(idx) if !scope.columns.iter().any(|c| &c.name == name) => Ok(projected[idx].clone()),
                    _ => self.eval_expr(expr, scope),
                }
            }
            _ => self.eval_expr(expr, scope),
        }
    }

    fn compute_aggregate(
        &mut self,
        aggregate: &Expr,
        relation: Option<&str>,
        columns: &[Attribute],
        rows: &[Row],
    ) -> Result<Option<Datum>> {
        let Expr::FunctionCall { name, args, star } = aggregate else {
            return Err(BackendError::internal("not an aggregate"));
        };
        if *star {
            if name != "count" {
                return Err(ereport!(sqlstate::SYNTAX_ERROR, "{}(*) is not supported", name));
            }
            return Ok(Some(Datum::Int8(rows.len() as i64)));
        }
        let [arg] = args.as_slice() else {
            return Err(ereport!(
                sqlstate::UNDEFINED_FUNCTION,
                "function {} with {} arguments does not exist",
                name,
                args.len()
            ));
        };

        let mut values = Vec::new();
        for row in rows {
            let scope = RowScope::for_row(relation, columns, row);
            if let Some(value) = self.eval_expr(arg, &scope)? {
                values.push(value);
            }
        }

        match name.as_str() {
            "count" => Ok(Some(Datum::Int8(values.len() as i64))),
            "sum" => sum_values(values),
            "min" | "max" => {
                let want = if name == "min" { Ordering::Less } else { Ordering::Greater };
                let mut best: Option<Datum> = None;
                for value in values {
                    best = match best {
                        Some(current) if compare_datums(&value, &current)? != want => Some(current),
                        _ => Some(value),
                    };
                }
                Ok(best)
            }
            other => Err(ereport!(sqlstate::UNDEFINED_FUNCTION, "function {} does not exist", other)),
        }
    }

    fn relation_for_write(&self, name: &str) -> Result<&Relation> {
        let image = &self.database()?.image;
        if let Some(relation) = image.relations.get(name) {
            return Ok(relation);
        }
        if image.views.contains_key(name) {
            return Err(ereport!(
                sqlstate::WRONG_OBJECT_TYPE,
                "cannot change view \"{}\"",
                name
            )
            .with_detail("Views are not automatically updatable."));
        }
        Err(ereport!(sqlstate::UNDEFINED_TABLE, "relation \"{}\" does not exist", name))
    }

    fn returning(
        &mut self,
        list: &[SelectColumn],
        relation: &str,
        columns: &[Attribute],
        rows: &[Row],
        status: SpiStatus,
    ) -> Result<ExecResult> {
        let mut targets = Vec::new();
        for column in list {
            match column {
                SelectColumn::Star => {
                    for attr in columns {
                        targets.push((
                            attr.name.clone(),
                            Expr::Column {
                                table: None,
                                name: attr.name.clone(),
                            },
                        ));
                    }
                }
                SelectColumn::Expr(expr, alias) => {
                    targets.push((alias.clone().unwrap_or_else(|| expr.default_name()), expr.clone()))
                }
            }
        }
        let desc = targets
            .iter()
            .map(|(name, expr)| Attribute::new(name.clone(), self.infer_type(expr, columns)))
            .collect();
        let mut table = TupleTable::new(desc);
        for row in rows {
            let scope = RowScope::for_row(Some(relation), columns, row);
            table.rows.push(self.project(&targets, &scope)?);
        }
        Ok(ExecResult::rows(status, table))
    }

    fn exec_insert(&mut self, insert: &InsertStmt) -> Result<ExecResult> {
        let relation = self.relation_for_write(&insert.table)?;
        let columns = relation.columns.clone();
        let targets: Vec<usize> = match &insert.columns {
            Some(names) => names
                .iter()
                .map(|n| {
                    relation.column_index(n).ok_or_else(|| {
                        ereport!(
                            sqlstate::UNDEFINED_COLUMN,
                            "column \"{}\" of relation \"{}\" does not exist",
                            n,
                            insert.table
                        )
                    })
                })
                .collect::<Result<_>>()?,
            None => (0..columns.len()).collect(),
        };

        let mut value_rows = Vec::with_capacity(insert.values.len());
        for values in &insert.values {
            if values.len() > targets.len() {
                return Err(ereport!(sqlstate::SYNTAX_ERROR, "INSERT has more expressions than target columns"));
            }
            if values.len() < targets.len() && insert.columns.is_some() {
                return Err(ereport!(sqlstate::SYNTAX_ERROR, "INSERT has more target columns than expressions"));
            }
            let mut row: Vec<Option<Option<Datum>>> = vec![None; columns.len()];
            for (expr, &idx) in values.iter().zip(&targets) {
                let value = self.eval_expr(expr, &RowScope::empty())?;
                let value = value.map(|d| coerce_datum(d, columns[idx].type_id)).transpose()?;
                row[idx] = Some(value);
            }
            value_rows.push(row);
        }

        let database = self.database_mut()?;
        let relation = database
            .image
            .relations
            .get_mut(&insert.table)
            .ok_or_else(|| BackendError::internal("relation vanished during INSERT"))?;
        let mut candidate = Vec::with_capacity(value_rows.len());
        for (offset, row) in value_rows.into_iter().enumerate() {
            let mut full = Vec::with_capacity(columns.len());
            for (idx, given) in row.into_iter().enumerate() {
                let value = match given {
                    Some(value) => value,
                    None if columns[idx].serial => {
                        relation.sequence += 1;
                        Some(match columns[idx].type_id {
                            TypeId::Int4 => Datum::Int4(i32::try_from(relation.sequence).map_err(|_| {
                                ereport!(
                                    sqlstate::OBJECT_NOT_IN_PREREQUISITE_STATE,
                                    "nextval: reached maximum value of sequence \"{}_{}_seq\"",
                                    relation.name,
                                    columns[idx].name
                                )
                            })?),
                            _ => Datum::Int8(relation.sequence),
                        })
                    }
                    None => None,
                };
                full.push(value);
            }
            candidate.push((relation.next_row_id + offset as u64, full));
        }
        check_constraints(relation, &candidate)?;

        let inserted: Vec<Row> = candidate.iter().map(|(_, row)| row.clone()).collect();
        for (id, row) in candidate {
            relation.rows.insert(id, row);
        }
        relation.next_row_id += inserted.len() as u64;
        self.xact.database_dirty = true;
        debug!(table = %insert.table, rows = inserted.len(), "INSERT");

        match &insert.returning {
            Some(list) => self.returning(list, &insert.table, &attributes(&columns), &inserted, SpiStatus::InsertReturning),
            None => Ok(ExecResult {
                status: SpiStatus::Insert,
                processed: inserted.len() as u64,
                tuples: None,
            }),
        }
    }

    /// Row ids and rows of `table` matching `predicate`.
    fn matching_rows(&mut self, table: &str, predicate: Option<&Expr>) -> Result<Vec<(u64, Row)>> {
        let relation = self.relation_for_write(table)?;
        let desc = attributes(&relation.columns);
        let rows: Vec<(u64, Row)> = relation.rows.iter().map(|(id, row)| (*id, row.clone())).collect();
        let Some(predicate) = predicate else {
            return Ok(rows);
        };
        if predicate.contains_aggregate() {
            return Err(ereport!(sqlstate::GROUPING_ERROR, "aggregate functions are not allowed in WHERE"));
        }
        let mut matched = Vec::new();
        for (id, row) in rows {
            let scope = RowScope::for_row(Some(table), &desc, &row);
            if let Some(value) = self.eval_expr(predicate, &scope)? {
                if datum_to_bool(&value, "WHERE")? {
                    matched.push((id, row));
                }
            }
        }
        Ok(matched)
    }

    fn exec_update(&mut self, update: &UpdateStmt) -> Result<ExecResult> {
        let relation = self.relation_for_write(&update.table)?;
        let columns = relation.columns.clone();
        let mut assignments = Vec::with_capacity(update.assignments.len());
        for (name, expr) in &update.assignments {
            let idx = relation.column_index(name).ok_or_else(|| {
                ereport!(
                    sqlstate::UNDEFINED_COLUMN,
                    "column \"{}\" of relation \"{}\" does not exist",
                    name,
                    update.table
                )
            })?;
            assignments.push((idx, expr));
        }
        let desc = attributes(&columns);

        let matched = self.matching_rows(&update.table, update.where_clause.as_ref())?;
        let mut candidate = Vec::with_capacity(matched.len());
        for (id, old) in matched {
            let mut new = old.clone();
            let scope = RowScope::for_row(Some(&update.table), &desc, &old);
            for (idx, expr) in &assignments {
                let value = self.eval_expr(expr, &scope)?;
                new[*idx] = value.map(|d| coerce_datum(d, columns[*idx].type_id)).transpose()?;
            }
            candidate.push((id, new));
        }

        let database = self.database_mut()?;
        let relation = database
            .image
            .relations
            .get_mut(&update.table)
            .ok_or_else(|| BackendError::internal("relation vanished during UPDATE"))?;
        check_constraints(relation, &candidate)?;
        let updated: Vec<Row> = candidate.iter().map(|(_, row)| row.clone()).collect();
        for (id, row) in candidate {
            relation.rows.insert(id, row);
        }
        if !updated.is_empty() {
            self.xact.database_dirty = true;
        }

        match &update.returning {
            Some(list) => self.returning(list, &update.table, &desc, &updated, SpiStatus::UpdateReturning),
            None => Ok(ExecResult {
                status: SpiStatus::Update,
                processed: updated.len() as u64,
                tuples: None,
            }),
        }
    }

    fn exec_delete(&mut self, delete: &DeleteStmt) -> Result<ExecResult> {
        let desc = attributes(&self.relation_for_write(&delete.table)?.columns);
        let matched = self.matching_rows(&delete.table, delete.where_clause.as_ref())?;

        let database = self.database_mut()?;
        let relation = database
            .image
            .relations
            .get_mut(&delete.table)
            .ok_or_else(|| BackendError::internal("relation vanished during DELETE"))?;
        let mut deleted = Vec::with_capacity(matched.len());
        for (id, _) in &matched {
            if let Some(row) = relation.rows.remove(id) {
                deleted.push(row);
            }
        }
        if !deleted.is_empty() {
            self.xact.database_dirty = true;
        }

        match &delete.returning {
            Some(list) => self.returning(list, &delete.table, &desc, &deleted, SpiStatus::DeleteReturning),
            None => Ok(ExecResult {
                status: SpiStatus::Delete,
                processed: deleted.len() as u64,
                tuples: None,
            }),
        }
    }

    fn exec_show(&mut self, name: Option<&str>) -> Result<ExecResult> {
        let settings = self.settings()?;
        let table = match name {
            Some(name) => {
                let value = settings.get(name)?.to_string();
                let mut table = TupleTable::new(vec![Attribute::new(name.to_ascii_lowercase(), TypeId::Text)]);
                table.rows.push(vec![Some(Datum::Text(value))]);
                table
            }
            None => {
                let mut table = TupleTable::new(vec![
                    Attribute::new("name", TypeId::Text),
                    Attribute::new("setting", TypeId::Text),
                    Attribute::new("source", TypeId::Text),
                ]);
                for setting in settings.all() {
                    table.rows.push(vec![
                        Some(Datum::Text(setting.name.to_string())),
                        Some(Datum::Text(setting.value.clone())),
                        Some(Datum::Text(setting.source.name().to_string())),
                    ]);
                }
                table
            }
        };
        // SHOW is a utility statement that returns rows
        Ok(ExecResult {
            status: SpiStatus::Utility,
            processed: table.rows.len() as u64,
            tuples: Some(table),
        })
    }
}
