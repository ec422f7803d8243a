/// Abstract Syntax Tree for SQL statements
///
/// Serializable because view definitions are stored as parsed queries.
use serde::{Deserialize, Serialize};

/// Top-level SQL statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Select(SelectStmt),
    Insert(InsertStmt),
    Update(UpdateStmt),
    Delete(DeleteStmt),
    CreateTable(CreateTableStmt),
    DropTable { name: String, if_exists: bool },
    CreateView { name: String, or_replace: bool, query: SelectStmt },
    DropView { name: String, if_exists: bool },
    CreateFunction(CreateFunctionStmt),
    DropFunction { name: String, if_exists: bool },
    CreateExtension { name: String, if_not_exists: bool, version: Option<String> },
    DropExtension { name: String, if_exists: bool },
    CommentOnDatabase { name: String, comment: Option<String> },
    Notify { channel: String, payload: Option<String> },
    Listen { channel: String },
    /// `None` is `UNLISTEN *`
    Unlisten { channel: Option<String> },
    /// `None` is `SHOW ALL`
    Show { name: Option<String> },
    Set { name: String, value: String },
    TransactionControl(TransactionKind),
    CreateDatabase { name: String },
}

impl Statement {
    /// Command tag, as reported for the statement kind.
    pub fn tag(&self) -> &'static str {
        match self {
            Statement::Select(_) => "SELECT",
            Statement::Insert(_) => "INSERT",
            Statement::Update(_) => "UPDATE",
            Statement::Delete(_) => "DELETE",
            Statement::CreateTable(_) => "CREATE TABLE",
            Statement::DropTable { .. } => "DROP TABLE",
            Statement::CreateView { .. } => "CREATE VIEW",
            Statement::DropView { .. } => "DROP VIEW",
            Statement::CreateFunction(_) => "CREATE FUNCTION",
            Statement::DropFunction { .. } => "DROP FUNCTION",
            Statement::CreateExtension { .. } => "CREATE EXTENSION",
            Statement::DropExtension { .. } => "DROP EXTENSION",
            Statement::CommentOnDatabase { .. } => "COMMENT",
            Statement::Notify { .. } => "NOTIFY",
            Statement::Listen { .. } => "LISTEN",
            Statement::Unlisten { .. } => "UNLISTEN",
            Statement::Show { .. } => "SHOW",
            Statement::Set { .. } => "SET",
            Statement::TransactionControl(kind) => kind.tag(),
            Statement::CreateDatabase { .. } => "CREATE DATABASE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    Begin,
    Commit,
    Rollback,
    Savepoint,
}

impl TransactionKind {
    pub fn tag(&self) -> &'static str {
        match self {
            TransactionKind::Begin => "BEGIN",
            TransactionKind::Commit => "COMMIT",
            TransactionKind::Rollback => "ROLLBACK",
            TransactionKind::Savepoint => "SAVEPOINT",
        }
    }
}

/// SELECT statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectStmt {
    pub columns: Vec<SelectColumn>,
    pub from: Option<TableRef>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SelectColumn {
    Star,
    Expr(Expr, Option<String>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderByExpr {
    pub expr: Expr,
    pub asc: bool,
}

/// INSERT statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertStmt {
    pub table: String,
    pub columns: Option<Vec<String>>,
    pub values: Vec<Vec<Expr>>,
    pub returning: Option<Vec<SelectColumn>>,
}

/// UPDATE statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateStmt {
    pub table: String,
    pub assignments: Vec<(String, Expr)>,
    pub where_clause: Option<Expr>,
    pub returning: Option<Vec<SelectColumn>>,
}

/// DELETE statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteStmt {
    pub table: String,
    pub where_clause: Option<Expr>,
    pub returning: Option<Vec<SelectColumn>>,
}

/// CREATE TABLE statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateTableStmt {
    pub table: String,
    pub if_not_exists: bool,
    pub columns: Vec<ColumnSpec>,
    /// Table-level `PRIMARY KEY (col)`
    pub primary_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub type_name: String,
    pub not_null: bool,
    pub primary_key: bool,
}

/// CREATE FUNCTION statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateFunctionStmt {
    pub name: String,
    pub or_replace: bool,
    pub arg_types: Vec<String>,
    pub return_type: String,
    pub language: String,
    /// `AS 'symbol'` or `AS 'library', 'symbol'`
    pub definition: Vec<String>,
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SqlValueFunction {
    CurrentUser,
    SessionUser,
    CurrentCatalog,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Literal(Literal),
    Column { table: Option<String>, name: String },
    BinaryOp { left: Box<Expr>, op: BinaryOperator, right: Box<Expr> },
    UnaryOp { op: UnaryOperator, expr: Box<Expr> },
    IsNull { expr: Box<Expr>, negated: bool },
    FunctionCall { name: String, args: Vec<Expr>, star: bool },
    Cast { expr: Box<Expr>, type_name: String },
    SqlValue(SqlValueFunction),
}

impl Expr {
    /// Output column name the engine gives this expression.
    pub fn default_name(&self) -> String {
        match self {
            Expr::Column { name, .. } => name.clone(),
            Expr::FunctionCall { name, .. } => name.clone(),
            Expr::Cast { expr, type_name } => match expr.as_ref() {
                Expr::Literal(_) => type_name.clone(),
                inner => inner.default_name(),
            },
            Expr::SqlValue(SqlValueFunction::CurrentUser) => "current_user".to_string(),
            Expr::SqlValue(SqlValueFunction::SessionUser) => "session_user".to_string(),
            Expr::SqlValue(SqlValueFunction::CurrentCatalog) => "current_catalog".to_string(),
            _ => "?column?".to_string(),
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::FunctionCall { name, args, .. } => {
                is_aggregate(name) || args.iter().any(|a| a.contains_aggregate())
            }
            Expr::BinaryOp { left, right, .. } => left.contains_aggregate() || right.contains_aggregate(),
            Expr::UnaryOp { expr, .. } | Expr::IsNull { expr, .. } | Expr::Cast { expr, .. } => {
                expr.contains_aggregate()
            }
            _ => false,
        }
    }
}

pub fn is_aggregate(name: &str) -> bool {
    matches!(name, "count" | "sum" | "min" | "max")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Or,
    And,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Concat,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOperator {
    pub fn precedence(&self) -> u8 {
        match self {
            BinaryOperator::Or => 1,
            BinaryOperator::And => 2,
            // IS [NOT] NULL binds at 3
            BinaryOperator::Eq
            | BinaryOperator::NotEq
            | BinaryOperator::Lt
            | BinaryOperator::LtEq
            | BinaryOperator::Gt
            | BinaryOperator::GtEq => 4,
            BinaryOperator::Concat => 5,
            BinaryOperator::Plus | BinaryOperator::Minus => 6,
            BinaryOperator::Multiply | BinaryOperator::Divide | BinaryOperator::Modulo => 7,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::Or => "OR",
            BinaryOperator::And => "AND",
            BinaryOperator::Eq => "=",
            BinaryOperator::NotEq => "<>",
            BinaryOperator::Lt => "<",
            BinaryOperator::LtEq => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::GtEq => ">=",
            BinaryOperator::Concat => "||",
            BinaryOperator::Plus => "+",
            BinaryOperator::Minus => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Not,
    Minus,
    Plus,
}
