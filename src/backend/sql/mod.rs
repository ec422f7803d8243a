//! SQL front end: tokens, parser, evaluation and execution

pub mod ast;
pub mod eval;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod token;
mod virtual_catalogs;

pub use ast::Statement;
pub use executor::ExecResult;
pub use parser::parse_sql;
