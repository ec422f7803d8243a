//! Engine error reports
//!
//! Every engine failure carries a five-character SQLSTATE, a primary message
//! and optional detail/hint lines, like an `ereport` call.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BackendError>;

/// SQLSTATE codes raised by the engine.
pub mod sqlstate {
    pub const SUCCESSFUL_COMPLETION: &str = "00000";
    pub const FEATURE_NOT_SUPPORTED: &str = "0A000";
    pub const INVALID_TRANSACTION_STATE: &str = "25000";
    pub const ACTIVE_SQL_TRANSACTION: &str = "25001";
    pub const NO_ACTIVE_SQL_TRANSACTION: &str = "25P01";
    pub const IN_FAILED_SQL_TRANSACTION: &str = "25P02";
    pub const INVALID_TRANSACTION_TERMINATION: &str = "2D000";
    pub const SYNTAX_ERROR: &str = "42601";
    pub const INSUFFICIENT_PRIVILEGE: &str = "42501";
    pub const UNDEFINED_COLUMN: &str = "42703";
    pub const UNDEFINED_FUNCTION: &str = "42883";
    pub const UNDEFINED_TABLE: &str = "42P01";
    pub const UNDEFINED_OBJECT: &str = "42704";
    pub const DUPLICATE_TABLE: &str = "42P07";
    pub const DUPLICATE_FUNCTION: &str = "42723";
    pub const DUPLICATE_OBJECT: &str = "42710";
    pub const DUPLICATE_DATABASE: &str = "42P04";
    pub const DUPLICATE_COLUMN: &str = "42701";
    pub const INVALID_TABLE_DEFINITION: &str = "42P16";
    pub const INVALID_COLUMN_REFERENCE: &str = "42P10";
    pub const WRONG_OBJECT_TYPE: &str = "42809";
    pub const DEPENDENT_OBJECTS_STILL_EXIST: &str = "2BP01";
    pub const DATATYPE_MISMATCH: &str = "42804";
    pub const GROUPING_ERROR: &str = "42803";
    pub const INVALID_PARAMETER_VALUE: &str = "22023";
    pub const INVALID_TEXT_REPRESENTATION: &str = "22P02";
    pub const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";
    pub const DIVISION_BY_ZERO: &str = "22012";
    pub const STRING_DATA_RIGHT_TRUNCATION: &str = "22001";
    pub const NOT_NULL_VIOLATION: &str = "23502";
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const CANT_CHANGE_RUNTIME_PARAM: &str = "55P02";
    pub const OBJECT_NOT_IN_PREREQUISITE_STATE: &str = "55000";
    pub const INVALID_CATALOG_NAME: &str = "3D000";
    pub const INVALID_AUTHORIZATION_SPECIFICATION: &str = "28000";
    pub const CONNECTION_EXCEPTION: &str = "08000";
    pub const TOO_MANY_CONNECTIONS: &str = "53300";
    pub const CONFIG_FILE_ERROR: &str = "F0000";
    pub const LOCK_FILE_EXISTS: &str = "F0001";
    pub const UNDEFINED_FILE: &str = "58P01";
    pub const IO_ERROR: &str = "58030";
    pub const DATA_CORRUPTED: &str = "XX001";
    pub const INTERNAL_ERROR: &str = "XX000";
    pub const EXTERNAL_ROUTINE_EXCEPTION: &str = "38000";
    pub const SPI_ERROR: &str = "39000";
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct BackendError {
    pub code: &'static str,
    pub message: String,
    pub detail: Option<String>,
    pub hint: Option<String>,
}

impl BackendError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            hint: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(sqlstate::INTERNAL_ERROR, message)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(sqlstate::SYNTAX_ERROR, message)
    }

    /// Message with detail and hint appended, one per line.
    pub fn full_message(&self) -> String {
        let mut out = self.message.clone();
        if let Some(detail) = &self.detail {
            out.push_str("\nDETAIL:  ");
            out.push_str(detail);
        }
        if let Some(hint) = &self.hint {
            out.push_str("\nHINT:  ");
            out.push_str(hint);
        }
        out
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::new(sqlstate::IO_ERROR, format!("I/O error: {}", err))
    }
}

impl From<bincode::Error> for BackendError {
    fn from(err: bincode::Error) -> Self {
        BackendError::new(sqlstate::DATA_CORRUPTED, format!("could not decode relation data: {}", err))
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(err: serde_json::Error) -> Self {
        BackendError::new(sqlstate::DATA_CORRUPTED, format!("could not decode catalog file: {}", err))
    }
}

impl From<crate::fmgr::FunctionError> for BackendError {
    fn from(err: crate::fmgr::FunctionError) -> Self {
        BackendError::new(sqlstate::EXTERNAL_ROUTINE_EXCEPTION, err.message)
    }
}

impl From<crate::error::EmbedError> for BackendError {
    fn from(err: crate::error::EmbedError) -> Self {
        use crate::error::EmbedError;
        let code = match &err {
            EmbedError::UnknownLibrary(_) => sqlstate::UNDEFINED_FILE,
            EmbedError::UnknownFunction { .. } => sqlstate::UNDEFINED_FUNCTION,
            _ => sqlstate::INTERNAL_ERROR,
        };
        let mut report = BackendError::new(code, err.to_string());
        if let Some(hint) = err.hint() {
            report = report.with_hint(hint);
        }
        report
    }
}

/// `return Err(ereport!(code, "fmt", args..))` shorthand.
macro_rules! ereport {
    ($code:expr, $($arg:tt)+) => {
        $crate::backend::error::BackendError::new($code, format!($($arg)+))
    };
}
pub(crate) use ereport;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_message_layout() {
        let err = BackendError::new(sqlstate::LOCK_FILE_EXISTS, "lock file \"postmaster.pid\" already exists")
            .with_hint("Is another instance running?");
        assert_eq!(err.to_string(), "lock file \"postmaster.pid\" already exists");
        assert_eq!(
            err.full_message(),
            "lock file \"postmaster.pid\" already exists\nHINT:  Is another instance running?"
        );
    }

    #[test]
    fn test_unknown_library_keeps_hint() {
        let err: BackendError = crate::error::EmbedError::UnknownLibrary("x".into()).into();
        assert_eq!(err.code, sqlstate::UNDEFINED_FILE);
        assert!(err.hint.is_some());
    }
}
