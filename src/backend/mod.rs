//! Hosted relational engine
//!
//! A compact standalone backend exposing the surface the harness drives:
//! boot steps, transactions, the statement interface, LISTEN/NOTIFY,
//! shutdown and per-subsystem resets.

pub mod async_notify;
pub mod bootstrap;
pub mod catalog;
pub mod control;
pub mod ddl;
pub mod error;
pub mod funcs;
pub mod globals;
pub mod memory;
pub mod process;
pub mod settings;
pub mod spi;
pub mod sql;
pub mod storage;
pub mod timezone;
pub mod xact;

pub use error::{sqlstate, BackendError};
pub use process::{lock, Backend};
pub use spi::{SpiStatus, TupleTable};

/// Major version written to `PG_VERSION`.
pub const MAJOR_VERSION: &str = "16";

/// Reported by `server_version` and `version()`.
pub const ENGINE_VERSION: &str = "16.4";

/// Installation share directory. Extension and timezone files below it are
/// normally served by the embedded filesystem.
pub const SHARE_DIR: &str = "/usr/local/share/pgembed";
