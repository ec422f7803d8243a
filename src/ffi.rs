//! C ABI
//!
//! Exported under the `pg_embedded_*` names. Integer-returning calls give
//! `0` on success and `-1` on failure; the failure text is available from
//! `pg_embedded_error_message` until the next failing call. No Rust panic
//! crosses this boundary.

use crate::config::{BootstrapOptions, PerformanceConfig};
use crate::error::{EmbedError, Result};
use crate::notify;
use crate::result::{QueryResult, RawRows};
use crate::session;
use crate::txn;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::ptr;
use tracing::error;

/// Status reported in [`PgResult::status`] when the engine raised an error.
pub const PG_EMBEDDED_ERROR_STATUS: c_int = -1;

/// Result of `pg_embedded_exec`. Free with `pg_embedded_free_result`.
///
/// The leading fields match the `pg_result` layout of the C header; `raw` is
/// private to the library.
#[repr(C)]
pub struct PgResult {
    /// Statement status code, or `-1` on engine error
    pub status: c_int,
    pub rows: u64,
    pub cols: c_int,
    /// `values[row][col]`, NULL pointer for SQL NULL
    pub values: *mut *mut *mut c_char,
    pub colnames: *mut *mut c_char,
    raw: *mut RawRows,
}

#[repr(C)]
pub struct PgNotification {
    pub channel: *mut c_char,
    /// Empty string when sent without payload
    pub payload: *mut c_char,
    pub sender_pid: c_int,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PgEmbeddedConfig {
    pub fsync: bool,
    pub synchronous_commit: bool,
    pub full_page_writes: bool,
}

/// Borrowed bytes of a by-reference value. `data` stays valid until the
/// owning result is freed; `needs_free` is always 0.
#[repr(C)]
pub struct PgBytes {
    pub data: *const u8,
    pub len: usize,
    pub needs_free: c_int,
}

impl PgBytes {
    fn null() -> Self {
        Self {
            data: ptr::null(),
            len: 0,
            needs_free: 0,
        }
    }
}

static ERROR_MESSAGE: Lazy<Mutex<CString>> = Lazy::new(|| Mutex::new(CString::default()));

/// Run `f`, turning a panic into `fallback`.
fn guarded<T>(fallback: T, f: impl FnOnce() -> T) -> T {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            error!("panic caught at the C boundary");
            fallback
        }
    }
}

fn status_of(result: Result<()>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(_) => -1,
    }
}

/// Borrow a required C string argument.
unsafe fn str_arg<'a>(name: &str, p: *const c_char) -> Result<&'a str> {
    if p.is_null() {
        return Err(EmbedError::InvalidArgument(format!("{name} is required")));
    }
    // SAFETY: caller guarantees a NUL-terminated string that outlives the call
    unsafe { CStr::from_ptr(p) }
        .to_str()
        .map_err(|_| EmbedError::InvalidArgument(format!("{name} is not valid UTF-8")))
}

/// Borrow an optional C string argument; NULL is `None`.
unsafe fn opt_str_arg<'a>(name: &str, p: *const c_char) -> Result<Option<&'a str>> {
    if p.is_null() {
        Ok(None)
    } else {
        // SAFETY: forwarded from the caller's contract
        unsafe { str_arg(name, p) }.map(Some)
    }
}

/// Record a failure that happened before the harness saw the call.
fn reject<T>(err: EmbedError) -> Result<T> {
    session::record(Err(err))
}

fn to_c_string(s: &str) -> *mut c_char {
    // Interior NULs cannot cross the boundary; cut at the first one
    let bytes = s.split('\0').next().unwrap_or_default();
    CString::new(bytes).unwrap_or_default().into_raw()
}

unsafe fn free_c_string(p: *mut c_char) {
    if !p.is_null() {
        // SAFETY: produced by `to_c_string`
        drop(unsafe { CString::from_raw(p) });
    }
}

fn into_raw_slice<T>(items: Vec<T>) -> *mut T {
    if items.is_empty() {
        return ptr::null_mut();
    }
    Box::into_raw(items.into_boxed_slice()) as *mut T
}

/// Reclaim a slice made by `into_raw_slice`.
unsafe fn from_raw_slice<T>(p: *mut T, len: usize) -> Box<[T]> {
    // SAFETY: `p` came from a boxed slice of exactly `len` elements
    unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(p, len)) }
}

fn marshal(result: &QueryResult) -> *mut PgResult {
    let values = result
        .values
        .iter()
        .map(|row| {
            let cells = row
                .iter()
                .map(|cell| cell.as_deref().map_or(ptr::null_mut(), to_c_string))
                .collect();
            into_raw_slice(cells)
        })
        .collect();
    let colnames = result.column_names.iter().map(|name| to_c_string(name)).collect();
    let raw = result
        .raw()
        .cloned()
        .map_or(ptr::null_mut(), |raw| Box::into_raw(Box::new(raw)));

    Box::into_raw(Box::new(PgResult {
        status: result.status_code(),
        rows: result.row_count,
        cols: result.column_count as c_int,
        values: into_raw_slice(values),
        colnames: into_raw_slice(colnames),
        raw,
    }))
}

fn error_result() -> *mut PgResult {
    Box::into_raw(Box::new(PgResult {
        status: PG_EMBEDDED_ERROR_STATUS,
        rows: 0,
        cols: 0,
        values: ptr::null_mut(),
        colnames: ptr::null_mut(),
        raw: ptr::null_mut(),
    }))
}

/// Create a new data directory. `encoding` and `locale` may be NULL for
/// `UTF8` and `C`. An existing cluster counts as success.
///
/// # Safety
/// - string arguments must be NULL or valid NUL-terminated strings
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_initdb(
    data_dir: *const c_char,
    username: *const c_char,
    encoding: *const c_char,
    locale: *const c_char,
) -> c_int {
    guarded(-1, || {
        // SAFETY: forwarded from the caller's contract
        let args = unsafe {
            (|| -> Result<_> {
                Ok((
                    str_arg("data directory", data_dir)?,
                    str_arg("user name", username)?,
                    opt_str_arg("encoding", encoding)?,
                    opt_str_arg("locale", locale)?,
                ))
            })()
        };
        let result = args.or_else(reject).and_then(|(dir, user, encoding, locale)| {
            let mut options = BootstrapOptions::new(user);
            options.encoding = encoding.map(str::to_string);
            options.locale = locale.map(str::to_string);
            session::bootstrap::bootstrap(dir, &options).map(|_| ())
        });
        status_of(result)
    })
}

unsafe fn init_with(
    data_dir: *const c_char,
    dbname: *const c_char,
    username: *const c_char,
    start: fn(&Path, &str, &str) -> Result<()>,
) -> c_int {
    guarded(-1, || {
        // SAFETY: forwarded from the caller's contract
        let args = unsafe {
            (|| -> Result<_> {
                Ok((
                    str_arg("data directory", data_dir)?,
                    str_arg("database name", dbname)?,
                    str_arg("user name", username)?,
                ))
            })()
        };
        let result = args
            .or_else(reject)
            .and_then(|(dir, db, user)| start(Path::new(dir), db, user));
        status_of(result)
    })
}

/// Start the engine and connect to `dbname` as `username`.
///
/// # Safety
/// - arguments must be valid NUL-terminated strings
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_init(
    data_dir: *const c_char,
    dbname: *const c_char,
    username: *const c_char,
) -> c_int {
    // SAFETY: same contract
    unsafe { init_with(data_dir, dbname, username, |d, db, u| session::initialize(d, db, u)) }
}

/// Like `pg_embedded_init`, allowing writes to system catalogs.
///
/// # Safety
/// - arguments must be valid NUL-terminated strings
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_init_with_system_mods(
    data_dir: *const c_char,
    dbname: *const c_char,
    username: *const c_char,
) -> c_int {
    // SAFETY: same contract
    unsafe {
        init_with(data_dir, dbname, username, |d, db, u| {
            session::initialize_with_catalog_writes(d, db, u)
        })
    }
}

#[no_mangle]
pub extern "C" fn pg_embedded_shutdown() {
    guarded((), session::shutdown)
}

/// Execute SQL. Returns NULL when the call was rejected before reaching the
/// engine (not initialized, NULL query), and a result with status `-1` when
/// the engine raised an error.
///
/// # Safety
/// - query must be NULL or a valid NUL-terminated string
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_exec(query: *const c_char) -> *mut PgResult {
    guarded(ptr::null_mut(), || {
        // SAFETY: forwarded from the caller's contract
        let sql = match unsafe { str_arg("query", query) }.or_else(reject) {
            Ok(sql) => sql,
            Err(_) => return ptr::null_mut(),
        };
        match txn::execute(sql) {
            Ok(result) => marshal(&result),
            Err(err) if err.is_precondition() => ptr::null_mut(),
            Err(_) => error_result(),
        }
    })
}

/// # Safety
/// - result must be NULL or a pointer returned by `pg_embedded_exec`, not
///   yet freed
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_free_result(result: *mut PgResult) {
    if result.is_null() {
        return;
    }
    // SAFETY: allocated by `marshal` or `error_result`
    let result = unsafe { Box::from_raw(result) };
    let rows = result.rows as usize;
    let cols = result.cols.max(0) as usize;
    if !result.values.is_null() {
        // SAFETY: `rows` row arrays of `cols` cells each, built by `marshal`
        let row_ptrs = unsafe { from_raw_slice(result.values, rows) };
        for &row in row_ptrs.iter() {
            if row.is_null() {
                continue;
            }
            let cells = unsafe { from_raw_slice(row, cols) };
            for &cell in cells.iter() {
                unsafe { free_c_string(cell) };
            }
        }
    }
    if !result.colnames.is_null() {
        // SAFETY: `cols` names built by `marshal`
        let names = unsafe { from_raw_slice(result.colnames, cols) };
        for &name in names.iter() {
            unsafe { free_c_string(name) };
        }
    }
    if !result.raw.is_null() {
        // SAFETY: boxed by `marshal`
        drop(unsafe { Box::from_raw(result.raw) });
    }
}

#[no_mangle]
pub extern "C" fn pg_embedded_begin() -> c_int {
    guarded(-1, || status_of(txn::begin()))
}

#[no_mangle]
pub extern "C" fn pg_embedded_commit() -> c_int {
    guarded(-1, || status_of(txn::commit()))
}

#[no_mangle]
pub extern "C" fn pg_embedded_rollback() -> c_int {
    guarded(-1, || status_of(txn::rollback()))
}

/// # Safety
/// - channel must be a valid NUL-terminated string
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_listen(channel: *const c_char) -> c_int {
    guarded(-1, || {
        // SAFETY: forwarded from the caller's contract
        let channel = unsafe { str_arg("channel", channel) }.or_else(reject);
        status_of(channel.and_then(notify::listen))
    })
}

/// Stop listening on `channel`, or on every channel when it is NULL.
///
/// # Safety
/// - channel must be NULL or a valid NUL-terminated string
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_unlisten(channel: *const c_char) -> c_int {
    guarded(-1, || {
        // SAFETY: forwarded from the caller's contract
        let channel = unsafe { opt_str_arg("channel", channel) }.or_else(reject);
        status_of(channel.and_then(notify::unlisten))
    })
}

/// # Safety
/// - channel must be a valid NUL-terminated string; payload may be NULL
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_notify(channel: *const c_char, payload: *const c_char) -> c_int {
    guarded(-1, || {
        // SAFETY: forwarded from the caller's contract
        let args = unsafe {
            (|| -> Result<_> { Ok((str_arg("channel", channel)?, opt_str_arg("payload", payload)?)) })()
        };
        status_of(args.or_else(reject).and_then(|(channel, payload)| notify::notify(channel, payload)))
    })
}

/// Next pending notification or NULL. Free with
/// `pg_embedded_free_notification`.
#[no_mangle]
pub extern "C" fn pg_embedded_poll_notifications() -> *mut PgNotification {
    guarded(ptr::null_mut(), || match notify::poll_notification() {
        Some(n) => Box::into_raw(Box::new(PgNotification {
            channel: to_c_string(&n.channel),
            payload: to_c_string(&n.payload),
            sender_pid: n.sender_pid as c_int,
        })),
        None => ptr::null_mut(),
    })
}

/// # Safety
/// - notification must be NULL or returned by
///   `pg_embedded_poll_notifications`, not yet freed
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_free_notification(notification: *mut PgNotification) {
    if notification.is_null() {
        return;
    }
    // SAFETY: boxed by `pg_embedded_poll_notifications`
    let n = unsafe { Box::from_raw(notification) };
    unsafe {
        free_c_string(n.channel);
        free_c_string(n.payload);
    }
}

/// Set durability options for the next `pg_embedded_init`.
///
/// # Safety
/// - config must be NULL or point to a valid `PgEmbeddedConfig`
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_set_config(config: *const PgEmbeddedConfig) {
    if config.is_null() {
        return;
    }
    // SAFETY: non-null and valid per the caller's contract
    let config = unsafe { *config };
    session::set_performance_config(PerformanceConfig {
        fsync: config.fsync,
        synchronous_commit: config.synchronous_commit,
        full_page_writes: config.full_page_writes,
    });
}

/// Text of the last failure. The pointer is valid until the next call of
/// this function.
#[no_mangle]
pub extern "C" fn pg_embedded_error_message() -> *const c_char {
    let text = session::last_error_message().unwrap_or_default();
    let mut slot = ERROR_MESSAGE.lock();
    *slot = CString::new(text.replace('\0', "")).unwrap_or_default();
    slot.as_ptr()
}

/// Run a typed accessor against the raw rows of `res`. Any failure reads as
/// NULL and is recorded as the last error.
unsafe fn with_raw<T: Default>(
    res: *const PgResult,
    row: u64,
    col: c_int,
    isnull: *mut bool,
    get: impl FnOnce(&RawRows, usize, usize) -> Result<Option<T>>,
) -> T {
    let set_null = |null: bool| {
        if !isnull.is_null() {
            // SAFETY: caller passes NULL or a writable bool
            unsafe { *isnull = null };
        }
    };
    // SAFETY: caller passes NULL or a live result
    let Some(raw) = (unsafe { res.as_ref() }).and_then(|r| unsafe { r.raw.as_ref() }) else {
        set_null(true);
        return T::default();
    };
    let outcome = if col < 0 {
        Err(EmbedError::OutOfRange {
            row: row as usize,
            column: 0,
        })
    } else {
        get(raw, row as usize, col as usize)
    };
    match session::record(outcome) {
        Ok(Some(value)) => {
            set_null(false);
            value
        }
        _ => {
            set_null(true);
            T::default()
        }
    }
}

/// # Safety
/// - res must be NULL or a live result; isnull NULL or writable
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_get_int32(res: *const PgResult, row: u64, col: c_int, isnull: *mut bool) -> i32 {
    guarded(0, || unsafe { with_raw(res, row, col, isnull, |r, row, col| r.get_int32(row, col)) })
}

/// # Safety
/// - res must be NULL or a live result; isnull NULL or writable
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_get_int64(res: *const PgResult, row: u64, col: c_int, isnull: *mut bool) -> i64 {
    guarded(0, || unsafe { with_raw(res, row, col, isnull, |r, row, col| r.get_int64(row, col)) })
}

/// # Safety
/// - res must be NULL or a live result; isnull NULL or writable
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_get_float64(res: *const PgResult, row: u64, col: c_int, isnull: *mut bool) -> f64 {
    guarded(0.0, || unsafe { with_raw(res, row, col, isnull, |r, row, col| r.get_float64(row, col)) })
}

/// # Safety
/// - res must be NULL or a live result; isnull NULL or writable
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_get_bool(res: *const PgResult, row: u64, col: c_int, isnull: *mut bool) -> bool {
    guarded(false, || unsafe { with_raw(res, row, col, isnull, |r, row, col| r.get_bool(row, col)) })
}

/// Machine word of a by-value column.
///
/// # Safety
/// - res must be NULL or a live result; isnull NULL or writable
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_get_datum_raw(res: *const PgResult, row: u64, col: c_int, isnull: *mut bool) -> u64 {
    guarded(0, || unsafe { with_raw(res, row, col, isnull, |r, row, col| r.get_datum_raw(row, col)) })
}

/// # Safety
/// - res must be NULL or a live result; isnull NULL or writable
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_get_bytes(res: *const PgResult, row: u64, col: c_int, isnull: *mut bool) -> PgBytes {
    guarded(PgBytes::null(), || {
        let (data, len) = unsafe {
            with_raw(res, row, col, isnull, |r, row, col| {
                Ok(r.get_bytes(row, col)?.map(|b| (b.as_ptr() as usize, b.len())))
            })
        };
        if data == 0 {
            return PgBytes::null();
        }
        PgBytes {
            data: data as *const u8,
            len,
            needs_free: 0,
        }
    })
}

/// Kept for callers written against allocating byte accessors; clears the
/// struct.
///
/// # Safety
/// - bytes must be NULL or writable
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_free_bytes(bytes: *mut PgBytes) {
    // SAFETY: caller passes NULL or a writable PgBytes
    if let Some(bytes) = unsafe { bytes.as_mut() } {
        *bytes = PgBytes::null();
    }
}

/// Text form of any value, NULL for SQL NULL or on error. Free with
/// `pg_embedded_free_string`.
///
/// # Safety
/// - res must be NULL or a live result
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_get_string_debug(res: *const PgResult, row: u64, col: c_int) -> *mut c_char {
    guarded(ptr::null_mut(), || {
        let text: Option<String> = unsafe {
            with_raw(res, row, col, ptr::null_mut(), |r, row, col| {
                r.get_string(row, col).map(|s| s.map(Some))
            })
        };
        text.map_or(ptr::null_mut(), |s| to_c_string(&s))
    })
}

/// # Safety
/// - s must be NULL or returned by `pg_embedded_get_string_debug`
#[no_mangle]
pub unsafe extern "C" fn pg_embedded_free_string(s: *mut c_char) {
    // SAFETY: forwarded from the caller's contract
    unsafe { free_c_string(s) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    fn c(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    fn exec(sql: &str) -> *mut PgResult {
        let sql = c(sql);
        unsafe { pg_embedded_exec(sql.as_ptr()) }
    }

    fn error_message() -> String {
        unsafe { CStr::from_ptr(pg_embedded_error_message()) }
            .to_string_lossy()
            .into_owned()
    }

    fn init(cluster: &tempfile::TempDir) -> c_int {
        let dir = c(cluster.path().to_str().unwrap());
        let (db, user) = (c("postgres"), c(testutil::USER));
        let config = PgEmbeddedConfig {
            fsync: false,
            synchronous_commit: false,
            full_page_writes: false,
        };
        unsafe {
            pg_embedded_set_config(&config);
            pg_embedded_init(dir.as_ptr(), db.as_ptr(), user.as_ptr())
        }
    }

    #[test]
    fn test_exec_before_init_is_null() {
        let _serial = testutil::serial();
        assert!(exec("SELECT 1").is_null());
        assert_eq!(error_message(), "Not initialized");
        assert_eq!(pg_embedded_begin(), -1);
        unsafe { assert!(pg_embedded_exec(ptr::null()).is_null()) };
    }

    #[test]
    fn test_init_rejects_null_arguments() {
        let _serial = testutil::serial();
        let db = c("postgres");
        let rc = unsafe { pg_embedded_init(ptr::null(), db.as_ptr(), db.as_ptr()) };
        assert_eq!(rc, -1);
        assert!(error_message().contains("data directory is required"));
    }

    #[test]
    fn test_exec_marshals_rows() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        assert_eq!(init(&cluster), 0);

        unsafe { pg_embedded_free_result(exec("CREATE TABLE t (id integer, name text)")) };
        let ins = exec("INSERT INTO t VALUES (1, 'a'), (2, NULL)");
        unsafe {
            assert_eq!((*ins).status, crate::backend::SpiStatus::Insert.code());
            assert_eq!((*ins).rows, 2);
            pg_embedded_free_result(ins);
        }

        let res = exec("SELECT id, name FROM t ORDER BY id");
        unsafe {
            let r = &*res;
            assert_eq!((r.rows, r.cols), (2, 2));
            assert_eq!(CStr::from_ptr(*r.colnames.add(1)).to_str().unwrap(), "name");
            let row0 = *r.values;
            assert_eq!(CStr::from_ptr(*row0.add(1)).to_str().unwrap(), "a");
            let row1 = *r.values.add(1);
            assert!((*row1.add(1)).is_null());

            let mut isnull = true;
            assert_eq!(pg_embedded_get_int32(res, 1, 0, &mut isnull), 2);
            assert!(!isnull);
            assert_eq!(pg_embedded_get_int64(res, 0, 0, &mut isnull), 1);
            let bytes = pg_embedded_get_bytes(res, 0, 1, &mut isnull);
            assert_eq!(std::slice::from_raw_parts(bytes.data, bytes.len), b"a");
            pg_embedded_get_bytes(res, 1, 1, &mut isnull);
            assert!(isnull);

            let s = pg_embedded_get_string_debug(res, 1, 0);
            assert_eq!(CStr::from_ptr(s).to_str().unwrap(), "2");
            pg_embedded_free_string(s);

            // Type mismatch reads as NULL with an error recorded
            pg_embedded_get_float64(res, 0, 0, &mut isnull);
            assert!(isnull);
            assert!(error_message().contains("not double precision"));
            pg_embedded_free_result(res);
        }

        let bad = exec("SELECT * FROM missing");
        unsafe {
            assert_eq!((*bad).status, PG_EMBEDDED_ERROR_STATUS);
            pg_embedded_free_result(bad);
        }
        assert!(error_message().contains("relation \"missing\" does not exist"));
        pg_embedded_shutdown();
    }

    #[test]
    fn test_transactions_and_notifications() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        assert_eq!(init(&cluster), 0);
        unsafe { pg_embedded_free_result(exec("CREATE TABLE t (id integer)")) };

        assert_eq!(pg_embedded_begin(), 0);
        assert_eq!(pg_embedded_begin(), -1);
        assert_eq!(error_message(), "Already in transaction");
        unsafe { pg_embedded_free_result(exec("INSERT INTO t VALUES (1)")) };
        assert_eq!(pg_embedded_rollback(), 0);
        assert_eq!(pg_embedded_commit(), -1);

        let (ch, payload) = (c("events"), c("hello"));
        unsafe {
            assert_eq!(pg_embedded_listen(ch.as_ptr()), 0);
            assert_eq!(pg_embedded_notify(ch.as_ptr(), payload.as_ptr()), 0);
            let n = pg_embedded_poll_notifications();
            assert!(!n.is_null());
            assert_eq!(CStr::from_ptr((*n).channel).to_str().unwrap(), "events");
            assert_eq!(CStr::from_ptr((*n).payload).to_str().unwrap(), "hello");
            pg_embedded_free_notification(n);
            assert!(pg_embedded_poll_notifications().is_null());

            assert_eq!(pg_embedded_unlisten(ptr::null()), 0);
            assert_eq!(pg_embedded_listen(ptr::null()), -1);
        }
        pg_embedded_shutdown();
        assert!(!session::is_initialized());
    }
}
