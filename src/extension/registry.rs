//! Static extension registry
//!
//! Replaces dynamic library loading: extensions are compiled into the binary
//! and registered by name. The engine resolves `'library', 'symbol'` pairs
//! from `CREATE FUNCTION ... LANGUAGE C` through this table.

use super::EmbeddedFile;
use crate::error::{EmbedError, Result};
use crate::fmgr::{FinfoFunction, PgFunction, FINFO_PREFIX};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Marker stamped into every handle handed out by the registry.
pub const HANDLE_MAGIC: u32 = 0xDEAD_BEEF;

/// A named, callable function of a static library.
#[derive(Clone, Copy)]
pub struct StaticFunction {
    pub name: &'static str,
    pub func: PgFunction,
}

/// A `pg_finfo_<function>` metadata accessor of a static library.
#[derive(Clone, Copy)]
pub struct StaticFinfo {
    pub name: &'static str,
    pub finfo: FinfoFunction,
}

/// One statically linked extension library.
#[derive(Clone)]
pub struct ExtensionLibrary {
    /// Library name as referenced by `CREATE FUNCTION ... AS 'name'`
    pub name: &'static str,

    /// Runs once, on the first successful resolution of this library
    pub init: Option<fn()>,

    pub functions: &'static [StaticFunction],
    pub finfo: &'static [StaticFinfo],

    /// `<name>.control` packaging file
    pub control_file: Option<EmbeddedFile>,

    /// `<name>--<version>.sql` install script
    pub script_file: Option<EmbeddedFile>,
}

impl std::fmt::Debug for ExtensionLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtensionLibrary")
            .field("name", &self.name)
            .field("functions", &self.functions.iter().map(|x| x.name).collect::<Vec<_>>())
            .field("control_file", &self.control_file.map(|c| c.filename))
            .finish()
    }
}

impl ExtensionLibrary {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            init: None,
            functions: &[],
            finfo: &[],
            control_file: None,
            script_file: None,
        }
    }

    pub fn with_init(mut self, init: fn()) -> Self {
        self.init = Some(init);
        self
    }

    pub fn with_functions(
        mut self,
        functions: &'static [StaticFunction],
        finfo: &'static [StaticFinfo],
    ) -> Self {
        self.functions = functions;
        self.finfo = finfo;
        self
    }

    pub fn with_files(mut self, control: EmbeddedFile, script: EmbeddedFile) -> Self {
        self.control_file = Some(control);
        self.script_file = Some(script);
        self
    }

    fn function(&self, name: &str) -> Option<PgFunction> {
        self.functions.iter().find(|f| f.name == name).map(|f| f.func)
    }

    fn finfo_accessor(&self, name: &str) -> Option<FinfoFunction> {
        self.finfo.iter().find(|f| f.name == name).map(|f| f.finfo)
    }
}

/// Opaque reference to a resolved library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryHandle {
    magic: u32,
    index: usize,
}

impl LibraryHandle {
    /// A handle that fails validation, for callers that must pass something.
    pub fn invalid() -> Self {
        Self { magic: 0, index: usize::MAX }
    }
}

/// Result of a handle-based symbol lookup.
#[derive(Clone, Copy)]
pub enum ExternalSymbol {
    Function(PgFunction),
    Finfo(FinfoFunction),
}

impl std::fmt::Debug for ExternalSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExternalSymbol::Function(_) => f.write_str("Function"),
            ExternalSymbol::Finfo(_) => f.write_str("Finfo"),
        }
    }
}

struct RegisteredLibrary {
    library: ExtensionLibrary,
    init_called: AtomicBool,
}

/// Process-wide table of static libraries.
///
/// Newest registration first, so lookups see the last registration of a name.
/// The table is frozen by the first lookup; afterwards only the per-library
/// init flag changes.
pub struct ExtensionRegistry {
    libraries: RwLock<Vec<Arc<RegisteredLibrary>>>,
    frozen: AtomicBool,
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self {
            libraries: RwLock::new(Vec::new()),
            frozen: AtomicBool::new(false),
        }
    }

    pub fn register(&self, library: ExtensionLibrary) -> Result<()> {
        let mut libraries = self.libraries.write();
        if self.frozen.load(Ordering::Acquire) {
            return Err(EmbedError::RegistryFrozen(library.name.to_string()));
        }
        debug!(
            library = library.name,
            functions = library.functions.len(),
            "registered static extension"
        );
        libraries.insert(
            0,
            Arc::new(RegisteredLibrary {
                library,
                init_called: AtomicBool::new(false),
            }),
        );
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    fn freeze(&self) {
        self.frozen.store(true, Ordering::Release);
    }

    fn find(&self, name: &str) -> Option<(usize, Arc<RegisteredLibrary>)> {
        self.freeze();
        self.libraries
            .read()
            .iter()
            .enumerate()
            .find(|(_, lib)| lib.library.name == name)
            .map(|(idx, lib)| (idx, Arc::clone(lib)))
    }

    /// Resolve `function` in the library named by `library_ref`.
    ///
    /// Returns `Ok(None)` for a missing function when `signal_not_found` is
    /// false. An unknown library is always an error.
    pub fn load_function(
        &self,
        library_ref: &str,
        function: &str,
        signal_not_found: bool,
    ) -> Result<Option<(PgFunction, LibraryHandle)>> {
        let name = normalize_library_name(library_ref);
        let (index, entry) = self
            .find(name)
            .ok_or_else(|| EmbedError::UnknownLibrary(name.to_string()))?;

        if !entry.init_called.swap(true, Ordering::AcqRel) {
            if let Some(init) = entry.library.init {
                debug!(library = name, "running extension init");
                init();
            }
        }

        let handle = LibraryHandle { magic: HANDLE_MAGIC, index };
        match entry.library.function(function) {
            Some(func) => Ok(Some((func, handle))),
            None if signal_not_found => Err(EmbedError::UnknownFunction {
                library: name.to_string(),
                function: function.to_string(),
            }),
            None => Ok(None),
        }
    }

    /// Handle-based side channel for metadata accessors and sibling functions.
    pub fn lookup(&self, handle: &LibraryHandle, name: &str) -> Option<ExternalSymbol> {
        if handle.magic != HANDLE_MAGIC {
            warn!("invalid handle passed to lookup_external_function");
            return None;
        }
        let libraries = self.libraries.read();
        let Some(entry) = libraries.get(handle.index) else {
            warn!(index = handle.index, "library handle out of range");
            return None;
        };
        if name.starts_with(FINFO_PREFIX) {
            entry.library.finfo_accessor(name).map(ExternalSymbol::Finfo)
        } else {
            entry.library.function(name).map(ExternalSymbol::Function)
        }
    }

    /// Control and script blobs of every library, newest registration first.
    pub fn embedded_files(&self) -> Vec<EmbeddedFile> {
        self.freeze();
        self.libraries
            .read()
            .iter()
            .flat_map(|lib| [lib.library.control_file, lib.library.script_file])
            .flatten()
            .collect()
    }
}

/// Reduce a library reference to its registry key.
///
/// `$libdir/vector`, `/any/path/vector.so` and `vector` all become `vector`.
pub fn normalize_library_name(library_ref: &str) -> &str {
    let name = library_ref.strip_prefix("$libdir/").unwrap_or(library_ref);
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    [".so", ".dll", ".dylib"]
        .iter()
        .find_map(|ext| base.strip_suffix(ext))
        .unwrap_or(base)
}

static REGISTRY: Lazy<ExtensionRegistry> = Lazy::new(ExtensionRegistry::new);

/// The process-wide registry.
pub fn global() -> &'static ExtensionRegistry {
    &REGISTRY
}

/// Add a library to the process-wide registry. Must happen before the first
/// engine start; the registry freezes at the first lookup.
pub fn register_static_extension(library: ExtensionLibrary) -> Result<()> {
    global().register(library)
}

/// Resolve a function in the process-wide registry.
pub fn load_external_function(
    library_ref: &str,
    function: &str,
    signal_not_found: bool,
) -> Result<Option<(PgFunction, LibraryHandle)>> {
    global().load_function(library_ref, function, signal_not_found)
}

/// Look up a symbol next to a previously resolved function.
pub fn lookup_external_function(handle: &LibraryHandle, name: &str) -> Option<ExternalSymbol> {
    global().lookup(handle, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fmgr::{finfo_v1, Datum, FunctionCallInfo, FunctionResult};
    use std::sync::atomic::AtomicUsize;

    fn add_one(fcinfo: &FunctionCallInfo<'_>) -> FunctionResult {
        Ok(Some(Datum::Int4(fcinfo.get_arg_i32(0)? + 1)))
    }

    fn answer(_: &FunctionCallInfo<'_>) -> FunctionResult {
        Ok(Some(Datum::Int4(42)))
    }

    static VECTOR_FUNCS: &[StaticFunction] = &[StaticFunction { name: "add_one", func: add_one }];
    static VECTOR_FINFO: &[StaticFinfo] = &[StaticFinfo { name: "pg_finfo_add_one", finfo: finfo_v1 }];
    static OTHER_FUNCS: &[StaticFunction] = &[StaticFunction { name: "answer", func: answer }];

    static INIT_CALLS: AtomicUsize = AtomicUsize::new(0);

    fn count_init() {
        INIT_CALLS.fetch_add(1, Ordering::SeqCst);
    }

    fn vector_lib() -> ExtensionLibrary {
        ExtensionLibrary::new("vector").with_functions(VECTOR_FUNCS, VECTOR_FINFO)
    }

    #[test]
    fn test_normalize_library_name() {
        assert_eq!(normalize_library_name("vector"), "vector");
        assert_eq!(normalize_library_name("$libdir/vector"), "vector");
        assert_eq!(normalize_library_name("/any/path/vector.so"), "vector");
        assert_eq!(normalize_library_name("C:\\ext\\vector.dll"), "vector");
        assert_eq!(normalize_library_name("lib/vector.dylib"), "vector");
        assert_eq!(normalize_library_name("vector.tar"), "vector.tar");
    }

    #[test]
    fn test_equivalent_references_resolve_same_function() {
        let registry = ExtensionRegistry::new();
        registry.register(vector_lib()).unwrap();

        for reference in ["vector", "$libdir/vector", "/any/path/vector.so"] {
            let (func, _) = registry.load_function(reference, "add_one", true).unwrap().unwrap();
            let args = [Some(Datum::Int4(41))];
            assert_eq!(func(&FunctionCallInfo::new(&args)).unwrap(), Some(Datum::Int4(42)));
        }
    }

    #[test]
    fn test_unknown_library_is_error() {
        let registry = ExtensionRegistry::new();
        registry.register(vector_lib()).unwrap();
        let err = registry.load_function("nosuchlib", "f", false).unwrap_err();
        assert!(matches!(err, EmbedError::UnknownLibrary(ref n) if n == "nosuchlib"));
        assert!(err.hint().unwrap().contains("register_static_extension"));
    }

    #[test]
    fn test_unknown_function_probe_and_signal() {
        let registry = ExtensionRegistry::new();
        registry.register(vector_lib()).unwrap();
        assert!(registry.load_function("vector", "missing", false).unwrap().is_none());
        let err = registry.load_function("vector", "missing", true).unwrap_err();
        assert_eq!(
            err.to_string(),
            "could not find function \"missing\" in static library \"vector\""
        );
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = ExtensionRegistry::new();
        registry.register(vector_lib()).unwrap();
        registry
            .register(ExtensionLibrary::new("vector").with_functions(OTHER_FUNCS, &[]))
            .unwrap();
        assert!(registry.load_function("vector", "answer", true).unwrap().is_some());
        assert!(registry.load_function("vector", "add_one", false).unwrap().is_none());
    }

    #[test]
    fn test_frozen_after_first_lookup() {
        let registry = ExtensionRegistry::new();
        registry.register(vector_lib()).unwrap();
        assert!(!registry.is_frozen());
        let _ = registry.load_function("vector", "add_one", true);
        assert!(registry.is_frozen());
        let err = registry.register(ExtensionLibrary::new("late")).unwrap_err();
        assert!(matches!(err, EmbedError::RegistryFrozen(_)));
    }

    #[test]
    fn test_init_runs_once() {
        let registry = ExtensionRegistry::new();
        registry
            .register(ExtensionLibrary::new("counted").with_init(count_init))
            .unwrap();
        let before = INIT_CALLS.load(Ordering::SeqCst);
        let _ = registry.load_function("counted", "a", false);
        let _ = registry.load_function("$libdir/counted", "b", false);
        assert_eq!(INIT_CALLS.load(Ordering::SeqCst), before + 1);
    }

    #[test]
    fn test_handle_lookup() {
        let registry = ExtensionRegistry::new();
        registry.register(vector_lib()).unwrap();
        let (_, handle) = registry.load_function("vector", "add_one", true).unwrap().unwrap();

        match registry.lookup(&handle, "pg_finfo_add_one") {
            Some(ExternalSymbol::Finfo(finfo)) => assert_eq!(finfo().api_version, 1),
            other => panic!("expected finfo accessor, got {:?}", other),
        }
        assert!(matches!(registry.lookup(&handle, "add_one"), Some(ExternalSymbol::Function(_))));
        assert!(registry.lookup(&handle, "pg_finfo_missing").is_none());
        assert!(registry.lookup(&LibraryHandle::invalid(), "add_one").is_none());
    }
}
