//! Static extensions
//!
//! - `registry`: library name -> statically compiled functions
//! - `vfs`: embedded packaging files (control, install script, timezone set)

pub mod registry;
pub mod vfs;

pub use registry::{
    load_external_function, lookup_external_function, normalize_library_name,
    register_static_extension, ExtensionLibrary, ExtensionRegistry, ExternalSymbol,
    LibraryHandle, StaticFinfo, StaticFunction,
};

/// A file compiled into the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddedFile {
    /// Path suffix this blob answers to, e.g. `extension/vector.control`
    pub filename: &'static str,
    pub data: &'static [u8],
}

impl EmbeddedFile {
    pub const fn new(filename: &'static str, data: &'static [u8]) -> Self {
        Self { filename, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use crate::session::shutdown;
    use crate::testutil;
    use crate::txn::execute;

    #[test]
    fn test_c_function_through_every_library_reference() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        testutil::start(&cluster);

        for (name, reference) in [("inc_a", "demo"), ("inc_b", "$libdir/demo"), ("inc_c", "/any/path/demo.so")] {
            execute(&format!(
                "CREATE FUNCTION {name}(integer) RETURNS integer AS '{reference}', 'add_one' LANGUAGE C STRICT"
            ))
            .unwrap();
            let rows = execute(&format!("SELECT {name}(41)")).unwrap();
            assert_eq!(rows.get(0, 0), Some("42"));
        }
        shutdown();
    }

    #[test]
    fn test_unknown_library_and_function() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        testutil::start(&cluster);

        let err = execute("CREATE FUNCTION f(integer) RETURNS integer AS 'nosuchlib', 'f' LANGUAGE C")
            .unwrap_err()
            .to_string();
        assert!(err.contains("could not find library \"nosuchlib\""), "{err}");
        assert!(err.contains("register_static_extension"), "{err}");

        let err = execute("CREATE FUNCTION g(integer) RETURNS integer AS 'demo', 'missing' LANGUAGE C")
            .unwrap_err()
            .to_string();
        assert!(err.contains("could not find function \"missing\""), "{err}");
        shutdown();
    }

    #[test]
    fn test_create_extension_from_embedded_files() {
        let _serial = testutil::serial();
        let cluster = testutil::cluster();
        testutil::start(&cluster);

        execute("CREATE EXTENSION demo").unwrap();
        let rows = execute("SELECT demo_shout('hi')").unwrap();
        assert_eq!(rows.get(0, 0), Some("HI!"));

        let installed = execute("SELECT extname, extversion FROM pg_extension").unwrap();
        assert_eq!(installed.get(0, 0), Some("demo"));
        assert_eq!(installed.get(0, 1), Some("1.0"));

        let err = execute("CREATE EXTENSION absent").unwrap_err().to_string();
        assert!(err.contains("extension \"absent\" is not available"), "{err}");
        shutdown();
    }
}
