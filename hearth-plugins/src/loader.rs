//! ## hearth-plugins::loader
//! **Opening plugin libraries and resolving the ABI pair**
//!
//! [`DynamicLoader`] opens real shared libraries with `libloading`.
//! [`StaticLoader`] serves symbol tables registered in-process, for plugins
//! linked into the host and for tests.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::{debug, trace};

use crate::error::PluginError;
use crate::installer::{CreateFn, DestroyFn, PluginInstaller, SymbolNames};

/// An open library. Dropping it closes the library.
pub trait PluginLibrary {
    fn path(&self) -> &Path;

    fn has_symbol(&self, name: &str) -> bool;

    /// Resolves both symbols, or fails without resolving either.
    fn installer(&self, symbols: &SymbolNames) -> Result<PluginInstaller, PluginError>;
}

pub trait LibraryLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn PluginLibrary>, PluginError>;
}

impl<L: LibraryLoader + ?Sized> LibraryLoader for Box<L> {
    fn open(&self, path: &Path) -> Result<Box<dyn PluginLibrary>, PluginError> {
        (**self).open(path)
    }
}

/// Which ABI symbols a library exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolReport {
    pub path: PathBuf,
    pub create: bool,
    pub destroy: bool,
}

impl SymbolReport {
    pub fn is_loadable(&self) -> bool {
        self.create && self.destroy
    }
}

/// Opens `path` and reports which of `symbols` resolve. Nothing is instantiated.
pub fn inspect_library(
    loader: &dyn LibraryLoader,
    path: &Path,
    symbols: &SymbolNames,
) -> Result<SymbolReport, PluginError> {
    let canonical = path.canonicalize().map_err(|source| PluginError::InvalidPath {
        path: path.to_path_buf(),
        source,
    })?;
    let library = loader.open(&canonical)?;
    Ok(SymbolReport {
        create: library.has_symbol(&symbols.create),
        destroy: library.has_symbol(&symbols.destroy),
        path: canonical,
    })
}

// --- Dynamic ---

/// Loads shared libraries from disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct DynamicLoader;

impl LibraryLoader for DynamicLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn PluginLibrary>, PluginError> {
        // SAFETY: running library initializers is inherent to loading a plugin.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| PluginError::Open {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        debug!(path = %path.display(), "library opened");
        Ok(Box::new(DynamicLibrary {
            path: path.to_path_buf(),
            library,
        }))
    }
}

struct DynamicLibrary {
    path: PathBuf,
    library: libloading::Library,
}

impl DynamicLibrary {
    fn resolve<T: Copy>(&self, name: &str) -> Result<T, PluginError> {
        // SAFETY: the symbol's type is fixed by the plugin ABI; the pointer is
        // only used while the library stays open.
        unsafe { self.library.get::<T>(name.as_bytes()) }
            .map(|symbol| *symbol)
            .map_err(|_| PluginError::MissingSymbol {
                symbol: name.to_string(),
                path: self.path.clone(),
            })
    }
}

impl PluginLibrary for DynamicLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn has_symbol(&self, name: &str) -> bool {
        self.resolve::<*const ()>(name).is_ok()
    }

    fn installer(&self, symbols: &SymbolNames) -> Result<PluginInstaller, PluginError> {
        let create = self.resolve::<CreateFn>(&symbols.create)?;
        let destroy = self.resolve::<DestroyFn>(&symbols.destroy)?;
        Ok(PluginInstaller { create, destroy })
    }
}

impl Drop for DynamicLibrary {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "library closed");
    }
}

// --- Static ---

/// A symbol served by a [`StaticLoader`].
#[derive(Debug, Clone, Copy)]
pub enum StaticSymbol {
    Create(CreateFn),
    Destroy(DestroyFn),
}

#[derive(Default)]
struct StaticState {
    libraries: RefCell<HashMap<PathBuf, HashMap<String, StaticSymbol>>>,
    opens: Cell<usize>,
    open_now: Cell<usize>,
}

/// In-process symbol tables keyed by library path.
///
/// Clones share the same tables and counters.
#[derive(Clone, Default)]
pub struct StaticLoader {
    state: Rc<StaticState>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a library at `path` exporting the default symbol names.
    pub fn register(&self, path: impl AsRef<Path>, create: CreateFn, destroy: DestroyFn) {
        let names = SymbolNames::default();
        self.register_symbol(&path, &names.create, StaticSymbol::Create(create));
        self.register_symbol(&path, &names.destroy, StaticSymbol::Destroy(destroy));
    }

    /// Registers a single symbol. The library exists once it has any symbol.
    pub fn register_symbol(&self, path: impl AsRef<Path>, name: &str, symbol: StaticSymbol) {
        let path = path.as_ref();
        let key = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.state
            .libraries
            .borrow_mut()
            .entry(key)
            .or_default()
            .insert(name.to_string(), symbol);
    }

    /// Total successful opens.
    pub fn opens(&self) -> usize {
        self.state.opens.get()
    }

    /// Libraries opened and not yet closed.
    pub fn open_libraries(&self) -> usize {
        self.state.open_now.get()
    }
}

impl fmt::Debug for StaticLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticLoader")
            .field("libraries", &self.state.libraries.borrow().len())
            .field("open", &self.open_libraries())
            .finish()
    }
}

impl LibraryLoader for StaticLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn PluginLibrary>, PluginError> {
        let symbols = self
            .state
            .libraries
            .borrow()
            .get(path)
            .cloned()
            .ok_or_else(|| PluginError::Open {
                path: path.to_path_buf(),
                reason: "no static library registered at this path".to_string(),
            })?;
        self.state.opens.set(self.state.opens.get() + 1);
        self.state.open_now.set(self.state.open_now.get() + 1);
        trace!(path = %path.display(), "static library opened");
        Ok(Box::new(StaticLibrary {
            path: path.to_path_buf(),
            symbols,
            state: self.state.clone(),
        }))
    }
}

struct StaticLibrary {
    path: PathBuf,
    symbols: HashMap<String, StaticSymbol>,
    state: Rc<StaticState>,
}

impl StaticLibrary {
    fn missing(&self, name: &str) -> PluginError {
        PluginError::MissingSymbol {
            symbol: name.to_string(),
            path: self.path.clone(),
        }
    }
}

impl PluginLibrary for StaticLibrary {
    fn path(&self) -> &Path {
        &self.path
    }

    fn has_symbol(&self, name: &str) -> bool {
        self.symbols.contains_key(name)
    }

    fn installer(&self, symbols: &SymbolNames) -> Result<PluginInstaller, PluginError> {
        let create = match self.symbols.get(&symbols.create) {
            Some(StaticSymbol::Create(f)) => *f,
            _ => return Err(self.missing(&symbols.create)),
        };
        let destroy = match self.symbols.get(&symbols.destroy) {
            Some(StaticSymbol::Destroy(f)) => *f,
            _ => return Err(self.missing(&symbols.destroy)),
        };
        Ok(PluginInstaller { create, destroy })
    }
}

impl Drop for StaticLibrary {
    fn drop(&mut self) {
        self.state.open_now.set(self.state.open_now.get().saturating_sub(1));
        trace!(path = %self.path.display(), "static library closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::installer::PluginInstance;
    use crate::manager::PluginManager;
    use std::ffi::c_void;

    extern "C" fn create(_: *mut PluginManager, _: *mut c_void) -> *mut PluginInstance {
        std::ptr::null_mut()
    }

    extern "C" fn destroy(_: *mut PluginManager, _: *mut PluginInstance) {}

    #[test]
    fn static_loader_counts_open_libraries() {
        let loader = StaticLoader::new();
        loader.register("/virtual/libmock.so", create, destroy);

        let library = loader.open(Path::new("/virtual/libmock.so")).unwrap();
        assert_eq!(loader.open_libraries(), 1);
        assert!(library.installer(&SymbolNames::default()).is_ok());
        drop(library);
        assert_eq!(loader.open_libraries(), 0);
        assert_eq!(loader.opens(), 1);
    }

    #[test]
    fn missing_half_of_the_pair_fails() {
        let loader = StaticLoader::new();
        loader.register_symbol(
            "/virtual/libhalf.so",
            "hearth_plugin_create",
            StaticSymbol::Create(create),
        );
        let library = loader.open(Path::new("/virtual/libhalf.so")).unwrap();
        assert!(library.has_symbol("hearth_plugin_create"));
        assert!(!library.has_symbol("hearth_plugin_destroy"));
        assert!(matches!(
            library.installer(&SymbolNames::default()),
            Err(PluginError::MissingSymbol { symbol, .. }) if symbol == "hearth_plugin_destroy"
        ));
    }

    #[test]
    fn unknown_static_path_fails_to_open() {
        let loader = StaticLoader::new();
        assert!(matches!(
            loader.open(Path::new("/virtual/nothing.so")),
            Err(PluginError::Open { .. })
        ));
        assert_eq!(loader.opens(), 0);
    }

    #[test]
    fn dynamic_loader_reports_unloadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libnot_a_library.so");
        std::fs::write(&path, b"not an object file").unwrap();
        assert!(matches!(
            DynamicLoader.open(&path),
            Err(PluginError::Open { .. })
        ));
    }

    #[test]
    fn inspect_reports_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libinspect.so");
        std::fs::write(&path, b"").unwrap();

        let loader = StaticLoader::new();
        loader.register(&path, create, destroy);
        let report = inspect_library(&loader, &path, &SymbolNames::default()).unwrap();
        assert!(report.is_loadable());

        let renamed = SymbolNames::new("other_create", "hearth_plugin_destroy");
        let report = inspect_library(&loader, &path, &renamed).unwrap();
        assert!(!report.create);
        assert!(report.destroy);
    }
}
