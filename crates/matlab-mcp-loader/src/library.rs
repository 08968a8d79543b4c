//! Dynamic library handle with lazy, cached symbol resolution.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use matlab_mcp_core::{Error, Result};

use crate::ffi::{BoundFn, EntryPoint, LibraryKind};
use crate::loader::{LibraryLoader, LoadedImage};

#[derive(Default)]
struct LibraryState {
    search_dir: Option<PathBuf>,
    image: Option<Box<dyn LoadedImage>>,
    symbols: HashMap<&'static str, BoundFn>,
}

/// One native shared library.
///
/// The library is constructed unloaded. Entry points are resolved on first
/// use and cached until [`DynamicLibrary::unload`], which drops every cached
/// pointer together with the image.
///
/// The state sits behind a mutex so the handle can be shared by sessions,
/// but engine calls themselves are not synchronised: callers serialise use
/// of the engine.
pub struct DynamicLibrary {
    kind: LibraryKind,
    name: String,
    loader: Arc<dyn LibraryLoader>,
    state: Mutex<LibraryState>,
}

impl DynamicLibrary {
    /// Create an unloaded handle for the library file `name`.
    pub fn new(kind: LibraryKind, name: impl Into<String>, loader: Arc<dyn LibraryLoader>) -> Self {
        Self {
            kind,
            name: name.into(),
            loader,
            state: Mutex::new(LibraryState::default()),
        }
    }

    /// Logical library.
    pub fn kind(&self) -> LibraryKind {
        self.kind
    }

    /// File name the library is loaded by.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> MutexGuard<'_, LibraryState> {
        // A panic while holding the lock leaves the state consistent; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Directory the library is loaded from, if any.
    pub fn search_dir(&self) -> Option<PathBuf> {
        self.state().search_dir.clone()
    }

    /// Load from `dir` instead of through the loader's search path.
    ///
    /// Takes effect on the next [`DynamicLibrary::load`].
    pub fn set_search_dir(&self, dir: Option<&Path>) {
        self.state().search_dir = dir.map(Path::to_path_buf);
    }

    /// Path handed to the native loader.
    pub fn load_path(&self) -> PathBuf {
        match &self.state().search_dir {
            Some(dir) => dir.join(&self.name),
            None => PathBuf::from(&self.name),
        }
    }

    /// Load the library. Loading a loaded library is a no-op.
    pub fn load(&self) -> Result<()> {
        let mut state = self.state();
        if state.image.is_some() {
            return Ok(());
        }

        let path = match &state.search_dir {
            Some(dir) => dir.join(&self.name),
            None => PathBuf::from(&self.name),
        };

        match self.loader.open(&path) {
            Ok(image) => {
                info!("Loaded {} library from {}", self.kind, path.display());
                state.image = Some(image);
                state.symbols.clear();
                Ok(())
            }
            Err(e) => {
                warn!("Failed to load {} library: {}", self.kind, e);
                Err(e)
            }
        }
    }

    /// Check that the library opens from `dir`, then release it again.
    ///
    /// The handle's own load state, search directory and cache are left
    /// untouched, so a loaded library can be checked against a new
    /// directory.
    pub fn try_open_in(&self, dir: &Path) -> Result<()> {
        let path = dir.join(&self.name);
        let image = self.loader.open(&path)?;
        drop(image);
        debug!("Opened and released {} library at {}", self.kind, path.display());
        Ok(())
    }

    /// Unload the library and invalidate every cached entry point.
    ///
    /// Unloading an unloaded library is a no-op. Pointers obtained from
    /// [`DynamicLibrary::resolve`] must not be called afterwards.
    pub fn unload(&self) {
        let mut state = self.state();
        state.symbols.clear();
        if state.image.take().is_some() {
            info!("Unloaded {} library {}", self.kind, self.name);
        }
    }

    /// Whether the library is loaded.
    pub fn is_loaded(&self) -> bool {
        self.state().image.is_some()
    }

    /// Number of entry points currently cached.
    pub fn cached_symbols(&self) -> usize {
        self.state().symbols.len()
    }

    /// Resolve an entry point, querying the native loader only on first use.
    ///
    /// Fails with [`Error::UnknownSymbol`] when `E` belongs to another
    /// library, [`Error::LibraryNotLoaded`] when unloaded, and
    /// [`Error::SymbolNotFound`] when the image does not export it.
    pub fn resolve<E: EntryPoint>(&self) -> Result<E::Fn> {
        if E::LIBRARY != self.kind {
            return Err(Error::UnknownSymbol {
                library: self.name.clone(),
                symbol: E::SYMBOL.to_string(),
            });
        }

        let mut state = self.state();
        if let Some(bound) = state.symbols.get(E::SYMBOL) {
            return E::unwrap(*bound).ok_or_else(|| Error::UnknownSymbol {
                library: self.name.clone(),
                symbol: E::SYMBOL.to_string(),
            });
        }

        let image = state
            .image
            .as_ref()
            .ok_or_else(|| Error::LibraryNotLoaded(self.name.clone()))?;
        let raw = image.symbol(E::SYMBOL)?;
        if raw.is_null() {
            return Err(Error::SymbolNotFound {
                library: self.name.clone(),
                symbol: E::SYMBOL.to_string(),
            });
        }

        // SAFETY: `raw` was exported under `E::SYMBOL`, whose signature is
        // fixed by the binding table.
        let bound = unsafe { E::bind(raw) };
        debug!("Bound {} from {}", E::SYMBOL, self.name);
        state.symbols.insert(E::SYMBOL, bound);

        E::unwrap(bound).ok_or_else(|| Error::UnknownSymbol {
            library: self.name.clone(),
            symbol: E::SYMBOL.to_string(),
        })
    }
}

impl std::fmt::Debug for DynamicLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicLibrary")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::{EngEvalString, EngOpen, MxGetField};
    use crate::testing::FakeLoader;

    fn engine_library(loader: &FakeLoader) -> DynamicLibrary {
        DynamicLibrary::new(LibraryKind::Engine, "libeng.so", Arc::new(loader.clone()))
    }

    #[test]
    fn test_new_library_is_unloaded() {
        let loader = FakeLoader::new();
        let lib = engine_library(&loader);
        assert!(!lib.is_loaded());
        assert_eq!(lib.name(), "libeng.so");
        assert_eq!(loader.loads(), 0);
    }

    #[test]
    fn test_load_is_idempotent() {
        let loader = FakeLoader::new();
        let lib = engine_library(&loader);

        assert!(lib.load().is_ok());
        assert!(lib.load().is_ok());
        assert!(lib.is_loaded());
        assert_eq!(loader.loads(), 1);
    }

    #[test]
    fn test_unload_is_idempotent() {
        let loader = FakeLoader::new();
        let lib = engine_library(&loader);

        lib.unload();
        lib.load().unwrap();
        lib.unload();
        lib.unload();
        assert!(!lib.is_loaded());
    }

    #[test]
    fn test_load_failure() {
        let loader = FakeLoader::new();
        loader.refuse("libeng.so");
        let lib = engine_library(&loader);

        assert!(matches!(lib.load(), Err(Error::LibraryLoad { .. })));
        assert!(!lib.is_loaded());
    }

    #[test]
    fn test_resolve_requires_loaded_library() {
        let loader = FakeLoader::new();
        let lib = engine_library(&loader);

        let result = lib.resolve::<EngEvalString>();
        assert!(matches!(result, Err(Error::LibraryNotLoaded(_))));
        assert_eq!(loader.lookups(), 0);
    }

    #[test]
    fn test_resolve_is_cached() {
        let loader = FakeLoader::new();
        let lib = engine_library(&loader);
        lib.load().unwrap();

        let first = lib.resolve::<EngEvalString>().unwrap();
        let second = lib.resolve::<EngEvalString>().unwrap();

        assert_eq!(first as usize, second as usize);
        assert_eq!(loader.lookups(), 1);
        assert_eq!(lib.cached_symbols(), 1);
    }

    #[test]
    fn test_unload_invalidates_cache() {
        let loader = FakeLoader::new();
        let lib = engine_library(&loader);
        lib.load().unwrap();
        lib.resolve::<EngOpen>().unwrap();

        lib.unload();
        assert_eq!(lib.cached_symbols(), 0);
        assert!(matches!(
            lib.resolve::<EngOpen>(),
            Err(Error::LibraryNotLoaded(_))
        ));

        lib.load().unwrap();
        lib.resolve::<EngOpen>().unwrap();
        assert_eq!(loader.lookups(), 2);
    }

    #[test]
    fn test_resolve_rejects_foreign_entry_point() {
        let loader = FakeLoader::new();
        let lib = engine_library(&loader);
        lib.load().unwrap();

        let result = lib.resolve::<MxGetField>();
        assert!(matches!(result, Err(Error::UnknownSymbol { .. })));
        assert_eq!(loader.lookups(), 0);
    }

    #[test]
    fn test_resolve_missing_symbol() {
        let loader = FakeLoader::new();
        loader.hide_symbol("engEvalString");
        let lib = engine_library(&loader);
        lib.load().unwrap();

        let result = lib.resolve::<EngEvalString>();
        assert!(matches!(result, Err(Error::SymbolNotFound { .. })));
        assert_eq!(lib.cached_symbols(), 0);
    }

    #[test]
    fn test_search_dir_changes_load_path() {
        let loader = FakeLoader::new();
        let lib = engine_library(&loader);
        assert_eq!(lib.load_path(), PathBuf::from("libeng.so"));

        let dir = Path::new("/opt/matlab/bin/glnxa64");
        lib.set_search_dir(Some(dir));
        assert_eq!(lib.load_path(), dir.join("libeng.so"));

        lib.load().unwrap();
        assert_eq!(loader.opened_paths(), vec![dir.join("libeng.so")]);
    }

    #[test]
    fn test_check_other_dir_leaves_loaded_library_alone() {
        let loader = FakeLoader::new();
        let lib = engine_library(&loader);
        let good = Path::new("/opt/matlab/bin/glnxa64");
        loader.require_dir(good);
        lib.set_search_dir(Some(good));
        lib.load().unwrap();
        lib.resolve::<EngOpen>().unwrap();

        assert!(lib.try_open_in(Path::new("/tmp/not-matlab")).is_err());
        assert!(lib.try_open_in(good).is_ok());
        assert!(lib.is_loaded());
        assert_eq!(lib.load_path(), good.join("libeng.so"));
        assert_eq!(lib.cached_symbols(), 1);
        assert_eq!(loader.loads(), 2);
    }
}
