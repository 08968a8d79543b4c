//! Registry of the engine, matrix and MAT-file libraries.

use std::path::Path;
use std::sync::Arc;

use tracing::warn;

use matlab_mcp_core::{LibrarySettings, Result};

use crate::ffi::LibraryKind;
use crate::library::DynamicLibrary;
use crate::loader::{LibraryLoader, SystemLoader};

/// The three native libraries, constructed once and looked up by kind.
///
/// Handles are created unloaded with their file names fixed; they are
/// loaded explicitly or by the session pool.
#[derive(Debug)]
pub struct LibraryRegistry {
    engine: DynamicLibrary,
    matrix: DynamicLibrary,
    mat: DynamicLibrary,
}

impl LibraryRegistry {
    /// Create a registry using the operating system loader.
    pub fn new(settings: &LibrarySettings) -> Self {
        Self::with_loader(settings, Arc::new(SystemLoader))
    }

    /// Create a registry with a custom loader.
    pub fn with_loader(settings: &LibrarySettings, loader: Arc<dyn LibraryLoader>) -> Self {
        Self {
            engine: DynamicLibrary::new(LibraryKind::Engine, &settings.engine, Arc::clone(&loader)),
            matrix: DynamicLibrary::new(LibraryKind::Matrix, &settings.matrix, Arc::clone(&loader)),
            mat: DynamicLibrary::new(LibraryKind::Mat, &settings.mat, loader),
        }
    }

    /// Engine library (`engOpen`, `engEvalString`, ...).
    pub fn engine(&self) -> &DynamicLibrary {
        &self.engine
    }

    /// Matrix library (`mxGetField`, `mxGetPr`, ...).
    pub fn matrix(&self) -> &DynamicLibrary {
        &self.matrix
    }

    /// MAT-file library.
    pub fn mat(&self) -> &DynamicLibrary {
        &self.mat
    }

    /// Look up a library by kind.
    pub fn get(&self, kind: LibraryKind) -> &DynamicLibrary {
        match kind {
            LibraryKind::Engine => &self.engine,
            LibraryKind::Matrix => &self.matrix,
            LibraryKind::Mat => &self.mat,
        }
    }

    /// Point every library at an install directory.
    pub fn set_search_dir(&self, dir: Option<&Path>) {
        for kind in LibraryKind::ALL {
            self.get(kind).set_search_dir(dir);
        }
    }

    /// Load the libraries sessions need.
    ///
    /// The engine library is required. The matrix library is only needed to
    /// create and decode values, so failing to load it is logged and ignored.
    pub fn load_runtime(&self) -> Result<()> {
        self.engine.load()?;
        if let Err(e) = self.matrix.load() {
            warn!("Matrix library unavailable, value helpers will fail: {}", e);
        }
        Ok(())
    }

    /// Unload all three libraries.
    pub fn unload_all(&self) {
        for kind in LibraryKind::ALL {
            self.get(kind).unload();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeLoader;
    use matlab_mcp_core::Platform;

    fn registry(loader: &FakeLoader) -> LibraryRegistry {
        LibraryRegistry::with_loader(
            &LibrarySettings::for_platform(Platform::Linux),
            Arc::new(loader.clone()),
        )
    }

    #[test]
    fn test_registry_names() {
        let registry = registry(&FakeLoader::new());
        assert_eq!(registry.engine().name(), "libeng.so");
        assert_eq!(registry.matrix().name(), "libmx.so");
        assert_eq!(registry.mat().name(), "libmat.so");
        assert_eq!(registry.get(LibraryKind::Matrix).kind(), LibraryKind::Matrix);
    }

    #[test]
    fn test_registry_starts_unloaded() {
        let registry = registry(&FakeLoader::new());
        for kind in LibraryKind::ALL {
            assert!(!registry.get(kind).is_loaded());
        }
    }

    #[test]
    fn test_load_runtime() {
        let loader = FakeLoader::new();
        let registry = registry(&loader);

        registry.load_runtime().unwrap();
        assert!(registry.engine().is_loaded());
        assert!(registry.matrix().is_loaded());
        assert!(!registry.mat().is_loaded());
    }

    #[test]
    fn test_load_runtime_tolerates_missing_matrix_library() {
        let loader = FakeLoader::new();
        loader.refuse("libmx.so");
        let registry = registry(&loader);

        assert!(registry.load_runtime().is_ok());
        assert!(registry.engine().is_loaded());
        assert!(!registry.matrix().is_loaded());
    }

    #[test]
    fn test_load_runtime_requires_engine_library() {
        let loader = FakeLoader::new();
        loader.refuse("libeng.so");
        let registry = registry(&loader);

        assert!(registry.load_runtime().is_err());
    }

    #[test]
    fn test_set_search_dir_applies_to_all() {
        let registry = registry(&FakeLoader::new());
        let dir = Path::new("/opt/matlab/bin/glnxa64");
        registry.set_search_dir(Some(dir));

        for kind in LibraryKind::ALL {
            assert_eq!(registry.get(kind).search_dir().as_deref(), Some(dir));
        }

        registry.set_search_dir(None);
        assert!(registry.engine().search_dir().is_none());
    }

    #[test]
    fn test_unload_all() {
        let loader = FakeLoader::new();
        let registry = registry(&loader);
        registry.load_runtime().unwrap();
        registry.mat().load().unwrap();

        registry.unload_all();
        for kind in LibraryKind::ALL {
            assert!(!registry.get(kind).is_loaded());
        }
    }
}
