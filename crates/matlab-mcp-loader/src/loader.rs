//! Native loader backends.

use std::ffi::c_void;
use std::path::Path;

use matlab_mcp_core::{Error, Result};

/// Opens shared libraries.
///
/// The system implementation goes through the platform loader
/// (`dlopen`/`LoadLibrary`); tests substitute in-process fakes.
pub trait LibraryLoader: Send + Sync {
    /// Open the library at `path` (a bare file name or a full path).
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedImage>>;
}

/// A library image that has been mapped into the process.
///
/// Dropping the image releases it.
pub trait LoadedImage: Send + Sync {
    /// Look up the address of an exported symbol.
    fn symbol(&self, name: &str) -> Result<*const c_void>;
}

/// Loader backed by the operating system via `libloading`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemLoader;

impl LibraryLoader for SystemLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedImage>> {
        // SAFETY: loading runs the library's initialisers; the MATLAB runtime
        // libraries have no initialisers with preconditions on the host.
        let library = unsafe { libloading::Library::new(path) }.map_err(|e| Error::LibraryLoad {
            name: path.display().to_string(),
            reason: e.to_string(),
        })?;

        Ok(Box::new(SystemImage {
            name: path.display().to_string(),
            library,
        }))
    }
}

struct SystemImage {
    name: String,
    library: libloading::Library,
}

impl LoadedImage for SystemImage {
    fn symbol(&self, name: &str) -> Result<*const c_void> {
        // SAFETY: the symbol is only read as an address here; binding it to a
        // signature happens in the typed binding table.
        let symbol = unsafe { self.library.get::<unsafe extern "C" fn()>(name.as_bytes()) }
            .map_err(|_| Error::SymbolNotFound {
                library: self.name.clone(),
                symbol: name.to_string(),
            })?;

        Ok(*symbol as *const c_void)
    }
}
