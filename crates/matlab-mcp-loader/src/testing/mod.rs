//! Testing utilities for code that drives the MATLAB libraries.
//!
//! [`FakeLoader`] stands in for the operating system loader. The images it
//! opens export in-process `extern "C"` functions that emulate the engine
//! and matrix APIs closely enough to exercise sessions, value decoding and
//! discovery without a MATLAB install. It also counts loads and symbol
//! lookups so caching behaviour can be asserted.

mod engine;
mod matrix;

use std::collections::HashSet;
use std::ffi::c_void;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use matlab_mcp_core::{Error, Result};

use crate::loader::{LibraryLoader, LoadedImage};

pub use matrix::FakeValue;

#[derive(Default)]
struct FakeLoaderState {
    loads: AtomicUsize,
    lookups: AtomicUsize,
    refused: Mutex<HashSet<String>>,
    hidden: Mutex<HashSet<String>>,
    required_dir: Mutex<Option<PathBuf>>,
    opened: Mutex<Vec<PathBuf>>,
}

/// In-process loader serving fake engine and matrix libraries.
///
/// Clones share counters and configuration.
#[derive(Clone, Default)]
pub struct FakeLoader {
    state: Arc<FakeLoaderState>,
}

impl FakeLoader {
    /// Create a loader that opens every library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful library opens.
    pub fn loads(&self) -> usize {
        self.state.loads.load(Ordering::SeqCst)
    }

    /// Number of symbol lookups performed against opened images.
    pub fn lookups(&self) -> usize {
        self.state.lookups.load(Ordering::SeqCst)
    }

    /// Paths passed to successful opens, in order.
    pub fn opened_paths(&self) -> Vec<PathBuf> {
        self.state.opened.lock().unwrap().clone()
    }

    /// Make opening the library with this file name fail.
    pub fn refuse(&self, file_name: &str) {
        self.state.refused.lock().unwrap().insert(file_name.to_string());
    }

    /// Stop refusing the library with this file name.
    pub fn allow(&self, file_name: &str) {
        self.state.refused.lock().unwrap().remove(file_name);
    }

    /// Make the images report this symbol as missing.
    pub fn hide_symbol(&self, symbol: &str) {
        self.state.hidden.lock().unwrap().insert(symbol.to_string());
    }

    /// Only open libraries located directly in `dir`, like a loader whose
    /// search path lacks the install directory.
    pub fn require_dir(&self, dir: impl AsRef<Path>) {
        *self.state.required_dir.lock().unwrap() = Some(dir.as_ref().to_path_buf());
    }
}

impl LibraryLoader for FakeLoader {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedImage>> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let refuse = |reason: &str| Error::LibraryLoad {
            name: path.display().to_string(),
            reason: reason.to_string(),
        };

        if self.state.refused.lock().unwrap().contains(&file_name) {
            return Err(refuse("refused by fake loader"));
        }

        if let Some(dir) = self.state.required_dir.lock().unwrap().as_deref() {
            if path.parent() != Some(dir) {
                return Err(refuse("not found on fake search path"));
            }
        }

        self.state.loads.fetch_add(1, Ordering::SeqCst);
        self.state.opened.lock().unwrap().push(path.to_path_buf());

        Ok(Box::new(FakeImage {
            name: file_name,
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeImage {
    name: String,
    state: Arc<FakeLoaderState>,
}

impl LoadedImage for FakeImage {
    fn symbol(&self, name: &str) -> Result<*const c_void> {
        self.state.lookups.fetch_add(1, Ordering::SeqCst);

        let missing = || Error::SymbolNotFound {
            library: self.name.clone(),
            symbol: name.to_string(),
        };

        if self.state.hidden.lock().unwrap().contains(name) {
            return Err(missing());
        }

        engine::symbol(name)
            .or_else(|| matrix::symbol(name))
            .ok_or_else(missing)
    }
}
