//! Install discovery and library search-path handling.
//!
//! A [`InstallLocator`] finds the directory holding the engine libraries of
//! a MATLAB install. Windows reads the COM server registration; Linux and
//! macOS follow the `matlab` launcher on `PATH`. The manager then makes the
//! directory visible to the loader with a [`SearchPathGuard`].

mod executable;
mod registry;
mod search_path;

use std::path::{Path, PathBuf};

use matlab_mcp_core::Platform;

pub use executable::{library_dir_from_executable, ExecutableLocator};
pub use registry::{install_dir_from_server_command, parse_default_value, RegistryLocator};
pub use search_path::{appended, SearchPathGuard};

/// Finds the library directory of a MATLAB install.
pub trait InstallLocator: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Library directory, or `None` when no install is found.
    fn locate(&self) -> Option<PathBuf>;
}

/// Locator returning a configured directory.
#[derive(Debug, Clone)]
pub struct FixedLocator {
    dir: PathBuf,
}

impl FixedLocator {
    /// Always report `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

impl InstallLocator for FixedLocator {
    fn name(&self) -> &'static str {
        "configured"
    }

    fn locate(&self) -> Option<PathBuf> {
        Some(self.dir.clone())
    }
}

/// Locator that never finds an install.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInstall;

impl InstallLocator for NoInstall {
    fn name(&self) -> &'static str {
        "none"
    }

    fn locate(&self) -> Option<PathBuf> {
        None
    }
}

/// Default locator for a platform.
pub fn locator_for_platform(platform: Platform) -> Box<dyn InstallLocator> {
    match platform {
        Platform::Windows => Box::new(RegistryLocator),
        Platform::Linux | Platform::MacOS => Box::new(ExecutableLocator::new(platform)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_locator() {
        let locator = FixedLocator::new("/opt/matlab/bin/glnxa64");
        assert_eq!(
            locator.locate(),
            Some(PathBuf::from("/opt/matlab/bin/glnxa64"))
        );
        assert_eq!(locator.name(), "configured");
    }

    #[test]
    fn test_no_install() {
        assert!(NoInstall.locate().is_none());
    }

    #[test]
    fn test_locator_for_platform() {
        assert_eq!(locator_for_platform(Platform::Windows).name(), "registry");
        assert_eq!(locator_for_platform(Platform::Linux).name(), "executable");
        assert_eq!(locator_for_platform(Platform::MacOS).name(), "executable");
    }
}
