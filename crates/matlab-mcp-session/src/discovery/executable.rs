//! Launcher-based discovery for Linux and macOS.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::debug;

use matlab_mcp_core::Platform;

use super::InstallLocator;

/// Library directory for the launcher at `<root>/bin/matlab`.
///
/// Returns `<root>/bin/<arch>`.
pub fn library_dir_from_executable(executable: &Path, platform: Platform) -> Option<PathBuf> {
    let bin = executable.parent()?;
    if bin.file_name()? != "bin" {
        return None;
    }
    Some(bin.join(platform.arch_dir()))
}

/// Locator following the `matlab` launcher on `PATH`.
#[derive(Debug, Clone, Copy)]
pub struct ExecutableLocator {
    platform: Platform,
}

impl ExecutableLocator {
    /// Locator for `platform`'s launcher and library layout.
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    fn find_executable(&self) -> Option<PathBuf> {
        let output = Command::new("which")
            .arg(self.platform.executable_name())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }

        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if path.is_empty() {
            return None;
        }

        // The launcher on PATH is usually a symlink into the install.
        let path = PathBuf::from(path);
        Some(std::fs::canonicalize(&path).unwrap_or(path))
    }
}

impl InstallLocator for ExecutableLocator {
    fn name(&self) -> &'static str {
        "executable"
    }

    fn locate(&self) -> Option<PathBuf> {
        let executable = self.find_executable()?;
        debug!("Found MATLAB launcher at {}", executable.display());
        let dir = library_dir_from_executable(&executable, self.platform)?;
        dir.is_dir().then_some(dir)
    }
}
