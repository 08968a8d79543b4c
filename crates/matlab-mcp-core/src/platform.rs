//! Platform detection and native library conventions.
//!
//! The engine's shared libraries, the loader search-path variable, and the
//! architecture directory inside a MATLAB install all differ per platform.

use serde::{Deserialize, Serialize};

/// Supported platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Linux
    Linux,
    /// macOS
    MacOS,
    /// Windows
    Windows,
}

impl Platform {
    /// Detect the current platform.
    ///
    /// # Examples
    ///
    /// ```
    /// use matlab_mcp_core::Platform;
    ///
    /// let platform = Platform::detect();
    /// println!("Running on: {:?}", platform);
    /// ```
    pub fn detect() -> Self {
        #[cfg(target_os = "linux")]
        {
            Platform::Linux
        }

        #[cfg(target_os = "macos")]
        {
            Platform::MacOS
        }

        #[cfg(target_os = "windows")]
        {
            Platform::Windows
        }

        #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
        {
            compile_error!("Unsupported platform - only Linux, macOS, and Windows are supported")
        }
    }

    /// Get the platform name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            Platform::Linux => "Linux",
            Platform::MacOS => "macOS",
            Platform::Windows => "Windows",
        }
    }

    /// Check if this is Windows.
    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Windows)
    }

    /// Whether engines are opened as single-use instances.
    ///
    /// Only the Windows engine API offers `engOpenSingleUse`.
    pub fn opens_single_use(&self) -> bool {
        self.is_windows()
    }

    /// Platform-conventional file name for a library stem (`"eng"` → `libeng.so`).
    pub fn library_file_name(&self, stem: &str) -> String {
        match self {
            Platform::Linux => format!("lib{stem}.so"),
            Platform::MacOS => format!("lib{stem}.dylib"),
            Platform::Windows => format!("lib{stem}.dll"),
        }
    }

    /// Environment variable the native loader searches for dependencies.
    pub fn library_path_var(&self) -> &'static str {
        match self {
            Platform::Linux => "LD_LIBRARY_PATH",
            Platform::MacOS => "DYLD_LIBRARY_PATH",
            Platform::Windows => "PATH",
        }
    }

    /// Separator between entries of the search-path variable.
    pub fn path_separator(&self) -> char {
        match self {
            Platform::Windows => ';',
            Platform::Linux | Platform::MacOS => ':',
        }
    }

    /// Architecture directory under `<matlabroot>/bin`.
    pub fn arch_dir(&self) -> &'static str {
        match self {
            Platform::Linux => "glnxa64",
            Platform::MacOS if cfg!(target_arch = "aarch64") => "maca64",
            Platform::MacOS => "maci64",
            Platform::Windows => "win64",
        }
    }

    /// Name of the MATLAB launcher executable.
    pub fn executable_name(&self) -> &'static str {
        match self {
            Platform::Windows => "MATLAB.exe",
            Platform::Linux | Platform::MacOS => "matlab",
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
