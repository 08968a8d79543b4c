//! Configuration types for the MATLAB MCP Server.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{ConsoleWindowStatus, Error, Platform};

/// Largest accepted output buffer (16 MiB).
pub const MAX_OUTPUT_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Default output buffer capacity in bytes.
pub const DEFAULT_OUTPUT_BUFFER_SIZE: usize = 512;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Server configuration loaded from YAML file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Server settings
    pub server: ServerSettings,
    /// Engine session settings
    pub engine: EngineSettings,
    /// Native library file names
    pub libraries: LibrarySettings,
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string.
    pub fn from_yaml(yaml: &str) -> crate::Result<Self> {
        let config: ServerConfig = serde_yaml::from_str(yaml)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> crate::Result<()> {
        if !LOG_LEVELS.contains(&self.server.log_level.as_str()) {
            return Err(Error::Config(format!(
                "server.log_level must be one of {LOG_LEVELS:?}, got '{}'",
                self.server.log_level
            )));
        }

        if self.engine.output_buffer_size > MAX_OUTPUT_BUFFER_SIZE {
            return Err(Error::Config(format!(
                "engine.output_buffer_size must be <= {MAX_OUTPUT_BUFFER_SIZE}"
            )));
        }

        if let Some(var) = &self.engine.library_path_var {
            if var.trim().is_empty() || var.contains('=') {
                return Err(Error::Config(format!(
                    "engine.library_path_var is not a valid variable name: '{var}'"
                )));
            }
        }

        self.libraries.validate()
    }
}

/// Server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Engine session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Console window policy for new sessions
    pub console: ConsoleWindowStatus,
    /// Output buffer capacity for new sessions (0 = no capture)
    pub output_buffer_size: usize,
    /// Library directory override; skips install discovery when set
    pub install_dir: Option<PathBuf>,
    /// Search-path variable override (defaults to the platform's)
    pub library_path_var: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            console: ConsoleWindowStatus::Auto,
            output_buffer_size: DEFAULT_OUTPUT_BUFFER_SIZE,
            install_dir: None,
            library_path_var: None,
        }
    }
}

impl EngineSettings {
    /// Search-path variable to mutate during discovery.
    pub fn library_path_var(&self, platform: Platform) -> String {
        self.library_path_var
            .clone()
            .unwrap_or_else(|| platform.library_path_var().to_string())
    }
}

/// File names of the three native libraries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Engine library (engOpen, engEvalString, ...)
    pub engine: String,
    /// Matrix library (mxGetField, mxGetPr, ...)
    pub matrix: String,
    /// MAT-file library
    pub mat: String,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self::for_platform(Platform::detect())
    }
}

impl LibrarySettings {
    /// Conventional library names for a platform.
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            engine: platform.library_file_name("eng"),
            matrix: platform.library_file_name("mx"),
            mat: platform.library_file_name("mat"),
        }
    }

    fn validate(&self) -> crate::Result<()> {
        for (key, name) in [
            ("engine", &self.engine),
            ("matrix", &self.matrix),
            ("mat", &self.mat),
        ] {
            if name.trim().is_empty() {
                return Err(Error::Config(format!("libraries.{key} cannot be empty")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.engine.console, ConsoleWindowStatus::Auto);
        assert_eq!(config.engine.output_buffer_size, 512);
        assert!(config.engine.install_dir.is_none());
        assert_eq!(
            config.libraries.engine,
            Platform::detect().library_file_name("eng")
        );
    }

    #[test]
    fn test_config_validation() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = ServerConfig::default();
        config.server.log_level = "verbose".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_output_buffer_too_large() {
        let mut config = ServerConfig::default();
        config.engine.output_buffer_size = MAX_OUTPUT_BUFFER_SIZE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_output_buffer_is_valid() {
        let mut config = ServerConfig::default();
        config.engine.output_buffer_size = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_library_name() {
        let mut config = ServerConfig::default();
        config.libraries.matrix = " ".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("libraries.matrix"));
    }

    #[test]
    fn test_invalid_library_path_var() {
        let mut config = ServerConfig::default();
        config.engine.library_path_var = Some("A=B".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_library_path_var_override() {
        let mut settings = EngineSettings::default();
        assert_eq!(settings.library_path_var(Platform::Windows), "PATH");

        settings.library_path_var = Some("MATLAB_LIBS".to_string());
        assert_eq!(settings.library_path_var(Platform::Windows), "MATLAB_LIBS");
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = r#"
server:
  log_level: debug

engine:
  console: hide
  output_buffer_size: 4096
  install_dir: /opt/matlab/R2023b/bin/glnxa64

libraries:
  engine: libeng.so
  matrix: libmx.so
  mat: libmat.so
"#;

        let config = ServerConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.log_level, "debug");
        assert_eq!(config.engine.console, ConsoleWindowStatus::Hide);
        assert_eq!(config.engine.output_buffer_size, 4096);
        assert_eq!(
            config.engine.install_dir,
            Some(PathBuf::from("/opt/matlab/R2023b/bin/glnxa64"))
        );
        assert_eq!(config.libraries.matrix, "libmx.so");
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = ServerConfig::from_yaml("engine:\n  console: show\n").unwrap();
        assert_eq!(config.engine.console, ConsoleWindowStatus::Show);
        assert_eq!(config.engine.output_buffer_size, DEFAULT_OUTPUT_BUFFER_SIZE);
        assert_eq!(config.server.log_level, "info");
    }

    #[test]
    fn test_malformed_yaml() {
        let result = ServerConfig::from_yaml("engine: [unclosed");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
