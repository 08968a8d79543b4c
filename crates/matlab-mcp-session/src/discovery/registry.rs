//! Windows registry discovery.
//!
//! MATLAB registers itself as the `MATLAB.AutoServer` COM server. Its CLSID
//! leads to the `LocalServer32` command line, whose directory part is the
//! library directory, e.g. `C:\Program Files\MATLAB\R2017a\bin\win64\`.

use std::path::PathBuf;
use std::process::Command;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, warn};

use matlab_mcp_core::{Error, Result};

use super::InstallLocator;

const AUTOSERVER_CLSID_KEY: &str = r"HKCR\MATLAB.AutoServer\CLSID";
const SERVER_EXECUTABLE: &str = "matlab.exe";

lazy_static! {
    /// Default value line of `reg query <key> /ve`, any locale.
    static ref DEFAULT_VALUE: Regex =
        Regex::new(r"(?m)^[ \t]*\([^)]*\)[ \t]+REG_(?:EXPAND_)?SZ[ \t]+(.*?)[ \t\r]*$").unwrap();
}

/// Extract the default value from `reg query <key> /ve` output.
pub fn parse_default_value(output: &str) -> Option<String> {
    DEFAULT_VALUE
        .captures(output)
        .and_then(|caps| caps.get(1))
        .map(|value| value.as_str().to_string())
        .filter(|value| !value.is_empty())
}

/// Library directory from a `LocalServer32` command line.
///
/// The directory is everything before `MATLAB.exe` (case-insensitive), with
/// a leading quote removed.
pub fn install_dir_from_server_command(command: &str) -> Option<PathBuf> {
    let end = command.to_ascii_lowercase().find(SERVER_EXECUTABLE)?;
    let dir = command[..end].trim_start().trim_start_matches('"');
    if dir.is_empty() {
        None
    } else {
        Some(PathBuf::from(dir))
    }
}

fn query_default_value(key: &str) -> Result<Option<String>> {
    let output = Command::new("reg")
        .args(["query", key, "/ve"])
        .output()
        .map_err(|e| Error::Discovery(format!("failed to run reg query: {e}")))?;
    if !output.status.success() {
        debug!("reg query {} failed", key);
        return Ok(None);
    }
    Ok(parse_default_value(&String::from_utf8_lossy(&output.stdout)))
}

/// Locator reading the COM server registration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryLocator;

impl RegistryLocator {
    fn query(&self) -> Result<Option<PathBuf>> {
        let Some(clsid) = query_default_value(AUTOSERVER_CLSID_KEY)? else {
            return Ok(None);
        };
        let server_key = format!(r"HKCR\CLSID\{}\LocalServer32", clsid);
        let Some(command) = query_default_value(&server_key)? else {
            return Ok(None);
        };
        debug!("MATLAB.AutoServer command line: {}", command);
        Ok(install_dir_from_server_command(&command))
    }
}

impl InstallLocator for RegistryLocator {
    fn name(&self) -> &'static str {
        "registry"
    }

    fn locate(&self) -> Option<PathBuf> {
        self.query().unwrap_or_else(|e| {
            warn!("{}", e);
            None
        })
    }
}
