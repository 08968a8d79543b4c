//! # matlab-mcp-core
//!
//! Core types for the MATLAB MCP Server.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other matlab-mcp crates. It provides:
//!
//! - Session types (SessionHandle, SessionStatus, ConsoleWindowStatus)
//! - Platform detection and native library naming
//! - Configuration loaded from YAML
//! - Error types
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other matlab-mcp crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod platform;
pub mod session;

// Re-export commonly used types
pub use config::{EngineSettings, LibrarySettings, ServerConfig, ServerSettings};
pub use error::{Error, Result};
pub use platform::Platform;
pub use session::{ConsoleWindowStatus, SessionHandle, SessionInfo, SessionStatus};
