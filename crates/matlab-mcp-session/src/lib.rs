//! # matlab-mcp-session
//!
//! Engine session lifecycle and pooling for the MATLAB MCP Server.
//!
//! This crate provides:
//! - [`EngineSession`]: one engine connection with command evaluation,
//!   variable exchange, console visibility and output capture
//! - [`MxArray`]: owned engine values and struct decoding
//! - [`discovery`]: install discovery and library search-path handling
//! - [`EngineManager`]: the pool of sessions keyed by integer handle
//!
//! ## Architecture
//!
//! This is Layer 2 in the architecture - it depends on matlab-mcp-core
//! and matlab-mcp-loader to manage engine session lifecycles.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod discovery;
pub mod manager;
pub mod output;
pub mod session;
pub mod value;

// Re-export commonly used types
pub use discovery::{FixedLocator, InstallLocator, NoInstall, SearchPathGuard};
pub use manager::{EngineManager, EngineManagerConfig};
pub use output::OutputBuffer;
pub use session::{EngineSession, CLEAR_WORKSPACE_COMMAND};
pub use value::{MxArray, ValueClass};
