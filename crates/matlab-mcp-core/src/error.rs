//! Error types for the MATLAB MCP Server.

use thiserror::Error;

use crate::SessionHandle;

/// Main error type for MATLAB engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The native library has not been loaded
    #[error("Library not loaded: {0}")]
    LibraryNotLoaded(String),

    /// The native loader refused to load a library
    #[error("Failed to load library '{name}': {reason}")]
    LibraryLoad {
        /// Library file name
        name: String,
        /// Loader message
        reason: String,
    },

    /// The library is loaded but does not export the symbol
    #[error("Symbol '{symbol}' not found in {library}")]
    SymbolNotFound {
        /// Library file name
        library: String,
        /// Exported symbol name
        symbol: String,
    },

    /// The entry point is not registered for this library
    #[error("Symbol '{symbol}' is not registered for {library}")]
    UnknownSymbol {
        /// Library file name
        library: String,
        /// Exported symbol name
        symbol: String,
    },

    /// The session has no live engine handle
    #[error("Engine session not connected")]
    NotConnected,

    /// A native call reported a nonzero status
    #[error("Native call {call} failed with status {status}")]
    NativeCall {
        /// Entry point that failed
        call: &'static str,
        /// Status code returned by the engine
        status: i32,
    },

    /// Names passed to the engine cannot contain interior NUL bytes
    #[error("Invalid name: {0:?}")]
    InvalidName(String),

    /// Session not found
    #[error("Session not found: {0}")]
    SessionNotFound(SessionHandle),

    /// Install discovery failed
    #[error("Discovery error: {0}")]
    Discovery(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

impl From<std::ffi::NulError> for Error {
    fn from(err: std::ffi::NulError) -> Self {
        let bytes = err.into_vec();
        Error::InvalidName(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
