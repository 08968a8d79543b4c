//! Session types for engine session management.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Caller-chosen integer key of a pooled engine session.
///
/// Handles are not required to be dense; any `i32` is a valid key.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct SessionHandle(i32);

impl SessionHandle {
    /// Create a handle from its integer value.
    pub const fn new(id: i32) -> Self {
        Self(id)
    }

    /// Get the integer value.
    pub const fn get(&self) -> i32 {
        self.0
    }
}

impl From<i32> for SessionHandle {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection state of an engine session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// No native engine handle
    Closed,
    /// A native engine handle is held
    Open,
}

/// Console window policy for newly created sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleWindowStatus {
    /// Never show the engine console
    Hide,
    /// Always show the engine console
    Show,
    /// Visible in debug builds, hidden in release builds
    #[default]
    Auto,
}

impl ConsoleWindowStatus {
    /// Resolve the policy to a visibility flag.
    ///
    /// `Auto` follows the build mode (`debug_assertions`).
    pub fn resolve(&self) -> bool {
        match self {
            ConsoleWindowStatus::Hide => false,
            ConsoleWindowStatus::Show => true,
            ConsoleWindowStatus::Auto => cfg!(debug_assertions),
        }
    }
}

impl std::fmt::Display for ConsoleWindowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConsoleWindowStatus::Hide => write!(f, "hide"),
            ConsoleWindowStatus::Show => write!(f, "show"),
            ConsoleWindowStatus::Auto => write!(f, "auto"),
        }
    }
}

/// Snapshot of a pooled session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SessionInfo {
    /// Pool key
    pub handle: SessionHandle,
    /// Current status
    pub status: SessionStatus,
    /// Whether the engine was opened as a single-use instance
    pub single_use: bool,
    /// Whether the engine console is visible
    pub visible: bool,
    /// Output buffer capacity in bytes (0 = capture disabled)
    pub buffer_size: usize,
}
