//! MCP Tool Types
//!
//! Parameter and response types for every tool the server exposes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use matlab_mcp_core::{ConsoleWindowStatus, SessionInfo};
use matlab_mcp_session::ValueClass;

// =============================================================================
// Server Tools
// =============================================================================

/// Parameters for matlab_status
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusParams {}

/// Response for matlab_status
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StatusResponse {
    /// Whether the engine library was found and loads
    pub available: bool,

    /// Library directory of the MATLAB install, if found
    pub install_dir: Option<String>,

    /// Console policy for new sessions
    pub console: ConsoleWindowStatus,

    /// Whether new sessions show the console
    pub show_console: bool,

    /// Number of pooled sessions
    pub session_count: usize,

    /// Host platform
    pub platform: String,
}

// =============================================================================
// Session Management Tools
// =============================================================================

/// Parameters for matlab_session_open
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionOpenParams {
    /// Integer handle identifying the session
    pub handle: i32,
}

/// Response for matlab_session_open
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionOpenResponse {
    /// Session handle
    pub handle: i32,

    /// Whether this call created the session
    pub created: bool,

    /// Whether the engine answers commands
    pub connected: bool,

    /// Whether the engine is a single-use instance
    pub single_use: bool,

    /// Whether the engine console is visible
    pub visible: bool,

    /// Output buffer size in bytes
    pub buffer_size: usize,

    /// Status message
    pub message: String,
}

/// Parameters for matlab_session_list
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionListParams {}

/// Response for matlab_session_list
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionListResponse {
    /// Pooled sessions by ascending handle
    pub sessions: Vec<SessionInfo>,

    /// Total count
    pub count: usize,
}

/// Parameters for matlab_session_close
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionCloseParams {
    /// Session to close
    #[serde(default)]
    pub handle: Option<i32>,

    /// Close every session instead
    #[serde(default)]
    pub all: bool,
}

/// Response for matlab_session_close
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionCloseResponse {
    /// Number of sessions closed
    pub closed: usize,

    /// Status message
    pub message: String,
}

// =============================================================================
// Engine Tools
// =============================================================================

/// Parameters for matlab_eval
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EvalParams {
    /// Session to evaluate in
    pub handle: i32,

    /// MATLAB command (e.g., "x = magic(4)", "disp(pi)")
    pub command: String,
}

/// Response for matlab_eval
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EvalResponse {
    /// Session handle
    pub handle: i32,

    /// Whether the engine accepted the command
    pub success: bool,

    /// Captured command window output (empty when capture is off)
    pub output: String,
}

/// Parameters for matlab_get_variable
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetVariableParams {
    /// Session to read from
    pub handle: i32,

    /// Workspace variable name
    pub name: String,
}

/// Response for matlab_get_variable
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GetVariableResponse {
    /// Session handle
    pub handle: i32,

    /// Variable name
    pub name: String,

    /// Class of the variable
    pub class: ValueClass,

    /// Decoded value: a number, string or boolean (null for arrays of
    /// other classes, including integer types)
    pub value: Value,
}

/// Parameters for matlab_put_variable
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PutVariableParams {
    /// Session to write to
    pub handle: i32,

    /// Workspace variable name
    pub name: String,

    /// Value: a number, string or boolean
    pub value: Value,
}

/// Response for matlab_put_variable
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PutVariableResponse {
    /// Session handle
    pub handle: i32,

    /// Variable name
    pub name: String,

    /// Whether the engine stored the value
    pub success: bool,
}

/// Parameters for matlab_set_visible
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetVisibleParams {
    /// Session to change
    pub handle: i32,

    /// Show (true) or hide (false) the console
    pub visible: bool,
}

/// Response for matlab_set_visible
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetVisibleResponse {
    /// Session handle
    pub handle: i32,

    /// Whether the engine accepted the change
    pub success: bool,

    /// Visibility reported afterwards
    pub visible: bool,
}

/// Parameters for matlab_set_output_buffer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetOutputBufferParams {
    /// Session to change
    pub handle: i32,

    /// Buffer size in bytes (0 disables capture)
    pub size: usize,
}

/// Response for matlab_set_output_buffer
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SetOutputBufferResponse {
    /// Session handle
    pub handle: i32,

    /// Whether the buffer was replaced (an open session keeps its old
    /// buffer when the engine refuses the new one)
    pub success: bool,

    /// Buffer size in bytes after the call
    pub buffer_size: usize,

    /// Whether output is captured
    pub capturing: bool,
}

/// Parameters for matlab_clear
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClearParams {
    /// Session whose workspace is cleared
    pub handle: i32,
}

/// Response for matlab_clear
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClearResponse {
    /// Session handle
    pub handle: i32,

    /// Whether the engine ran the clear
    pub success: bool,
}
