//! MATLAB MCP Server Implementation
//!
//! This module implements the MCP server using rmcp 0.9's #[tool_router] pattern.
//! It routes MCP tool calls to the engine session pool.

use std::sync::{Arc, Mutex, PoisonError};

use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ErrorData as McpError,
};
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use matlab_mcp_core::config::MAX_OUTPUT_BUFFER_SIZE;
use matlab_mcp_core::{Error, ServerConfig};
use matlab_mcp_loader::LibraryRegistry;
use matlab_mcp_session::{EngineManager, EngineManagerConfig, MxArray, ValueClass};

use crate::tools::*;

fn invalid_params(message: impl Into<String>) -> McpError {
    McpError::new(ErrorCode(-32602), message.into(), None)
}

fn internal_error(message: impl Into<String>) -> McpError {
    McpError::new(ErrorCode(-32603), message.into(), None)
}

fn session_error(err: Error) -> McpError {
    match err {
        Error::SessionNotFound(handle) => invalid_params(format!(
            "Session {handle} not found. Open it with matlab_session_open first."
        )),
        Error::InvalidName(name) => invalid_params(format!("Invalid name: {name:?}")),
        other => internal_error(other.to_string()),
    }
}

fn to_json<T: serde::Serialize>(response: &T, fallback: impl FnOnce() -> String) -> CallToolResult {
    CallToolResult::success(vec![Content::text(
        serde_json::to_string_pretty(response).unwrap_or_else(|_| fallback()),
    )])
}

/// Decode a workspace value into JSON.
///
/// Double values yield their first element, character arrays their text and
/// logical values their first element; anything else decodes to `null`.
fn decode(value: &MxArray) -> matlab_mcp_core::Result<(ValueClass, Value)> {
    let class = value.class()?;
    let decoded = match class {
        ValueClass::Numeric => value
            .to_scalar()?
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number),
        ValueClass::Char => value.to_text()?.map(Value::String),
        ValueClass::Logical => value.to_bool()?.map(Value::Bool),
        ValueClass::Cell | ValueClass::Struct | ValueClass::Other => None,
    };
    Ok((class, decoded.unwrap_or(Value::Null)))
}

fn encode(libs: &Arc<LibraryRegistry>, value: &Value) -> Result<MxArray, McpError> {
    let created = match value {
        Value::Number(number) => match number.as_f64() {
            Some(number) => MxArray::scalar(libs, number),
            None => return Err(invalid_params(format!("Unsupported number: {number}"))),
        },
        Value::String(text) => MxArray::string(libs, text),
        Value::Bool(flag) => MxArray::logical(libs, *flag),
        other => {
            return Err(invalid_params(format!(
                "Only numbers, strings and booleans can be stored, got {other}"
            )))
        }
    };
    created.map_err(session_error)
}

/// MATLAB MCP Server
///
/// Owns the engine session pool and exposes it via MCP tools. Engine calls
/// block, so every tool runs its pool work on tokio's blocking pool while
/// holding the pool mutex.
#[derive(Clone)]
pub struct MatlabMcpServer {
    /// Engine session pool
    manager: Arc<Mutex<EngineManager>>,
    /// Tool router for handling MCP tool calls
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl MatlabMcpServer {
    /// Create a server around an existing session pool
    pub fn new(manager: EngineManager) -> Self {
        Self {
            manager: Arc::new(Mutex::new(manager)),
            tool_router: Self::tool_router(),
        }
    }

    /// Create a server that discovers the install with the given configuration
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(EngineManager::new(EngineManagerConfig::from(config)))
    }

    /// Run `f` against the pool on the blocking thread pool.
    async fn with_manager<T, F>(&self, f: F) -> Result<T, McpError>
    where
        T: Send + 'static,
        F: FnOnce(&mut EngineManager) -> Result<T, McpError> + Send + 'static,
    {
        let manager = Arc::clone(&self.manager);
        tokio::task::spawn_blocking(move || {
            let mut manager = manager.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut manager)
        })
        .await
        .map_err(|e| {
            error!("Engine task failed: {}", e);
            internal_error(format!("Engine task failed: {e}"))
        })?
    }

    /// Report availability of the engine library and the pool state
    #[tool(description = "Report whether a MATLAB install was found, the console policy and the number of open sessions")]
    #[instrument(skip_all)]
    pub async fn matlab_status(
        &self,
        Parameters(_params): Parameters<StatusParams>,
    ) -> Result<CallToolResult, McpError> {
        let response = self
            .with_manager(|manager| {
                Ok(StatusResponse {
                    available: manager.is_available(),
                    install_dir: manager.install_dir().map(|dir| dir.display().to_string()),
                    console: manager.console_policy(),
                    show_console: manager.show_console(),
                    session_count: manager.count(),
                    platform: manager.config().platform.to_string(),
                })
            })
            .await?;

        debug!("Status: available={}", response.available);

        Ok(to_json(&response, || {
            format!("available: {}", response.available)
        }))
    }

    /// Open (or look up) the session with the given handle
    #[tool(description = "Open the MATLAB engine session with the given integer handle, creating it on first use")]
    #[instrument(skip_all)]
    pub async fn matlab_session_open(
        &self,
        Parameters(params): Parameters<SessionOpenParams>,
    ) -> Result<CallToolResult, McpError> {
        info!("Opening session {}", params.handle);

        let handle = params.handle;
        let response = self
            .with_manager(move |manager| {
                let created = !manager.exists(handle);
                let available = manager.is_available();
                let session = manager.get_session(handle);
                let connected = session.is_connected();

                let message = match (connected, created) {
                    (true, true) => format!("Session {handle} opened"),
                    (true, false) => format!("Session {handle} already open"),
                    (false, _) if !available => {
                        format!("Session {handle} created but no MATLAB install was found")
                    }
                    (false, _) => format!("Session {handle} is not connected to an engine"),
                };

                Ok(SessionOpenResponse {
                    handle,
                    created,
                    connected,
                    single_use: session.is_single_use(),
                    visible: session.is_visible(),
                    buffer_size: session.buffer_size(),
                    message,
                })
            })
            .await?;

        if !response.connected {
            warn!("{}", response.message);
        }

        Ok(to_json(&response, || response.message.clone()))
    }

    /// List pooled sessions
    #[tool(description = "List all MATLAB engine sessions in the pool")]
    #[instrument(skip_all)]
    pub async fn matlab_session_list(
        &self,
        Parameters(_params): Parameters<SessionListParams>,
    ) -> Result<CallToolResult, McpError> {
        let sessions = self
            .with_manager(|manager| Ok(manager.list_sessions()))
            .await?;

        let response = SessionListResponse {
            count: sessions.len(),
            sessions,
        };

        Ok(to_json(&response, || format!("{} sessions", response.count)))
    }

    /// Close one session or every session
    #[tool(description = "Close a MATLAB engine session by handle, or every session when 'all' is true")]
    #[instrument(skip_all)]
    pub async fn matlab_session_close(
        &self,
        Parameters(params): Parameters<SessionCloseParams>,
    ) -> Result<CallToolResult, McpError> {
        let response = match (params.all, params.handle) {
            (true, _) => {
                let closed = self.with_manager(|manager| Ok(manager.delete_all())).await?;
                info!("Closed {} sessions", closed);
                SessionCloseResponse {
                    closed,
                    message: format!("Closed {closed} sessions"),
                }
            }
            (false, Some(handle)) => {
                let removed = self
                    .with_manager(move |manager| Ok(manager.delete_session(handle)))
                    .await?;
                if !removed {
                    return Err(invalid_params(format!("Session {handle} not found")));
                }
                info!("Closed session {}", handle);
                SessionCloseResponse {
                    closed: 1,
                    message: format!("Session {handle} closed"),
                }
            }
            (false, None) => {
                return Err(invalid_params("Either 'handle' or 'all' must be given"));
            }
        };

        Ok(to_json(&response, || response.message.clone()))
    }

    /// Evaluate a command in a session
    #[tool(description = "Evaluate a MATLAB command in an open session and return the captured command window output")]
    #[instrument(skip_all)]
    pub async fn matlab_eval(
        &self,
        Parameters(params): Parameters<EvalParams>,
    ) -> Result<CallToolResult, McpError> {
        debug!("Evaluating in session {}: {:?}", params.handle, params.command);

        let EvalParams { handle, command } = params;
        let response = self
            .with_manager(move |manager| {
                let session = manager.session_mut(handle).map_err(session_error)?;
                let success = session.run_command(&command);
                Ok(EvalResponse {
                    handle,
                    success,
                    output: if success {
                        session.engine_output()
                    } else {
                        String::new()
                    },
                })
            })
            .await?;

        if !response.success {
            warn!("Command failed in session {}", response.handle);
        }

        Ok(to_json(&response, || response.output.clone()))
    }

    /// Read a workspace variable
    #[tool(description = "Read a variable from a session's workspace; doubles, strings and logicals are decoded, other classes return null")]
    #[instrument(skip_all)]
    pub async fn matlab_get_variable(
        &self,
        Parameters(params): Parameters<GetVariableParams>,
    ) -> Result<CallToolResult, McpError> {
        let GetVariableParams { handle, name } = params;
        let response = self
            .with_manager(move |manager| {
                let session = manager.session(handle).map_err(session_error)?;
                let value = session.get_var(&name).ok_or_else(|| {
                    invalid_params(format!("Variable '{name}' not found in session {handle}"))
                })?;
                let (class, value) = decode(&value).map_err(|e| {
                    error!("Failed to decode '{}': {}", name, e);
                    internal_error(format!("Failed to decode '{name}': {e}"))
                })?;
                Ok(GetVariableResponse {
                    handle,
                    name,
                    class,
                    value,
                })
            })
            .await?;

        Ok(to_json(&response, || response.value.to_string()))
    }

    /// Write a workspace variable
    #[tool(description = "Store a number, string or boolean as a variable in a session's workspace")]
    #[instrument(skip_all)]
    pub async fn matlab_put_variable(
        &self,
        Parameters(params): Parameters<PutVariableParams>,
    ) -> Result<CallToolResult, McpError> {
        let PutVariableParams {
            handle,
            name,
            value,
        } = params;
        let response = self
            .with_manager(move |manager| {
                let libs = Arc::clone(manager.libraries());
                let session = manager.session_mut(handle).map_err(session_error)?;
                let array = encode(&libs, &value)?;
                let success = session.put_var(&name, &array);
                Ok(PutVariableResponse {
                    handle,
                    name,
                    success,
                })
            })
            .await?;

        if !response.success {
            warn!("Failed to store '{}' in session {}", response.name, response.handle);
        }

        Ok(to_json(&response, || format!("stored: {}", response.success)))
    }

    /// Show or hide the engine console
    #[tool(description = "Show or hide the MATLAB console window of a session")]
    #[instrument(skip_all)]
    pub async fn matlab_set_visible(
        &self,
        Parameters(params): Parameters<SetVisibleParams>,
    ) -> Result<CallToolResult, McpError> {
        let SetVisibleParams { handle, visible } = params;
        let response = self
            .with_manager(move |manager| {
                let session = manager.session_mut(handle).map_err(session_error)?;
                let success = session.set_visible(visible);
                Ok(SetVisibleResponse {
                    handle,
                    success,
                    visible: session.is_visible(),
                })
            })
            .await?;

        Ok(to_json(&response, || format!("visible: {}", response.visible)))
    }

    /// Replace the output capture buffer
    #[tool(description = "Resize the output capture buffer of a session in bytes; 0 disables capture")]
    #[instrument(skip_all)]
    pub async fn matlab_set_output_buffer(
        &self,
        Parameters(params): Parameters<SetOutputBufferParams>,
    ) -> Result<CallToolResult, McpError> {
        if params.size > MAX_OUTPUT_BUFFER_SIZE {
            return Err(invalid_params(format!(
                "Output buffer size must be <= {MAX_OUTPUT_BUFFER_SIZE}, got {}",
                params.size
            )));
        }

        let SetOutputBufferParams { handle, size } = params;
        let response = self
            .with_manager(move |manager| {
                let session = manager.session_mut(handle).map_err(session_error)?;
                let success = session.set_output_buffer(size);
                Ok(SetOutputBufferResponse {
                    handle,
                    success,
                    buffer_size: session.buffer_size(),
                    capturing: session.has_output_buffer(),
                })
            })
            .await?;

        Ok(to_json(&response, || {
            format!("buffer_size: {}", response.buffer_size)
        }))
    }

    /// Clear a session's workspace
    #[tool(description = "Clear all variables and functions from a session's workspace")]
    #[instrument(skip_all)]
    pub async fn matlab_clear(
        &self,
        Parameters(params): Parameters<ClearParams>,
    ) -> Result<CallToolResult, McpError> {
        let handle = params.handle;
        let response = self
            .with_manager(move |manager| {
                let session = manager.session_mut(handle).map_err(session_error)?;
                Ok(ClearResponse {
                    handle,
                    success: session.clear_workspace(),
                })
            })
            .await?;

        Ok(to_json(&response, || format!("cleared: {}", response.success)))
    }
}

impl Default for MatlabMcpServer {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

// Implement the ServerHandler trait to define server capabilities
#[tool_handler]
impl rmcp::ServerHandler for MatlabMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(
                "MATLAB MCP Server - Drive MATLAB engine sessions identified by integer handles. \
                 Use matlab_session_open to start a session, matlab_eval to run commands, \
                 matlab_get_variable / matlab_put_variable to exchange values, \
                 and matlab_session_close when done."
                    .into(),
            ),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}
