//! MCP server: exposes the [`Runtime`] facade's operations as tools.
//!
//! Tool schemas are the request/response types from [`crate::models`]
//! directly -- they already derive `JsonSchema`/`Deserialize`/`Serialize`,
//! so there is no separate parameter-struct layer the way the stateless
//! command tools the facade replaced once had.

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::*;
use rmcp::tool;
use rmcp::tool_handler;
use rmcp::tool_router;
use rmcp::{ErrorData as McpError, ServerHandler};
use serde::Serialize;

use crate::error::ExceptionTransfer;
use crate::models::{
    Action, Command, CreateSessionRequest, ReadFileRequest, UploadRequest, WriteFileRequest,
};
use crate::registry::Runtime;

fn json_content<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("JSON serialization error: {e}"), None))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}

/// Render a [`SwerexError`] as its wire `ExceptionTransfer` form, so a caller
/// gets the same `class_path`/`extra_info` a remote client would see over
/// HTTP (even though this transport is MCP stdio, not HTTP).
fn err_result(err: crate::error::SwerexError) -> Result<CallToolResult, McpError> {
    let transfer: ExceptionTransfer = (&err).into();
    let json = serde_json::to_string_pretty(&transfer).unwrap_or_else(|_| err.to_string());
    Ok(CallToolResult::error(vec![Content::text(json)]))
}

/// The session-runtime MCP server.
#[derive(Clone)]
pub struct SweshServer {
    runtime: Runtime,
    tool_router: ToolRouter<SweshServer>,
}

impl SweshServer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            runtime: Runtime::new(),
            tool_router: Self::tool_router(),
        }
    }
}

impl Default for SweshServer {
    fn default() -> Self {
        Self::new()
    }
}

#[tool_router]
impl SweshServer {
    #[tool(description = "Check whether the runtime is alive. Always true for this local, in-process runtime.")]
    async fn is_alive(&self) -> Result<CallToolResult, McpError> {
        json_content(&self.runtime.is_alive().await)
    }

    #[tool(
        description = "Create a persistent bash session backed by a real PTY. Working directory, env vars, shell functions, and aliases persist across commands run in it. Optionally sources a list of startup files first."
    )]
    async fn create_session(
        &self,
        Parameters(req): Parameters<CreateSessionRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(session = %req.session, "create_session");
        let started = std::time::Instant::now();
        match self.runtime.create_session(&req).await {
            Ok(resp) => {
                tracing::info!(
                    session = %req.session,
                    duration = started.elapsed().as_secs_f64(),
                    "create_session completed"
                );
                json_content(&resp)
            }
            Err(e) => {
                tracing::warn!(session = %req.session, error = %e, "create_session failed");
                err_result(e)
            }
        }
    }

    #[tool(
        description = "Run a bash action or a bash-interrupt action in a session. Use `action_type: \"bash\"` for normal/interactive commands, or `action_type: \"bash_interrupt\"` to abort a running command (send SIGINT, retrying, falling back to SIGTSTP + kill -9)."
    )]
    async fn run_in_session(
        &self,
        Parameters(action): Parameters<Action>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(session = %action.session(), "run_in_session");
        let started = std::time::Instant::now();
        match self.runtime.run_in_session(&action).await {
            Ok(observation) => {
                tracing::info!(
                    session = %action.session(),
                    exit_code = observation.exit_code,
                    duration = started.elapsed().as_secs_f64(),
                    "run_in_session completed"
                );
                json_content(&observation)
            }
            Err(e) => {
                let timed_out = matches!(e, crate::error::SwerexError::CommandTimeout(_));
                tracing::warn!(
                    session = %action.session(),
                    duration = started.elapsed().as_secs_f64(),
                    timed_out,
                    error = %e,
                    "run_in_session failed"
                );
                err_result(e)
            }
        }
    }

    #[tool(description = "Close a bash session, releasing its PTY.")]
    async fn close_session(
        &self,
        Parameters(req): Parameters<crate::models::CloseSessionRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(session = %req.session, "close_session");
        match self.runtime.close_session(&req.session).await {
            Ok(()) => {
                tracing::info!(session = %req.session, "close_session completed");
                json_content(&crate::models::CloseSessionResponse::default())
            }
            Err(e) => {
                tracing::warn!(session = %req.session, error = %e, "close_session failed");
                err_result(e)
            }
        }
    }

    #[tool(
        description = "Run a one-shot subprocess outside of any session (no PTY, no persisted state). Accepts either a shell string or an argv list, with optional timeout, env, and cwd."
    )]
    async fn execute(
        &self,
        Parameters(command): Parameters<Command>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!("execute");
        let started = std::time::Instant::now();
        match self.runtime.execute(&command).await {
            Ok(resp) => {
                tracing::info!(
                    exit_code = resp.exit_code,
                    duration = started.elapsed().as_secs_f64(),
                    "execute completed"
                );
                json_content(&resp)
            }
            Err(e) => {
                let timed_out = matches!(e, crate::error::SwerexError::CommandTimeout(_));
                tracing::warn!(
                    duration = started.elapsed().as_secs_f64(),
                    timed_out,
                    error = %e,
                    "execute failed"
                );
                err_result(e)
            }
        }
    }

    #[tool(description = "Read a file's contents as UTF-8 text.")]
    async fn read_file(
        &self,
        Parameters(req): Parameters<ReadFileRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(path = %req.path, "read_file");
        match self.runtime.read_file(&req.path).await {
            Ok(resp) => json_content(&resp),
            Err(e) => {
                tracing::warn!(path = %req.path, error = %e, "read_file failed");
                err_result(e)
            }
        }
    }

    #[tool(description = "Write text content to a file, creating parent directories as needed.")]
    async fn write_file(
        &self,
        Parameters(req): Parameters<WriteFileRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(path = %req.path, "write_file");
        match self.runtime.write_file(&req).await {
            Ok(resp) => json_content(&resp),
            Err(e) => {
                tracing::warn!(path = %req.path, error = %e, "write_file failed");
                err_result(e)
            }
        }
    }

    #[tool(
        description = "Upload a local file or directory to a target path. Directories are zipped and unpacked at the target; files are copied directly."
    )]
    async fn upload(
        &self,
        Parameters(req): Parameters<UploadRequest>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(source = %req.source_path, target = %req.target_path, "upload");
        let started = std::time::Instant::now();
        match self.runtime.upload(&req).await {
            Ok(resp) => {
                tracing::info!(
                    target = %req.target_path,
                    duration = started.elapsed().as_secs_f64(),
                    "upload completed"
                );
                json_content(&resp)
            }
            Err(e) => {
                tracing::warn!(target = %req.target_path, error = %e, "upload failed");
                err_result(e)
            }
        }
    }

    #[tool(description = "Close every session and release all runtime resources.")]
    async fn close(&self) -> Result<CallToolResult, McpError> {
        tracing::info!("close");
        match self.runtime.close().await {
            Ok(resp) => {
                tracing::info!("close completed");
                json_content(&resp)
            }
            Err(e) => {
                tracing::error!(error = %e, "close failed");
                err_result(e)
            }
        }
    }
}

#[tool_handler]
impl ServerHandler for SweshServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "swesh".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            instructions: Some(
                "swesh is a remote code-execution runtime for autonomous software-engineering \
                 agents. create_session starts a persistent bash session with a real PTY; \
                 run_in_session drives it (bash actions, or bash_interrupt to abort a hung \
                 command); close_session releases it. execute runs a one-shot subprocess with \
                 no session or PTY. read_file/write_file/upload move files in and out. Errors \
                 carry a class_path and extra_info so callers can distinguish timeout, \
                 non-zero-exit, and syntax-error failures."
                    .to_string(),
            ),
        }
    }
}
