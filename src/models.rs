//! Request/response schema: tagged variants for create/run/close per session
//! kind, and value types for commands, observations, file I/O, and error
//! transfer (the transfer type itself lives in [`crate::error`]).

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_session_name() -> String {
    "default".to_string()
}

fn default_startup_timeout() -> f64 {
    1.0
}

fn default_check_mode() -> CheckMode {
    CheckMode::Raise
}

/// This runtime only ever runs bash sessions, but every session-scoped
/// request/response still carries the literal discriminator the schema
/// defines room for (the original models these as `Literal["bash"]`,
/// alongside other, non-bash runtimes it doesn't implement).
fn default_session_type() -> String {
    "bash".to_string()
}

/// Whether a non-zero exit code raises, is swallowed, or is not extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CheckMode {
    Raise,
    Silent,
    Ignore,
}

/// Request to start a new bash session.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub startup_source: Vec<String>,
    #[serde(default = "default_session_name")]
    pub session: String,
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout: f64,
    #[serde(default = "default_session_type")]
    pub session_type: String,
}

impl Default for CreateSessionRequest {
    fn default() -> Self {
        CreateSessionRequest {
            startup_source: Vec::new(),
            session: default_session_name(),
            startup_timeout: default_startup_timeout(),
            session_type: default_session_type(),
        }
    }
}

/// Output collected while starting a session.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CreateSessionResponse {
    #[serde(default)]
    pub output: String,
    #[serde(default = "default_session_type")]
    pub session_type: String,
}

impl Default for CreateSessionResponse {
    fn default() -> Self {
        CreateSessionResponse {
            output: String::new(),
            session_type: default_session_type(),
        }
    }
}

/// A command to run inside a bash session and wait for a prompt boundary.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BashAction {
    pub command: String,
    #[serde(default = "default_session_name")]
    pub session: String,
    /// `None` means no timeout.
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub is_interactive_command: bool,
    #[serde(default)]
    pub is_interactive_quit: bool,
    #[serde(default = "default_check_mode")]
    pub check: CheckMode,
    #[serde(default)]
    pub error_msg: String,
    #[serde(default)]
    pub expect: Vec<String>,
}

/// The sanctioned way to abort a command that timed out.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BashInterruptAction {
    #[serde(default = "default_session_name")]
    pub session: String,
    #[serde(default = "default_interrupt_timeout")]
    pub timeout: f64,
    #[serde(default = "default_n_retry")]
    pub n_retry: u32,
    #[serde(default)]
    pub expect: Vec<String>,
}

fn default_interrupt_timeout() -> f64 {
    0.2
}

fn default_n_retry() -> u32 {
    3
}

/// Tagged union over the two bash action kinds, discriminated the way the
/// source models it (`action_type`).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum Action {
    Bash(BashAction),
    BashInterrupt(BashInterruptAction),
}

impl Action {
    pub fn session(&self) -> &str {
        match self {
            Action::Bash(a) => &a.session,
            Action::BashInterrupt(a) => &a.session,
        }
    }
}

/// Result of running an [`Action`] in a session.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Observation {
    #[serde(default)]
    pub output: String,
    /// Unset when `check = ignore` or the action was interactive.
    #[serde(default)]
    pub exit_code: Option<i32>,
    /// Which of the expect strings matched; empty on timeout.
    #[serde(default)]
    pub expect_string: String,
    /// Set only when an observation is produced despite a swallowed error.
    #[serde(default)]
    pub failure_reason: String,
    #[serde(default = "default_session_type")]
    pub session_type: String,
}

impl Default for Observation {
    fn default() -> Self {
        Observation {
            output: String::new(),
            exit_code: None,
            expect_string: String::new(),
            failure_reason: String::new(),
            session_type: default_session_type(),
        }
    }
}

/// Request to close a bash session.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CloseSessionRequest {
    #[serde(default = "default_session_name")]
    pub session: String,
    #[serde(default = "default_session_type")]
    pub session_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CloseSessionResponse {
    #[serde(default = "default_session_type")]
    pub session_type: String,
}

impl Default for CloseSessionResponse {
    fn default() -> Self {
        CloseSessionResponse {
            session_type: default_session_type(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CloseResponse {}

/// Either a single shell string or an argv vector, matching the original's
/// `str | list[str]` union for one-shot command execution.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum CommandArgs {
    Shell(String),
    Argv(Vec<String>),
}

/// A one-shot subprocess to run (similar to `subprocess.run`).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Command {
    pub command: CommandArgs,
    #[serde(default)]
    pub timeout: Option<f64>,
    #[serde(default)]
    pub shell: bool,
    #[serde(default)]
    pub check: bool,
    #[serde(default)]
    pub error_msg: String,
    #[serde(default)]
    pub env: Option<std::collections::HashMap<String, String>>,
    #[serde(default)]
    pub cwd: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CommandResponse {
    #[serde(default)]
    pub stdout: String,
    #[serde(default)]
    pub stderr: String,
    #[serde(default)]
    pub exit_code: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadFileRequest {
    pub path: String,
    #[serde(default)]
    pub encoding: Option<String>,
    #[serde(default)]
    pub errors: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ReadFileResponse {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WriteFileRequest {
    pub content: String,
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct WriteFileResponse {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct UploadRequest {
    pub source_path: String,
    pub target_path: String,
    #[serde(default)]
    pub unzip: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct UploadResponse {}

/// Total: connection failures return `is_alive=false` rather than raising.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IsAliveResponse {
    pub is_alive: bool,
    #[serde(default)]
    pub message: String,
}

impl IsAliveResponse {
    pub fn alive() -> Self {
        IsAliveResponse {
            is_alive: true,
            message: String::new(),
        }
    }
}
