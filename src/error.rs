//! Error taxonomy and the on-the-wire transfer form.
//!
//! Every error the runtime can raise is a variant of [`SwerexError`]. Each
//! variant carries a stable `class_path` literal so a remote client can
//! reconstruct a matching error from the wire form ([`ExceptionTransfer`])
//! without dynamically loading code -- the registry in [`SwerexError::from_class_path`]
//! is closed and exhaustive.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Any error raised by the session runtime.
#[derive(Debug, thiserror::Error)]
pub enum SwerexError {
    #[error("session '{0}' already exists")]
    SessionExists(String),

    #[error("session '{0}' does not exist")]
    SessionDoesNotExist(String),

    #[error("session '{0}' is not initialized")]
    SessionNotInitialized(String),

    #[error("bash syntax error: {message}")]
    BashIncorrectSyntax {
        message: String,
        bash_stdout: String,
        bash_stderr: String,
    },

    #[error("command timed out: {0}")]
    CommandTimeout(String),

    #[error("failed to extract exit code: {0}")]
    NoExitCode(String),

    #[error("{message}")]
    NonZeroExitCode {
        message: String,
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("dummy runtime ran out of scripted outputs")]
    DummyOutputsExhausted,

    #[error("deployment not started")]
    DeploymentNotStarted,

    #[error("failed to pull docker image: {0}")]
    DockerPull(String),

    #[error("{message} ({path})")]
    FileNotFound { message: String, path: String },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{message}")]
    Generic { message: String },
}

impl SwerexError {
    /// Fully qualified class path used to reconstruct this error kind on the
    /// client side of the wire.
    pub fn class_path(&self) -> &'static str {
        match self {
            SwerexError::SessionExists(_) => "swerex.exceptions.SessionExistsError",
            SwerexError::SessionDoesNotExist(_) => "swerex.exceptions.SessionDoesNotExistError",
            SwerexError::SessionNotInitialized(_) => {
                "swerex.exceptions.SessionNotInitializedError"
            }
            SwerexError::BashIncorrectSyntax { .. } => {
                "swerex.exceptions.BashIncorrectSyntaxError"
            }
            SwerexError::CommandTimeout(_) => "swerex.exceptions.CommandTimeoutError",
            SwerexError::NoExitCode(_) => "swerex.exceptions.NoExitCodeError",
            SwerexError::NonZeroExitCode { .. } => "swerex.exceptions.NonZeroExitCodeError",
            SwerexError::DummyOutputsExhausted => {
                "swerex.exceptions.DummyOutputsExhaustedError"
            }
            SwerexError::DeploymentNotStarted => "swerex.exceptions.DeploymentNotStartedError",
            SwerexError::DockerPull(_) => "swerex.exceptions.DockerPullError",
            SwerexError::FileNotFound { .. } => "swerex.exceptions.FileNotFoundError",
            SwerexError::InvalidInput(_) => "swerex.exceptions.InvalidInputError",
            SwerexError::Generic { .. } => "swerex.exceptions.SwerexException",
        }
    }

    /// Extra structured payload carried alongside the message, e.g. the
    /// captured stdout/stderr of a failed syntax check.
    pub fn extra_info(&self) -> HashMap<String, String> {
        match self {
            SwerexError::BashIncorrectSyntax {
                bash_stdout,
                bash_stderr,
                ..
            } => HashMap::from([
                ("bash_stdout".to_string(), bash_stdout.clone()),
                ("bash_stderr".to_string(), bash_stderr.clone()),
            ]),
            SwerexError::NonZeroExitCode {
                command,
                exit_code,
                output,
                ..
            } => HashMap::from([
                ("command".to_string(), command.clone()),
                (
                    "exit_code".to_string(),
                    exit_code.map(|c| c.to_string()).unwrap_or_default(),
                ),
                ("output".to_string(), output.clone()),
            ]),
            _ => HashMap::new(),
        }
    }

    /// Reconstruct a (lossy) error from a class path and message, the way a
    /// remote client rebuilds a typed error from the wire form. Unknown
    /// paths collapse to `Generic`, never attempting to load code.
    pub fn from_class_path(class_path: &str, message: impl Into<String>) -> SwerexError {
        let message = message.into();
        match class_path {
            "swerex.exceptions.SessionExistsError" => SwerexError::SessionExists(message),
            "swerex.exceptions.SessionDoesNotExistError" => {
                SwerexError::SessionDoesNotExist(message)
            }
            "swerex.exceptions.SessionNotInitializedError" => {
                SwerexError::SessionNotInitialized(message)
            }
            "swerex.exceptions.CommandTimeoutError" => SwerexError::CommandTimeout(message),
            "swerex.exceptions.NoExitCodeError" => SwerexError::NoExitCode(message),
            "swerex.exceptions.DummyOutputsExhaustedError" => {
                SwerexError::DummyOutputsExhausted
            }
            "swerex.exceptions.DeploymentNotStartedError" => SwerexError::DeploymentNotStarted,
            "swerex.exceptions.DockerPullError" => SwerexError::DockerPull(message),
            _ => SwerexError::Generic { message },
        }
    }
}

/// On-the-wire form of a [`SwerexError`], sent back to the remote client so
/// it can reconstruct a typed error (or fall back to a generic one) while
/// preserving `message` and `extra_info`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionTransfer {
    pub message: String,
    pub class_path: String,
    pub traceback: String,
    pub extra_info: HashMap<String, String>,
}

impl From<&SwerexError> for ExceptionTransfer {
    fn from(err: &SwerexError) -> Self {
        ExceptionTransfer {
            message: err.to_string(),
            class_path: err.class_path().to_string(),
            traceback: format!("{err:?}"),
            extra_info: err.extra_info(),
        }
    }
}

impl From<SwerexError> for ExceptionTransfer {
    fn from(err: SwerexError) -> Self {
        (&err).into()
    }
}

pub type Result<T> = std::result::Result<T, SwerexError>;
