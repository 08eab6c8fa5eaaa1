//! A runtime that returns blank or scripted outputs instead of touching any
//! real shell or filesystem. Useful for testing callers of [`crate::registry::Runtime`]
//! without paying for a PTY.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{Result, SwerexError};
use crate::models::{
    Action, Command, CommandResponse, CreateSessionRequest, CreateSessionResponse,
    IsAliveResponse, Observation, ReadFileRequest, ReadFileResponse, UploadRequest,
    UploadResponse, WriteFileRequest, WriteFileResponse,
};

/// What `run_in_session` should hand back: either the same observation every
/// time, or a scripted queue that gets drained front-to-back.
pub enum ScriptedObservations {
    Fixed(Observation),
    Queue(Vec<Observation>),
}

impl Default for ScriptedObservations {
    fn default() -> Self {
        ScriptedObservations::Fixed(Observation {
            exit_code: Some(0),
            ..Default::default()
        })
    }
}

/// A runtime that never spawns a process; it returns blank or scripted
/// outputs so other components can be exercised without a real PTY.
pub struct DummyRuntime {
    run_in_session_outputs: Arc<Mutex<ScriptedObservations>>,
}

impl DummyRuntime {
    #[must_use]
    pub fn new() -> Self {
        DummyRuntime {
            run_in_session_outputs: Arc::new(Mutex::new(ScriptedObservations::default())),
        }
    }

    /// Replace the scripted outputs `run_in_session` will hand back.
    pub async fn set_outputs(&self, outputs: ScriptedObservations) {
        *self.run_in_session_outputs.lock().await = outputs;
    }

    pub async fn is_alive(&self) -> IsAliveResponse {
        IsAliveResponse::alive()
    }

    pub async fn create_session(&self, _req: &CreateSessionRequest) -> Result<CreateSessionResponse> {
        Ok(CreateSessionResponse::default())
    }

    pub async fn run_in_session(&self, action: &Action) -> Result<Observation> {
        let mut outputs = self.run_in_session_outputs.lock().await;
        match &mut *outputs {
            ScriptedObservations::Fixed(obs) => Ok(obs.clone()),
            ScriptedObservations::Queue(queue) => {
                if queue.is_empty() {
                    return Err(SwerexError::DummyOutputsExhausted);
                }
                Ok(queue.remove(0))
            }
        }
    }

    pub async fn close_session(&self, _session: &str) -> Result<()> {
        Ok(())
    }

    pub async fn execute(&self, _command: &Command) -> Result<CommandResponse> {
        Ok(CommandResponse {
            exit_code: Some(0),
            ..Default::default()
        })
    }

    pub async fn read_file(&self, _req: &ReadFileRequest) -> Result<ReadFileResponse> {
        Ok(ReadFileResponse::default())
    }

    pub async fn write_file(&self, _req: &WriteFileRequest) -> Result<WriteFileResponse> {
        Ok(WriteFileResponse::default())
    }

    pub async fn upload(&self, _req: &UploadRequest) -> Result<UploadResponse> {
        Ok(UploadResponse::default())
    }

    pub async fn close(&self) -> Result<crate::models::CloseResponse> {
        Ok(crate::models::CloseResponse::default())
    }
}

impl Default for DummyRuntime {
    fn default() -> Self {
        Self::new()
    }
}
