//! Session registry / runtime facade.
//!
//! [`Runtime`] is the single entry point the server talks to: a
//! coarse-mutex-guarded map of named [`BashSession`]s plus the session-less
//! operations (`execute`, `read_file`, `write_file`, `upload`). Requests
//! against *different* sessions run concurrently; requests against the
//! *same* session serialize naturally because each session's state lives
//! behind its own lock.

use std::collections::HashMap;
use std::io::Write as _;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::bash::session::BashSession;
use crate::error::{Result, SwerexError};
use crate::models::{
    Action, CloseResponse, Command, CommandResponse, CreateSessionRequest, CreateSessionResponse,
    IsAliveResponse, Observation, ReadFileResponse, UploadRequest, UploadResponse,
    WriteFileRequest, WriteFileResponse,
};
use crate::process;

/// Thread-safe registry of named bash sessions, plus session-less helpers.
#[derive(Clone)]
pub struct Runtime {
    sessions: Arc<Mutex<HashMap<String, Arc<Mutex<BashSession>>>>>,
}

impl Runtime {
    #[must_use]
    pub fn new() -> Self {
        Runtime {
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Always alive: this is a local, in-process runtime with nothing to
    /// dial out to.
    pub async fn is_alive(&self) -> IsAliveResponse {
        IsAliveResponse::alive()
    }

    pub async fn create_session(&self, req: &CreateSessionRequest) -> Result<CreateSessionResponse> {
        let mut sessions = self.sessions.lock().await;
        if sessions.contains_key(&req.session) {
            return Err(SwerexError::SessionExists(req.session.clone()));
        }

        let mut session = BashSession::new(req.session.clone());
        let output = session
            .start(&req.startup_source, req.startup_timeout)
            .await?;
        sessions.insert(req.session.clone(), Arc::new(Mutex::new(session)));

        Ok(CreateSessionResponse {
            output,
            ..Default::default()
        })
    }

    async fn get_session(&self, name: &str) -> Result<Arc<Mutex<BashSession>>> {
        let sessions = self.sessions.lock().await;
        sessions
            .get(name)
            .cloned()
            .ok_or_else(|| SwerexError::SessionDoesNotExist(name.to_string()))
    }

    pub async fn run_in_session(&self, action: &Action) -> Result<Observation> {
        let session = self.get_session(action.session()).await?;
        let mut session = session.lock().await;
        match action {
            Action::Bash(bash_action) => session.run(bash_action).await,
            Action::BashInterrupt(interrupt_action) => session.interrupt(interrupt_action).await,
        }
    }

    pub async fn close_session(&self, name: &str) -> Result<()> {
        let session = {
            let mut sessions = self.sessions.lock().await;
            sessions
                .remove(name)
                .ok_or_else(|| SwerexError::SessionDoesNotExist(name.to_string()))?
        };
        session.lock().await.close().await;
        Ok(())
    }

    /// Run a one-shot subprocess outside of any session.
    pub async fn execute(&self, command: &Command) -> Result<CommandResponse> {
        let result = process::run_one_shot(command).await?;
        if command.check && result.exit_code != Some(0) {
            let mut message = format!(
                "command: {:?}\nexit code: {:?}\nstdout: {}\nstderr: {}",
                command.command, result.exit_code, result.stdout, result.stderr
            );
            if !command.error_msg.is_empty() {
                message = format!("{}\n{}", command.error_msg, message);
            }
            return Err(SwerexError::NonZeroExitCode {
                message,
                command: format!("{:?}", command.command),
                exit_code: result.exit_code,
                output: format!("stdout: {}\nstderr: {}", result.stdout, result.stderr),
            });
        }
        Ok(result)
    }

    pub async fn read_file(&self, path: &str) -> Result<ReadFileResponse> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| SwerexError::FileNotFound {
                message: format!("failed to read file: {e}"),
                path: path.to_string(),
            })?;
        Ok(ReadFileResponse { content })
    }

    pub async fn write_file(&self, req: &WriteFileRequest) -> Result<WriteFileResponse> {
        if let Some(parent) = Path::new(&req.path).parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SwerexError::Generic {
                        message: format!("failed to create parent directories: {e}"),
                    })?;
            }
        }
        tokio::fs::write(&req.path, &req.content)
            .await
            .map_err(|e| SwerexError::Generic {
                message: format!("failed to write file '{}': {e}", req.path),
            })?;
        Ok(WriteFileResponse {})
    }

    /// Upload a file as-is, or a directory zipped then unpacked at the
    /// target, round-tripping through a temp file so the target never sees
    /// a partially-written archive.
    pub async fn upload(&self, req: &UploadRequest) -> Result<UploadResponse> {
        let source = req.source_path.clone();
        let target = req.target_path.clone();
        let source_meta = tokio::fs::metadata(&source)
            .await
            .map_err(|e| SwerexError::FileNotFound {
                message: format!("upload source does not exist: {e}"),
                path: source.clone(),
            })?;

        if source_meta.is_dir() {
            let target_clone = target.clone();
            tokio::task::spawn_blocking(move || zip_and_unpack_dir(&source, &target_clone))
                .await
                .map_err(|e| SwerexError::Generic {
                    message: format!("upload task panicked: {e}"),
                })??;
        } else {
            if let Some(parent) = Path::new(&target).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| SwerexError::Generic {
                            message: format!("failed to create parent directories: {e}"),
                        })?;
                }
            }
            tokio::fs::copy(&source, &target)
                .await
                .map_err(|e| SwerexError::Generic {
                    message: format!("failed to copy '{source}' to '{target}': {e}"),
                })?;
        }

        Ok(UploadResponse {})
    }

    /// Close every session, then drop them all.
    pub async fn close(&self) -> Result<CloseResponse> {
        let mut sessions = self.sessions.lock().await;
        for session in sessions.values() {
            session.lock().await.close().await;
        }
        sessions.clear();
        Ok(CloseResponse {})
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

/// Zip `source_dir` into a temp file, then unpack that archive at
/// `target_dir`. Blocking: run inside `spawn_blocking`.
fn zip_and_unpack_dir(source_dir: &str, target_dir: &str) -> Result<()> {
    let tmp = tempfile::NamedTempFile::new().map_err(|e| SwerexError::Generic {
        message: format!("failed to create temp file for upload: {e}"),
    })?;

    {
        let mut writer = zip::ZipWriter::new(tmp.reopen().map_err(|e| SwerexError::Generic {
            message: format!("failed to reopen temp file: {e}"),
        })?);
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);

        let source_root = Path::new(source_dir);
        for entry in walk_dir(source_root) {
            let relative = entry
                .strip_prefix(source_root)
                .expect("walked entry is under source_root")
                .to_string_lossy()
                .replace('\\', "/");
            if entry.is_dir() {
                writer
                    .add_directory(format!("{relative}/"), options)
                    .map_err(|e| SwerexError::Generic {
                        message: format!("failed to add directory to zip: {e}"),
                    })?;
            } else {
                writer
                    .start_file(relative, options)
                    .map_err(|e| SwerexError::Generic {
                        message: format!("failed to start zip entry: {e}"),
                    })?;
                let bytes = std::fs::read(&entry).map_err(|e| SwerexError::Generic {
                    message: format!("failed to read '{}': {e}", entry.display()),
                })?;
                writer.write_all(&bytes).map_err(|e| SwerexError::Generic {
                    message: format!("failed to write zip entry: {e}"),
                })?;
            }
        }
        writer.finish().map_err(|e| SwerexError::Generic {
            message: format!("failed to finalize zip archive: {e}"),
        })?;
    }

    std::fs::create_dir_all(target_dir).map_err(|e| SwerexError::Generic {
        message: format!("failed to create upload target '{target_dir}': {e}"),
    })?;
    let file = std::fs::File::open(tmp.path()).map_err(|e| SwerexError::Generic {
        message: format!("failed to reopen archive for extraction: {e}"),
    })?;
    let mut archive = zip::ZipArchive::new(file).map_err(|e| SwerexError::Generic {
        message: format!("failed to read zip archive: {e}"),
    })?;
    archive
        .extract(target_dir)
        .map_err(|e| SwerexError::Generic {
            message: format!("failed to extract archive to '{target_dir}': {e}"),
        })?;

    Ok(())
}

fn walk_dir(root: &Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                out.push(path.clone());
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BashAction, CheckMode};

    #[tokio::test]
    async fn create_run_and_close_a_session() {
        let runtime = Runtime::new();
        let req = CreateSessionRequest {
            session: "default".to_string(),
            ..Default::default()
        };
        runtime.create_session(&req).await.unwrap();

        let action = Action::Bash(BashAction {
            command: "echo hello world".to_string(),
            session: "default".to_string(),
            timeout: Some(5.0),
            is_interactive_command: false,
            is_interactive_quit: false,
            check: CheckMode::Raise,
            error_msg: String::new(),
            expect: Vec::new(),
        });
        let observation = runtime.run_in_session(&action).await.unwrap();
        assert_eq!(observation.output.trim(), "hello world");
        assert_eq!(observation.exit_code, Some(0));

        runtime.close_session("default").await.unwrap();
    }

    #[tokio::test]
    async fn duplicate_session_name_is_rejected() {
        let runtime = Runtime::new();
        let req = CreateSessionRequest::default();
        runtime.create_session(&req).await.unwrap();
        let err = runtime.create_session(&req).await.unwrap_err();
        assert!(matches!(err, SwerexError::SessionExists(_)));
    }

    #[tokio::test]
    async fn unknown_session_is_rejected() {
        let runtime = Runtime::new();
        let action = Action::Bash(BashAction {
            command: "echo hi".to_string(),
            session: "nope".to_string(),
            timeout: None,
            is_interactive_command: false,
            is_interactive_quit: false,
            check: CheckMode::Raise,
            error_msg: String::new(),
            expect: Vec::new(),
        });
        let err = runtime.run_in_session(&action).await.unwrap_err();
        assert!(matches!(err, SwerexError::SessionDoesNotExist(_)));
    }

    #[tokio::test]
    async fn execute_runs_outside_any_session() {
        let runtime = Runtime::new();
        let cmd = Command {
            command: crate::models::CommandArgs::Shell("echo standalone".to_string()),
            timeout: None,
            shell: false,
            check: false,
            error_msg: String::new(),
            env: None,
            cwd: None,
        };
        let result = runtime.execute(&cmd).await.unwrap();
        assert_eq!(result.stdout.trim(), "standalone");
    }

    #[tokio::test]
    async fn write_then_read_a_file() {
        let runtime = Runtime::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt").to_string_lossy().to_string();

        runtime
            .write_file(&WriteFileRequest {
                content: "hello file".to_string(),
                path: path.clone(),
            })
            .await
            .unwrap();

        let read = runtime.read_file(&path).await.unwrap();
        assert_eq!(read.content, "hello file");
    }
}
