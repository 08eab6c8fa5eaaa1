//! One-shot subprocess execution: the core primitive behind
//! [`crate::registry::Runtime::execute`]. Captures stdout and stderr
//! separately, honors a timeout, and runs the child in its own process group
//! so a timeout can kill the whole tree rather than just the immediate pid.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;

use crate::error::SwerexError;
use crate::models::{Command, CommandArgs, CommandResponse};

/// Send SIGKILL to the process group of a child process (the child must have
/// been started with `setsid` for this to hit its whole tree).
fn kill_process_group(child: &tokio::process::Child) -> Result<(), String> {
    let pid = child
        .id()
        .ok_or_else(|| "process has no PID (already exited?)".to_string())?;
    nix::sys::signal::kill(
        nix::unistd::Pid::from_raw(-(pid as i32)),
        nix::sys::signal::Signal::SIGKILL,
    )
    .map_err(|e| format!("failed to kill process group: {e}"))
}

/// Run a one-shot command (similar to `subprocess.run`) and capture the
/// result. `check` is handled by the caller, not here, because the error it
/// raises needs the already-captured output.
pub async fn run_one_shot(command: &Command) -> Result<CommandResponse, SwerexError> {
    let mut cmd = match (&command.command, command.shell) {
        (CommandArgs::Shell(s), _) => {
            let mut c = TokioCommand::new("/bin/sh");
            c.arg("-c").arg(s);
            c
        }
        (CommandArgs::Argv(argv), true) => {
            let joined = shell_quote_join(argv);
            let mut c = TokioCommand::new("/bin/sh");
            c.arg("-c").arg(joined);
            c
        }
        (CommandArgs::Argv(argv), false) => {
            if argv.is_empty() {
                return Err(SwerexError::InvalidInput(
                    "command argv must not be empty".to_string(),
                ));
            }
            let mut c = TokioCommand::new(&argv[0]);
            c.args(&argv[1..]);
            c
        }
    };

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);

    if let Some(env) = &command.env {
        cmd.env_clear();
        cmd.envs(env);
    }
    if let Some(cwd) = &command.cwd {
        cmd.current_dir(cwd);
    }

    // SAFETY: pre_exec runs in the child after fork, before exec.
    unsafe {
        cmd.pre_exec(|| {
            nix::unistd::setsid().map_err(std::io::Error::other)?;
            Ok(())
        });
    }

    let mut child = cmd.spawn().map_err(|e| SwerexError::Generic {
        message: format!("failed to spawn process: {e}"),
    })?;

    let mut stdout_pipe = child.stdout.take().expect("stdout was piped");
    let mut stderr_pipe = child.stderr.take().expect("stderr was piped");

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf).await;
        buf
    });

    let wait_result = match command.timeout {
        Some(secs) => tokio::time::timeout(Duration::from_secs_f64(secs.max(0.0)), child.wait()).await,
        None => Ok(child.wait().await),
    };

    let exit_code = match wait_result {
        Ok(Ok(status)) => status.code(),
        Ok(Err(e)) => {
            return Err(SwerexError::Generic {
                message: format!("failed to wait for process: {e}"),
            });
        }
        Err(_) => {
            let _ = kill_process_group(&child);
            let _ = child.wait().await;
            let stdout = stdout_task.await.unwrap_or_default();
            let stderr = stderr_task.await.unwrap_or_default();
            tracing::debug!(
                stdout = %String::from_utf8_lossy(&stdout),
                stderr = %String::from_utf8_lossy(&stderr),
                "discarding partial output from timed-out command"
            );
            return Err(SwerexError::CommandTimeout(format!(
                "command timed out after {:.1}s: {}",
                command.timeout.unwrap_or(0.0),
                describe(&command.command)
            )));
        }
    };

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(CommandResponse {
        stdout: String::from_utf8_lossy(&stdout).to_string(),
        stderr: String::from_utf8_lossy(&stderr).to_string(),
        exit_code,
    })
}

fn describe(args: &CommandArgs) -> String {
    match args {
        CommandArgs::Shell(s) => s.clone(),
        CommandArgs::Argv(argv) => argv.join(" "),
    }
}

fn shell_quote_join(argv: &[String]) -> String {
    argv.iter()
        .map(|a| format!("'{}'", a.replace('\'', r"'\''")))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_shell_string() {
        let cmd = Command {
            command: CommandArgs::Shell("echo hello".to_string()),
            timeout: None,
            shell: false,
            check: false,
            error_msg: String::new(),
            env: None,
            cwd: None,
        };
        let result = run_one_shot(&cmd).await.unwrap();
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.exit_code, Some(0));
    }

    #[tokio::test]
    async fn runs_argv_without_a_shell() {
        let cmd = Command {
            command: CommandArgs::Argv(vec!["echo".to_string(), "hi".to_string()]),
            timeout: None,
            shell: false,
            check: false,
            error_msg: String::new(),
            env: None,
            cwd: None,
        };
        let result = run_one_shot(&cmd).await.unwrap();
        assert_eq!(result.stdout.trim(), "hi");
    }

    #[tokio::test]
    async fn times_out() {
        let cmd = Command {
            command: CommandArgs::Shell("sleep 10".to_string()),
            timeout: Some(0.1),
            shell: false,
            check: false,
            error_msg: String::new(),
            env: None,
            cwd: None,
        };
        let err = run_one_shot(&cmd).await.unwrap_err();
        assert!(matches!(err, SwerexError::CommandTimeout(_)));
    }

    #[tokio::test]
    async fn captures_nonzero_exit_code() {
        let cmd = Command {
            command: CommandArgs::Shell("exit 3".to_string()),
            timeout: None,
            shell: false,
            check: false,
            error_msg: String::new(),
            env: None,
            cwd: None,
        };
        let result = run_one_shot(&cmd).await.unwrap();
        assert_eq!(result.exit_code, Some(3));
    }
}
