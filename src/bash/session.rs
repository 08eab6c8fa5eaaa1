//! Bash Session: the state machine driving one shell.
//!
//! Implements the startup handshake, normal command execution with
//! exit-code extraction, interactive-command mode, interactive-quit mode,
//! and interrupt handling described in spec.md's component design.

use std::time::Duration;

use regex::Regex;

use crate::bash::splitter::{self, split_bash_command};
use crate::error::{Result, SwerexError};
use crate::models::{BashAction, BashInterruptAction, CheckMode, Observation};
use crate::output;
use crate::pty::{ExpectOutcome, PtyShell};

/// Safety ceiling applied whenever a caller-supplied timeout is absent or
/// implausibly large; spec.md's "no timeout" default is modeled as this
/// ceiling rather than a literal unbounded wait.
pub const MAX_TIMEOUT_SECONDS: f64 = 3600.0;

const EXIT_CODE_WAIT_SECONDS: f64 = 1.0;
const RESYNC_WAIT_SECONDS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Uninitialized,
    Ready,
    Closed,
}

/// One PTY-backed bash shell and the sentinel literals used to find command
/// boundaries in its output stream.
pub struct BashSession {
    name: String,
    ps1: String,
    state: SessionState,
    pty: Option<PtyShell>,
}

fn resolve_timeout(timeout: Option<f64>) -> Duration {
    let secs = timeout.unwrap_or(MAX_TIMEOUT_SECONDS).max(0.0);
    Duration::from_secs_f64(secs.min(MAX_TIMEOUT_SECONDS))
}

fn compile_pattern(s: &str) -> Regex {
    Regex::new(s).unwrap_or_else(|_| Regex::new(&regex::escape(s)).expect("escaped literal is always a valid regex"))
}

impl BashSession {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let ps1 = format!("SWESH_PS1_{}", uuid::Uuid::new_v4().simple());
        BashSession {
            name,
            ps1,
            state: SessionState::Uninitialized,
            pty: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn require_ready(&mut self) -> Result<&mut PtyShell> {
        match self.state {
            SessionState::Ready => self
                .pty
                .as_mut()
                .ok_or_else(|| SwerexError::SessionNotInitialized(self.name.clone())),
            _ => Err(SwerexError::SessionNotInitialized(self.name.clone())),
        }
    }

    /// Startup handshake: spawn the PTY, wait briefly for bash to be ready,
    /// then reset PS1/PS2/PS0 (optionally sourcing startup files first) and
    /// wait for the new sentinel.
    pub async fn start(&mut self, startup_source: &[String], startup_timeout: f64) -> Result<String> {
        let mut pty = PtyShell::spawn()
            .await
            .map_err(|e| SwerexError::Generic { message: e })?;

        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut parts: Vec<String> = Vec::new();
        for path in startup_source {
            parts.push(format!("source {path}"));
        }
        if !startup_source.is_empty() {
            parts.push("sleep 0.3".to_string());
        }
        parts.push(format!("export PS1='{}'", self.ps1));
        parts.push("export PS2=''".to_string());
        parts.push("export PS0=''".to_string());
        let startup_line = parts.join(" ; ");

        pty.sendline(&startup_line)
            .await
            .map_err(|e| SwerexError::Generic { message: e })?;

        let ps1_pattern = compile_pattern(&regex::escape(&self.ps1));
        let outcome = pty
            .expect(&[ps1_pattern], Duration::from_secs_f64(startup_timeout.max(0.01)))
            .await;

        let output = match outcome {
            ExpectOutcome::Matched { before, .. } => output::strip_control_chars(&before),
            ExpectOutcome::Timeout { .. } => {
                return Err(SwerexError::CommandTimeout(
                    "timeout while starting session".to_string(),
                ));
            }
        };

        self.pty = Some(pty);
        self.state = SessionState::Ready;
        Ok(output)
    }

    /// Run a normal or interactive bash action.
    pub async fn run(&mut self, action: &BashAction) -> Result<Observation> {
        if action.is_interactive_command {
            return self.run_interactive_command(action).await;
        }
        if action.is_interactive_quit {
            return self.run_interactive_quit(action).await;
        }
        self.run_normal(action).await
    }

    async fn run_normal(&mut self, action: &BashAction) -> Result<Observation> {
        // Step 1: pre-validate.
        splitter::validate_syntax(&action.command).await?;

        // Step 2: serialize multi-command input.
        let (command_to_send, fallback_terminator) = match split_bash_command(&action.command) {
            Ok(commands) if commands.is_empty() => {
                // All-blank/comment input: nothing to run.
                return Ok(Observation {
                    output: String::new(),
                    exit_code: Some(0),
                    expect_string: String::new(),
                    failure_reason: String::new(),
                    ..Default::default()
                });
            }
            Ok(commands) => (commands.join(" ; "), None),
            Err(_) => {
                let unique = format!("SWESH_FALLBACK_{}", uuid::Uuid::new_v4().simple());
                let rewritten = format!(
                    "{}\nSWESH_TMP_EC=$? ; sleep 0.1; echo '{unique}' ; (exit $SWESH_TMP_EC)",
                    action.command
                );
                (rewritten, Some(unique))
            }
        };

        let timeout = resolve_timeout(action.timeout);
        let ps1 = self.ps1.clone();
        let session_name = self.name.clone();
        let pty = self.require_ready()?;

        pty.sendline(&command_to_send)
            .await
            .map_err(|e| SwerexError::Generic { message: e })?;

        let terminator = fallback_terminator.clone().unwrap_or_else(|| ps1.clone());
        let mut expect_strings: Vec<String> = action.expect.clone();
        expect_strings.push(terminator.clone());
        let patterns: Vec<Regex> = expect_strings
            .iter()
            .map(|s| {
                if Some(s) == fallback_terminator.as_ref() || s == &ps1 {
                    compile_pattern(&regex::escape(s))
                } else {
                    compile_pattern(s)
                }
            })
            .collect();

        let outcome = pty.expect(&patterns, timeout).await;
        let (matched_index, before) = match outcome {
            ExpectOutcome::Matched { index, before, .. } => (index, before),
            ExpectOutcome::Timeout { .. } => {
                return Err(SwerexError::CommandTimeout(format!(
                    "timeout while running command in session '{session_name}': {}",
                    action.command
                )));
            }
        };

        let mut cleaned_output = output::strip_control_chars(before.trim());
        cleaned_output = output::remove_token(&cleaned_output, &ps1);
        if let Some(u) = &fallback_terminator {
            cleaned_output = output::remove_token(&cleaned_output, u);
        }
        let cleaned_output = cleaned_output.trim().to_string();
        let matched_expect_string = expect_strings[matched_index].clone();

        // Step 4: exit-code extraction (unless check = ignore).
        if action.check == CheckMode::Ignore {
            return Ok(Observation {
                output: cleaned_output,
                exit_code: None,
                expect_string: matched_expect_string,
                failure_reason: String::new(),
                ..Default::default()
            });
        }

        let extraction = self.extract_exit_code().await;
        match extraction {
            Ok(code) => {
                if action.check == CheckMode::Raise && code != 0 {
                    let mut message = format!(
                        "command: {:?}\nexit code: {code}\noutput: {cleaned_output}",
                        action.command
                    );
                    if !action.error_msg.is_empty() {
                        message = format!("{}\n{}", action.error_msg, message);
                    }
                    return Err(SwerexError::NonZeroExitCode {
                        message,
                        command: action.command.clone(),
                        exit_code: Some(code),
                        output: cleaned_output,
                    });
                }
                Ok(Observation {
                    output: cleaned_output,
                    exit_code: Some(code),
                    expect_string: matched_expect_string,
                    failure_reason: String::new(),
                    ..Default::default()
                })
            }
            Err(SwerexError::CommandTimeout(msg)) => Err(SwerexError::CommandTimeout(msg)),
            Err(err) => match action.check {
                CheckMode::Raise => Err(err),
                CheckMode::Silent => Ok(Observation {
                    output: cleaned_output,
                    exit_code: None,
                    expect_string: matched_expect_string,
                    failure_reason: err.to_string(),
                    ..Default::default()
                }),
                CheckMode::Ignore => unreachable!("handled above"),
            },
        }
    }

    /// Send `echo <PREFIX>$?<SUFFIX>`, wait for SUFFIX, parse the integer
    /// between the markers, then resync on a trailing PS1.
    async fn extract_exit_code(&mut self) -> Result<i32> {
        let prefix = format!("SWESH_EC_START_{}_", uuid::Uuid::new_v4().simple());
        let suffix = format!("_SWESH_EC_END_{}", uuid::Uuid::new_v4().simple());
        let ps1 = self.ps1.clone();
        let session_name = self.name.clone();
        let pty = self.require_ready()?;

        pty.sendline(&format!("echo {prefix}$?{suffix}"))
            .await
            .map_err(|e| SwerexError::Generic { message: e })?;

        let suffix_pattern = compile_pattern(&regex::escape(&suffix));
        let outcome = pty
            .expect(&[suffix_pattern], Duration::from_secs_f64(EXIT_CODE_WAIT_SECONDS))
            .await;
        let before = match outcome {
            ExpectOutcome::Matched { before, .. } => before,
            ExpectOutcome::Timeout { .. } => {
                return Err(SwerexError::CommandTimeout(format!(
                    "timeout while extracting exit code in session '{session_name}'"
                )));
            }
        };

        let marker_re = Regex::new(&format!(
            "{}(-?[0-9]+){}",
            regex::escape(&prefix),
            regex::escape(&suffix)
        ))
        .expect("marker regex is always valid");
        let matches: Vec<_> = marker_re.captures_iter(&before).collect();
        let code = if matches.len() == 1 {
            matches[0][1].parse::<i32>().ok()
        } else {
            None
        };

        // Resync on a trailing PS1.
        let ps1_pattern = compile_pattern(&regex::escape(&ps1));
        let resync = pty
            .expect(&[ps1_pattern], Duration::from_secs_f64(RESYNC_WAIT_SECONDS))
            .await;
        if matches!(resync, ExpectOutcome::Timeout { .. }) {
            return Err(SwerexError::CommandTimeout(format!(
                "timeout while resyncing prompt in session '{session_name}'"
            )));
        }

        code.ok_or_else(|| {
            SwerexError::NoExitCode(format!(
                "failed to parse exit code from output between markers (session '{session_name}')"
            ))
        })
    }

    async fn run_interactive_command(&mut self, action: &BashAction) -> Result<Observation> {
        let ps1 = self.ps1.clone();
        let pty = self.require_ready()?;

        pty.sendline(&action.command)
            .await
            .map_err(|e| SwerexError::Generic { message: e })?;

        let mut expect_strings = action.expect.clone();
        expect_strings.push(ps1.clone());
        let patterns: Vec<Regex> = expect_strings
            .iter()
            .map(|s| if s == &ps1 { compile_pattern(&regex::escape(s)) } else { compile_pattern(s) })
            .collect();

        let timeout = resolve_timeout(action.timeout);
        let outcome = pty.expect(&patterns, timeout).await;
        let (index, before) = match outcome {
            ExpectOutcome::Matched { index, before, .. } => (index, before),
            ExpectOutcome::Timeout { .. } => {
                return Err(SwerexError::CommandTimeout(format!(
                    "timeout while running interactive command: {}",
                    action.command
                )));
            }
        };

        let mut cleaned = output::strip_control_chars(before.trim());
        let trimmed_start = cleaned.trim_start();
        if let Some(rest) = trimmed_start.strip_prefix(action.command.as_str()) {
            cleaned = rest.trim_start().to_string();
        }

        Ok(Observation {
            output: cleaned.trim().to_string(),
            exit_code: Some(0),
            expect_string: expect_strings[index].clone(),
            failure_reason: String::new(),
            ..Default::default()
        })
    }

    async fn run_interactive_quit(&mut self, action: &BashAction) -> Result<Observation> {
        let ps1 = self.ps1.clone();
        let pty = self.require_ready()?;

        pty.sendline(&action.command)
            .await
            .map_err(|e| SwerexError::Generic { message: e })?;

        let mut expect_strings = action.expect.clone();
        expect_strings.push(ps1.clone());
        let patterns: Vec<Regex> = expect_strings
            .iter()
            .map(|s| if s == &ps1 { compile_pattern(&regex::escape(s)) } else { compile_pattern(s) })
            .collect();
        let timeout = resolve_timeout(action.timeout);
        let outcome = pty.expect(&patterns, timeout).await;
        let (index, before) = match outcome {
            ExpectOutcome::Matched { index, before, .. } => (index, before),
            ExpectOutcome::Timeout { .. } => {
                return Err(SwerexError::CommandTimeout(format!(
                    "timeout while quitting interactive program: {}",
                    action.command
                )));
            }
        };

        // Many REPLs leave a double-prompt artifact behind; force an echo
        // resync before handing control back to normal command execution.
        pty.setecho(false).await.map_err(|e| SwerexError::Generic { message: e })?;
        pty.waitnoecho().await;

        let unique = format!("SWESH_RESYNC_{}", uuid::Uuid::new_v4().simple());
        pty.sendline(&format!("stty -echo; echo '{unique}'"))
            .await
            .map_err(|e| SwerexError::Generic { message: e })?;

        let unique_pattern = compile_pattern(&regex::escape(&unique));
        let _ = pty.expect(&[unique_pattern], Duration::from_secs(1)).await;
        let ps1_pattern = compile_pattern(&regex::escape(&ps1));
        let _ = pty.expect(&[ps1_pattern], Duration::from_secs(1)).await;

        Ok(Observation {
            output: output::strip_control_chars(before.trim()),
            exit_code: Some(0),
            expect_string: expect_strings[index].clone(),
            failure_reason: String::new(),
            ..Default::default()
        })
    }

    /// Attempt to abort a running command. Retries SIGINT `n_retry` times,
    /// then falls back to SIGTSTP + `kill -9 %1`.
    pub async fn interrupt(&mut self, action: &BashInterruptAction) -> Result<Observation> {
        let ps1 = self.ps1.clone();
        let session_name = self.name.clone();
        let timeout = Duration::from_secs_f64(action.timeout.max(0.01));

        let mut expect_strings = action.expect.clone();
        expect_strings.push(ps1.clone());
        let patterns: Vec<Regex> = expect_strings
            .iter()
            .map(|s| if s == &ps1 { compile_pattern(&regex::escape(s)) } else { compile_pattern(s) })
            .collect();

        for _ in 0..action.n_retry {
            let pty = self.require_ready()?;
            pty.sendintr().await.map_err(|e| SwerexError::Generic { message: e })?;
            let outcome = pty.expect(&patterns, timeout).await;
            if let ExpectOutcome::Matched { index, .. } = outcome {
                let trailing = pty.read_nonblocking(Duration::from_millis(100)).await;
                return Ok(Observation {
                    output: output::strip_control_chars(trailing.trim()),
                    exit_code: Some(0),
                    expect_string: expect_strings[index].clone(),
                    failure_reason: String::new(),
                    ..Default::default()
                });
            }
        }

        // Fallback: suspend, then force-kill the foreground job.
        let ps1_only = [compile_pattern(&regex::escape(&ps1))];
        let pty = self.require_ready()?;
        pty.sendctrlz().await.map_err(|e| SwerexError::Generic { message: e })?;
        let suspended = pty.expect(&ps1_only, Duration::from_secs(2)).await;
        if matches!(suspended, ExpectOutcome::Timeout { .. }) {
            return Err(SwerexError::CommandTimeout(format!(
                "timeout while interrupting session '{session_name}'"
            )));
        }

        pty.sendline("kill -9 %1")
            .await
            .map_err(|e| SwerexError::Generic { message: e })?;
        let killed = pty.expect(&ps1_only, Duration::from_secs(2)).await;
        match killed {
            ExpectOutcome::Matched { .. } => Ok(Observation {
                output: String::new(),
                exit_code: Some(0),
                expect_string: ps1,
                failure_reason: String::new(),
                ..Default::default()
            }),
            ExpectOutcome::Timeout { .. } => Err(SwerexError::CommandTimeout(format!(
                "timeout while interrupting session '{session_name}'"
            ))),
        }
    }

    /// Tear down the PTY. Idempotent.
    pub async fn close(&mut self) {
        if let Some(pty) = self.pty.take() {
            pty.close().await;
        }
        self.state = SessionState::Closed;
    }

    pub fn is_ready(&self) -> bool {
        self.state == SessionState::Ready
    }
}
