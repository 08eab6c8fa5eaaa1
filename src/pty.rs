//! PTY Shell Adapter: spawns `/bin/bash` under a pseudo-terminal with echo
//! disabled and exposes the small set of primitives a [`crate::bash::session::BashSession`]
//! needs to drive it: `sendline`, `expect`, `sendintr`/`sendctrlz`,
//! `setecho`/`waitnoecho`, `read_nonblocking`, and `close`.

use std::time::Duration;

use regex::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;

/// Outcome of [`PtyShell::expect`]. Timeouts are a distinct variant, not a
/// generic error, per the adapter's contract.
pub enum ExpectOutcome {
    /// `patterns[index]` matched. `before`/`after` are the text preceding
    /// and following the match in the cumulative stream since the previous
    /// `expect` call.
    Matched {
        index: usize,
        before: String,
        after: String,
    },
    Timeout {
        /// Whatever was accumulated in the buffer before the deadline hit.
        partial: String,
    },
}

/// A bash process attached to a pseudo-terminal.
pub struct PtyShell {
    child: tokio::process::Child,
    writer: pty_process::OwnedWritePty,
    reader: pty_process::OwnedReadPty,
    /// Bytes read from the PTY but not yet consumed by a matched `expect`.
    buffer: String,
}

impl PtyShell {
    /// Spawn `/bin/bash` under a fresh PTY with local echo disabled.
    pub async fn spawn() -> Result<Self, String> {
        let (pty, pts) = pty_process::open().map_err(|e| format!("failed to open PTY: {e}"))?;
        pty.resize(pty_process::Size::new(24, 250))
            .map_err(|e| format!("failed to resize PTY: {e}"))?;

        let cmd = pty_process::Command::new("/bin/bash").arg("--norc").arg("--noprofile");
        let child = cmd
            .spawn(pts)
            .map_err(|e| format!("failed to spawn bash under PTY: {e}"))?;

        let (reader, writer) = pty.into_split();

        let mut shell = PtyShell {
            child,
            writer,
            reader,
            buffer: String::new(),
        };

        // Local echo disabled at the terminal driver so our own input never
        // reappears in the output stream.
        shell.setecho(false).await?;
        Ok(shell)
    }

    /// Write `s` followed by a newline.
    pub async fn sendline(&mut self, s: &str) -> Result<(), String> {
        self.send_raw_bytes(s.as_bytes()).await?;
        self.send_raw_bytes(b"\n").await
    }

    async fn send_raw_bytes(&mut self, bytes: &[u8]) -> Result<(), String> {
        self.writer
            .write_all(bytes)
            .await
            .map_err(|e| format!("failed to write to PTY: {e}"))?;
        self.writer
            .flush()
            .await
            .map_err(|e| format!("failed to flush PTY: {e}"))
    }

    /// Block until one of `patterns` matches the cumulative stream, or
    /// `timeout` elapses.
    pub async fn expect(&mut self, patterns: &[Regex], timeout: Duration) -> ExpectOutcome {
        let deadline = Instant::now() + timeout;

        loop {
            for (index, pattern) in patterns.iter().enumerate() {
                if let Some(m) = pattern.find(&self.buffer) {
                    let before = self.buffer[..m.start()].to_string();
                    let after = self.buffer[m.end()..].to_string();
                    self.buffer = after.clone();
                    return ExpectOutcome::Matched {
                        index,
                        before,
                        after,
                    };
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return ExpectOutcome::Timeout {
                    partial: std::mem::take(&mut self.buffer),
                };
            }

            let mut chunk = [0u8; 4096];
            match tokio::time::timeout(remaining, self.reader.read(&mut chunk)).await {
                Ok(Ok(0)) => {
                    // EOF: bash exited. Leave what's buffered for the caller
                    // to inspect via the timeout branch; no more bytes will
                    // ever arrive.
                    return ExpectOutcome::Timeout {
                        partial: std::mem::take(&mut self.buffer),
                    };
                }
                Ok(Ok(n)) => {
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&chunk[..n]));
                }
                Ok(Err(_)) => {
                    return ExpectOutcome::Timeout {
                        partial: std::mem::take(&mut self.buffer),
                    };
                }
                Err(_) => {
                    return ExpectOutcome::Timeout {
                        partial: std::mem::take(&mut self.buffer),
                    };
                }
            }
        }
    }

    /// Drain whatever is buffered right now, reading for up to `timeout`
    /// without requiring a pattern match.
    pub async fn read_nonblocking(&mut self, timeout: Duration) -> String {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let mut chunk = [0u8; 4096];
            match tokio::time::timeout(remaining, self.reader.read(&mut chunk)).await {
                Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
                Ok(Ok(n)) => {
                    self.buffer
                        .push_str(&String::from_utf8_lossy(&chunk[..n]));
                }
            }
        }
        std::mem::take(&mut self.buffer)
    }

    /// Deliver SIGINT to whichever process group is currently in the
    /// foreground of this terminal. Bash runs interactively under job
    /// control, so a running foreground command sits in its own process
    /// group distinct from bash's -- signaling the PTY's child pid directly
    /// would hit bash, not the job. Writing the terminal's INTR character
    /// lets the kernel's line discipline deliver SIGINT to whatever group
    /// actually owns the foreground, the same way pexpect's `sendintr` and a
    /// real Ctrl+C keypress do.
    pub async fn sendintr(&mut self) -> Result<(), String> {
        self.send_raw_bytes(&[0x03]).await
    }

    /// Deliver SIGTSTP the same way, via the terminal's SUSP character.
    pub async fn sendctrlz(&mut self) -> Result<(), String> {
        self.send_raw_bytes(&[0x1a]).await
    }

    /// Disable/enable terminal echo via `stty`.
    pub async fn setecho(&mut self, enabled: bool) -> Result<(), String> {
        let cmd = if enabled { "stty echo\n" } else { "stty -echo\n" };
        self.send_raw_bytes(cmd.as_bytes()).await
    }

    /// Wait for terminal echo to settle after [`setecho`]. There is no
    /// ioctl-level echo query exposed by `pty-process`, so we approximate
    /// with a short drain: by the time output stops arriving, `stty` has
    /// applied the mode change.
    pub async fn waitnoecho(&mut self) {
        let _ = self.read_nonblocking(Duration::from_millis(100)).await;
    }

    /// Tear down the PTY: drop the write half (sends EOF/HUP), wait for the
    /// child with a bounded timeout, then kill it if still alive.
    pub async fn close(mut self) {
        let _ = self.writer.shutdown().await;
        if tokio::time::timeout(Duration::from_secs(2), self.child.wait())
            .await
            .is_err()
        {
            let _ = self.child.start_kill();
            let _ = tokio::time::timeout(Duration::from_secs(1), self.child.wait()).await;
        }
    }

    /// Whether the bash process is still alive.
    pub fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }
}
