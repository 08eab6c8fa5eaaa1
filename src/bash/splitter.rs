//! Bash command splitter and syntax validator.
//!
//! [`split_bash_command`] is a hand-written lexer standing in for the
//! Python original's `bashlex`-based splitter (no equivalent crate exists in
//! this pack): it tracks quoting, heredocs, escaped newlines, and bash's
//! compound-statement keywords well enough to find top-level command
//! boundaries without executing anything. When it cannot close out a
//! construct confidently it returns [`SplitError`] rather than guessing, so
//! callers fall back to the unique-terminator strategy (spec.md's
//! tie-break: "return the whole input as a single command rather than
//! mis-split").
//!
//! [`validate_syntax`] is unrelated to the lexer: it shells out to
//! `bash -n` to get an authoritative syntax check.

use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command as TokioCommand;

use crate::error::SwerexError;

/// The splitter could not confidently determine top-level command
/// boundaries (unterminated quote/heredoc, unbalanced nesting). Callers
/// should treat this as "do not split".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SplitError;

struct PendingHeredoc {
    delimiter: String,
    strip_leading_tabs: bool,
}

/// Split a block of shell source into its top-level commands, preserving
/// the original whitespace within each command.
pub fn split_bash_command(input: &str) -> Result<Vec<String>, SplitError> {
    let trimmed = input.trim();
    if trimmed.is_empty()
        || trimmed
            .lines()
            .all(|l| l.trim().is_empty() || l.trim().starts_with('#'))
    {
        return Ok(Vec::new());
    }

    let chars: Vec<char> = input.chars().collect();
    let n = chars.len();

    let mut i = 0usize;
    let mut quote: Option<char> = None;
    let mut escape = false;
    let mut depth: i32 = 0;
    let mut keyword_depth: i32 = 0;
    let mut at_word_start = true;
    let mut pending_heredocs: VecDeque<PendingHeredoc> = VecDeque::new();
    let mut cmd_start = 0usize;
    let mut commands: Vec<String> = Vec::new();

    let push_command = |commands: &mut Vec<String>, start: usize, end: usize| {
        if end > start {
            let text = chars[start..end].iter().collect::<String>();
            if !text.trim().is_empty() {
                commands.push(text);
            }
        }
    };

    while i < n {
        let c = chars[i];

        if let Some(q) = quote {
            if escape {
                escape = false;
                i += 1;
                continue;
            }
            if c == '\\' && q == '"' {
                escape = true;
                i += 1;
                continue;
            }
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        if escape {
            escape = false;
            i += 1;
            continue;
        }

        match c {
            '\\' => {
                if i + 1 < n && chars[i + 1] == '\n' {
                    i += 2; // escaped newline: not a split point
                } else {
                    escape = true;
                    i += 1;
                }
            }
            '\'' | '"' => {
                quote = Some(c);
                at_word_start = false;
                i += 1;
            }
            '(' | '{' => {
                depth += 1;
                at_word_start = false;
                i += 1;
            }
            ')' | '}' => {
                depth -= 1;
                at_word_start = false;
                i += 1;
            }
            '<' if i + 1 < n && chars[i + 1] == '<' => {
                let mut j = i + 2;
                let strip_leading_tabs = if j < n && chars[j] == '-' {
                    j += 1;
                    true
                } else {
                    false
                };
                while j < n && (chars[j] == ' ' || chars[j] == '\t') {
                    j += 1;
                }
                match parse_heredoc_delimiter(&chars, j) {
                    Some((delimiter, end)) => {
                        pending_heredocs.push_back(PendingHeredoc {
                            delimiter,
                            strip_leading_tabs,
                        });
                        i = end;
                        at_word_start = false;
                    }
                    None => return Err(SplitError),
                }
            }
            '<' | '>' => {
                // Plain redirection, not a heredoc operator.
                i += 1;
                at_word_start = false;
            }
            '\n' => {
                if !pending_heredocs.is_empty() {
                    i += 1;
                    while let Some(hd) = pending_heredocs.pop_front() {
                        i = consume_heredoc_body(&chars, i, &hd)?;
                    }
                    at_word_start = true;
                } else if depth == 0 && keyword_depth == 0 {
                    push_command(&mut commands, cmd_start, i);
                    i += 1;
                    cmd_start = i;
                    at_word_start = true;
                } else {
                    i += 1;
                    at_word_start = true;
                }
            }
            ';' => {
                if depth == 0 && keyword_depth == 0 {
                    push_command(&mut commands, cmd_start, i);
                    i += 1;
                    cmd_start = i;
                } else {
                    i += 1;
                }
                at_word_start = true;
            }
            '&' => {
                if i + 1 < n && chars[i + 1] == '&' {
                    i += 2;
                } else if depth == 0 && keyword_depth == 0 {
                    push_command(&mut commands, cmd_start, i);
                    i += 1;
                    cmd_start = i;
                    at_word_start = true;
                } else {
                    i += 1;
                }
            }
            '|' => {
                if i + 1 < n && chars[i + 1] == '|' {
                    i += 2;
                } else {
                    i += 1;
                }
                at_word_start = false;
            }
            ' ' | '\t' | '\r' => {
                at_word_start = true;
                i += 1;
            }
            '#' if at_word_start => {
                while i < n && chars[i] != '\n' {
                    i += 1;
                }
            }
            _ => {
                if at_word_start {
                    let (word, end) = read_word(&chars, i);
                    match word.as_str() {
                        "if" | "for" | "while" | "until" | "case" => keyword_depth += 1,
                        "fi" | "done" | "esac" => {
                            keyword_depth -= 1;
                            if keyword_depth < 0 {
                                return Err(SplitError);
                            }
                        }
                        _ => {}
                    }
                    i = end;
                    at_word_start = false;
                } else {
                    i += 1;
                }
            }
        }
    }

    if quote.is_some()
        || escape
        || depth != 0
        || keyword_depth != 0
        || !pending_heredocs.is_empty()
    {
        return Err(SplitError);
    }

    push_command(&mut commands, cmd_start, n);
    Ok(commands)
}

/// Read a contiguous "word": stops at whitespace or any character that is
/// meaningful to the splitter's state machine.
fn read_word(chars: &[char], start: usize) -> (String, usize) {
    const STOP: &[char] = &[
        ' ', '\t', '\r', '\n', ';', '&', '|', '<', '>', '(', ')', '{', '}', '\'', '"', '\\', '#',
    ];
    let mut j = start;
    while j < chars.len() && !STOP.contains(&chars[j]) {
        j += 1;
    }
    (chars[start..j].iter().collect(), j)
}

/// Parse a heredoc delimiter starting at `start` (already past `<<`/`<<-`
/// and any leading whitespace). Handles bare words, single- and
/// double-quoted delimiters, and a leading backslash (which, like quoting,
/// only suppresses body expansion -- irrelevant to boundary-finding, so we
/// just strip it).
fn parse_heredoc_delimiter(chars: &[char], start: usize) -> Option<(String, usize)> {
    if start >= chars.len() {
        return None;
    }
    match chars[start] {
        '\'' | '"' => {
            let quote = chars[start];
            let mut j = start + 1;
            while j < chars.len() && chars[j] != quote {
                j += 1;
            }
            if j >= chars.len() {
                return None; // unterminated delimiter quote
            }
            let delim: String = chars[start + 1..j].iter().collect();
            Some((delim, j + 1))
        }
        _ => {
            let mut j = start;
            let mut delim = String::new();
            const STOP: &[char] = &[' ', '\t', '\r', '\n', ';', '&', '|'];
            while j < chars.len() && !STOP.contains(&chars[j]) {
                if chars[j] != '\\' {
                    delim.push(chars[j]);
                }
                j += 1;
            }
            if delim.is_empty() {
                None
            } else {
                Some((delim, j))
            }
        }
    }
}

/// Consume a heredoc body starting right after the opening line's newline.
/// Returns the index right after the delimiter line (or end of input if the
/// delimiter is never found, which is treated as unterminated).
fn consume_heredoc_body(
    chars: &[char],
    mut i: usize,
    heredoc: &PendingHeredoc,
) -> Result<usize, SplitError> {
    let n = chars.len();
    loop {
        let line_start = i;
        while i < n && chars[i] != '\n' {
            i += 1;
        }
        let mut line: &[char] = &chars[line_start..i];
        if heredoc.strip_leading_tabs {
            while !line.is_empty() && line[0] == '\t' {
                line = &line[1..];
            }
        }
        let line_text: String = line.iter().collect();
        let at_end = i >= n;
        if line_text == heredoc.delimiter {
            return Ok(if at_end { i } else { i + 1 });
        }
        if at_end {
            return Err(SplitError); // unterminated heredoc
        }
        i += 1; // skip the newline, keep scanning
    }
}

/// Validate a block of shell source via `bash -n`, fed through a uniquely
/// delimited heredoc so arbitrary content (including embedded quotes) is
/// never subject to shell-argument escaping rules.
pub async fn validate_syntax(command: &str) -> Result<(), SwerexError> {
    let delimiter = format!("SWESH_SYNTAX_CHECK_{}", uuid::Uuid::new_v4().simple());
    let script = format!("bash -n <<'{delimiter}'\n{command}\n{delimiter}\n");

    let mut child = TokioCommand::new("bash")
        .arg("-c")
        .arg(&script)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| SwerexError::Generic {
            message: format!("failed to spawn syntax checker: {e}"),
        })?;

    // Nothing to write: the heredoc body is embedded in the script itself.
    if let Some(mut stdin) = child.stdin.take() {
        let _ = stdin.shutdown().await;
    }

    let output = tokio::time::timeout(Duration::from_secs(10), child.wait_with_output())
        .await
        .map_err(|_| SwerexError::CommandTimeout("syntax check timed out".to_string()))?
        .map_err(|e| SwerexError::Generic {
            message: format!("failed to wait for syntax checker: {e}"),
        })?;

    if output.status.success() {
        Ok(())
    } else {
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        Err(SwerexError::BashIncorrectSyntax {
            message: format!("bash -n reported a syntax error for: {command}"),
            bash_stdout: stdout,
            bash_stderr: stderr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_simple_newline_separated_commands() {
        let cmds = split_bash_command("echo a\necho b").unwrap();
        assert_eq!(cmds, vec!["echo a", "echo b"]);
    }

    #[test]
    fn splits_semicolon_separated_commands() {
        let cmds = split_bash_command("echo a; echo b").unwrap();
        assert_eq!(cmds.len(), 2);
        assert!(cmds[0].contains("echo a"));
        assert!(cmds[1].contains("echo b"));
    }

    #[test]
    fn does_not_split_inside_single_quotes() {
        let cmds = split_bash_command("echo 'hello world'").unwrap();
        assert_eq!(cmds, vec!["echo 'hello world'"]);
    }

    #[test]
    fn does_not_split_and_or_lists() {
        let cmds = split_bash_command("false && true").unwrap();
        assert_eq!(cmds, vec!["false && true"]);
        let cmds = split_bash_command("false || true").unwrap();
        assert_eq!(cmds, vec!["false || true"]);
    }

    #[test]
    fn escaped_newline_does_not_split() {
        let cmds = split_bash_command("cmd1\\\n asdf").unwrap();
        assert_eq!(cmds.len(), 1);
    }

    #[test]
    fn heredoc_is_a_single_command() {
        let input = "python <<EOF\nprint('hello world')\nprint('hello world 2')\nEOF";
        let cmds = split_bash_command(input).unwrap();
        assert_eq!(cmds.len(), 1);
        assert!(cmds[0].contains("hello world 2"));
    }

    #[test]
    fn heredoc_with_quoted_delimiter_and_blank_lines() {
        let input = "cat <<'EOF'\n\nsome text\n\nEOF";
        let cmds = split_bash_command(input).unwrap();
        assert_eq!(cmds.len(), 1);
        assert!(cmds[0].contains("some text"));
    }

    #[test]
    fn compound_for_loop_stays_one_command() {
        let input = "for x in 1 2 3; do\n  echo $x\ndone";
        let cmds = split_bash_command(input).unwrap();
        assert_eq!(cmds.len(), 1);
    }

    #[test]
    fn all_comment_input_is_empty() {
        assert_eq!(split_bash_command("# just a comment\n# more").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn all_blank_input_is_empty() {
        assert_eq!(split_bash_command("   \n\n  ").unwrap(), Vec::<String>::new());
    }

    #[test]
    fn unterminated_quote_is_a_split_error() {
        assert_eq!(split_bash_command("echo 'unterminated"), Err(SplitError));
    }

    #[test]
    fn unterminated_heredoc_is_a_split_error() {
        assert_eq!(split_bash_command("cat <<EOF\nsome text"), Err(SplitError));
    }
}
