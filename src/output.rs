//! Output hygiene: ANSI/control-character stripping for PTY output.
//!
//! Before any observation is returned to a caller, its output must be free
//! of terminal escape sequences, the session's prompt sentinel, the unique
//! fallback terminator (if one was used), and the exit-code markers. This
//! module provides the pure stripping functions; [`crate::bash::session`] is
//! responsible for calling them in the right order.

use std::sync::LazyLock;

use regex::Regex;

/// Matches ANSI CSI/OSC escape sequences and bare single-character escapes.
static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[@-_][0-?]*[ -/]*[@-~]|\x1b\][^\x07]*\x07|\x1b[()][0-9A-B]|\x1b[a-zA-Z]")
        .expect("invalid ANSI regex")
});

/// Strip ANSI CSI/OSC escape sequences from a string, matching spec.md's
/// `\x1B[@-_][0-?]*[ -/]*[@-~]` pattern (extended to also cover OSC
/// sequences and bare escapes the way real PTY output emits them).
#[must_use]
pub fn strip_ansi(s: &str) -> String {
    ANSI_ESCAPE.replace_all(s, "").to_string()
}

/// Strip non-printable control characters (other than newline/tab) that
/// survive ANSI stripping -- stray backspaces, bell characters, etc.
#[must_use]
pub fn strip_control_chars(s: &str) -> String {
    strip_ansi(s)
        .chars()
        .filter(|c| *c == '\n' || *c == '\t' || !c.is_control())
        .collect()
}

/// Remove every occurrence of `needle` from `s`, if `needle` is non-empty.
#[must_use]
pub fn remove_token(s: &str, needle: &str) -> String {
    if needle.is_empty() {
        return s.to_string();
    }
    s.replace(needle, "")
}
