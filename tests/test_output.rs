//! Integration tests for output hygiene via the public API.

use swesh::output::{remove_token, strip_ansi, strip_control_chars};

#[test]
fn strips_ansi_color_codes_from_real_looking_output() {
    let input = "\x1b[1;32m$\x1b[0m ls\r\nfile.txt\r\n";
    let cleaned = strip_ansi(input);
    assert!(!cleaned.contains('\x1b'));
    assert!(cleaned.contains("file.txt"));
}

#[test]
fn control_char_strip_removes_bell_but_keeps_newlines() {
    let input = "done\x07\nnext line";
    let cleaned = strip_control_chars(input);
    assert_eq!(cleaned, "done\nnext line");
}

#[test]
fn remove_token_strips_every_occurrence_of_a_sentinel() {
    let sentinel = "SWESH_PS1_abc123";
    let input = format!("{sentinel}output here{sentinel}");
    assert_eq!(remove_token(&input, sentinel), "output here");
}
