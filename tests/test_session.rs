//! Integration tests for persistent bash sessions, covering the scenarios
//! a real agent session exercises: state persistence, check modes,
//! interactive programs, timeouts, interrupts, and syntax errors.

use swesh::error::SwerexError;
use swesh::models::{BashAction, BashInterruptAction, CheckMode, CreateSessionRequest};
use swesh::registry::Runtime;

async fn new_session(runtime: &Runtime, name: &str) {
    runtime
        .create_session(&CreateSessionRequest {
            session: name.to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
}

fn bash(command: &str, session: &str) -> BashAction {
    BashAction {
        command: command.to_string(),
        session: session.to_string(),
        timeout: Some(10.0),
        is_interactive_command: false,
        is_interactive_quit: false,
        check: CheckMode::Raise,
        error_msg: String::new(),
        expect: Vec::new(),
    }
}

#[tokio::test]
async fn echo_hello_world_exits_zero() {
    let runtime = Runtime::new();
    new_session(&runtime, "default").await;

    let action = swesh::models::Action::Bash(bash("echo 'hello world'", "default"));
    let observation = runtime.run_in_session(&action).await.unwrap();

    assert_eq!(observation.output.trim(), "hello world");
    assert_eq!(observation.exit_code, Some(0));
}

#[tokio::test]
async fn unknown_command_with_silent_check_returns_127() {
    let runtime = Runtime::new();
    new_session(&runtime, "default").await;

    let mut action = bash("doesntexist_xyz", "default");
    action.check = CheckMode::Silent;
    let observation = runtime
        .run_in_session(&swesh::models::Action::Bash(action))
        .await
        .unwrap();

    assert_eq!(observation.exit_code, Some(127));
}

#[tokio::test]
async fn and_list_short_circuits() {
    let runtime = Runtime::new();
    new_session(&runtime, "default").await;

    let action = swesh::models::Action::Bash(bash("false && echo unreachable", "default"));
    let err = runtime.run_in_session(&action).await.unwrap_err();
    assert!(matches!(
        err,
        SwerexError::NonZeroExitCode { exit_code: Some(1), .. }
    ));
}

#[tokio::test]
async fn or_list_falls_through_to_success() {
    let runtime = Runtime::new();
    new_session(&runtime, "default").await;

    let action = swesh::models::Action::Bash(bash("false || true", "default"));
    let observation = runtime.run_in_session(&action).await.unwrap();
    assert_eq!(observation.exit_code, Some(0));
}

#[tokio::test]
async fn working_directory_persists_across_commands() {
    let runtime = Runtime::new();
    new_session(&runtime, "default").await;

    runtime
        .run_in_session(&swesh::models::Action::Bash(bash("cd /tmp", "default")))
        .await
        .unwrap();
    let observation = runtime
        .run_in_session(&swesh::models::Action::Bash(bash("pwd", "default")))
        .await
        .unwrap();
    assert_eq!(observation.output.trim(), "/tmp");
}

#[tokio::test]
async fn env_var_persists_across_commands() {
    let runtime = Runtime::new();
    new_session(&runtime, "default").await;

    runtime
        .run_in_session(&swesh::models::Action::Bash(bash(
            "export SWESH_FOO=bar",
            "default",
        )))
        .await
        .unwrap();
    let observation = runtime
        .run_in_session(&swesh::models::Action::Bash(bash("echo $SWESH_FOO", "default")))
        .await
        .unwrap();
    assert_eq!(observation.output.trim(), "bar");
}

#[tokio::test]
async fn heredoc_runs_as_a_single_command() {
    let runtime = Runtime::new();
    new_session(&runtime, "default").await;

    let command = "python3 <<'EOF'\nprint('from heredoc')\nEOF";
    let observation = runtime
        .run_in_session(&swesh::models::Action::Bash(bash(command, "default")))
        .await
        .unwrap();
    assert_eq!(observation.exit_code, Some(0));
    assert!(observation.output.contains("from heredoc"));
}

#[tokio::test]
async fn syntax_error_is_reported_before_anything_runs() {
    let runtime = Runtime::new();
    new_session(&runtime, "default").await;

    let action = swesh::models::Action::Bash(bash("(a", "default"));
    let err = runtime.run_in_session(&action).await.unwrap_err();
    match err {
        SwerexError::BashIncorrectSyntax { bash_stderr, .. } => {
            assert!(!bash_stderr.is_empty());
        }
        other => panic!("expected BashIncorrectSyntax, got {other:?}"),
    }
}

#[tokio::test]
async fn timeout_then_interrupt_recovers_the_session() {
    let runtime = Runtime::new();
    new_session(&runtime, "default").await;

    let mut action = bash("sleep 10", "default");
    action.timeout = Some(0.2);
    let err = runtime
        .run_in_session(&swesh::models::Action::Bash(action))
        .await
        .unwrap_err();
    assert!(matches!(err, SwerexError::CommandTimeout(_)));

    let interrupt = swesh::models::Action::BashInterrupt(BashInterruptAction {
        session: "default".to_string(),
        timeout: 0.5,
        n_retry: 3,
        expect: Vec::new(),
    });
    runtime.run_in_session(&interrupt).await.unwrap();

    let observation = runtime
        .run_in_session(&swesh::models::Action::Bash(bash("echo recovered", "default")))
        .await
        .unwrap();
    assert_eq!(observation.output.trim(), "recovered");
}

#[tokio::test]
async fn interactive_python_repl_round_trip() {
    let runtime = Runtime::new();
    new_session(&runtime, "default").await;

    let mut start = bash("python3 -u -i -q", "default");
    start.is_interactive_command = true;
    start.expect = vec![">>> ".to_string()];
    runtime
        .run_in_session(&swesh::models::Action::Bash(start))
        .await
        .unwrap();

    let mut eval = bash("2 + 2", "default");
    eval.is_interactive_command = true;
    eval.expect = vec![">>> ".to_string()];
    let observation = runtime
        .run_in_session(&swesh::models::Action::Bash(eval))
        .await
        .unwrap();
    assert!(observation.output.contains('4'));

    let mut quit = bash("quit()\n", "default");
    quit.is_interactive_quit = true;
    runtime
        .run_in_session(&swesh::models::Action::Bash(quit))
        .await
        .unwrap();

    let observation = runtime
        .run_in_session(&swesh::models::Action::Bash(bash(
            "echo back in bash",
            "default",
        )))
        .await
        .unwrap();
    assert_eq!(observation.output.trim(), "back in bash");
}

#[tokio::test]
async fn closing_a_session_then_running_in_it_fails() {
    let runtime = Runtime::new();
    new_session(&runtime, "default").await;
    runtime.close_session("default").await.unwrap();

    let err = runtime
        .run_in_session(&swesh::models::Action::Bash(bash("echo hi", "default")))
        .await
        .unwrap_err();
    assert!(matches!(err, SwerexError::SessionDoesNotExist(_)));
}
