//! Integration tests for the MCP server tools via duplex transport.
//!
//! Uses `tokio::io::duplex` to create an in-process transport, connects a
//! test client to the swesh server, and exercises the facade's operations
//! through the MCP protocol.

use rmcp::model::*;
use rmcp::{ClientHandler, ServiceExt};
use serde_json::Value;
use swesh::server::SweshServer;

#[derive(Default, Clone)]
struct TestClient;

impl ClientHandler for TestClient {}

async fn setup() -> rmcp::service::RunningService<
    rmcp::service::RoleClient,
    impl rmcp::service::Service<rmcp::service::RoleClient>,
> {
    let (server_transport, client_transport) = tokio::io::duplex(65536);

    let server = SweshServer::new();
    tokio::spawn(async move {
        let service = server.serve(server_transport).await.unwrap();
        let _ = service.waiting().await;
    });

    let client = TestClient::default();
    client.serve(client_transport).await.unwrap()
}

async fn call_tool(
    client: &rmcp::service::RunningService<
        rmcp::service::RoleClient,
        impl rmcp::service::Service<rmcp::service::RoleClient>,
    >,
    name: &str,
    args: Value,
) -> Value {
    let params = CallToolRequestParams {
        meta: None,
        name: name.to_string().into(),
        arguments: Some(serde_json::from_value(args).unwrap()),
        task: None,
    };
    let request = ClientRequest::CallToolRequest(Request::new(params));
    let response = client.send_request(request).await.unwrap();

    let ServerResult::CallToolResult(result) = response else {
        panic!("expected CallToolResult, got {response:?}");
    };

    let text = result
        .content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");

    serde_json::from_str(&text).unwrap_or_else(|_| Value::String(text))
}

#[tokio::test]
async fn is_alive_reports_true() {
    let client = setup().await;
    let result = call_tool(&client, "is_alive", serde_json::json!({})).await;
    assert_eq!(result["is_alive"], true);
    client.cancel().await.unwrap();
}

#[tokio::test]
async fn create_run_and_close_session_round_trip() {
    let client = setup().await;

    let created = call_tool(
        &client,
        "create_session",
        serde_json::json!({"session": "default"}),
    )
    .await;
    assert!(created.get("output").is_some());

    let observation = call_tool(
        &client,
        "run_in_session",
        serde_json::json!({
            "action_type": "bash",
            "command": "echo hello_world",
            "session": "default"
        }),
    )
    .await;
    assert_eq!(observation["exit_code"], 0);
    assert!(observation["output"].as_str().unwrap().contains("hello_world"));

    call_tool(
        &client,
        "close_session",
        serde_json::json!({"session": "default"}),
    )
    .await;

    client.cancel().await.unwrap();
}

#[tokio::test]
async fn run_in_session_on_unknown_session_reports_typed_error() {
    let client = setup().await;

    let params = CallToolRequestParams {
        meta: None,
        name: "run_in_session".to_string().into(),
        arguments: Some(
            serde_json::from_value(serde_json::json!({
                "action_type": "bash",
                "command": "echo hi",
                "session": "nope"
            }))
            .unwrap(),
        ),
        task: None,
    };
    let request = ClientRequest::CallToolRequest(Request::new(params));
    let response = client.send_request(request).await.unwrap();
    let ServerResult::CallToolResult(result) = response else {
        panic!("expected CallToolResult");
    };
    assert_eq!(result.is_error, Some(true));

    let text = result
        .content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("");
    assert!(text.contains("SessionDoesNotExistError"));

    client.cancel().await.unwrap();
}

#[tokio::test]
async fn execute_runs_a_one_shot_command() {
    let client = setup().await;
    let result = call_tool(
        &client,
        "execute",
        serde_json::json!({"command": "echo standalone"}),
    )
    .await;
    assert_eq!(result["exit_code"], 0);
    assert!(result["stdout"].as_str().unwrap().contains("standalone"));
    client.cancel().await.unwrap();
}

#[tokio::test]
async fn write_then_read_file_round_trip() {
    let client = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("note.txt").to_string_lossy().to_string();

    call_tool(
        &client,
        "write_file",
        serde_json::json!({"path": path, "content": "hello file"}),
    )
    .await;

    let read = call_tool(&client, "read_file", serde_json::json!({"path": path})).await;
    assert_eq!(read["content"], "hello file");

    client.cancel().await.unwrap();
}

#[tokio::test]
async fn close_closes_every_session() {
    let client = setup().await;
    call_tool(
        &client,
        "create_session",
        serde_json::json!({"session": "default"}),
    )
    .await;
    call_tool(&client, "close", serde_json::json!({})).await;

    let params = CallToolRequestParams {
        meta: None,
        name: "run_in_session".to_string().into(),
        arguments: Some(
            serde_json::from_value(serde_json::json!({
                "action_type": "bash",
                "command": "echo hi",
                "session": "default"
            }))
            .unwrap(),
        ),
        task: None,
    };
    let request = ClientRequest::CallToolRequest(Request::new(params));
    let response = client.send_request(request).await.unwrap();
    let ServerResult::CallToolResult(result) = response else {
        panic!("expected CallToolResult");
    };
    assert_eq!(result.is_error, Some(true));

    client.cancel().await.unwrap();
}
