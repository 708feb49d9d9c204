//! REST surface integration tests — boot the server on an ephemeral port
//! with an in-memory database and drive it with a real HTTP client.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use weft_core::agent::{AgentInvoker, AgentPayload, AgentRegistry, AgentReply};
use weft_core::db::Database;
use weft_server::state::{AppState, AppStateInner};
use weft_server::{start_server_with_state, ServerConfig};

struct EchoAgent;

#[async_trait]
impl AgentInvoker for EchoAgent {
    async fn invoke(&self, _agent_ref: &str, payload: &AgentPayload) -> Result<AgentReply, String> {
        Ok(AgentReply {
            output: Value::String(format!("echo: {}", payload.prompt)),
            usage: None,
        })
    }
}

async fn spawn_server() -> String {
    let db = Database::open_in_memory().expect("in-memory db");
    let mut registry = AgentRegistry::new();
    registry.register("echo", Arc::new(EchoAgent));

    let state: AppState = Arc::new(AppStateInner::new(db, Arc::new(registry)));
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        db_path: String::new(),
    };
    let addr = start_server_with_state(config, state)
        .await
        .expect("server start");
    format!("http://{}", addr)
}

async fn create_template(client: &reqwest::Client, base: &str, steps: Value) -> String {
    let response = client
        .post(format!("{}/api/templates", base))
        .json(&json!({ "name": "flow", "steps": steps }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    body["template"]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_full_execution_over_http() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let health: Value = client
        .get(format!("{}/api/health", base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");

    let template_id = create_template(
        &client,
        &base,
        json!([
            { "stepOrder": 0, "agentRef": "echo", "promptTemplate": "Say: {{initialContext.word}}" },
            { "stepOrder": 1, "agentRef": "echo", "promptTemplate": "Again: {{step0.output}}" }
        ]),
    )
    .await;

    // Start an execution.
    let response = client
        .post(format!("{}/api/executions", base))
        .json(&json!({ "templateId": template_id, "initialContext": { "word": "hi" } }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let body: Value = response.json().await.unwrap();
    let execution_id = body["execution"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["execution"]["status"], "running");
    assert_eq!(body["execution"]["currentStepOrder"], 0);

    // Drive it to completion.
    let body: Value = client
        .post(format!("{}/api/executions/{}/next", base, execution_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["completed"], false);

    let body: Value = client
        .post(format!("{}/api/executions/{}/next", base, execution_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["completed"], true);
    assert_eq!(body["execution"]["status"], "completed");

    // Read the finished execution back.
    let body: Value = client
        .get(format!("{}/api/executions/{}", base, execution_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["progressPercentage"], 100.0);
    assert_eq!(body["steps"].as_array().unwrap().len(), 2);
    assert_eq!(
        body["steps"][1]["agentOutput"],
        json!("echo: Again: echo: Say: hi")
    );

    // No steps remain: a further advance is a 400.
    let response = client
        .post(format!("{}/api/executions/{}/next", base, execution_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_input_gated_step_over_http() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let template_id = create_template(
        &client,
        &base,
        json!([
            { "stepOrder": 0, "agentRef": "echo", "promptTemplate": "Use: {{step0.userInput}}",
              "requiresUserInput": true, "inputSchema": { "notes": "string" } }
        ]),
    )
    .await;

    let body: Value = client
        .post(format!("{}/api/executions", base))
        .json(&json!({ "templateId": template_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let execution_id = body["execution"]["id"].as_str().unwrap().to_string();

    let body: Value = client
        .post(format!("{}/api/executions/{}/next", base, execution_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["requiresUserInput"], true);
    assert_eq!(body["execution"]["status"], "paused");

    // Submitting input against the wrong status guard is a 400.
    let response = client
        .post(format!("{}/api/executions/{}/input", base, execution_id))
        .json(&json!({ "stepOrder": 5, "userInput": "nope" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: Value = client
        .post(format!("{}/api/executions/{}/input", base, execution_id))
        .json(&json!({ "stepOrder": 0, "userInput": { "notes": "ok" } }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["completed"], true);

    // Cancelling a completed execution is an invalid transition.
    let response = client
        .post(format!("{}/api/executions/{}/cancel", base, execution_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_validation_and_lookup_errors_over_http() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    // Empty step list never reaches the engine.
    let response = client
        .post(format!("{}/api/templates", base))
        .json(&json!({ "name": "empty", "steps": [] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let response = client
        .post(format!("{}/api/executions", base))
        .json(&json!({ "templateId": "ghost" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let response = client
        .get(format!("{}/api/executions/ghost", base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_pause_and_resume_over_http() {
    let base = spawn_server().await;
    let client = reqwest::Client::new();

    let template_id = create_template(
        &client,
        &base,
        json!([
            { "stepOrder": 0, "agentRef": "echo", "promptTemplate": "a" },
            { "stepOrder": 1, "agentRef": "echo", "promptTemplate": "b" }
        ]),
    )
    .await;

    let body: Value = client
        .post(format!("{}/api/executions", base))
        .json(&json!({ "templateId": template_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let execution_id = body["execution"]["id"].as_str().unwrap().to_string();

    let body: Value = client
        .post(format!("{}/api/executions/{}/pause", base, execution_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["execution"]["status"], "paused");

    // Advancing a paused execution is a 400; resume unblocks it.
    let response = client
        .post(format!("{}/api/executions/{}/next", base, execution_id))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: Value = client
        .post(format!("{}/api/executions/{}/resume", base, execution_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["execution"]["status"], "running");

    let body: Value = client
        .post(format!("{}/api/executions/{}/next", base, execution_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["execution"]["currentStepOrder"], 1);
}
