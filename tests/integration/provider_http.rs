//! Publishing against a local chat-completions endpoint, wired from configuration

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use learncrafter::config::AppConfig;
use learncrafter::job::{ErrorKind, JobStatus};
use learncrafter::provider::{
    ChatClient, ChatMessage, CompletionOptions, OpenAiCompatibleClient, ProviderConfig,
};
use learncrafter::publisher::CoursePublisher;
use learncrafter::store::CourseStore;
use learncrafter::validator::ValidationMode;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::integration::test_utils::spec;

#[derive(Default)]
struct FakeProvider {
    replies: Mutex<VecDeque<(u16, serde_json::Value)>>,
    requests: Mutex<Vec<(Option<String>, serde_json::Value)>>,
}

impl FakeProvider {
    fn requests(&self) -> Vec<(Option<String>, serde_json::Value)> {
        self.requests.lock().unwrap().clone()
    }

    fn prompt(&self, index: usize) -> String {
        let requests = self.requests();
        let messages = requests[index].1["messages"].as_array().unwrap().clone();
        messages
            .last()
            .and_then(|m| m["content"].as_str())
            .unwrap_or_default()
            .to_string()
    }
}

fn completion(content: &str) -> (u16, serde_json::Value) {
    (
        200,
        serde_json::json!({
            "model": "fake-model",
            "choices": [{"message": {"role": "assistant", "content": content}, "finish_reason": "stop"}]
        }),
    )
}

fn failure(status: u16, message: &str) -> (u16, serde_json::Value) {
    (status, serde_json::json!({"error": {"message": message}}))
}

async fn chat_completions(
    State(provider): State<Arc<FakeProvider>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    provider.requests.lock().unwrap().push((auth, body));
    let (status, reply) = provider
        .replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| completion("<p>default</p>"));
    (
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        Json(reply),
    )
}

/// Start the fake provider and return it with a config pointing at it.
async fn start(replies: Vec<(u16, serde_json::Value)>) -> (Arc<FakeProvider>, AppConfig) {
    let provider = Arc::new(FakeProvider {
        replies: Mutex::new(replies.into()),
        requests: Mutex::new(Vec::new()),
    });
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .with_state(provider.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = AppConfig::default();
    config.provider.base_url = format!("http://{}/v1", addr);
    config.provider.model = "fake-model".to_string();
    config.provider.api_key = Some("test-key".to_string());
    config.orchestrator.worker_pool_size = 1;
    config.orchestrator.retry.base_delay_ms = 1;
    config.orchestrator.retry.max_delay_ms = 5;
    config.orchestrator.validation = ValidationMode::Off;
    (provider, config)
}

#[tokio::test]
async fn test_publishes_through_http_provider() {
    let (provider, config) = start(vec![
        completion("<p>velocity</p>"),
        completion("<p>acceleration</p>"),
    ])
    .await;
    let publisher = CoursePublisher::from_config(&config).unwrap();

    let record = publisher
        .run_to_completion(spec(&[("Kinematics", &["Velocity", "Acceleration"])]))
        .await
        .unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    let requests = provider.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].0.as_deref(), Some("Bearer test-key"));
    assert_eq!(requests[0].1["model"], "fake-model");
    assert_eq!(requests[0].1["stream"], false);
    assert!(provider.prompt(0).contains("Velocity"));

    let outline = publisher
        .store()
        .course_outline(record.course_id.unwrap())
        .await
        .unwrap();
    assert_eq!(outline.modules[0].concepts[0].content, "<p>velocity</p>");
    assert_eq!(outline.modules[0].concepts[1].content, "<p>acceleration</p>");
}

#[tokio::test]
async fn test_server_errors_are_retried() {
    let (provider, config) = start(vec![
        failure(503, "overloaded"),
        failure(429, "slow down"),
        completion("<p>finally</p>"),
    ])
    .await;
    let publisher = CoursePublisher::from_config(&config).unwrap();

    let record = publisher
        .run_to_completion(spec(&[("Kinematics", &["Velocity"])]))
        .await
        .unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(provider.requests().len(), 3);
}

#[tokio::test]
async fn test_auth_failure_is_permanent() {
    let (provider, config) = start(vec![failure(401, "bad key")]).await;
    let publisher = CoursePublisher::from_config(&config).unwrap();

    let record = publisher
        .run_to_completion(spec(&[("Kinematics", &["Velocity", "Mass"])]))
        .await
        .unwrap();

    assert_eq!(record.status, JobStatus::PartialFailure);
    assert_eq!(record.errors.len(), 1);
    assert_eq!(record.errors[0].kind, ErrorKind::PermanentGeneration);
    assert_eq!(provider.requests().len(), 2);
}

#[tokio::test]
async fn test_rule_rejection_feeds_regeneration_prompt() {
    let (provider, mut config) = start(vec![
        completion("<p>see</p><iframe src=\"x\"></iframe>"),
        completion("<p>clean</p>"),
    ])
    .await;
    config.orchestrator.validation = ValidationMode::Rules;
    let publisher = CoursePublisher::from_config(&config).unwrap();

    let record = publisher
        .run_to_completion(spec(&[("Kinematics", &["Velocity"])]))
        .await
        .unwrap();

    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(provider.requests().len(), 2);
    let regeneration = provider.prompt(1);
    assert!(regeneration.contains("Dangerous tags found: iframe"));
    assert!(regeneration.contains("<iframe"));

    let outline = publisher
        .store()
        .course_outline(record.course_id.unwrap())
        .await
        .unwrap();
    assert_eq!(outline.modules[0].concepts[0].content, "<p>clean</p>");
}

/// Read one HTTP request (headers plus `Content-Length` body) off the socket.
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        let text = String::from_utf8_lossy(&buf).to_string();
        if let Some(end) = text.find("\r\n\r\n") {
            let length = text[..end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }
}

#[tokio::test]
async fn test_stalled_response_body_is_transient() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        socket
            .write_all(
                b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 1000\r\n\r\n{\"model\":",
            )
            .await
            .unwrap();
        socket.flush().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
    });

    let config = ProviderConfig {
        base_url: format!("http://{}/v1", addr),
        api_key: None,
        ..ProviderConfig::default()
    };
    let client = OpenAiCompatibleClient::new(&config, Duration::from_millis(300)).unwrap();
    let err = client
        .complete(vec![ChatMessage::user("hello")], CompletionOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_transient(), "unexpected classification: {:?}", err);
}

#[tokio::test]
async fn test_malformed_body_is_permanent() {
    let (_provider, config) = start(vec![(200, serde_json::json!({"choices": "nope"}))]).await;
    let client = OpenAiCompatibleClient::new(&config.provider, Duration::from_secs(5)).unwrap();
    let err = client
        .complete(vec![ChatMessage::user("hello")], CompletionOptions::default())
        .await
        .unwrap_err();

    assert!(!err.is_transient());
    assert!(err.to_string().contains("failed to parse response"));
}
