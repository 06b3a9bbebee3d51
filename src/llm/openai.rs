//! OpenAI Responses API client for search-forge.
//!
//! This module provides the completion oracle used by every stage of the
//! pipeline: candidate generation, filtering, schema design, web search
//! execution and refinement.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

use super::recorder::ResponseRecorder;
use crate::error::LlmError;

/// Default base URL for the OpenAI API.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Request timeout in seconds. Web-search calls can be slow.
const REQUEST_TIMEOUT_SECS: u64 = 180;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Response shape hint passed to the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    /// Ask the model to answer with a single JSON object.
    JsonObject,
}

impl ResponseFormat {
    fn to_json(self) -> Value {
        match self {
            ResponseFormat::JsonObject => json!({ "type": "json_object" }),
        }
    }
}

/// A hosted tool the model may call while answering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type")]
    pub kind: String,
}

impl Tool {
    /// The hosted web search tool.
    pub fn web_search() -> Self {
        Self {
            kind: "web_search".to_string(),
        }
    }
}

/// Request for text generation from an LLM.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Model identifier to use for generation.
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Optional structured response hint.
    pub response_format: Option<ResponseFormat>,
    /// Hosted tools made available to the model.
    pub tools: Vec<Tool>,
    /// Label of the pipeline step issuing the call, used for raw-response file names.
    pub step: String,
    /// Free-form metadata persisted alongside the raw response.
    pub metadata: serde_json::Map<String, Value>,
}

impl GenerationRequest {
    /// Create a new generation request with default parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            response_format: None,
            tools: Vec::new(),
            step: "generic".to_string(),
            metadata: serde_json::Map::new(),
        }
    }

    /// Request a JSON object response.
    pub fn with_json_response(mut self) -> Self {
        self.response_format = Some(ResponseFormat::JsonObject);
        self
    }

    /// Make a hosted tool available to the model.
    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    /// Set the step label for this request.
    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = step.into();
        self
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Response from an LLM generation request.
#[derive(Debug, Clone, Default)]
pub struct GenerationResponse {
    /// Flattened output text.
    pub text: String,
    /// The full response payload as returned by the server.
    pub raw: Value,
}

impl GenerationResponse {
    /// Build a response carrying only text (raw payload is null).
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            raw: Value::Null,
        }
    }
}

/// Trait for LLM providers that can generate text.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a response for the given request.
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError>;
}

/// Client for the OpenAI Responses API.
pub struct OpenAiClient {
    /// Base URL for the API.
    api_base: String,
    /// API key for authentication.
    api_key: String,
    /// HTTP client for making API requests.
    http_client: Client,
    /// Optional sink for raw response payloads.
    recorder: Option<ResponseRecorder>,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiClient")
            .field("api_base", &self.api_base)
            .field("recorder", &self.recorder)
            .finish_non_exhaustive()
    }
}

impl OpenAiClient {
    /// Create a new client with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiKey` if the key is empty and
    /// `LlmError::RequestFailed` if the HTTP client cannot be built.
    pub fn new(api_base: impl Into<String>, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let http_client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| LlmError::RequestFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            http_client,
            recorder: None,
        })
    }

    /// Create a new client from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `OPENAI_API_KEY`: API key for authentication (required)
    /// - `OPENAI_API_BASE`: Base URL (defaults to the public OpenAI endpoint)
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiKey` if `OPENAI_API_KEY` is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_key = env::var("OPENAI_API_KEY").map_err(|_| LlmError::MissingApiKey)?;
        let api_base =
            env::var("OPENAI_API_BASE").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self::new(api_base, api_key)
    }

    /// Persist every raw response through the given recorder.
    pub fn with_recorder(mut self, recorder: ResponseRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    async fn post(&self, body: &Value) -> Result<Value, LlmError> {
        let url = format!("{}/responses", self.api_base);

        let http_response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let status = http_response.status();

        if !status.is_success() {
            let status_code = status.as_u16();

            let error_text = http_response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());

            if let Ok(error_response) = serde_json::from_str::<ApiErrorResponse>(&error_text) {
                if status_code == 429 {
                    return Err(LlmError::RateLimited(error_response.error.message));
                }

                return Err(LlmError::ApiError {
                    code: status_code,
                    message: error_response.error.message,
                });
            }

            return Err(LlmError::ApiError {
                code: status_code,
                message: error_text,
            });
        }

        http_response
            .json()
            .await
            .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))
    }
}

/// Error response from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

/// Error detail from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Builds the Responses API request body.
fn build_request_body(request: &GenerationRequest, include_format: bool) -> Value {
    let mut body = json!({
        "model": request.model,
        "input": request.messages,
    });
    if include_format {
        if let Some(format) = request.response_format {
            body["text"] = json!({ "format": format.to_json() });
        }
    }
    if !request.tools.is_empty() {
        body["tools"] = json!(request.tools);
    }
    body
}

/// Retrieves the textual content from a Responses API payload.
///
/// Prefers the top-level `output_text` convenience field and otherwise joins
/// every `output_text`/`text` content item of every output block.
pub fn extract_output_text(raw: &Value) -> String {
    if let Some(text) = raw.get("output_text").and_then(Value::as_str) {
        return text.to_string();
    }

    let Some(output) = raw.get("output").and_then(Value::as_array) else {
        return String::new();
    };

    let texts: Vec<&str> = output
        .iter()
        .filter_map(|block| block.get("content").and_then(Value::as_array))
        .flatten()
        .filter(|item| {
            matches!(
                item.get("type").and_then(Value::as_str),
                Some("output_text") | Some("text")
            )
        })
        .map(|item| item.get("text").and_then(Value::as_str).unwrap_or(""))
        .collect();

    texts.join("\n").trim().to_string()
}

#[async_trait]
impl LlmProvider for OpenAiClient {
    async fn generate(&self, request: GenerationRequest) -> Result<GenerationResponse, LlmError> {
        let body = build_request_body(&request, true);
        let raw = match self.post(&body).await {
            Err(err) if err.is_bad_request() && request.response_format.is_some() => {
                tracing::warn!(
                    step = %request.step,
                    error = %err,
                    "Server rejected response format hint; retrying without it"
                );
                self.post(&build_request_body(&request, false)).await?
            }
            other => other?,
        };

        if let Some(recorder) = &self.recorder {
            if let Err(err) = recorder.record(&request, &raw).await {
                tracing::warn!(step = %request.step, error = %err, "Failed to persist raw response");
            }
        }

        Ok(GenerationResponse {
            text: extract_output_text(&raw),
            raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let system = Message::system("You generate diverse web searches.");
        assert_eq!(system.role, "system");

        let user = Message::user("Hello");
        assert_eq!(user.role, "user");
        assert_eq!(user.content, "Hello");

        let assistant = Message::assistant("Hi there!");
        assert_eq!(assistant.role, "assistant");
    }

    #[test]
    fn test_generation_request_builder() {
        let request = GenerationRequest::new("gpt-5-mini", vec![Message::user("test")])
            .with_json_response()
            .with_tool(Tool::web_search())
            .with_step("web_g0001")
            .with_metadata("query", "acme robotics");

        assert_eq!(request.model, "gpt-5-mini");
        assert_eq!(request.response_format, Some(ResponseFormat::JsonObject));
        assert_eq!(request.tools, vec![Tool::web_search()]);
        assert_eq!(request.step, "web_g0001");
        assert_eq!(request.metadata["query"], "acme robotics");
    }

    #[test]
    fn test_request_body_shape() {
        let request = GenerationRequest::new("m", vec![Message::user("q")])
            .with_json_response()
            .with_tool(Tool::web_search());

        let body = build_request_body(&request, true);
        assert_eq!(body["model"], "m");
        assert_eq!(body["input"][0]["role"], "user");
        assert_eq!(body["text"]["format"]["type"], "json_object");
        assert_eq!(body["tools"][0]["type"], "web_search");

        let without_format = build_request_body(&request, false);
        assert!(without_format.get("text").is_none());
        assert!(without_format.get("tools").is_some());
    }

    #[test]
    fn test_request_body_omits_empty_tools() {
        let request = GenerationRequest::new("m", vec![Message::user("q")]);
        let body = build_request_body(&request, true);
        assert!(body.get("tools").is_none());
        assert!(body.get("text").is_none());
    }

    #[test]
    fn test_extract_output_text_prefers_convenience_field() {
        let raw = json!({ "output_text": "{\"items\": []}", "output": [] });
        assert_eq!(extract_output_text(&raw), "{\"items\": []}");
    }

    #[test]
    fn test_extract_output_text_from_blocks() {
        let raw = json!({
            "output": [
                { "type": "web_search_call", "id": "ws_1" },
                {
                    "type": "message",
                    "content": [
                        { "type": "output_text", "text": "first" },
                        { "type": "refusal", "text": "ignored" },
                        { "type": "text", "text": "second " }
                    ]
                }
            ]
        });
        assert_eq!(extract_output_text(&raw), "first\nsecond");
        assert_eq!(extract_output_text(&json!({})), "");
    }

    #[test]
    fn test_client_requires_key() {
        let result = OpenAiClient::new(DEFAULT_API_BASE, "  ");
        assert!(matches!(result, Err(LlmError::MissingApiKey)));

        let client = OpenAiClient::new("http://localhost:4000/", "sk-test").expect("client");
        assert_eq!(client.api_base(), "http://localhost:4000");
    }

    mod local_server {
        //! One-shot HTTP responder for exercising the client end to end.

        use std::sync::{Arc, Mutex};

        use serde_json::Value;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::{TcpListener, TcpStream};
        use tokio::task::JoinHandle;

        pub type Bodies = Arc<Mutex<Vec<Value>>>;

        /// Serves `replies` in order, one connection each, recording request bodies.
        pub async fn spawn(replies: Vec<(u16, &'static str)>) -> (String, Bodies, JoinHandle<()>) {
            let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
            let base = format!("http://{}", listener.local_addr().expect("addr"));
            let bodies: Bodies = Arc::default();
            let recorded = Arc::clone(&bodies);

            let handle = tokio::spawn(async move {
                for (status, payload) in replies {
                    let (mut socket, _) = listener.accept().await.expect("accept");
                    let body = read_body(&mut socket).await;
                    recorded
                        .lock()
                        .expect("lock")
                        .push(serde_json::from_slice(&body).expect("json body"));

                    let reason = if status == 200 { "OK" } else { "Error" };
                    let response = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        reason,
                        payload.len(),
                        payload
                    );
                    socket.write_all(response.as_bytes()).await.expect("write");
                    socket.shutdown().await.ok();
                }
            });
            (base, bodies, handle)
        }

        async fn read_body(socket: &mut TcpStream) -> Vec<u8> {
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.expect("read");
                if n == 0 {
                    return Vec::new();
                }
                buf.extend_from_slice(&chunk[..n]);
                let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                    continue;
                };
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let length = head
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                let start = end + 4;
                if buf.len() >= start + length {
                    return buf[start..start + length].to_vec();
                }
            }
        }
    }

    const FORMAT_REJECTED: &str =
        r#"{"error": {"message": "Unsupported parameter: 'text.format'"}}"#;

    #[tokio::test]
    async fn test_bad_request_retries_without_format_hint() {
        let (base, bodies, server) = local_server::spawn(vec![
            (400, FORMAT_REJECTED),
            (200, r#"{"output_text": "{\"ids\": [\"g0001\"]}"}"#),
        ])
        .await;
        let client = OpenAiClient::new(base, "sk-test").expect("client");
        let request = GenerationRequest::new("m", vec![Message::user("pick")])
            .with_json_response()
            .with_step("filter_primary");

        let response = client.generate(request).await.expect("retried response");
        server.await.expect("server");

        assert_eq!(response.text, r#"{"ids": ["g0001"]}"#);
        let bodies = bodies.lock().expect("lock");
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["text"]["format"]["type"], "json_object");
        assert!(bodies[1].get("text").is_none());
        assert_eq!(bodies[1]["input"][0]["content"], "pick");
    }

    #[tokio::test]
    async fn test_bad_request_without_format_hint_is_returned() {
        let (base, bodies, server) = local_server::spawn(vec![(400, FORMAT_REJECTED)]).await;
        let client = OpenAiClient::new(base, "sk-test").expect("client");
        let request = GenerationRequest::new("m", vec![Message::user("plain")]);

        let err = client.generate(request).await.unwrap_err();
        server.await.expect("server");

        assert!(err.is_bad_request());
        assert_eq!(bodies.lock().expect("lock").len(), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_is_mapped() {
        let (base, _, server) = local_server::spawn(vec![(
            429,
            r#"{"error": {"message": "Too many requests"}}"#,
        )])
        .await;
        let client = OpenAiClient::new(base, "sk-test").expect("client");
        let request = GenerationRequest::new("m", vec![Message::user("q")]).with_json_response();

        let err = client.generate(request).await.unwrap_err();
        server.await.expect("server");
        assert!(matches!(err, LlmError::RateLimited(ref m) if m == "Too many requests"));
    }

    #[tokio::test]
    async fn test_generate_connection_error() {
        let client = OpenAiClient::new("http://localhost:65535", "sk-test").expect("client");
        let request = GenerationRequest::new("m", vec![Message::user("test")]);
        let result = client.generate(request).await;
        assert!(matches!(result, Err(LlmError::RequestFailed(_))));
    }
}
