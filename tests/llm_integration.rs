//! Integration tests for the OpenAI Responses client.
//!
//! These tests make real API calls.
//! Run with: OPENAI_API_KEY=your_key cargo test --test llm_integration -- --ignored

use search_forge::llm::{
    GenerationRequest, LlmProvider, Message, OpenAiClient, ResponseRecorder, Tool, DEFAULT_MODEL,
};
use search_forge::utils::parse_json_payload;

fn create_test_client() -> OpenAiClient {
    OpenAiClient::from_env()
        .expect("OPENAI_API_KEY environment variable must be set for integration tests")
}

#[tokio::test]
#[ignore] // Run with: cargo test --test llm_integration -- --ignored
async fn test_simple_generation() {
    let client = create_test_client();

    let request = GenerationRequest::new(
        DEFAULT_MODEL,
        vec![
            Message::system("You are a helpful assistant. Reply concisely."),
            Message::user("What is 2 + 2? Reply with just the number."),
        ],
    )
    .with_step("integration_simple");

    let response = client.generate(request).await;
    assert!(response.is_ok(), "Generation failed: {:?}", response.err());

    let response = response.expect("Should have response");
    assert!(
        response.text.contains('4'),
        "Response should contain '4', got: {}",
        response.text
    );
    assert!(!response.raw.is_null(), "Raw payload should be kept");
}

#[tokio::test]
#[ignore]
async fn test_json_mode_returns_parseable_payload() {
    let client = create_test_client();

    let request = GenerationRequest::new(
        DEFAULT_MODEL,
        vec![
            Message::system("You generate diverse web searches."),
            Message::user(
                "Propose 2 web searches for robotics companies in Boston. \
Respond with a JSON object only: {\"searches\": [{\"query\": \"...\"}]}",
            ),
        ],
    )
    .with_json_response()
    .with_step("integration_json");

    let response = client.generate(request).await.expect("Should have response");
    let payload = parse_json_payload(&response.text).expect("Should parse as JSON");
    let searches = payload["searches"].as_array().expect("Should have searches");
    assert!(!searches.is_empty());
}

#[tokio::test]
#[ignore]
async fn test_web_search_is_recorded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = create_test_client().with_recorder(ResponseRecorder::new(dir.path()));

    let request = GenerationRequest::new(
        DEFAULT_MODEL,
        vec![Message::user(
            "Find the official website of the Boston Dynamics company.",
        )],
    )
    .with_tool(Tool::web_search())
    .with_step("web_integration");

    let response = client.generate(request).await.expect("Should have response");
    assert!(!response.text.is_empty());

    let recorded: Vec<_> = std::fs::read_dir(dir.path())
        .expect("read dir")
        .filter_map(Result::ok)
        .collect();
    assert_eq!(recorded.len(), 1, "One raw payload should be written");
}

#[tokio::test]
async fn test_missing_api_key_is_rejected() {
    let result = OpenAiClient::new("https://api.openai.com/v1", "  ");
    assert!(result.is_err());
}
