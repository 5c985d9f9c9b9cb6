// Tests for the OpenAI-compatible HTTP clients against a mock server

use mockito::Matcher;
use serde_json::json;
use std::time::Duration;

use homematch::services::embedding::{EmbeddingError, EmbeddingService, HttpEmbeddingClient};
use homematch::services::llm::{CompletionRequest, HttpLanguageModel, LanguageModel, ModelError};

fn embedding_client(base_url: String, dimensions: usize) -> HttpEmbeddingClient {
    HttpEmbeddingClient::new(
        base_url,
        "test-key".to_string(),
        "text-embedding-3-small".to_string(),
        dimensions,
        Duration::from_secs(5),
    )
    .unwrap()
}

fn language_model(base_url: String) -> HttpLanguageModel {
    HttpLanguageModel::new(
        base_url,
        "test-key".to_string(),
        "gpt-4o-mini".to_string(),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn completion_request() -> CompletionRequest {
    CompletionRequest {
        system: "Rewrite listings.".to_string(),
        context: "- bedrooms: 4".to_string(),
        prompt: "Rewrite the description for this buyer.".to_string(),
        max_tokens: 200,
        temperature: 0.2,
    }
}

#[tokio::test]
async fn test_embedding_request_and_response() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/embeddings")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(json!({
            "model": "text-embedding-3-small",
            "input": "quiet street"
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"data": [{"embedding": [0.1, 0.2, 0.3]}]}).to_string())
        .create_async()
        .await;

    let client = embedding_client(server.url(), 3);
    let vector = client.embed("quiet street").await.unwrap();

    assert_eq!(vector, vec![0.1, 0.2, 0.3]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_embedding_dimension_mismatch() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/embeddings")
        .with_status(200)
        .with_body(json!({"data": [{"embedding": [0.1, 0.2]}]}).to_string())
        .create_async()
        .await;

    let client = embedding_client(server.url(), 3);
    let err = client.embed("anything").await.unwrap_err();
    assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_embedding_server_error() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/embeddings")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let client = embedding_client(server.url(), 3);
    let err = client.embed("anything").await.unwrap_err();
    assert!(matches!(err, EmbeddingError::Unavailable(_)));
}

#[tokio::test]
async fn test_chat_completion_sends_facts_with_prompt() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-4o-mini",
            "max_tokens": 200,
            "messages": [
                {"role": "system", "content": "Rewrite listings."},
                {
                    "role": "user",
                    "content": "## Listing facts\n- bedrooms: 4\n\nRewrite the description for this buyer."
                }
            ]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"choices": [{"message": {"role": "assistant", "content": "A bright home."}}]})
                .to_string(),
        )
        .create_async()
        .await;

    let model = language_model(server.url());
    let text = model.complete(completion_request()).await.unwrap();

    assert_eq!(text, "A bright home.");
    mock.assert_async().await;
}

#[tokio::test]
async fn test_chat_rate_limited() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_body("slow down")
        .create_async()
        .await;

    let model = language_model(server.url());
    let err = model.complete(completion_request()).await.unwrap_err();
    assert!(matches!(err, ModelError::RateLimited));
}

#[tokio::test]
async fn test_chat_without_choices_fails() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_body(json!({"choices": []}).to_string())
        .create_async()
        .await;

    let model = language_model(server.url());
    let err = model.complete(completion_request()).await.unwrap_err();
    assert!(matches!(err, ModelError::RequestFailed(_)));
}
