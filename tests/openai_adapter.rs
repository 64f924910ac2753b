//! End-to-end tests for the OpenAI-compatible adapter against a local mock
//! server: wire bodies, auth headers, streaming chunk sequences, error
//! surfacing.

use futures::StreamExt;
use serde_json::json;

use llm_conduit::providers::OpenAiProvider;
use llm_conduit::{
    ChatProvider, ChatRequest, Error, Message, ProviderConfig, ProviderKind, StreamChunk, Usage,
};

fn provider_for(server: &mockito::Server, api_key: Option<&str>) -> OpenAiProvider {
    let mut config = ProviderConfig::new(ProviderKind::Compatible)
        .with_name("mock")
        .with_base_url(server.url());
    if let Some(key) = api_key {
        config = config.with_api_key(key);
    }
    OpenAiProvider::new(&config).unwrap()
}

#[tokio::test]
async fn test_chat_strips_prefix_and_parses_usage() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_body(mockito::Matcher::PartialJson(json!({
            "model": "gpt-4o-mini",
            "stream": false,
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "choices": [{"message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let provider = provider_for(&server, None);
    let request = ChatRequest::new("mock:gpt-4o-mini", vec![Message::user("Hi")]);
    let response = provider.chat(&request).await.unwrap();

    assert_eq!(response.content, "hello");
    assert_eq!(response.usage, Usage::new(1, 1));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_bearer_header_sent_when_key_configured() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer sk-mock")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"choices": [{"message": {"content": "ok"}}]}).to_string())
        .create_async()
        .await;

    let provider = provider_for(&server, Some("sk-mock"));
    let request = ChatRequest::new("mock:gpt-4o", vec![Message::user("Hi")]);
    provider.chat(&request).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_error_status_surfaces_backend_error_with_body() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_body(r#"{"error": {"message": "rate limited"}}"#)
        .create_async()
        .await;

    let provider = provider_for(&server, None);
    let request = ChatRequest::new("mock:gpt-4o", vec![Message::user("Hi")]);
    let err = provider.chat(&request).await.unwrap_err();

    match err {
        Error::Backend { status, message } => {
            assert_eq!(status, 429);
            assert!(message.contains("rate limited"));
        }
        other => panic!("expected backend error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_stream_yields_deltas_then_single_terminal() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"},\"index\":0}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"A\"},\"index\":0}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"B\"},\"index\":0}]}\n\n",
            "data: [DONE]\n\n",
        ))
        .create_async()
        .await;

    let provider = provider_for(&server, None);
    let request = ChatRequest::new("mock:gpt-4o", vec![Message::user("Hi")]);
    let mut stream = provider.chat_stream(&request).await.unwrap();

    let mut chunks = Vec::new();
    while let Some(item) = stream.next().await {
        chunks.push(item.unwrap());
    }

    assert_eq!(
        chunks,
        vec![
            StreamChunk::delta("A"),
            StreamChunk::delta("B"),
            StreamChunk::terminal()
        ]
    );
    assert_eq!(chunks.iter().filter(|c| c.done).count(), 1);
}

#[tokio::test]
async fn test_stream_survives_malformed_frame() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"keep\"},\"index\":0}]}\n\n",
            "data: {broken json\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\" going\"},\"index\":0}]}\n\n",
            "data: [DONE]\n\n",
        ))
        .create_async()
        .await;

    let provider = provider_for(&server, None);
    let request = ChatRequest::new("mock:gpt-4o", vec![Message::user("Hi")]);
    let stream = provider.chat_stream(&request).await.unwrap();

    let chunks: Vec<StreamChunk> = stream.map(|r| r.unwrap()).collect().await;
    let text: String = chunks.iter().filter_map(|c| c.content.clone()).collect();
    assert_eq!(text, "keep going");
    assert!(chunks.last().unwrap().done);
}

#[tokio::test]
async fn test_stream_without_sentinel_still_terminates() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body("data: {\"choices\":[{\"delta\":{\"content\":\"only\"},\"index\":0}]}\n\n")
        .create_async()
        .await;

    let provider = provider_for(&server, None);
    let request = ChatRequest::new("mock:gpt-4o", vec![Message::user("Hi")]);
    let stream = provider.chat_stream(&request).await.unwrap();

    let chunks: Vec<StreamChunk> = stream.map(|r| r.unwrap()).collect().await;
    assert_eq!(
        chunks,
        vec![StreamChunk::delta("only"), StreamChunk::terminal()]
    );
}

#[tokio::test]
async fn test_stream_error_status_fails_before_first_chunk() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/chat/completions")
        .with_status(500)
        .with_body("upstream exploded")
        .create_async()
        .await;

    let provider = provider_for(&server, None);
    let request = ChatRequest::new("mock:gpt-4o", vec![Message::user("Hi")]);
    let err = provider.chat_stream(&request).await.err().unwrap();
    assert_eq!(err.status(), Some(500));
}

#[tokio::test]
async fn test_list_models_tags_ids() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/models")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "object": "list",
                "data": [
                    {"id": "gpt-4o", "object": "model"},
                    {"id": "gpt-4o-mini", "object": "model"}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let provider = provider_for(&server, None);
    let models = provider.list_models().await.unwrap();

    let ids: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["mock:gpt-4o", "mock:gpt-4o-mini"]);
}
