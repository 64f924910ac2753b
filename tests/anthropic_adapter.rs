//! End-to-end tests for the Anthropic messages adapter: system lifting,
//! required max_tokens, typed streaming events.

use futures::StreamExt;
use serde_json::json;

use llm_conduit::providers::AnthropicProvider;
use llm_conduit::{
    ChatProvider, ChatRequest, Message, ProviderConfig, ProviderKind, StreamChunk,
};

fn provider_for(server: &mockito::Server) -> AnthropicProvider {
    AnthropicProvider::new(
        &ProviderConfig::new(ProviderKind::Anthropic)
            .with_api_key("sk-ant-mock")
            .with_base_url(server.url()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_chat_lifts_system_and_sends_protocol_headers() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_header("x-api-key", "sk-ant-mock")
        .match_header("anthropic-version", "2023-06-01")
        .match_body(mockito::Matcher::PartialJson(json!({
            "model": "claude-sonnet-4",
            "system": "Be terse.",
            "messages": [{"role": "user", "content": "Hi"}],
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": "msg_1",
                "content": [{"type": "text", "text": "Hello!"}],
                "stop_reason": "end_turn",
                "usage": {"input_tokens": 8, "output_tokens": 3}
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let provider = provider_for(&server);
    let request = ChatRequest::new(
        "anthropic:claude-sonnet-4",
        vec![Message::system("Be terse."), Message::user("Hi")],
    );
    let response = provider.chat(&request).await.unwrap();

    assert_eq!(response.content, "Hello!");
    assert_eq!(response.usage.total_tokens, 11);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_max_tokens_always_present_on_the_wire() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/messages")
        .match_body(mockito::Matcher::PartialJson(json!({"max_tokens": 4096})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"content": [{"type": "text", "text": "ok"}]}).to_string())
        .create_async()
        .await;

    let provider = provider_for(&server);
    // No max_tokens in the request; the adapter must supply the default.
    let request = ChatRequest::new("anthropic:claude-sonnet-4", vec![Message::user("Hi")]);
    provider.chat(&request).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_stream_decodes_typed_events() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
            "event: ping\n",
            "data: {\"type\":\"ping\"}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        ))
        .create_async()
        .await;

    let provider = provider_for(&server);
    let request = ChatRequest::new("anthropic:claude-sonnet-4", vec![Message::user("Hi")]);
    let stream = provider.chat_stream(&request).await.unwrap();

    let chunks: Vec<StreamChunk> = stream.map(|r| r.unwrap()).collect().await;
    assert_eq!(
        chunks,
        vec![
            StreamChunk::delta("Hel"),
            StreamChunk::delta("lo"),
            StreamChunk::terminal()
        ]
    );
}

#[tokio::test]
async fn test_stream_truncated_before_stop_synthesizes_terminal() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/messages")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(concat!(
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"partial\"}}\n\n",
        ))
        .create_async()
        .await;

    let provider = provider_for(&server);
    let request = ChatRequest::new("anthropic:claude-sonnet-4", vec![Message::user("Hi")]);
    let stream = provider.chat_stream(&request).await.unwrap();

    let chunks: Vec<StreamChunk> = stream.map(|r| r.unwrap()).collect().await;
    assert_eq!(
        chunks,
        vec![StreamChunk::delta("partial"), StreamChunk::terminal()]
    );
}

#[tokio::test]
async fn test_list_models_carries_display_names() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/v1/models")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "data": [
                    {"id": "claude-sonnet-4-20250514", "display_name": "Claude Sonnet 4"},
                    {"id": "claude-3-5-haiku-20241022", "display_name": "Claude Haiku 3.5"}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let provider = provider_for(&server);
    let models = provider.list_models().await.unwrap();

    assert_eq!(models.len(), 2);
    assert_eq!(models[0].id, "anthropic:claude-sonnet-4-20250514");
    assert_eq!(models[0].display_name, "Claude Sonnet 4");
}
