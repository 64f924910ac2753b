//! End-to-end tests for the hub provider against a local mock server:
//! token exchange, deployment resolution and caching, per-engine dispatch,
//! streaming downgrade.

use futures::StreamExt;
use serde_json::{json, Value};

use llm_conduit::hub::HubProvider;
use llm_conduit::types::EngineKind;
use llm_conduit::{
    ChatProvider, ChatRequest, Error, HubAuthConfig, Message, ProviderConfig, ProviderKind,
    StreamChunk,
};

fn hub_config(server: &mockito::Server) -> ProviderConfig {
    ProviderConfig::new(ProviderKind::Hub)
        .with_name("hub")
        .with_base_url(format!("{}/v2/lm", server.url()))
        .with_hub(HubAuthConfig {
            auth_url: server.url(),
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
            resource_group: "team-a".to_string(),
        })
}

fn deployment_entry(server_url: &str, id: &str, executable: &str, model: &str) -> Value {
    json!({
        "id": id,
        "deploymentUrl": format!("{}/v2/inference/deployments/{}", server_url, id),
        "status": "RUNNING",
        "executableId": executable,
        "details": {"resources": {"backend_details": {"model": {"name": model, "version": "latest"}}}}
    })
}

async fn mock_token(server: &mut mockito::Server) -> mockito::Mock {
    server
        .mock("POST", "/oauth/token")
        .match_body(mockito::Matcher::AllOf(vec![
            mockito::Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()),
            mockito::Matcher::UrlEncoded("client_id".into(), "client-1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"tok-1","expires_in":3600}"#)
        .create_async()
        .await
}

async fn mock_listing(server: &mut mockito::Server, deployments: Value) {
    server
        .mock("GET", "/v2/lm/deployments")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "resources": deployments }).to_string())
        .create_async()
        .await;
    server
        .mock("GET", "/v2/lm/configurations")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"resources": []}).to_string())
        .create_async()
        .await;
}

#[tokio::test]
async fn test_chat_dispatches_to_chat_completions_engine() {
    let mut server = mockito::Server::new_async().await;
    let url = server.url();
    mock_token(&mut server).await;
    mock_listing(
        &mut server,
        json!([deployment_entry(&url, "d1", "azure-openai", "gpt-4o")]),
    )
    .await;

    let engine = server
        .mock("POST", "/v2/inference/deployments/d1/chat/completions")
        .match_query(mockito::Matcher::UrlEncoded(
            "api-version".into(),
            "2024-06-01".into(),
        ))
        .match_header("authorization", "Bearer tok-1")
        .match_header("ai-resource-group", "team-a")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"choices": [{"message": {"content": "via azure"}}]}).to_string())
        .expect(1)
        .create_async()
        .await;

    let provider = HubProvider::new(&hub_config(&server)).unwrap();
    let request = ChatRequest::new("hub:gpt-4o", vec![Message::user("Hi")]);
    let response = provider.chat(&request).await.unwrap();

    assert_eq!(response.content, "via azure");
    engine.assert_async().await;
}

#[tokio::test]
async fn test_unmatched_model_fails_resolution_naming_it() {
    let mut server = mockito::Server::new_async().await;
    let url = server.url();
    mock_token(&mut server).await;
    mock_listing(
        &mut server,
        json!([deployment_entry(&url, "d1", "azure-openai", "gpt-4o")]),
    )
    .await;

    let provider = HubProvider::new(&hub_config(&server)).unwrap();
    let request = ChatRequest::new("hub:ghost-model", vec![Message::user("Hi")]);
    let err = provider.chat(&request).await.unwrap_err();

    assert!(matches!(err, Error::Resolution { .. }));
    assert!(err.to_string().contains("ghost-model"));
}

#[tokio::test]
async fn test_second_chat_reuses_cached_token_and_resolution() {
    let mut server = mockito::Server::new_async().await;
    let url = server.url();

    let token = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token":"tok-1","expires_in":3600}"#)
        .expect(1)
        .create_async()
        .await;
    let listing = server
        .mock("GET", "/v2/lm/deployments")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"resources": [deployment_entry(&url, "d1", "azure-openai", "gpt-4o")]})
                .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let configurations = server
        .mock("GET", "/v2/lm/configurations")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"resources": []}).to_string())
        .expect(1)
        .create_async()
        .await;
    let engine = server
        .mock("POST", "/v2/inference/deployments/d1/chat/completions")
        .match_query(mockito::Matcher::Any)
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({"choices": [{"message": {"content": "ok"}}]}).to_string())
        .expect(2)
        .create_async()
        .await;

    let provider = HubProvider::new(&hub_config(&server)).unwrap();
    let request = ChatRequest::new("hub:gpt-4o", vec![Message::user("Hi")]);
    provider.chat(&request).await.unwrap();
    provider.chat(&request).await.unwrap();

    token.assert_async().await;
    listing.assert_async().await;
    configurations.assert_async().await;
    engine.assert_async().await;
}

#[tokio::test]
async fn test_stream_failure_downgrades_to_buffered_call_once() {
    let mut server = mockito::Server::new_async().await;
    let url = server.url();
    mock_token(&mut server).await;
    mock_listing(
        &mut server,
        json!([deployment_entry(&url, "d1", "azure-openai", "gpt-4o")]),
    )
    .await;

    let streaming = server
        .mock("POST", "/v2/inference/deployments/d1/chat/completions")
        .match_query(mockito::Matcher::Any)
        .match_body(mockito::Matcher::PartialJson(json!({"stream": true})))
        .with_status(503)
        .with_body("engine draining")
        .expect(1)
        .create_async()
        .await;
    let buffered = server
        .mock("POST", "/v2/inference/deployments/d1/chat/completions")
        .match_query(mockito::Matcher::Any)
        .match_body(mockito::Matcher::PartialJson(json!({"stream": false})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({"choices": [{"message": {"content": "downgraded answer"}}]}).to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let provider = HubProvider::new(&hub_config(&server)).unwrap();
    let request = ChatRequest::new("hub:gpt-4o", vec![Message::user("Hi")]);
    let stream = provider.chat_stream(&request).await.unwrap();

    let chunks: Vec<StreamChunk> = stream.map(|r| r.unwrap()).collect().await;
    assert_eq!(
        chunks,
        vec![
            StreamChunk::delta("downgraded answer"),
            StreamChunk::terminal()
        ]
    );
    streaming.assert_async().await;
    buffered.assert_async().await;
}

#[tokio::test]
async fn test_bedrock_deployment_routes_to_invoke() {
    let mut server = mockito::Server::new_async().await;
    let url = server.url();
    mock_token(&mut server).await;
    mock_listing(
        &mut server,
        json!([deployment_entry(
            &url,
            "d2",
            "aws-bedrock",
            "anthropic--claude-3-sonnet"
        )]),
    )
    .await;

    let engine = server
        .mock("POST", "/v2/inference/deployments/d2/invoke")
        .match_body(mockito::Matcher::PartialJson(
            json!({"anthropic_version": "bedrock-2023-05-31"}),
        ))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "content": [{"type": "text", "text": "via bedrock"}],
                "usage": {"input_tokens": 1, "output_tokens": 1}
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let provider = HubProvider::new(&hub_config(&server)).unwrap();
    let request = ChatRequest::new("hub:claude-3", vec![Message::user("Hi")]);
    let response = provider.chat(&request).await.unwrap();

    assert_eq!(response.content, "via bedrock");
    engine.assert_async().await;
}

#[tokio::test]
async fn test_unknown_executable_routes_to_converse() {
    let mut server = mockito::Server::new_async().await;
    let url = server.url();
    mock_token(&mut server).await;
    mock_listing(
        &mut server,
        json!([deployment_entry(&url, "d3", "custom-serving", "mistral-large")]),
    )
    .await;

    let engine = server
        .mock("POST", "/v2/inference/deployments/d3/converse")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "output": {"message": {"content": [{"text": "via converse"}]}},
                "usage": {"inputTokens": 2, "outputTokens": 3, "totalTokens": 5}
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;

    let provider = HubProvider::new(&hub_config(&server)).unwrap();
    let request = ChatRequest::new("hub:mistral-large", vec![Message::user("Hi")]);
    let response = provider.chat(&request).await.unwrap();

    assert_eq!(response.content, "via converse");
    assert_eq!(response.usage.total_tokens, 5);
    engine.assert_async().await;
}

#[tokio::test]
async fn test_list_models_carries_deployment_metadata() {
    let mut server = mockito::Server::new_async().await;
    let url = server.url();
    mock_token(&mut server).await;
    mock_listing(
        &mut server,
        json!([
            deployment_entry(&url, "d1", "azure-openai", "gpt-4o"),
            deployment_entry(&url, "d2", "aws-bedrock", "anthropic--claude-3-sonnet"),
        ]),
    )
    .await;

    let provider = HubProvider::new(&hub_config(&server)).unwrap();
    let models = provider.list_models().await.unwrap();

    assert_eq!(models.len(), 2);
    assert_eq!(models[0].id, "hub:gpt-4o");
    assert_eq!(models[0].deployment_id.as_deref(), Some("d1"));
    assert_eq!(models[0].engine, Some(EngineKind::AzureOpenAi));
    assert_eq!(models[0].status.as_deref(), Some("RUNNING"));
    assert_eq!(models[1].engine, Some(EngineKind::AwsBedrock));
}
