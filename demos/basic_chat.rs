//! Basic buffered chat against the OpenAI backend.
//!
//! Prerequisites:
//! - Set `OPENAI_API_KEY` (or a keyring entry under service `llm-conduit`)
//!
//! Run:
//!   OPENAI_API_KEY=your_key cargo run --example basic_chat

use llm_conduit::{ChatRequest, Message, ProviderConfig, ProviderKind, ProviderRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    if std::env::var("OPENAI_API_KEY").is_err() {
        eprintln!("Error: OPENAI_API_KEY environment variable is not set.");
        eprintln!("Run with: OPENAI_API_KEY=your_key cargo run --example basic_chat");
        std::process::exit(1);
    }

    let registry = ProviderRegistry::builder()
        .provider(ProviderConfig::new(ProviderKind::OpenAi))
        .build()?;

    let request = ChatRequest::new(
        "openai:gpt-4o-mini",
        vec![
            Message::system("You are a helpful assistant."),
            Message::user("Say hello in one short sentence."),
        ],
    )
    .with_temperature(0.7)
    .with_max_tokens(200);

    let response = registry.chat(&request).await?;

    println!("Response:\n{}", response.content);
    println!(
        "\nUsage: {} prompt + {} completion = {} tokens",
        response.usage.prompt_tokens, response.usage.completion_tokens, response.usage.total_tokens
    );

    Ok(())
}
