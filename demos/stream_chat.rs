//! Streaming chat: prints deltas as they arrive.
//!
//! Works against any configured backend; defaults to Anthropic. Set
//! `ANTHROPIC_API_KEY` before running.
//!
//! Run:
//!   ANTHROPIC_API_KEY=your_key cargo run --example stream_chat

use std::io::Write;

use futures::StreamExt;

use llm_conduit::{ChatRequest, Message, ProviderConfig, ProviderKind, ProviderRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    if std::env::var("ANTHROPIC_API_KEY").is_err() {
        eprintln!("Error: ANTHROPIC_API_KEY environment variable is not set.");
        eprintln!("Run with: ANTHROPIC_API_KEY=your_key cargo run --example stream_chat");
        std::process::exit(1);
    }

    let registry = ProviderRegistry::builder()
        .provider(ProviderConfig::new(ProviderKind::Anthropic))
        .build()?;

    let request = ChatRequest::new(
        "anthropic:claude-3-5-haiku-20241022",
        vec![Message::user(
            "Write two short sentences about mountain weather.",
        )],
    )
    .with_max_tokens(150);

    let mut stream = registry.chat_stream(&request).await?;
    let mut stdout = std::io::stdout();

    while let Some(item) = stream.next().await {
        let chunk = item?;
        if let Some(text) = &chunk.content {
            print!("{}", text);
            stdout.flush()?;
        }
        if chunk.done {
            break;
        }
    }
    println!();

    Ok(())
}
