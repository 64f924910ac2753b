//! Aggregated model catalog across every provider with a credential in the
//! environment.
//!
//! Run:
//!   OPENAI_API_KEY=... ANTHROPIC_API_KEY=... cargo run --example list_models
//!   cargo run --example list_models -- --refresh   # bypass the catalog cache

use llm_conduit::{ProviderConfig, ProviderKind, ProviderRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let force_refresh = std::env::args().any(|a| a == "--refresh");

    let mut builder = ProviderRegistry::builder();
    let mut configured = 0;
    for (env_var, kind) in [
        ("OPENAI_API_KEY", ProviderKind::OpenAi),
        ("ANTHROPIC_API_KEY", ProviderKind::Anthropic),
        ("GEMINI_API_KEY", ProviderKind::Gemini),
    ] {
        if std::env::var(env_var).is_ok() {
            builder = builder.provider(ProviderConfig::new(kind));
            configured += 1;
        }
    }

    if configured == 0 {
        eprintln!("No provider credentials found in the environment.");
        eprintln!("Set OPENAI_API_KEY, ANTHROPIC_API_KEY or GEMINI_API_KEY and retry.");
        std::process::exit(1);
    }

    let registry = builder.build()?;
    let models = registry.models(force_refresh).await?;

    println!("{} models from {} providers:", models.len(), configured);
    for model in &models {
        let capabilities: Vec<String> = model
            .capabilities
            .iter()
            .map(|c| format!("{:?}", c).to_lowercase())
            .collect();
        println!("- {:40} [{}]", model.id, capabilities.join(", "));
    }

    Ok(())
}
