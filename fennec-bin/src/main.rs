use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::warn;

use fennec_config::{ConfigLoader, FennecConfig, ProviderAdapterKind, ProviderConfig};
use fennec_llm::{
    anthropic::AnthropicAdapter, gemini::GeminiAdapter, local::LocalAdapter, mock::MockProvider,
    openai_compat::OpenAiCompatAdapter, ProviderAdapter, ProviderProfile,
};
use fennec_runtime::AgentRuntime;

#[derive(Parser)]
#[command(name = "fennec", about = "🦊 Fennec — always-on autonomous agent runtime")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the agent runtime.
    Start {
        /// Path to fennec.toml (default: ~/.fennec/fennec.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Validate the configuration and exit.
    CheckConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Start { config } => cmd_start(config.as_deref()).await,
        Command::CheckConfig { config } => cmd_check_config(config.as_deref()),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {e}");
        std::process::exit(1);
    }
}

async fn cmd_start(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let loader = ConfigLoader::load(config_path)?;
    let config = loader.get();

    init_tracing(&config)?;

    println!("🦊 Fennec v{}", env!("CARGO_PKG_VERSION"));
    println!("   Providers: {}", config.providers.len());
    println!("   Workers:   {}", config.scheduler.concurrency);
    println!("   Triggers:  {}", config.scheduler.triggers.len());
    println!();

    let mut runtime = AgentRuntime::new(config.clone())?;

    let mut registered = 0u32;
    for provider_config in &config.providers {
        match build_provider(provider_config) {
            Some(provider) => {
                runtime.add_provider(provider);
                registered += 1;
            }
            None => warn!(provider = %provider_config.name, "provider skipped"),
        }
    }

    if registered == 0 {
        eprintln!("⚠️  No LLM providers registered. The agent won't be able to think.");
        eprintln!();
        eprintln!("   Add [[providers]] entries to {} and set the", loader.path().display());
        eprintln!("   matching API keys (ANTHROPIC_API_KEY, GEMINI_API_KEY, XAI_API_KEY),");
        eprintln!("   or configure a local provider.");
        eprintln!();
    }

    let handle = runtime.start()?;

    println!("✅ Runtime started. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;

    println!("\nShutting down…");
    let health = handle.health().await;
    println!(
        "   {} queued, {} running at shutdown",
        health.queue_depth, health.running
    );
    runtime.shutdown().await;
    Ok(())
}

fn cmd_check_config(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let loader = ConfigLoader::load(config_path)?;
    let config = loader.get();

    match config.validate() {
        Ok(warnings) if warnings.is_empty() => {
            println!("✅ {} is valid", loader.path().display());
        }
        Ok(warnings) => {
            println!(
                "✅ {} is valid, {} warning(s):",
                loader.path().display(),
                warnings.len()
            );
            for w in warnings {
                println!("{w}");
            }
        }
        Err(e) => anyhow::bail!(e),
    }
    Ok(())
}

fn init_tracing(config: &FennecConfig) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("fennec={0},fennec_runtime={0},fennec_llm={0},fennec_memory={0},fennec_config={0}", config.logging.level)));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if let Some(ref path) = config.logging.file {
        let file = Arc::new(
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?,
        );
        match config.logging.format.as_str() {
            "json" => builder.json().with_writer(file).init(),
            "compact" => builder.compact().with_writer(file).init(),
            _ => builder.with_ansi(false).with_writer(file).init(),
        }
    } else {
        match config.logging.format.as_str() {
            "json" => builder.json().init(),
            "compact" => builder.compact().init(),
            _ => builder.init(),
        }
    }
    Ok(())
}

/// Build the adapter a provider profile names. Returns None when required
/// credentials or endpoints are missing.
fn build_provider(config: &ProviderConfig) -> Option<Arc<dyn ProviderAdapter>> {
    let profile = ProviderProfile {
        name: config.name.clone(),
        capabilities: config.capabilities.iter().copied().collect(),
        cost_weight: config.cost_weight,
        latency_class: config.latency_class,
    };

    match config.adapter {
        ProviderAdapterKind::Anthropic => {
            let Some(key) = config.api_key.clone() else {
                warn!(provider = %config.name, "no API key (set ANTHROPIC_API_KEY)");
                return None;
            };
            let mut adapter = AnthropicAdapter::new(profile, key, config.model.clone());
            if let Some(ref url) = config.base_url {
                adapter = adapter.with_base_url(url.clone());
            }
            Some(Arc::new(adapter))
        }
        ProviderAdapterKind::Gemini => {
            let Some(key) = config.api_key.clone() else {
                warn!(provider = %config.name, "no API key (set GEMINI_API_KEY)");
                return None;
            };
            let mut adapter = GeminiAdapter::new(profile, key, config.model.clone());
            if let Some(ref url) = config.base_url {
                adapter = adapter.with_base_url(url.clone());
            }
            Some(Arc::new(adapter))
        }
        ProviderAdapterKind::OpenaiCompat => {
            let Some(url) = config.base_url.clone() else {
                warn!(provider = %config.name, "openai_compat needs a base_url");
                return None;
            };
            let key = config.api_key.clone().unwrap_or_default();
            Some(Arc::new(OpenAiCompatAdapter::new(
                profile,
                key,
                url,
                config.model.clone(),
            )))
        }
        ProviderAdapterKind::Local => {
            let url = config
                .base_url
                .clone()
                .unwrap_or_else(|| "http://127.0.0.1:11434".into());
            Some(Arc::new(LocalAdapter::new(
                profile,
                url,
                config.model.clone(),
            )))
        }
        ProviderAdapterKind::Mock => Some(Arc::new(MockProvider::new(
            config.name.clone(),
            config.capabilities.iter().copied(),
        ))),
    }
}
