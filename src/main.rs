//! calwatch: watches chat conversations and keeps a per-conversation list of
//! calendar events up to date.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use secrecy::SecretString;

use calwatch_core::transport::Transport;
use calwatch_engine::{Dispatcher, EngineConfig, ReconciliationEngine};
use calwatch_llm::{ChatCompletionsConfig, ChatCompletionsProvider};
use calwatch_server::{AppState, BroadcastTransport, ServerConfig};
use calwatch_settings::{load_settings, load_settings_from_path, CalwatchSettings};
use calwatch_telemetry::{init_telemetry, TelemetryConfig};

/// Conversation event tracker.
#[derive(Parser, Debug)]
#[command(name = "calwatch", about = "Conversation event tracker")]
struct Cli {
    /// Settings file (defaults to ~/.calwatch/settings.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,
}

fn load(cli: &Cli) -> Result<CalwatchSettings> {
    let mut settings = match &cli.config {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => load_settings().context("Failed to load settings")?,
    };
    if let Some(host) = &cli.host {
        settings.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        settings.server.port = port;
    }
    Ok(settings)
}

fn telemetry_config(settings: &CalwatchSettings) -> Result<TelemetryConfig> {
    let logging = &settings.logging;
    TelemetryConfig::from_parts(
        &logging.level,
        logging.modules.iter().map(|(m, l)| (m.as_str(), l.as_str())),
        logging.json,
    )
    .context("Invalid logging settings")
}

fn api_key() -> Option<SecretString> {
    std::env::var("CALWATCH_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
        .map(SecretString::from)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = load(&cli)?;
    init_telemetry(&telemetry_config(&settings)?).context("Failed to initialize logging")?;

    tracing::info!(
        model = %settings.extraction.model,
        window = settings.window.capacity,
        policy = ?settings.window.policy,
        "Starting calwatch"
    );

    let api_key = api_key();
    if api_key.is_none() {
        tracing::warn!("CALWATCH_API_KEY not set, extraction requests are sent unauthenticated");
    }

    let provider = ChatCompletionsProvider::new(ChatCompletionsConfig {
        base_url: settings.extraction.base_url.clone(),
        model: settings.extraction.model.clone(),
        api_key,
        temperature: settings.extraction.temperature,
        max_tokens: settings.extraction.max_tokens,
    })
    .context("Failed to create extraction provider")?;

    let transport = Arc::new(BroadcastTransport::new(settings.server.outbound_buffer));
    let engine = Arc::new(ReconciliationEngine::new(
        Arc::new(provider),
        Arc::clone(&transport) as Arc<dyn Transport>,
        EngineConfig {
            extraction_timeout: Duration::from_millis(settings.extraction.timeout_ms),
        },
    ));
    let dispatcher = Arc::new(Dispatcher::new(
        engine,
        settings.window.capacity,
        settings.window.policy,
    ));

    let handle = calwatch_server::start(
        ServerConfig {
            host: settings.server.host.clone(),
            port: settings.server.port,
        },
        AppState {
            dispatcher,
            transport,
        },
    )
    .await
    .context("Failed to start server")?;

    tracing::info!(addr = %handle.addr, "calwatch ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl+c")?;

    tracing::info!("Shutting down");
    handle.shutdown().await;
    Ok(())
}
