//! `colloquy`: serve the chat API or chat from the terminal.

mod chat;
mod config;

use clap::{Parser, Subcommand, ValueEnum};
use colloquy_agent::{build_gateway, ResponseOrchestrator};
use colloquy_gateway::{AuthConfig, GatewayServer};
use colloquy_session::{FileTranscriptJournal, SessionStore};
use config::ColloquyConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "colloquy", about = "Colloquy: session-scoped chat memory over an LLM")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "colloquy.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Chat interactively in the terminal
    Chat {
        /// Session to continue or start
        #[arg(short, long, default_value = "terminal")]
        session: String,
    },
}

fn init_tracing(format: LogFormat, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn build_orchestrator(config: &ColloquyConfig) -> anyhow::Result<Arc<ResponseOrchestrator>> {
    let store = match &config.chat.journal_dir {
        Some(dir) => {
            let journal = Arc::new(FileTranscriptJournal::new(dir.clone()).await?);
            info!(dir = %dir.display(), "Transcript journal enabled");
            SessionStore::restore(journal).await?
        }
        None => SessionStore::new(),
    };

    if config.model.api_key.is_empty() {
        warn!(
            env = config.model.provider.api_key_env(),
            "No API key configured; completion calls will be rejected"
        );
    }
    info!(
        provider = ?config.model.provider,
        model = %config.model.model_id,
        "Completion gateway configured"
    );

    Ok(Arc::new(ResponseOrchestrator::new(
        Arc::new(store),
        build_gateway(&config.model),
        &config.chat.settings,
    )))
}

fn spawn_idle_eviction(orchestrator: &ResponseOrchestrator, config: &ColloquyConfig) {
    let Some(secs) = config.chat.idle_eviction_secs else {
        return;
    };
    if config.chat.journal_dir.is_none() {
        warn!("idle_eviction_secs ignored: eviction without a journal would lose transcripts");
        return;
    }

    let store = orchestrator.store().clone();
    let max_idle = Duration::from_secs(secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(max_idle);
        loop {
            ticker.tick().await;
            store.prune_idle(max_idle);
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // `.env` is optional.
    let _ = dotenvy::dotenv();

    match cli.command {
        Commands::Serve { host, port } => {
            init_tracing(cli.log_format, "info");
            let config = ColloquyConfig::load(&cli.config).await?;
            let host = host.unwrap_or_else(|| config.server.host.clone());
            let port = port.unwrap_or(config.server.port);

            let orchestrator = build_orchestrator(&config).await?;
            spawn_idle_eviction(&orchestrator, &config);

            let auth = AuthConfig::new(config.security.api_keys.clone());
            let app = GatewayServer::build(orchestrator, auth);

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Colloquy listening on {}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = tokio::signal::ctrl_c().await;
                    info!("Shutting down");
                })
                .await?;
        }
        Commands::Chat { session } => {
            init_tracing(cli.log_format, "warn");
            let config = ColloquyConfig::load(&cli.config).await?;
            let orchestrator = build_orchestrator(&config).await?;
            chat::run(orchestrator, session).await?;
        }
    }

    Ok(())
}
