//! gamegrab command line
//!
//! `serve` runs the HTTP endpoint, `scrape` fetches one game and prints the
//! JSON envelope.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gamegrab::server::{self, AppState};
use gamegrab::{organize, AppConfig, ChromeRenderer, Error, GameRequest, GameScraper};

#[derive(Parser)]
#[command(name = "gamegrab")]
#[command(version, about = "Scrape chess game pages into JSON", long_about = None)]
struct Cli {
    /// Config file (default: ./gamegrab.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Scrape one game and print the result
    Scrape {
        /// Game id appended to the base URL
        game_id: String,

        /// Settle delay in milliseconds
        #[arg(short, long)]
        wait: Option<u64>,

        /// Catalog script to run
        #[arg(short, long)]
        script: Option<String>,

        /// File with JavaScript to evaluate in the page
        #[arg(long, value_name = "FILE")]
        custom_script: Option<PathBuf>,

        /// Print the organized view instead of the raw envelope
        #[arg(long)]
        organize: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gamegrab=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Serve { host, port } => run_server(config, host, port).await,
        Commands::Scrape {
            game_id,
            wait,
            script,
            custom_script,
            organize,
        } => {
            let custom_script = match custom_script {
                Some(path) => Some(
                    std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?,
                ),
                None => None,
            };
            let request = GameRequest {
                game_id: Some(game_id),
                custom_script,
                script,
                wait_time: wait,
                organize,
            };
            run_scrape(config, request).await
        }
    }
}

/// Run the API server
async fn run_server(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(h) = host {
        config.server.host = h;
    }
    if let Some(p) = port {
        config.server.port = p;
    }

    tracing::info!("Configuration loaded");
    tracing::info!("Scraping {}/<gameId>", config.scrape.base_url);

    let scrape = Arc::new(config.scrape);
    let renderer = ChromeRenderer::from_config(&scrape);
    let scraper = GameScraper::new(renderer, scrape);
    let state = Arc::new(AppState::new(scraper, &config.server));
    let app = server::router(state);

    let addr = SocketAddr::new(config.server.host.parse()?, config.server.port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// One-shot scrape to stdout
async fn run_scrape(config: AppConfig, request: GameRequest) -> anyhow::Result<()> {
    let scrape = Arc::new(config.scrape);
    let renderer = ChromeRenderer::from_config(&scrape);
    let scraper = GameScraper::new(renderer, scrape);

    let envelope = match scraper.scrape(&request).await {
        Ok(envelope) => envelope,
        Err(e @ Error::UnknownScript(_)) => {
            let available: Vec<&str> = scraper.catalog().names().collect();
            anyhow::bail!("{} (available: {})", e, available.join(", "));
        }
        Err(e) => return Err(e.into()),
    };

    let output = if request.organize {
        serde_json::to_string_pretty(&organize(&envelope))?
    } else {
        serde_json::to_string_pretty(&envelope)?
    };
    println!("{}", output);
    Ok(())
}
