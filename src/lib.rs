//! # gamegrab
//!
//! Scrape a single chess game page into one JSON envelope.
//!
//! gamegrab loads `{base_url}/{gameId}` in a headless Chrome driven over a
//! hand-written CDP client, waits for the page's own scripts to settle, and
//! reads the page exactly once. Seven independent probes then pick out what
//! they can find: the site's initial-state payload, interesting globals, the
//! move list, evaluation markers, elements left behind by helper extensions,
//! localStorage entries and inline JSON scripts. A probe that finds nothing
//! or fails leaves its slot empty; it never takes the others down with it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use gamegrab::{ChromeRenderer, GameRequest, GameScraper, ScrapeConfig};
//!
//! #[tokio::main]
//! async fn main() -> gamegrab::Result<()> {
//!     let config = Arc::new(ScrapeConfig::default());
//!     let renderer = ChromeRenderer::from_config(&config);
//!     let scraper = GameScraper::new(renderer, config);
//!
//!     let request = GameRequest::for_game("123456789");
//!     let envelope = scraper.scrape(&request).await?;
//!     println!("{} moves", envelope.computed.move_count);
//!     Ok(())
//! }
//! ```
//!
//! ## Serving
//!
//! [`server::router`] wraps a [`GameScraper`] in an axum router answering
//! `GET`/`POST /game?gameId=...` with CORS headers on every response.

pub mod browser;
pub mod cdp;
pub mod config;
pub mod error;
pub mod extract;
pub mod organize;
pub mod page;
pub mod renderer;
pub mod scraper;
pub mod scripts;
pub mod server;

// Re-exports
pub use browser::{Browser, ChromeConfig, ChromePage, ChromeRenderer};
pub use config::{AppConfig, ServerConfig};
pub use error::{Error, Result};
pub use extract::{Assembler, ExtractionConfig, GameDataEnvelope};
pub use organize::{organize, OrganizedGame};
pub use page::Page;
pub use renderer::{RenderOptions, RenderedPage, Renderer};
pub use scraper::{GameRequest, GameScraper};
pub use scripts::{InjectPhase, ScriptCatalog, ScriptTemplate};

/// User agent sent with every page load
pub const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) ",
    "Chrome/124.0.0.0 Safari/537.36 gamegrab/",
    env!("CARGO_PKG_VERSION")
);

/// Configuration for scraping
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Game pages live at `{base_url}/{gameId}`
    pub base_url: String,
    pub user_agent: String,
    /// Upper bound on navigation, network settle included
    pub navigation_timeout_ms: u64,
    /// How long the network must stay quiet to count as settled
    pub network_idle_ms: u64,
    /// Upper bound on each in-page evaluation, injected scripts included
    pub evaluation_timeout_ms: u64,
    /// Settle delay when the request names none
    pub default_wait_ms: u64,
    /// Requested settle delays are clamped to this
    pub max_wait_ms: u64,
    pub chrome: ChromeConfig,
    pub extraction: ExtractionConfig,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.chess.com/game/live".into(),
            user_agent: USER_AGENT.into(),
            navigation_timeout_ms: 30_000,
            network_idle_ms: 500,
            evaluation_timeout_ms: 30_000,
            default_wait_ms: 3_000,
            max_wait_ms: 30_000,
            chrome: ChromeConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

impl ScrapeConfig {
    /// Page URL for a game id
    pub fn game_url(&self, game_id: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), game_id)
    }
}
