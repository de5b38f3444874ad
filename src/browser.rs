//! Browser Launcher
//!
//! Chrome discovery, launch, and the Chrome-backed [`Renderer`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cdp::transport::launch_chrome;
use crate::cdp::{Connection, Transport};
use crate::error::{Error, Result};
use crate::page::{Page, NETWORK_TRACKER};
use crate::renderer::{RenderOptions, RenderedPage, Renderer};
use crate::ScrapeConfig;

/// Global counter for unique user data directories
static BROWSER_COUNTER: AtomicU64 = AtomicU64::new(0);

/// How Chrome is launched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChromeConfig {
    /// Path to Chrome/Chromium binary (None = search well-known locations)
    pub chrome_path: Option<String>,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Appended after the built-in flags
    pub extra_args: Vec<String>,
}

impl Default for ChromeConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: true,
            viewport_width: 1366,
            viewport_height: 900,
            extra_args: Vec::new(),
        }
    }
}

fn chrome_args(config: &ChromeConfig, user_agent: &str) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--no-first-run".into(),
        "--no-default-browser-check".into(),
        "--no-sandbox".into(),
        "--disable-dev-shm-usage".into(),
        "--disable-gpu".into(),
        "--disable-extensions".into(),
        "--disable-background-networking".into(),
        "--disable-sync".into(),
        "--disable-translate".into(),
        "--disable-popup-blocking".into(),
        "--mute-audio".into(),
        "--password-store=basic".into(),
        "--use-mock-keychain".into(),
        format!(
            "--window-size={},{}",
            config.viewport_width, config.viewport_height
        ),
    ];

    if !user_agent.is_empty() {
        args.push(format!("--user-agent={}", user_agent));
    }

    if config.headless {
        args.push("--headless=new".into());
    }

    args.extend(config.extra_args.iter().cloned());
    args
}

/// Find a Chrome/Chromium binary in well-known locations
pub fn find_chrome() -> Result<PathBuf> {
    let candidates: &[&str] = if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
        ]
    } else if cfg!(target_os = "linux") {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
        ]
    } else {
        &[]
    };

    candidates
        .iter()
        .map(Path::new)
        .find(|path| path.exists())
        .map(Path::to_path_buf)
        .ok_or(Error::ChromeNotFound)
}

/// One Chrome process
pub struct Browser {
    connection: Connection,
    /// User data directory (cleaned up on close)
    user_data_dir: PathBuf,
}

impl Browser {
    /// Launch Chrome with a fixed user agent
    pub async fn launch(config: &ChromeConfig, user_agent: &str) -> Result<Self> {
        let instance_id = BROWSER_COUNTER.fetch_add(1, Ordering::Relaxed);
        let user_data_dir = std::env::temp_dir().join(format!(
            "gamegrab-browser-{}-{}",
            std::process::id(),
            instance_id
        ));

        let _ = std::fs::remove_dir_all(&user_data_dir);
        std::fs::create_dir_all(&user_data_dir)?;

        let chrome_path = match &config.chrome_path {
            Some(p) => PathBuf::from(p),
            None => find_chrome()?,
        };

        let mut args = chrome_args(config, user_agent);
        args.push(format!("--user-data-dir={}", user_data_dir.display()));

        tracing::debug!("Launching Chrome from {:?}", chrome_path);

        // Reading Chrome's stderr and the handshake block
        let transport = tokio::task::spawn_blocking(move || {
            let (child, ws_url) = launch_chrome(&chrome_path, &args)?;
            Transport::new(child, &ws_url)
        })
        .await
        .map_err(|e| Error::Launch(format!("launch task failed: {}", e)))??;

        let connection = Connection::new(transport);
        let browser = Self {
            connection,
            user_data_dir,
        };

        let version = browser.connection.version().await?;
        tracing::debug!("Connected to Chrome: {}", version.product);

        Ok(browser)
    }

    /// Open a blank tab with the network tracker and `init_scripts` installed
    pub async fn new_page(&self, init_scripts: &[String]) -> Result<Page> {
        let target_id = self.connection.create_target("about:blank").await?;
        let session = self.connection.attach_to_target(&target_id).await?;
        session.page_enable().await?;

        let page = Page::new(session);
        page.add_init_script(NETWORK_TRACKER).await?;
        for script in init_scripts {
            page.add_init_script(script).await?;
        }

        Ok(page)
    }

    /// Get the browser version
    pub async fn version(&self) -> Result<String> {
        Ok(self.connection.version().await?.product)
    }

    /// Close the browser
    pub async fn close(self) -> Result<()> {
        self.connection.close().await?;
        let _ = std::fs::remove_dir_all(&self.user_data_dir);
        Ok(())
    }
}

impl Drop for Browser {
    fn drop(&mut self) {
        // The Transport's Drop impl kills the Chrome process
        let _ = std::fs::remove_dir_all(&self.user_data_dir);
    }
}

/// [`Renderer`] that launches a fresh Chrome per session
#[derive(Debug, Clone)]
pub struct ChromeRenderer {
    chrome: ChromeConfig,
    network_idle_ms: u64,
    load_timeout_ms: u64,
}

impl ChromeRenderer {
    pub fn new(chrome: ChromeConfig, network_idle_ms: u64, load_timeout_ms: u64) -> Self {
        Self {
            chrome,
            network_idle_ms,
            load_timeout_ms,
        }
    }

    /// Settle timing taken from the scrape settings
    pub fn from_config(config: &ScrapeConfig) -> Self {
        Self::new(
            config.chrome.clone(),
            config.network_idle_ms,
            config.navigation_timeout_ms,
        )
    }
}

impl Renderer for ChromeRenderer {
    type Page = ChromePage;

    async fn open(&self, options: &RenderOptions) -> Result<ChromePage> {
        let browser = Browser::launch(&self.chrome, &options.user_agent).await?;

        match browser.new_page(&options.init_scripts).await {
            Ok(page) => Ok(ChromePage {
                browser,
                page,
                network_idle_ms: self.network_idle_ms,
                load_timeout_ms: self.load_timeout_ms,
            }),
            Err(e) => {
                if let Err(close_err) = browser.close().await {
                    tracing::warn!("Failed to close Chrome after setup error: {}", close_err);
                }
                Err(e)
            }
        }
    }
}

/// A Chrome process with its single tab
pub struct ChromePage {
    browser: Browser,
    page: Page,
    network_idle_ms: u64,
    load_timeout_ms: u64,
}

impl RenderedPage for ChromePage {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.page
            .goto(url, self.network_idle_ms, self.load_timeout_ms)
            .await
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        self.page.evaluate_value(expression).await
    }

    async fn close(self) -> Result<()> {
        tracing::debug!("Closing tab {} and its browser", self.page.target_id());
        self.browser.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_carry_user_agent_and_headless() {
        let args = chrome_args(&ChromeConfig::default(), "gamegrab-test/1.0");
        assert!(args.contains(&"--user-agent=gamegrab-test/1.0".to_string()));
        assert!(args.contains(&"--headless=new".to_string()));
        assert!(args.contains(&"--window-size=1366,900".to_string()));
    }

    #[test]
    fn test_visible_mode_and_extra_args() {
        let config = ChromeConfig {
            headless: false,
            extra_args: vec!["--lang=en-US".into()],
            ..Default::default()
        };
        let args = chrome_args(&config, "");
        assert!(!args.iter().any(|a| a.starts_with("--headless")));
        assert!(!args.iter().any(|a| a.starts_with("--user-agent")));
        assert_eq!(args.last().map(String::as_str), Some("--lang=en-US"));
    }
}
