//! Page Abstraction
//!
//! Navigation with settle detection, and JavaScript evaluation.

use std::time::{Duration, Instant};

use serde_json::Value;

use crate::cdp::Session;
use crate::error::{Error, Result};

/// Counts in-flight fetch/XHR requests in `window.__gamegrab_pending`.
/// Installed before navigation so the page's own first requests are counted.
pub const NETWORK_TRACKER: &str = r#"
(function () {
    if (window.__gamegrab_pending !== undefined) return;
    Object.defineProperty(window, '__gamegrab_pending', {
        value: 0, writable: true, enumerable: false, configurable: true
    });

    const originalFetch = window.fetch;
    window.fetch = function (...args) {
        window.__gamegrab_pending++;
        return originalFetch.apply(this, args).finally(() => {
            window.__gamegrab_pending--;
        });
    };

    const originalSend = XMLHttpRequest.prototype.send;
    XMLHttpRequest.prototype.send = function (...args) {
        window.__gamegrab_pending++;
        this.addEventListener('loadend', () => {
            window.__gamegrab_pending--;
        });
        return originalSend.apply(this, args);
    };
})();
"#;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A browser page
pub struct Page {
    session: Session,
}

impl Page {
    /// Create a new Page wrapping a CDP session
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    /// Target id of the underlying tab
    pub fn target_id(&self) -> &str {
        self.session.target_id()
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Navigate and wait until the document is complete and the network has
    /// been idle for `idle_ms`
    pub async fn goto(&self, url: &str, idle_ms: u64, timeout_ms: u64) -> Result<()> {
        let start = Instant::now();

        let result = self.session.navigate(url).await?;
        if let Some(error) = result.error_text {
            return Err(Error::Navigation(format!("{}: {}", url, error)));
        }

        // Give the new document a moment to replace the old one
        tokio::time::sleep(Duration::from_millis(100)).await;

        self.wait_for_navigation_timeout(timeout_ms).await?;

        let remaining = timeout_ms.saturating_sub(start.elapsed().as_millis() as u64);
        self.wait_for_network_idle(idle_ms, remaining).await
    }

    /// Poll document.readyState until "complete"
    pub async fn wait_for_navigation_timeout(&self, timeout_ms: u64) -> Result<()> {
        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);

        loop {
            // readyState is unavailable mid-navigation; keep waiting
            if let Ok(result) = self.session.evaluate("document.readyState").await {
                if result.result.value.as_ref().and_then(Value::as_str) == Some("complete") {
                    return Ok(());
                }
            }

            if start.elapsed() > timeout {
                return Err(Error::Timeout(format!(
                    "Navigation did not complete within {}ms",
                    timeout_ms
                )));
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Wait until no fetch/XHR has been in flight for `idle_time_ms`
    pub async fn wait_for_network_idle(&self, idle_time_ms: u64, timeout_ms: u64) -> Result<()> {
        let start = Instant::now();
        let timeout = Duration::from_millis(timeout_ms);
        let idle_duration = Duration::from_millis(idle_time_ms);
        let mut idle_start: Option<Instant> = None;

        loop {
            let pending: i64 = self
                .evaluate("window.__gamegrab_pending || 0")
                .await
                .unwrap_or(0);

            if pending <= 0 {
                match idle_start {
                    Some(since) if since.elapsed() >= idle_duration => return Ok(()),
                    None => idle_start = Some(Instant::now()),
                    _ => {}
                }
            } else {
                idle_start = None;
            }

            if start.elapsed() > timeout {
                return Err(Error::Timeout(format!(
                    "Network did not become idle within {}ms (pending: {})",
                    timeout_ms, pending
                )));
            }

            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    // =========================================================================
    // JavaScript Evaluation
    // =========================================================================

    /// Evaluate JavaScript and return its value; `undefined` becomes `null`
    pub async fn evaluate_value(&self, expression: &str) -> Result<Value> {
        let result = self.session.evaluate(expression).await?;

        if let Some(exception) = result.exception_details {
            return Err(Error::JavaScript(exception.message()));
        }

        Ok(result.result.value.unwrap_or(Value::Null))
    }

    /// Evaluate JavaScript and deserialize the result
    pub async fn evaluate<T: serde::de::DeserializeOwned>(&self, expression: &str) -> Result<T> {
        let value = self.evaluate_value(expression).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Install a script that runs before page scripts on every new document
    pub async fn add_init_script(&self, source: &str) -> Result<()> {
        self.session
            .add_script_to_evaluate_on_new_document(source)
            .await?;
        Ok(())
    }
}
