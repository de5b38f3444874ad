//! Rendering seam
//!
//! The request handler only needs three things from a browser: load a URL
//! until the network settles, evaluate an expression and get JSON back, and
//! let go of everything afterwards. [`Renderer`] hands out fresh
//! [`RenderedPage`]s; the Chrome-backed implementation lives in
//! [`crate::browser`].

use std::future::Future;

use serde_json::Value;

use crate::error::Result;

/// Per-session options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOptions {
    /// User agent every request of the session carries
    pub user_agent: String,
    /// Scripts installed before any page script runs
    pub init_scripts: Vec<String>,
}

/// Acquires rendering sessions
pub trait Renderer: Send + Sync {
    type Page: RenderedPage;

    /// Start a fresh session. The caller owns it and must `close` it.
    fn open(&self, options: &RenderOptions) -> impl Future<Output = Result<Self::Page>> + Send;
}

/// One live page
pub trait RenderedPage: Send {
    /// Load `url` and wait for the network to settle
    fn navigate(&mut self, url: &str) -> impl Future<Output = Result<()>> + Send;

    /// Evaluate `expression` in the page; `undefined` comes back as `null`.
    /// A thrown exception is an [`Error::JavaScript`](crate::Error::JavaScript).
    fn evaluate(&mut self, expression: &str) -> impl Future<Output = Result<Value>> + Send;

    /// Release the page and everything behind it
    fn close(self) -> impl Future<Output = Result<()>> + Send;
}
