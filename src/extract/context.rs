//! What a probe may ask of the rendered page

use serde_json::Value;
use thiserror::Error;

use super::envelope::ElementInfo;

/// Failure inside a single probe. Never leaves the assembler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The page context holds no data for this query
    #[error("not captured: {0}")]
    NotCaptured(String),

    /// The query itself threw inside the page
    #[error("query '{target}' failed: {message}")]
    Query { target: String, message: String },

    /// The page answered with something unusable
    #[error("unexpected shape: {0}")]
    Shape(String),
}

impl ProbeError {
    pub fn query(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Query {
            target: target.into(),
            message: message.into(),
        }
    }
}

/// Read-only view of one rendered document and its globals.
///
/// Every query is independent: an `Err` from one says nothing about the
/// others.
pub trait PageContext {
    /// Text of the first element matching `selector`, `None` if no match
    fn script_text(&self, selector: &str) -> Result<Option<String>, ProbeError>;

    /// All elements matching `selector`, in document order
    fn query_all(&self, selector: &str) -> Result<Vec<ElementInfo>, ProbeError>;

    /// Names of enumerable window properties
    fn global_names(&self) -> Result<Vec<String>, ProbeError>;

    /// JSON value of a window property, `None` if it isn't serializable
    fn global_value(&self, name: &str) -> Result<Option<Value>, ProbeError>;

    /// Raw localStorage entries
    fn storage_entries(&self) -> Result<Vec<(String, String)>, ProbeError>;

    /// Text of inline scripts that look like JSON
    fn inline_scripts(&self) -> Result<Vec<String>, ProbeError>;

    fn url(&self) -> Option<String> {
        None
    }

    fn title(&self) -> Option<String> {
        None
    }
}
