//! Extraction pipeline
//!
//! A rendered page is read exactly once: the [`Assembler`] builds a
//! collector script from its probes' needs, the script runs in the page and
//! returns a [`PageSnapshot`], and the probes then read that snapshot through
//! the [`PageContext`] trait. Each probe either contributes a [`Fragment`],
//! finds nothing, or fails on its own; the resulting [`GameDataEnvelope`]
//! always has every key.

pub mod assembler;
pub mod context;
pub mod envelope;
pub mod json;
pub mod matcher;
pub mod probes;
pub mod snapshot;

use serde::{Deserialize, Serialize};

pub use assembler::Assembler;
pub use context::{PageContext, ProbeError};
pub use envelope::{
    AnalysisMarker, Computed, DomFragments, ElementInfo, Fragment, GameDataEnvelope,
};
pub use matcher::KeywordMatcher;
pub use probes::{NamedSelector, Probe};
pub use snapshot::{CollectPlan, PageSnapshot};

/// What the probes look for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Script element carrying the site's initial state
    pub payload_selector: String,
    pub global_matcher: KeywordMatcher,
    pub move_selector: String,
    pub analysis_selector: String,
    /// Attributes read from analysis elements, first present wins
    pub analysis_attributes: Vec<String>,
    pub custom_selectors: Vec<NamedSelector>,
    pub storage_matcher: KeywordMatcher,
    /// Cap on element text in the custom-selector scan
    pub text_limit: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            payload_selector: "script#__NEXT_DATA__".into(),
            global_matcher: KeywordMatcher::globals(),
            move_selector: "wc-simple-move-list .node, .move-list .node, [data-ply]".into(),
            analysis_selector: "[data-eval], [data-evaluation], [data-score]".into(),
            analysis_attributes: vec![
                "data-eval".into(),
                "data-evaluation".into(),
                "data-score".into(),
            ],
            custom_selectors: vec![
                NamedSelector::new("extensionAttributes", "[data-extension]"),
                NamedSelector::new("extensionIds", "[id*='extension']"),
                NamedSelector::new("helperClasses", "[class*='chess-helper']"),
                NamedSelector::new("engineLines", "[class*='engine-line']"),
                NamedSelector::new("evalBars", "[class*='eval-bar'], [class*='evaluation-bar']"),
                NamedSelector::new("analysisAttributes", "[data-analysis]"),
                NamedSelector::new("boardTags", "[data-board-fen]"),
            ],
            storage_matcher: KeywordMatcher::storage(),
            text_limit: 500,
        }
    }
}
