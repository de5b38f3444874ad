//! Extraction probes
//!
//! Each probe looks for one category of signal. A probe returns `Ok(None)`
//! when the page simply doesn't carry its signal and `Err` when a query it
//! depends on failed; either way the other probes are unaffected.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Map;

use super::context::{PageContext, ProbeError};
use super::envelope::{AnalysisMarker, Fragment};
use super::json::{looks_like_json, parse_or_string, truncate_chars, try_parse};
use super::matcher::KeywordMatcher;
use super::snapshot::CollectPlan;

/// One fault-isolated extraction strategy
pub trait Probe: Send + Sync {
    fn name(&self) -> &'static str;

    /// Declare the queries this probe needs answered
    fn plan(&self, plan: &mut CollectPlan);

    fn run(&self, ctx: &dyn PageContext) -> Result<Option<Fragment>, ProbeError>;
}

/// A keyed selector for the custom-selector scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedSelector {
    pub key: String,
    pub selector: String,
}

impl NamedSelector {
    pub fn new(key: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            selector: selector.into(),
        }
    }
}

// =========================================================================
// Structured payload
// =========================================================================

/// The site's serialized initial state
pub struct StructuredPayload {
    pub selector: String,
}

impl Probe for StructuredPayload {
    fn name(&self) -> &'static str {
        "structured-payload"
    }

    fn plan(&self, plan: &mut CollectPlan) {
        plan.scripts.insert(self.selector.clone());
    }

    fn run(&self, ctx: &dyn PageContext) -> Result<Option<Fragment>, ProbeError> {
        let Some(text) = ctx.script_text(&self.selector)? else {
            tracing::debug!("No element matches {}", self.selector);
            return Ok(None);
        };
        match try_parse(&text) {
            Some(payload) => Ok(Some(Fragment::StructuredPayload(payload))),
            None => {
                tracing::debug!("{} does not hold valid JSON", self.selector);
                Ok(None)
            }
        }
    }
}

// =========================================================================
// Global scan
// =========================================================================

/// Window globals whose names pass a [`KeywordMatcher`]
pub struct GlobalScan {
    pub matcher: KeywordMatcher,
}

impl Probe for GlobalScan {
    fn name(&self) -> &'static str {
        "global-scan"
    }

    fn plan(&self, plan: &mut CollectPlan) {
        plan.globals = Some(self.matcher.clone());
    }

    fn run(&self, ctx: &dyn PageContext) -> Result<Option<Fragment>, ProbeError> {
        let mut found = Map::new();
        for name in ctx.global_names()? {
            if !self.matcher.matches(&name) {
                continue;
            }
            match ctx.global_value(&name) {
                Ok(Some(value)) => {
                    found.insert(name, value);
                }
                Ok(None) => {}
                Err(e) => tracing::debug!("Skipping global {}: {}", name, e),
            }
        }
        Ok(Some(Fragment::Globals(found)))
    }
}

// =========================================================================
// DOM move list
// =========================================================================

/// Move text tokens in document order
pub struct MoveList {
    pub selector: String,
}

impl Probe for MoveList {
    fn name(&self) -> &'static str {
        "move-list"
    }

    fn plan(&self, plan: &mut CollectPlan) {
        plan.elements.insert(self.selector.clone());
    }

    fn run(&self, ctx: &dyn PageContext) -> Result<Option<Fragment>, ProbeError> {
        let moves: Vec<String> = ctx
            .query_all(&self.selector)?
            .into_iter()
            .map(|el| el.text.trim().to_string())
            .filter(|text| !text.is_empty())
            .collect();

        if moves.is_empty() {
            return Ok(None);
        }
        Ok(Some(Fragment::Moves(moves)))
    }
}

// =========================================================================
// DOM analysis markers
// =========================================================================

/// Elements carrying evaluation/analysis attributes
pub struct AnalysisMarkers {
    pub selector: String,
    /// Checked in order, the first present one is reported
    pub attributes: Vec<String>,
}

impl Probe for AnalysisMarkers {
    fn name(&self) -> &'static str {
        "analysis-markers"
    }

    fn plan(&self, plan: &mut CollectPlan) {
        plan.elements.insert(self.selector.clone());
    }

    fn run(&self, ctx: &dyn PageContext) -> Result<Option<Fragment>, ProbeError> {
        let markers: Vec<AnalysisMarker> = ctx
            .query_all(&self.selector)?
            .into_iter()
            .map(|el| AnalysisMarker {
                attribute_value: self
                    .attributes
                    .iter()
                    .find_map(|attr| el.attribute(attr))
                    .map(String::from),
                text: el.text,
            })
            .collect();

        if markers.is_empty() {
            return Ok(None);
        }
        Ok(Some(Fragment::AnalysisMarkers(markers)))
    }
}

// =========================================================================
// Custom selectors
// =========================================================================

/// Elements matching extension-pattern selectors
pub struct CustomSelectors {
    pub selectors: Vec<NamedSelector>,
    pub text_limit: usize,
}

impl Probe for CustomSelectors {
    fn name(&self) -> &'static str {
        "custom-selectors"
    }

    fn plan(&self, plan: &mut CollectPlan) {
        plan.elements
            .extend(self.selectors.iter().map(|s| s.selector.clone()));
    }

    fn run(&self, ctx: &dyn PageContext) -> Result<Option<Fragment>, ProbeError> {
        let mut found = BTreeMap::new();
        for named in &self.selectors {
            let elements = match ctx.query_all(&named.selector) {
                Ok(elements) => elements,
                Err(e) => {
                    tracing::debug!("Skipping selector {}: {}", named.key, e);
                    continue;
                }
            };
            if elements.is_empty() {
                continue;
            }
            let elements = elements
                .into_iter()
                .map(|mut el| {
                    el.text = truncate_chars(&el.text, self.text_limit);
                    el
                })
                .collect();
            found.insert(named.key.clone(), elements);
        }
        Ok(Some(Fragment::CustomSelectors(found)))
    }
}

// =========================================================================
// Persisted storage
// =========================================================================

/// localStorage entries whose keys pass a [`KeywordMatcher`]
pub struct LocalStorage {
    pub matcher: KeywordMatcher,
}

impl Probe for LocalStorage {
    fn name(&self) -> &'static str {
        "local-storage"
    }

    fn plan(&self, plan: &mut CollectPlan) {
        plan.storage = true;
    }

    fn run(&self, ctx: &dyn PageContext) -> Result<Option<Fragment>, ProbeError> {
        let entries = ctx
            .storage_entries()?
            .into_iter()
            .filter(|(key, _)| self.matcher.matches(key))
            .map(|(key, raw)| (key, parse_or_string(&raw)))
            .collect();
        Ok(Some(Fragment::LocalStorage(entries)))
    }
}

// =========================================================================
// Inline script JSON
// =========================================================================

/// Inline scripts whose whole body is JSON
pub struct InlineJson;

impl Probe for InlineJson {
    fn name(&self) -> &'static str {
        "inline-json"
    }

    fn plan(&self, plan: &mut CollectPlan) {
        plan.inline_scripts = true;
    }

    fn run(&self, ctx: &dyn PageContext) -> Result<Option<Fragment>, ProbeError> {
        let values = ctx
            .inline_scripts()?
            .iter()
            .filter(|text| looks_like_json(text))
            .filter_map(|text| try_parse(text))
            .collect();
        Ok(Some(Fragment::InlineJson(values)))
    }
}
