//! Runs every probe against one page snapshot and merges the fragments

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde_json::Value;

use super::context::PageContext;
use super::envelope::{Computed, GameDataEnvelope};
use super::probes::{
    AnalysisMarkers, CustomSelectors, GlobalScan, InlineJson, LocalStorage, MoveList, Probe,
    StructuredPayload,
};
use super::snapshot::{CollectPlan, PageSnapshot};
use super::ExtractionConfig;
use crate::error::Result;

/// Ordered set of probes sharing one collector script
pub struct Assembler {
    probes: Vec<Box<dyn Probe>>,
    text_limit: usize,
}

impl Assembler {
    /// The standard probes, in their documented order
    pub fn new(config: &ExtractionConfig) -> Self {
        let probes: Vec<Box<dyn Probe>> = vec![
            Box::new(StructuredPayload {
                selector: config.payload_selector.clone(),
            }),
            Box::new(GlobalScan {
                matcher: config.global_matcher.clone(),
            }),
            Box::new(MoveList {
                selector: config.move_selector.clone(),
            }),
            Box::new(AnalysisMarkers {
                selector: config.analysis_selector.clone(),
                attributes: config.analysis_attributes.clone(),
            }),
            Box::new(CustomSelectors {
                selectors: config.custom_selectors.clone(),
                text_limit: config.text_limit,
            }),
            Box::new(LocalStorage {
                matcher: config.storage_matcher.clone(),
            }),
            Box::new(InlineJson),
        ];
        Self::with_probes(probes, config.text_limit)
    }

    pub fn with_probes(probes: Vec<Box<dyn Probe>>, text_limit: usize) -> Self {
        Self { probes, text_limit }
    }

    pub fn probe_names(&self) -> Vec<&'static str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    /// Union of every probe's queries
    pub fn plan(&self) -> CollectPlan {
        let mut plan = CollectPlan::new(self.text_limit);
        for probe in &self.probes {
            probe.plan(&mut plan);
        }
        plan
    }

    /// The single expression to evaluate in the page
    pub fn collector_script(&self) -> Result<String> {
        self.plan().script()
    }

    /// Decode a collector result and assemble it
    pub fn assemble_value(&self, raw: Value) -> GameDataEnvelope {
        self.assemble(&PageSnapshot::from_value(raw))
    }

    /// Run every probe; never fails
    pub fn assemble(&self, ctx: &dyn PageContext) -> GameDataEnvelope {
        let mut envelope = GameDataEnvelope::default();
        let mut failed = Vec::new();

        for probe in &self.probes {
            match catch_unwind(AssertUnwindSafe(|| probe.run(ctx))) {
                Ok(Ok(Some(fragment))) => envelope.merge(fragment),
                Ok(Ok(None)) => tracing::debug!("Probe {} found nothing", probe.name()),
                Ok(Err(e)) => {
                    tracing::warn!("Probe {} failed: {}", probe.name(), e);
                    failed.push(probe.name().to_string());
                }
                Err(_) => {
                    tracing::warn!("Probe {} panicked", probe.name());
                    failed.push(probe.name().to_string());
                }
            }
        }

        envelope.computed = Computed {
            url: ctx.url(),
            title: ctx.title(),
            move_count: envelope.dom.moves.as_ref().map_or(0, Vec::len),
            has_structured_payload: envelope.structured_payload.is_some(),
            failed_probes: failed,
        };
        envelope
    }
}
