//! The fixed-shape result of one extraction

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An element as seen by the collector
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementInfo {
    pub tag: String,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
}

impl ElementInfo {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }
}

/// An element carrying an evaluation/analysis attribute
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalysisMarker {
    pub attribute_value: Option<String>,
    pub text: String,
}

/// DOM-derived fragments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DomFragments {
    pub moves: Option<Vec<String>>,
    pub analysis_markers: Option<Vec<AnalysisMarker>>,
    pub custom_selectors: BTreeMap<String, Vec<ElementInfo>>,
}

/// Values derived from the other fragments after all probes ran
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Computed {
    pub url: Option<String>,
    pub title: Option<String>,
    pub move_count: usize,
    pub has_structured_payload: bool,
    pub failed_probes: Vec<String>,
}

/// Aggregate of every probe's fragment.
///
/// Every key is always serialized, empty or `null` when its probe found
/// nothing, so consumers can index into it without guarding each level.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameDataEnvelope {
    pub structured_payload: Option<Value>,
    pub globals: Map<String, Value>,
    pub dom: DomFragments,
    pub local_storage: Option<Map<String, Value>>,
    pub inline_json: Vec<Value>,
    pub computed: Computed,
}

/// Output of a single probe, one variant per envelope slot
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    StructuredPayload(Value),
    Globals(Map<String, Value>),
    Moves(Vec<String>),
    AnalysisMarkers(Vec<AnalysisMarker>),
    CustomSelectors(BTreeMap<String, Vec<ElementInfo>>),
    LocalStorage(Map<String, Value>),
    InlineJson(Vec<Value>),
}

impl GameDataEnvelope {
    /// Store a fragment under its fixed key
    pub fn merge(&mut self, fragment: Fragment) {
        match fragment {
            Fragment::StructuredPayload(v) => self.structured_payload = Some(v),
            Fragment::Globals(m) => self.globals.extend(m),
            Fragment::Moves(m) => self.dom.moves = Some(m),
            Fragment::AnalysisMarkers(m) => self.dom.analysis_markers = Some(m),
            Fragment::CustomSelectors(m) => self.dom.custom_selectors.extend(m),
            Fragment::LocalStorage(m) => self.local_storage = Some(m),
            Fragment::InlineJson(v) => self.inline_json.extend(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_envelope_has_every_key() {
        let value = serde_json::to_value(GameDataEnvelope::default()).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "structuredPayload",
            "globals",
            "dom",
            "localStorage",
            "inlineJson",
            "computed",
        ] {
            assert!(obj.contains_key(key), "missing {}", key);
        }
        assert_eq!(value["structuredPayload"], Value::Null);
        assert_eq!(value["dom"]["moves"], Value::Null);
        assert_eq!(value["dom"]["customSelectors"], json!({}));
        assert_eq!(value["computed"]["failedProbes"], json!([]));
    }

    #[test]
    fn test_merge_places_fragments() {
        let mut env = GameDataEnvelope::default();
        env.merge(Fragment::Moves(vec!["e4".into(), "e5".into()]));
        env.merge(Fragment::StructuredPayload(json!({"game": {"id": "abc"}})));
        env.merge(Fragment::InlineJson(vec![json!([1])]));

        assert_eq!(env.dom.moves.as_deref(), Some(&["e4".to_string(), "e5".to_string()][..]));
        assert_eq!(env.structured_payload, Some(json!({"game": {"id": "abc"}})));
        assert_eq!(env.inline_json, vec![json!([1])]);
    }

    #[test]
    fn test_analysis_marker_wire_names() {
        let marker = AnalysisMarker {
            attribute_value: Some("+0.4".into()),
            text: "0.4".into(),
        };
        assert_eq!(
            serde_json::to_value(marker).unwrap(),
            json!({"attributeValue": "+0.4", "text": "0.4"})
        );
    }
}
