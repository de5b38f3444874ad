//! Single-evaluation page snapshot
//!
//! Probes declare what they need in a [`CollectPlan`]. The plan is embedded
//! into one collector script which runs every query inside the page in a
//! single `Runtime.evaluate`, capturing each result as `{"ok": ..}` or
//! `{"error": ".."}`. The returned JSON decodes into a [`PageSnapshot`],
//! which answers the probes' queries afterwards.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::context::{PageContext, ProbeError};
use super::envelope::ElementInfo;
use super::matcher::KeywordMatcher;
use crate::error::Result;

/// Union of the queries the probes want answered
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectPlan {
    /// Selectors whose first match's text is wanted
    pub scripts: BTreeSet<String>,
    /// Selectors whose matches are wanted as [`ElementInfo`]
    pub elements: BTreeSet<String>,
    /// Window globals to serialize
    pub globals: Option<KeywordMatcher>,
    pub storage: bool,
    pub inline_scripts: bool,
    /// Cap on element text, in UTF-16 units inside the page
    pub text_limit: usize,
}

impl CollectPlan {
    pub fn new(text_limit: usize) -> Self {
        Self {
            text_limit,
            ..Default::default()
        }
    }

    /// Build the collector expression for this plan
    pub fn script(&self) -> Result<String> {
        let plan = serde_json::to_string(self)?;
        Ok(format!("({})({})", COLLECTOR_FN, plan))
    }
}

/// Runs in the page. Every query is individually guarded.
const COLLECTOR_FN: &str = r#"function (plan) {
    const capture = (fn) => {
        try {
            return { ok: fn() };
        } catch (e) {
            return { error: String((e && e.message) || e) };
        }
    };
    const clip = (s) => {
        s = (s || '').trim();
        if (s.length <= plan.textLimit) return s;
        let end = plan.textLimit;
        // Never split a surrogate pair
        const last = s.charCodeAt(end - 1);
        if (last >= 0xD800 && last <= 0xDBFF) end -= 1;
        return s.slice(0, end);
    };
    const describe = (el) => {
        const attributes = {};
        for (const attr of Array.from(el.attributes || [])) {
            attributes[attr.name] = attr.value;
        }
        return {
            tag: (el.tagName || '').toLowerCase(),
            id: el.id || null,
            classes: Array.from(el.classList || []),
            attributes,
            text: clip(el.textContent)
        };
    };
    const matches = (m, name) => {
        if (m.exclude_prefixes.some(p => name.startsWith(p))) return false;
        const lower = name.toLowerCase();
        return m.keywords.some(k => lower.includes(k.toLowerCase()))
            || m.prefixes.some(p => name.startsWith(p));
    };

    const out = { scripts: {}, elements: {} };
    try { out.url = String(location.href); } catch (e) {}
    try { out.title = String(document.title); } catch (e) {}

    for (const sel of plan.scripts) {
        out.scripts[sel] = capture(() => {
            const el = document.querySelector(sel);
            return el ? el.textContent : null;
        });
    }

    for (const sel of plan.elements) {
        out.elements[sel] = capture(() =>
            Array.from(document.querySelectorAll(sel)).map(describe));
    }

    if (plan.globals) {
        out.globals = capture(() => {
            const names = Object.keys(window);
            const values = {};
            for (const name of names) {
                if (!matches(plan.globals, name)) continue;
                try {
                    const raw = window[name];
                    if (raw === undefined || raw === window) continue;
                    if (typeof raw === 'function' || typeof raw === 'symbol') continue;
                    if (typeof Node !== 'undefined' && raw instanceof Node) continue;
                    const text = JSON.stringify(raw);
                    if (text === undefined) continue;
                    values[name] = { ok: JSON.parse(text) };
                } catch (e) {
                    values[name] = { error: String((e && e.message) || e) };
                }
            }
            return { names, values };
        });
    }

    if (plan.storage) {
        out.storage = capture(() => {
            const entries = [];
            for (let i = 0; i < window.localStorage.length; i++) {
                const key = window.localStorage.key(i);
                entries.push([key, window.localStorage.getItem(key) ?? '']);
            }
            return entries;
        });
    }

    if (plan.inlineScripts) {
        out.inlineScripts = capture(() =>
            Array.from(document.querySelectorAll('script:not([src])'))
                .map(s => s.textContent || '')
                .filter(t => /^[\[{]/.test(t.trim())));
    }

    return out;
}"#;

/// Outcome of one in-page query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Captured<T> {
    Ok(T),
    Error(String),
}

impl<T: Clone> Captured<T> {
    fn to_result(&self, target: &str) -> std::result::Result<T, ProbeError> {
        match self {
            Captured::Ok(v) => Ok(v.clone()),
            Captured::Error(message) => Err(ProbeError::query(target, message.clone())),
        }
    }
}

/// Window globals as captured by the collector
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalCapture {
    pub names: Vec<String>,
    pub values: BTreeMap<String, Captured<Value>>,
}

/// Everything the collector returned
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSnapshot {
    pub url: Option<String>,
    pub title: Option<String>,
    pub scripts: BTreeMap<String, Captured<Option<String>>>,
    pub elements: BTreeMap<String, Captured<Vec<ElementInfo>>>,
    pub globals: Option<Captured<GlobalCapture>>,
    pub storage: Option<Captured<Vec<(String, String)>>>,
    pub inline_scripts: Option<Captured<Vec<String>>>,
}

impl PageSnapshot {
    /// Decode the collector's result. A malformed result yields an empty
    /// snapshot, so every probe reports nothing instead of the whole
    /// extraction failing.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!("Collector returned an unreadable snapshot: {}", e);
            Self::default()
        })
    }
}

fn not_captured(what: &str) -> ProbeError {
    ProbeError::NotCaptured(what.to_string())
}

impl PageContext for PageSnapshot {
    fn script_text(&self, selector: &str) -> std::result::Result<Option<String>, ProbeError> {
        self.scripts
            .get(selector)
            .ok_or_else(|| not_captured(selector))?
            .to_result(selector)
    }

    fn query_all(&self, selector: &str) -> std::result::Result<Vec<ElementInfo>, ProbeError> {
        self.elements
            .get(selector)
            .ok_or_else(|| not_captured(selector))?
            .to_result(selector)
    }

    fn global_names(&self) -> std::result::Result<Vec<String>, ProbeError> {
        let globals = self.globals.as_ref().ok_or_else(|| not_captured("globals"))?;
        Ok(globals.to_result("window")?.names)
    }

    fn global_value(&self, name: &str) -> std::result::Result<Option<Value>, ProbeError> {
        let globals = match self.globals.as_ref() {
            Some(Captured::Ok(g)) => g,
            Some(Captured::Error(message)) => {
                return Err(ProbeError::query("window", message.clone()))
            }
            None => return Err(not_captured("globals")),
        };
        match globals.values.get(name) {
            Some(captured) => captured.to_result(name).map(Some),
            None => Ok(None),
        }
    }

    fn storage_entries(&self) -> std::result::Result<Vec<(String, String)>, ProbeError> {
        self.storage
            .as_ref()
            .ok_or_else(|| not_captured("localStorage"))?
            .to_result("localStorage")
    }

    fn inline_scripts(&self) -> std::result::Result<Vec<String>, ProbeError> {
        self.inline_scripts
            .as_ref()
            .ok_or_else(|| not_captured("inline scripts"))?
            .to_result("script:not([src])")
    }

    fn url(&self) -> Option<String> {
        self.url.clone()
    }

    fn title(&self) -> Option<String> {
        self.title.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_script_embeds_plan() {
        let mut plan = CollectPlan::new(500);
        plan.scripts.insert("script#__NEXT_DATA__".into());
        plan.storage = true;

        let script = plan.script().unwrap();
        assert!(script.starts_with("(function (plan)"));
        assert!(script.contains(r#""scripts":["script#__NEXT_DATA__"]"#));
        assert!(script.contains(r#""textLimit":500"#));
        assert!(script.ends_with("})"));
    }

    #[test]
    fn test_decode_captures() {
        let snapshot = PageSnapshot::from_value(json!({
            "url": "https://www.chess.com/game/live/1",
            "scripts": { "#data": { "ok": "{\"a\":1}" }, "#none": { "ok": null } },
            "elements": { ".move": { "error": "Failed to execute 'querySelectorAll'" } },
            "globals": { "ok": {
                "names": ["gameState", "broken"],
                "values": {
                    "gameState": { "ok": { "fen": "startpos" } },
                    "broken": { "error": "cyclic object value" }
                }
            } },
            "storage": { "ok": [["chess_theme", "dark"]] }
        }));

        assert_eq!(snapshot.url().as_deref(), Some("https://www.chess.com/game/live/1"));
        assert_eq!(snapshot.script_text("#data").unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(snapshot.script_text("#none").unwrap(), None);
        assert!(matches!(
            snapshot.script_text("#missing"),
            Err(ProbeError::NotCaptured(_))
        ));
        assert!(matches!(
            snapshot.query_all(".move"),
            Err(ProbeError::Query { .. })
        ));
        assert_eq!(
            snapshot.global_value("gameState").unwrap(),
            Some(json!({ "fen": "startpos" }))
        );
        assert!(snapshot.global_value("broken").is_err());
        assert_eq!(snapshot.global_value("unlisted").unwrap(), None);
        assert_eq!(
            snapshot.storage_entries().unwrap(),
            vec![("chess_theme".to_string(), "dark".to_string())]
        );
        assert!(snapshot.inline_scripts().is_err());
    }

    #[test]
    fn test_malformed_snapshot_is_empty() {
        let snapshot = PageSnapshot::from_value(json!("not an object"));
        assert_eq!(snapshot, PageSnapshot::default());
        assert!(snapshot.global_names().is_err());
    }
}
