//! In-memory renderer that records what the scraper does with it

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use gamegrab::{Error, RenderOptions, RenderedPage, Renderer, Result, ScrapeConfig};
use serde_json::{json, Map, Value};

/// Everything the fake saw
#[derive(Default)]
pub struct RenderLog {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub navigations: Mutex<Vec<String>>,
    pub evaluations: Mutex<Vec<String>>,
    pub options: Mutex<Vec<RenderOptions>>,
}

impl RenderLog {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn evaluations(&self) -> Vec<String> {
        self.evaluations.lock().unwrap().clone()
    }
}

/// How the fake page behaves
#[derive(Clone, Default)]
pub struct PageScript {
    /// Returned for the collector expression
    pub snapshot: Value,
    pub navigate_delay: Option<Duration>,
    pub navigate_error: Option<String>,
    pub collector_error: Option<String>,
    /// Evaluations containing this never finish
    pub hang_on: Option<String>,
    pub open_error: bool,
    pub close_error: bool,
}

#[derive(Clone)]
pub struct FakeRenderer {
    pub log: Arc<RenderLog>,
    pub script: PageScript,
}

impl FakeRenderer {
    pub fn new(script: PageScript) -> Self {
        Self {
            log: Arc::new(RenderLog::default()),
            script,
        }
    }
}

impl Renderer for FakeRenderer {
    type Page = FakePage;

    async fn open(&self, options: &RenderOptions) -> Result<FakePage> {
        if self.script.open_error {
            return Err(Error::ChromeNotFound);
        }
        self.log.opened.fetch_add(1, Ordering::SeqCst);
        self.log.options.lock().unwrap().push(options.clone());
        Ok(FakePage {
            log: Arc::clone(&self.log),
            script: self.script.clone(),
            globals: Map::new(),
        })
    }
}

pub struct FakePage {
    log: Arc<RenderLog>,
    script: PageScript,
    /// Globals assigned by evaluated scripts
    globals: Map<String, Value>,
}

impl FakePage {
    /// Understands `window.name = <json>` lines and `throw`
    fn run_script(&mut self, expression: &str) -> Result<Value> {
        if expression.contains("throw ") {
            return Err(Error::JavaScript("Error: boom".into()));
        }
        for line in expression.lines() {
            let Some(assignment) = line.trim().strip_prefix("window.") else {
                continue;
            };
            if let Some((name, rhs)) = assignment.split_once('=') {
                let rhs = rhs.trim().trim_end_matches(';');
                if let Ok(value) = serde_json::from_str::<Value>(rhs) {
                    self.globals.insert(name.trim().to_string(), value);
                }
            }
        }
        Ok(Value::Null)
    }

    fn collect(&self) -> Result<Value> {
        if let Some(message) = &self.script.collector_error {
            return Err(Error::JavaScript(message.clone()));
        }
        let mut snapshot = self.script.snapshot.clone();
        if !self.globals.is_empty() {
            if snapshot.get("globals").is_none() {
                snapshot["globals"] = json!({ "ok": { "names": [], "values": {} } });
            }
            let globals = &mut snapshot["globals"]["ok"];
            for (name, value) in &self.globals {
                if let Some(names) = globals["names"].as_array_mut() {
                    names.push(json!(name));
                }
                globals["values"][name] = json!({ "ok": value });
            }
        }
        Ok(snapshot)
    }
}

impl RenderedPage for FakePage {
    async fn navigate(&mut self, url: &str) -> Result<()> {
        self.log.navigations.lock().unwrap().push(url.to_string());
        if let Some(delay) = self.script.navigate_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.script.navigate_error {
            Some(message) => Err(Error::Navigation(message.clone())),
            None => Ok(()),
        }
    }

    async fn evaluate(&mut self, expression: &str) -> Result<Value> {
        self.log
            .evaluations
            .lock()
            .unwrap()
            .push(expression.to_string());
        if let Some(marker) = &self.script.hang_on {
            if expression.contains(marker.as_str()) {
                std::future::pending::<()>().await;
            }
        }
        if expression.starts_with("(function (plan)") {
            self.collect()
        } else {
            self.run_script(expression)
        }
    }

    async fn close(self) -> Result<()> {
        self.log.closed.fetch_add(1, Ordering::SeqCst);
        if self.script.close_error {
            return Err(Error::transport("socket already closed"));
        }
        Ok(())
    }
}

/// Fast settings for tests
pub fn test_config() -> ScrapeConfig {
    ScrapeConfig {
        base_url: "https://chess.test/game/live".into(),
        navigation_timeout_ms: 200,
        evaluation_timeout_ms: 200,
        default_wait_ms: 5,
        max_wait_ms: 50,
        ..Default::default()
    }
}

/// A page whose payload script holds `payload`
pub fn snapshot_with_payload(payload: &str) -> Value {
    json!({
        "url": "https://chess.test/game/live/abc",
        "title": "Live game",
        "scripts": { "script#__NEXT_DATA__": { "ok": payload } },
        "elements": {
            "wc-simple-move-list .node, .move-list .node, [data-ply]": {
                "ok": [
                    { "tag": "div", "text": "e4" },
                    { "tag": "div", "text": "e5" }
                ]
            }
        },
        "storage": { "ok": [] },
        "inlineScripts": { "ok": [] }
    })
}
