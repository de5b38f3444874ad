//! Named injection scripts
//!
//! Scripts that mimic what chess helper extensions leave behind on a game
//! page: globals, data attributes and localStorage keys the probes then pick
//! up. Callers request them by name instead of sending source text.

use std::collections::BTreeMap;

use serde::Serialize;

/// When a template runs relative to navigation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InjectPhase {
    /// Installed before any page script runs
    BeforeNavigation,
    /// Evaluated once the page has settled
    AfterNavigation,
}

/// A named script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScriptTemplate {
    pub name: String,
    pub description: String,
    pub phase: InjectPhase,
    #[serde(skip)]
    pub source: String,
}

impl ScriptTemplate {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        phase: InjectPhase,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            phase,
            source: source.into(),
        }
    }
}

/// Records JSON bodies of game-related fetches into `window.__extGameResponses`
pub const RESPONSE_HOOK: &str = r#"
(function () {
    window.__extGameResponses = [];
    const originalFetch = window.fetch;
    window.fetch = function (...args) {
        return originalFetch.apply(this, args).then(response => {
            try {
                const url = String(response.url || '');
                if (/game|callback|analysis/i.test(url)) {
                    response.clone().json().then(body => {
                        window.__extGameResponses.push({ url, body });
                    }).catch(() => {});
                }
            } catch (e) {}
            return response;
        });
    };
})();
"#;

/// Mirrors the rendered move list into a global and localStorage
pub const MOVE_MIRROR: &str = r#"
(function () {
    const nodes = document.querySelectorAll('wc-simple-move-list .node, .move-list .node, [data-ply]');
    const moves = Array.from(nodes)
        .map(n => (n.textContent || '').trim())
        .filter(t => t.length > 0);
    window.__extMoves = moves;
    try {
        localStorage.setItem('chess_ext_moves', JSON.stringify(moves));
    } catch (e) {}
})();
"#;

/// Copies evaluation bar and engine line text into `window.__extEvaluation`
pub const EVAL_BRIDGE: &str = r#"
(function () {
    const text = (sel) => Array.from(document.querySelectorAll(sel))
        .map(n => (n.textContent || '').trim())
        .filter(t => t.length > 0);
    window.__extEvaluation = {
        bars: text("[class*='eval-bar'], [class*='evaluation-bar']"),
        lines: text("[class*='engine-line']"),
        scores: Array.from(document.querySelectorAll('[data-eval], [data-score]'))
            .map(n => n.getAttribute('data-eval') || n.getAttribute('data-score'))
    };
})();
"#;

/// Tags the board element with its current FEN when the board exposes one
pub const BOARD_TAGGER: &str = r#"
(function () {
    const board = document.querySelector('wc-chess-board, chess-board, .board');
    if (!board) return;
    let fen = null;
    try {
        if (board.game && typeof board.game.getFEN === 'function') {
            fen = board.game.getFEN();
        }
    } catch (e) {}
    board.setAttribute('data-extension', 'board-tagger');
    if (fen) board.setAttribute('data-board-fen', fen);
})();
"#;

/// Registry of [`ScriptTemplate`]s keyed by name
#[derive(Debug, Clone, Default)]
pub struct ScriptCatalog {
    templates: BTreeMap<String, ScriptTemplate>,
}

impl ScriptCatalog {
    /// An empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in templates
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register(ScriptTemplate::new(
            "response-hook",
            "Capture JSON responses of game-related fetches into window.__extGameResponses",
            InjectPhase::BeforeNavigation,
            RESPONSE_HOOK,
        ));
        catalog.register(ScriptTemplate::new(
            "move-mirror",
            "Mirror the move list into window.__extMoves and localStorage",
            InjectPhase::AfterNavigation,
            MOVE_MIRROR,
        ));
        catalog.register(ScriptTemplate::new(
            "eval-bridge",
            "Collect evaluation bar and engine line text into window.__extEvaluation",
            InjectPhase::AfterNavigation,
            EVAL_BRIDGE,
        ));
        catalog.register(ScriptTemplate::new(
            "board-tagger",
            "Tag the board element with data-board-fen",
            InjectPhase::AfterNavigation,
            BOARD_TAGGER,
        ));
        catalog
    }

    /// Add or replace a template
    pub fn register(&mut self, template: ScriptTemplate) {
        self.templates.insert(template.name.clone(), template);
    }

    pub fn get(&self, name: &str) -> Option<&ScriptTemplate> {
        self.templates.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.templates.keys().map(String::as_str)
    }

    pub fn templates(&self) -> impl Iterator<Item = &ScriptTemplate> {
        self.templates.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        let catalog = ScriptCatalog::builtin();
        let hook = catalog.get("response-hook").unwrap();
        assert_eq!(hook.phase, InjectPhase::BeforeNavigation);
        assert!(hook.source.contains("window.fetch"));

        assert_eq!(
            catalog.names().collect::<Vec<_>>(),
            vec!["board-tagger", "eval-bridge", "move-mirror", "response-hook"]
        );
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut catalog = ScriptCatalog::builtin();
        catalog.register(ScriptTemplate::new(
            "move-mirror",
            "custom",
            InjectPhase::AfterNavigation,
            "window.x = 1;",
        ));
        assert_eq!(catalog.get("move-mirror").unwrap().source, "window.x = 1;");
        assert_eq!(catalog.templates().count(), 4);
    }

    #[test]
    fn test_listing_omits_source() {
        let catalog = ScriptCatalog::builtin();
        let listed = serde_json::to_value(catalog.get("eval-bridge").unwrap()).unwrap();
        assert_eq!(listed["phase"], "afterNavigation");
        assert!(listed.get("source").is_none());
    }

    #[test]
    fn test_scripts_are_wrapped_in_iife() {
        for template in ScriptCatalog::builtin().templates() {
            let source = template.source.trim();
            assert!(source.starts_with("(function ()"), "{}", template.name);
            assert!(source.ends_with("})();"), "{}", template.name);
        }
    }
}
