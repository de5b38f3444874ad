//! Name heuristics for global and storage scans

use serde::{Deserialize, Serialize};

/// Decides which names a scan keeps.
///
/// A name matches when it contains any keyword (case-insensitive) or starts
/// with any prefix (case-sensitive), and starts with none of the excluded
/// prefixes. The in-page collector applies the same rule, so a matcher is
/// serialized verbatim into the collector script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordMatcher {
    pub keywords: Vec<String>,
    pub prefixes: Vec<String>,
    pub exclude_prefixes: Vec<String>,
}

impl KeywordMatcher {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    pub fn with_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefixes.extend(prefixes.into_iter().map(Into::into));
        self
    }

    pub fn excluding<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_prefixes
            .extend(prefixes.into_iter().map(Into::into));
        self
    }

    /// Default matcher for window globals
    pub fn globals() -> Self {
        Self::new([
            "game", "chess", "move", "pgn", "fen", "eval", "analysis", "engine", "board",
            "player", "clock",
        ])
        .with_prefixes(["_"])
        .excluding(["__gamegrab"])
    }

    /// Default matcher for localStorage keys
    pub fn storage() -> Self {
        Self::new([
            "game", "chess", "move", "pgn", "fen", "eval", "analysis", "engine", "board",
            "extension",
        ])
    }

    pub fn matches(&self, name: &str) -> bool {
        if self.exclude_prefixes.iter().any(|p| name.starts_with(p.as_str())) {
            return false;
        }
        let lower = name.to_lowercase();
        self.keywords
            .iter()
            .any(|k| lower.contains(&k.to_lowercase()))
            || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}
