//! Request lifecycle: validate, render, inject, settle, extract, release.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::extract::{Assembler, GameDataEnvelope};
use crate::renderer::{RenderOptions, RenderedPage, Renderer};
use crate::scripts::{InjectPhase, ScriptCatalog, ScriptTemplate};
use crate::ScrapeConfig;

/// Parameters of one scrape, from a query string or a JSON body
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameRequest {
    /// Spreadsheet cells often hold the id as a number
    #[serde(deserialize_with = "string_or_number")]
    pub game_id: Option<String>,
    /// Source evaluated in the page after navigation
    pub custom_script: Option<String>,
    /// Name of a catalog script
    pub script: Option<String>,
    /// Settle delay in milliseconds
    #[serde(alias = "waitTimeMs")]
    pub wait_time: Option<u64>,
    /// Also return the organized view
    pub organize: bool,
}

impl GameRequest {
    pub fn for_game(game_id: impl Into<String>) -> Self {
        Self {
            game_id: Some(game_id.into()),
            ..Default::default()
        }
    }

    /// Fill fields missing here from `fallback`
    pub fn or(self, fallback: GameRequest) -> Self {
        Self {
            game_id: self.game_id.or(fallback.game_id),
            custom_script: self.custom_script.or(fallback.custom_script),
            script: self.script.or(fallback.script),
            wait_time: self.wait_time.or(fallback.wait_time),
            organize: self.organize || fallback.organize,
        }
    }

    /// The trimmed game id, or a validation error
    pub fn validated_game_id(&self) -> Result<&str> {
        self.game_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::validation("Missing gameId parameter"))
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "gameId must be a string or a number, got {}",
            other
        ))),
    }
}

/// Scrapes game pages through a [`Renderer`]
pub struct GameScraper<R: Renderer> {
    renderer: R,
    config: Arc<ScrapeConfig>,
    assembler: Assembler,
    catalog: ScriptCatalog,
}

impl<R: Renderer> GameScraper<R> {
    /// Scraper with the built-in script catalog
    pub fn new(renderer: R, config: Arc<ScrapeConfig>) -> Self {
        Self::with_catalog(renderer, config, ScriptCatalog::builtin())
    }

    pub fn with_catalog(renderer: R, config: Arc<ScrapeConfig>, catalog: ScriptCatalog) -> Self {
        let assembler = Assembler::new(&config.extraction);
        Self {
            renderer,
            config,
            assembler,
            catalog,
        }
    }

    pub fn catalog(&self) -> &ScriptCatalog {
        &self.catalog
    }

    pub fn config(&self) -> &ScrapeConfig {
        &self.config
    }

    /// Requested settle delay; 0 or absent means the default
    pub fn settle_delay(&self, request: &GameRequest) -> Duration {
        let ms = match request.wait_time {
            None | Some(0) => self.config.default_wait_ms,
            Some(ms) => ms.min(self.config.max_wait_ms),
        };
        Duration::from_millis(ms)
    }

    /// Scrape one game page.
    ///
    /// The request is validated before a rendering session is opened. Once
    /// opened, the session is closed exactly once whatever happens after.
    pub async fn scrape(&self, request: &GameRequest) -> Result<GameDataEnvelope> {
        let game_id = request.validated_game_id()?;

        let template = match request.script.as_deref() {
            Some(name) => Some(
                self.catalog
                    .get(name)
                    .ok_or_else(|| Error::UnknownScript(name.to_string()))?,
            ),
            None => None,
        };

        let collector = self.assembler.collector_script()?;
        let url = self.config.game_url(game_id);

        let mut options = RenderOptions {
            user_agent: self.config.user_agent.clone(),
            init_scripts: Vec::new(),
        };
        if let Some(t) = template.filter(|t| t.phase == InjectPhase::BeforeNavigation) {
            options.init_scripts.push(t.source.clone());
        }

        tracing::info!(game_id, url = %url, "Scraping game");

        let mut page = self.renderer.open(&options).await?;
        tracing::debug!("Rendering session opened");

        let result = self
            .drive(&mut page, &url, template, request, &collector)
            .await;

        if let Err(e) = page.close().await {
            tracing::warn!("Failed to close rendering session: {}", e);
        }

        match &result {
            Ok(envelope) => tracing::info!(
                game_id,
                moves = envelope.computed.move_count,
                failed = envelope.computed.failed_probes.len(),
                "Scrape finished"
            ),
            Err(e) => tracing::info!(game_id, "Scrape failed: {}", e),
        }

        result
    }

    async fn drive(
        &self,
        page: &mut R::Page,
        url: &str,
        template: Option<&ScriptTemplate>,
        request: &GameRequest,
        collector: &str,
    ) -> Result<GameDataEnvelope> {
        let timeout_ms = self.config.navigation_timeout_ms;
        let navigation_timeout = || Error::NavigationTimeout {
            url: url.to_string(),
            timeout_ms,
        };

        match tokio::time::timeout(Duration::from_millis(timeout_ms), page.navigate(url)).await {
            Ok(Ok(())) => {}
            Ok(Err(Error::Timeout(reason))) => {
                tracing::debug!("Renderer gave up waiting: {}", reason);
                return Err(navigation_timeout());
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(navigation_timeout()),
        }
        tracing::debug!("Navigation settled");

        if let Some(t) = template.filter(|t| t.phase == InjectPhase::AfterNavigation) {
            tracing::debug!(script = %t.name, "Running catalog script");
            self.evaluate_bounded(page, &t.source, "Catalog script")
                .await
                .map_err(Error::into_injected)?;
        }

        if let Some(source) = request
            .custom_script
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            tracing::debug!(len = source.len(), "Running custom script");
            self.evaluate_bounded(page, &custom_script_expression(source), "Custom script")
                .await
                .map_err(Error::into_injected)?;
        }

        let delay = self.settle_delay(request);
        tracing::debug!("Settling for {}ms", delay.as_millis());
        tokio::time::sleep(delay).await;

        let raw = self.evaluate_bounded(page, collector, "Extraction").await?;
        Ok(self.assembler.assemble_value(raw))
    }

    /// A page stuck in a loop never answers; give up after the configured bound
    async fn evaluate_bounded(
        &self,
        page: &mut R::Page,
        expression: &str,
        what: &str,
    ) -> Result<Value> {
        let timeout_ms = self.config.evaluation_timeout_ms;
        match tokio::time::timeout(Duration::from_millis(timeout_ms), page.evaluate(expression))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout(format!(
                "{} did not finish within {}ms",
                what, timeout_ms
            ))),
        }
    }
}

/// Top-level declarations stay global; the completion value is discarded
/// so a non-serializable result cannot fail the evaluation.
fn custom_script_expression(source: &str) -> String {
    format!("{}\n;void 0", source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_from_json_body() {
        let request: GameRequest = serde_json::from_str(
            r#"{"gameId":"123","customScript":"window.x=1","waitTimeMs":1500,"organize":true}"#,
        )
        .unwrap();
        assert_eq!(request.game_id.as_deref(), Some("123"));
        assert_eq!(request.custom_script.as_deref(), Some("window.x=1"));
        assert_eq!(request.wait_time, Some(1500));
        assert!(request.organize);
        assert!(request.script.is_none());
    }

    #[test]
    fn test_numeric_game_id() {
        let request: GameRequest = serde_json::from_str(r#"{"gameId":123456789}"#).unwrap();
        assert_eq!(request.game_id.as_deref(), Some("123456789"));

        let request: GameRequest = serde_json::from_str(r#"{"gameId":null}"#).unwrap();
        assert!(request.game_id.is_none());

        let err = serde_json::from_str::<GameRequest>(r#"{"gameId":[1]}"#).unwrap_err();
        assert!(err.to_string().contains("string or a number"));
    }

    #[test]
    fn test_query_fields_win_over_body() {
        let query = GameRequest {
            game_id: Some("from-query".into()),
            ..Default::default()
        };
        let body = GameRequest {
            game_id: Some("from-body".into()),
            wait_time: Some(100),
            ..Default::default()
        };
        let merged = query.or(body);
        assert_eq!(merged.game_id.as_deref(), Some("from-query"));
        assert_eq!(merged.wait_time, Some(100));
    }

    #[test]
    fn test_blank_game_id_is_rejected() {
        for id in [None, Some(""), Some("   ")] {
            let request = GameRequest {
                game_id: id.map(String::from),
                ..Default::default()
            };
            let err = request.validated_game_id().unwrap_err();
            assert!(matches!(err, Error::Validation(_)));
            assert_eq!(err.to_string(), "Missing gameId parameter");
        }
        assert_eq!(GameRequest::for_game(" 42 ").validated_game_id().unwrap(), "42");
    }

    #[test]
    fn test_custom_script_expression() {
        let expr = custom_script_expression("var chessMarker = { marker: true }");
        assert!(expr.starts_with("var chessMarker"));
        assert!(expr.ends_with(";void 0"));
    }
}
