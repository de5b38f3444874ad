//! HTTP surface
//!
//! `GET`/`POST` on `/` and `/game` run one scrape; `OPTIONS` answers CORS
//! preflight. Every response carries `Access-Control-Allow-Origin: *`.

use std::error::Error as StdError;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::Error;
use crate::extract::GameDataEnvelope;
use crate::organize::{organize, OrganizedGame};
use crate::renderer::Renderer;
use crate::scraper::{GameRequest, GameScraper};
use crate::scripts::ScriptTemplate;

/// How to call the scrape endpoint
pub const USAGE: &str = "GET /game?gameId=<id>[&waitTime=<ms>][&script=<name>][&organize=true] \
or POST /game with JSON {\"gameId\": \"<id>\", \"customScript\": \"<js>\", \"waitTime\": <ms>}";

/// Application state shared across handlers
pub struct AppState<R: Renderer> {
    pub scraper: GameScraper<R>,
    limiter: Semaphore,
    include_error_details: bool,
}

impl<R: Renderer> AppState<R> {
    pub fn new(scraper: GameScraper<R>, config: &ServerConfig) -> Self {
        Self {
            scraper,
            limiter: Semaphore::new(config.max_concurrent.max(1)),
            include_error_details: config.include_error_details,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse {
    pub success: bool,
    pub game_id: String,
    pub data: GameDataEnvelope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organized: Option<OrganizedGame>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct UsageResponse {
    pub error: String,
    pub usage: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureResponse {
    pub success: bool,
    pub error: String,
    pub game_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Serialize)]
pub struct ScriptsResponse<'a> {
    pub scripts: Vec<&'a ScriptTemplate>,
}

/// Error type for API handlers
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    game_id: Option<String>,
    include_details: bool,
}

impl ApiError {
    pub fn new(error: Error, game_id: Option<String>) -> Self {
        Self {
            error,
            game_id,
            include_details: false,
        }
    }

    pub fn with_details(mut self, include: bool) -> Self {
        self.include_details = include;
        self
    }

    pub fn status(&self) -> StatusCode {
        if self.error.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if let Error::Validation(message) = &self.error {
            let body = UsageResponse {
                error: message.clone(),
                usage: USAGE,
            };
            return (status, Json(body)).into_response();
        }

        let details = self.include_details.then(|| source_chain(&self.error));
        let body = FailureResponse {
            success: false,
            error: self.error.to_string(),
            game_id: self.game_id,
            details,
        };
        (status, Json(body)).into_response()
    }
}

fn source_chain(error: &Error) -> Vec<String> {
    std::iter::successors(Some(error as &dyn StdError), |&e| e.source())
        .map(ToString::to_string)
        .collect()
}

/// Build the router
pub fn router<R: Renderer + 'static>(state: Arc<AppState<R>>) -> Router {
    Router::new()
        .route(
            "/",
            get(game_get::<R>).post(game_post::<R>).options(preflight),
        )
        .route(
            "/game",
            get(game_get::<R>).post(game_post::<R>).options(preflight),
        )
        .route("/health", get(health))
        .route("/scripts", get(scripts::<R>))
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .with_state(state)
}

/// CORS preflight
pub async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
            (header::ACCESS_CONTROL_MAX_AGE, "3600"),
        ],
    )
}

/// Health check endpoint
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Catalog listing
pub async fn scripts<R: Renderer + 'static>(State(state): State<Arc<AppState<R>>>) -> Response {
    let body = ScriptsResponse {
        scripts: state.scraper.catalog().templates().collect(),
    };
    Json(body).into_response()
}

async fn game_get<R: Renderer + 'static>(
    State(state): State<Arc<AppState<R>>>,
    query: Result<Query<GameRequest>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(request)) => run_scrape(&state, request).await,
        Err(rejection) => invalid_query(rejection),
    }
}

async fn game_post<R: Renderer + 'static>(
    State(state): State<Arc<AppState<R>>>,
    query: Result<Query<GameRequest>, QueryRejection>,
    body: Bytes,
) -> Response {
    let query = match query {
        Ok(Query(request)) => request,
        Err(rejection) => return invalid_query(rejection),
    };

    let body = if body.iter().all(u8::is_ascii_whitespace) {
        GameRequest::default()
    } else {
        match serde_json::from_slice::<GameRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                let error = Error::validation(format!("Invalid JSON body: {}", e));
                return ApiError::new(error, query.game_id).into_response();
            }
        }
    };

    run_scrape(&state, query.or(body)).await
}

fn invalid_query(rejection: QueryRejection) -> Response {
    let error = Error::validation(format!("Invalid query string: {}", rejection.body_text()));
    ApiError::new(error, None).into_response()
}

async fn run_scrape<R: Renderer>(state: &AppState<R>, request: GameRequest) -> Response {
    let game_id = request.game_id.clone();

    // Fail fast without waiting for a browser slot
    if let Err(e) = request.validated_game_id() {
        return ApiError::new(e, game_id).into_response();
    }

    let _permit = match state.limiter.acquire().await {
        Ok(permit) => permit,
        Err(_) => {
            let error = Error::transport("Scrape limiter closed");
            return ApiError::new(error, game_id).into_response();
        }
    };

    match state.scraper.scrape(&request).await {
        Ok(data) => {
            let organized = request.organize.then(|| organize(&data));
            let body = SuccessResponse {
                success: true,
                game_id: game_id.unwrap_or_default().trim().to_string(),
                data,
                organized,
                timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            };
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => {
            if e.is_timeout() {
                tracing::warn!(timeout = true, "Request timed out: {}", e);
            } else {
                tracing::warn!("Request failed: {}", e);
            }
            ApiError::new(e, game_id)
                .with_details(state.include_error_details)
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = ApiError::new(Error::validation("Missing gameId parameter"), None);
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = ApiError::new(Error::UnknownScript("nope".into()), Some("1".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = ApiError::new(
            Error::NavigationTimeout {
                url: "u".into(),
                timeout_ms: 5,
            },
            Some("1".into()),
        );
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_source_chain_includes_io_source() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let chain = source_chain(&Error::transport_io("Failed to write frame", io));
        assert_eq!(
            chain,
            vec![
                "Transport error: Failed to write frame".to_string(),
                "pipe closed".to_string()
            ]
        );
    }
}
