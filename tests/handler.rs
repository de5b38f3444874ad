//! Request lifecycle tests against an in-memory renderer

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{snapshot_with_payload, test_config, FakeRenderer, PageScript};
use gamegrab::{Error, GameRequest, GameScraper, InjectPhase, ScriptCatalog, ScriptTemplate};
use serde_json::json;

const PAYLOAD: &str = r#"{"game":{"id":"abc","winner":"white"}}"#;

fn scraper(script: PageScript) -> (GameScraper<FakeRenderer>, FakeRenderer) {
    let renderer = FakeRenderer::new(script);
    let scraper = GameScraper::new(renderer.clone(), Arc::new(test_config()));
    (scraper, renderer)
}

fn healthy_page() -> PageScript {
    PageScript {
        snapshot: snapshot_with_payload(PAYLOAD),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_missing_game_id_never_opens_renderer() {
    let (scraper, renderer) = scraper(healthy_page());

    for request in [
        GameRequest::default(),
        GameRequest::for_game(""),
        GameRequest::for_game("  "),
    ] {
        let err = scraper.scrape(&request).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    assert_eq!(renderer.log.opened(), 0);
    assert!(renderer.log.navigations.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_script_never_opens_renderer() {
    let (scraper, renderer) = scraper(healthy_page());
    let request = GameRequest {
        script: Some("does-not-exist".into()),
        ..GameRequest::for_game("abc")
    };

    let err = scraper.scrape(&request).await.unwrap_err();
    assert!(matches!(err, Error::UnknownScript(ref name) if name == "does-not-exist"));
    assert_eq!(renderer.log.opened(), 0);
}

#[tokio::test]
async fn test_success_releases_renderer_once() {
    let (scraper, renderer) = scraper(healthy_page());

    let envelope = tokio_test::assert_ok!(scraper.scrape(&GameRequest::for_game("abc")).await);

    assert_eq!(
        envelope.structured_payload,
        Some(json!({"game": {"id": "abc", "winner": "white"}}))
    );
    assert_eq!(envelope.dom.moves, Some(vec!["e4".to_string(), "e5".to_string()]));
    assert_eq!(envelope.computed.move_count, 2);
    assert!(envelope.computed.has_structured_payload);

    assert_eq!(renderer.log.opened(), 1);
    assert_eq!(renderer.log.closed(), 1);
    assert_eq!(
        *renderer.log.navigations.lock().unwrap(),
        vec!["https://chess.test/game/live/abc".to_string()]
    );

    // One evaluation: the collector
    assert_eq!(renderer.log.evaluations().len(), 1);

    let options = renderer.log.options.lock().unwrap();
    assert!(options[0].user_agent.contains("gamegrab/"));
    assert!(options[0].init_scripts.is_empty());
}

#[tokio::test]
async fn test_navigation_timeout_releases_renderer() {
    let (scraper, renderer) = scraper(PageScript {
        navigate_delay: Some(Duration::from_secs(5)),
        ..healthy_page()
    });

    let err = scraper.scrape(&GameRequest::for_game("abc")).await.unwrap_err();

    assert!(matches!(err, Error::NavigationTimeout { timeout_ms: 200, .. }));
    assert!(err.to_string().to_lowercase().contains("timeout"));
    assert_eq!(renderer.log.opened(), 1);
    assert_eq!(renderer.log.closed(), 1);
    assert!(renderer.log.evaluations().is_empty());
}

#[tokio::test]
async fn test_navigation_error_releases_renderer() {
    let (scraper, renderer) = scraper(PageScript {
        navigate_error: Some("net::ERR_NAME_NOT_RESOLVED".into()),
        ..healthy_page()
    });

    let err = scraper.scrape(&GameRequest::for_game("abc")).await.unwrap_err();

    assert!(matches!(err, Error::Navigation(_)));
    assert_eq!(renderer.log.closed(), 1);
}

#[tokio::test]
async fn test_injected_script_failure_is_surfaced() {
    let (scraper, renderer) = scraper(healthy_page());
    let request = GameRequest {
        custom_script: Some("throw new Error('boom')".into()),
        ..GameRequest::for_game("abc")
    };

    let err = tokio_test::assert_err!(scraper.scrape(&request).await);

    assert!(matches!(err, Error::InjectedScript(_)));
    assert!(err.to_string().contains("boom"));
    assert_eq!(renderer.log.closed(), 1);
    // Extraction never ran
    assert_eq!(renderer.log.evaluations().len(), 1);
}

#[tokio::test]
async fn test_hung_custom_script_times_out_and_releases() {
    let (scraper, renderer) = scraper(PageScript {
        hang_on: Some("while(true)".into()),
        ..healthy_page()
    });
    let request = GameRequest {
        custom_script: Some("while(true){}".into()),
        ..GameRequest::for_game("abc")
    };

    let result = tokio::time::timeout(Duration::from_secs(5), scraper.scrape(&request)).await;
    let err = tokio_test::assert_ok!(result).unwrap_err();

    assert!(matches!(err, Error::Timeout(_)));
    assert!(err.is_timeout());
    assert_eq!(renderer.log.opened(), 1);
    assert_eq!(renderer.log.closed(), 1);
    // Extraction never ran
    assert_eq!(renderer.log.evaluations().len(), 1);
}

#[tokio::test]
async fn test_hung_collector_times_out_and_releases() {
    let (scraper, renderer) = scraper(PageScript {
        hang_on: Some("(function (plan)".into()),
        ..healthy_page()
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        scraper.scrape(&GameRequest::for_game("abc")),
    )
    .await;
    let err = tokio_test::assert_ok!(result).unwrap_err();

    assert!(err.is_timeout());
    assert!(err.to_string().contains("Extraction"));
    assert_eq!(renderer.log.closed(), 1);
}

#[tokio::test]
async fn test_collector_failure_releases_renderer() {
    let (scraper, renderer) = scraper(PageScript {
        collector_error: Some("Execution context was destroyed".into()),
        ..healthy_page()
    });

    let err = scraper.scrape(&GameRequest::for_game("abc")).await.unwrap_err();

    assert!(matches!(err, Error::JavaScript(_)));
    assert_eq!(renderer.log.opened(), 1);
    assert_eq!(renderer.log.closed(), 1);
}

#[tokio::test]
async fn test_open_failure_has_nothing_to_release() {
    let (scraper, renderer) = scraper(PageScript {
        open_error: true,
        ..healthy_page()
    });

    let err = scraper.scrape(&GameRequest::for_game("abc")).await.unwrap_err();

    assert!(matches!(err, Error::ChromeNotFound));
    assert_eq!(renderer.log.closed(), 0);
}

#[tokio::test]
async fn test_close_failure_does_not_mask_result() {
    let (scraper, renderer) = scraper(PageScript {
        close_error: true,
        ..healthy_page()
    });

    let envelope = scraper.scrape(&GameRequest::for_game("abc")).await.unwrap();

    assert!(envelope.computed.has_structured_payload);
    assert_eq!(renderer.log.closed(), 1);
}

#[tokio::test]
async fn test_custom_script_global_is_scanned() {
    let (scraper, _renderer) = scraper(healthy_page());
    let request = GameRequest {
        custom_script: Some(r#"window.chessMarker = {"marker": true};"#.into()),
        ..GameRequest::for_game("abc")
    };

    let envelope = scraper.scrape(&request).await.unwrap();

    assert_eq!(envelope.globals.get("chessMarker"), Some(&json!({"marker": true})));
}

#[tokio::test]
async fn test_catalog_scripts_run_in_their_phase() {
    let (scraper, renderer) = scraper(healthy_page());

    let request = GameRequest {
        script: Some("response-hook".into()),
        ..GameRequest::for_game("abc")
    };
    scraper.scrape(&request).await.unwrap();
    {
        let options = renderer.log.options.lock().unwrap();
        assert_eq!(options[0].init_scripts.len(), 1);
        assert!(options[0].init_scripts[0].contains("__extGameResponses"));
    }
    assert_eq!(renderer.log.evaluations().len(), 1);

    let request = GameRequest {
        script: Some("move-mirror".into()),
        custom_script: Some("window.chessAfter = 1;".into()),
        ..GameRequest::for_game("abc")
    };
    scraper.scrape(&request).await.unwrap();

    let evaluations = renderer.log.evaluations();
    assert_eq!(evaluations.len(), 4);
    assert!(evaluations[1].contains("__extMoves"));
    assert!(evaluations[2].starts_with("window.chessAfter"));
    assert!(evaluations[3].starts_with("(function (plan)"));
    assert_eq!(renderer.log.closed(), 2);
}

#[tokio::test]
async fn test_custom_catalog() {
    let mut catalog = ScriptCatalog::new();
    catalog.register(ScriptTemplate::new(
        "tag",
        "set a marker",
        InjectPhase::AfterNavigation,
        r#"window.chessTagged = true;"#,
    ));
    let renderer = FakeRenderer::new(healthy_page());
    let scraper = GameScraper::with_catalog(renderer, Arc::new(test_config()), catalog);

    let request = GameRequest {
        script: Some("tag".into()),
        ..GameRequest::for_game("abc")
    };
    let envelope = scraper.scrape(&request).await.unwrap();
    assert_eq!(envelope.globals.get("chessTagged"), Some(&json!(true)));

    let request = GameRequest {
        script: Some("move-mirror".into()),
        ..GameRequest::for_game("abc")
    };
    assert!(matches!(
        scraper.scrape(&request).await,
        Err(Error::UnknownScript(_))
    ));
}

#[tokio::test]
async fn test_assembly_is_idempotent() {
    let (scraper, _renderer) = scraper(healthy_page());

    let first = scraper.scrape(&GameRequest::for_game("abc")).await.unwrap();
    let second = scraper.scrape(&GameRequest::for_game("abc")).await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_invalid_payload_leaves_other_fragments() {
    let (scraper, _renderer) = scraper(PageScript {
        snapshot: snapshot_with_payload("{not json"),
        ..Default::default()
    });

    let envelope = scraper.scrape(&GameRequest::for_game("abc")).await.unwrap();

    assert!(envelope.structured_payload.is_none());
    assert!(!envelope.computed.has_structured_payload);
    assert_eq!(envelope.computed.move_count, 2);
}

#[test]
fn test_settle_delay_defaults_and_clamps() {
    let (scraper, _renderer) = scraper(healthy_page());
    let delay = |wait_time| {
        scraper.settle_delay(&GameRequest {
            wait_time,
            ..GameRequest::for_game("abc")
        })
    };

    assert_eq!(delay(None), Duration::from_millis(5));
    assert_eq!(delay(Some(0)), Duration::from_millis(5));
    assert_eq!(delay(Some(20)), Duration::from_millis(20));
    assert_eq!(delay(Some(60_000)), Duration::from_millis(50));
}
