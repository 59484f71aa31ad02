//! HTTP surface integration tests over an in-memory repository.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use server::{build_state, AppState, ServiceConfig};
use std::sync::Arc;
use store::{Application, IntentCategory, IntentRule};
use tower::ServiceExt;

async fn test_state(mut config: ServiceConfig) -> Arc<AppState> {
    config.database_url = "sqlite::memory:".to_string();
    config.enable_cache = false;
    build_state(config).await.expect("state")
}

async fn seed_app(state: &AppState, app_key: &str) {
    let repo = state.service.repo();
    let app_id = repo
        .create_application(&Application {
            id: 0,
            app_key: app_key.into(),
            name: "PLM assistant".into(),
            enable_keyword: true,
            enable_regex: true,
            enable_semantic: false,
            enable_llm_fallback: false,
            enable_cache: false,
            fallback_intent_code: None,
            confidence_threshold: 0.7,
            is_active: true,
        })
        .await
        .unwrap();

    let category_id = repo
        .create_category(&IntentCategory {
            id: 0,
            application_id: app_id,
            code: "SEARCH_PART".into(),
            name: "零件查询".into(),
            description: "按编号或名称查找零件".into(),
            priority: 10,
            is_active: true,
        })
        .await
        .unwrap();

    repo.create_rule(&IntentRule {
        id: 0,
        category_id,
        rule_type: "keyword".into(),
        content: "^查找零件".into(),
        weight: 1.0,
        is_active: true,
        enabled: true,
    })
    .await
    .unwrap();
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn router_with_seeded_app() -> Router {
    let state = test_state(ServiceConfig::default()).await;
    seed_app(&state, "plm_assistant").await;
    server::build_router(state)
}

#[tokio::test]
async fn recognize_exact_keyword_hit() {
    let app = router_with_seeded_app().await;

    let response = app
        .oneshot(post_json(
            "/intent/recognize",
            json!({"app_key": "plm_assistant", "text": "查找零件"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["intent"], "SEARCH_PART");
    assert_eq!(body["confidence"], 1.0);
    assert_eq!(body["final_recognizer"], "keyword");
    assert_eq!(body["cached"], false);
}

#[tokio::test]
async fn empty_text_is_rejected_before_the_coordinator() {
    let app = router_with_seeded_app().await;

    let response = app
        .oneshot(post_json(
            "/intent/recognize",
            json!({"app_key": "plm_assistant", "text": "   \t  "}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn whitespace_is_collapsed_before_recognition() {
    let app = router_with_seeded_app().await;

    // The exact-match index sees "查找 零件" after collapsing, which is not
    // the registered token, so this falls through to a no-match failure —
    // but the request itself is valid.
    let response = app
        .oneshot(post_json(
            "/intent/recognize",
            json!({"app_key": "plm_assistant", "text": "  查找   零件  "}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn recognition_failure_is_in_band() {
    let app = router_with_seeded_app().await;

    let response = app
        .oneshot(post_json(
            "/intent/recognize",
            json!({"app_key": "ghost", "text": "查找零件"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["failure_type"], "config_missing");
    assert!(body["suggestion"].is_string());
}

#[tokio::test]
async fn batch_respects_max_size() {
    let state = test_state(ServiceConfig {
        max_batch_size: 2,
        ..Default::default()
    })
    .await;
    seed_app(&state, "plm_assistant").await;
    let app = server::build_router(state);

    // Exactly at the limit: accepted.
    let ok = app
        .clone()
        .oneshot(post_json(
            "/intent/recognize/batch",
            json!({"app_key": "plm_assistant", "texts": ["查找零件", "别的"]}),
        ))
        .await
        .unwrap();
    assert_eq!(ok.status(), StatusCode::OK);
    let body = body_json(ok).await;
    assert_eq!(body["total_count"], 2);
    assert_eq!(body["results"][0]["success"], true);

    // One past the limit: rejected.
    let too_many = app
        .oneshot(post_json(
            "/intent/recognize/batch",
            json!({"app_key": "plm_assistant", "texts": ["一", "二", "三"]}),
        ))
        .await
        .unwrap();
    assert_eq!(too_many.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn api_key_is_enforced_when_configured() {
    let mut config = ServiceConfig::default();
    config.api_keys.insert("secret-key".into());
    let state = test_state(config).await;
    seed_app(&state, "plm_assistant").await;
    let app = server::build_router(state);

    let denied = app
        .clone()
        .oneshot(post_json(
            "/intent/recognize",
            json!({"app_key": "plm_assistant", "text": "查找零件"}),
        ))
        .await
        .unwrap();
    assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

    let mut request = post_json(
        "/intent/recognize",
        json!({"app_key": "plm_assistant", "text": "查找零件"}),
    );
    request
        .headers_mut()
        .insert("X-API-Key", "secret-key".parse().unwrap());
    let allowed = app.clone().oneshot(request).await.unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);

    let mut bearer = post_json(
        "/intent/recognize",
        json!({"app_key": "plm_assistant", "text": "查找零件"}),
    );
    bearer
        .headers_mut()
        .insert("authorization", "Bearer secret-key".parse().unwrap());
    let allowed = app.oneshot(bearer).await.unwrap();
    assert_eq!(allowed.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_endpoints_are_public() {
    let mut config = ServiceConfig::default();
    config.api_keys.insert("secret-key".into());
    let state = test_state(config).await;
    let app = server::build_router(state);

    for uri in ["/", "/health", "/ready", "/status/llm"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
    }
}

#[tokio::test]
async fn unknown_route_is_404() {
    let app = router_with_seeded_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/nope")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn logs_and_stats_reflect_requests() {
    let app = router_with_seeded_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/intent/recognize",
            json!({"app_key": "plm_assistant", "text": "查找零件"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The log sink persists in the background; give it a moment.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let stats = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/intent/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(stats.status(), StatusCode::OK);
    let body = body_json(stats).await;
    assert_eq!(body["dropped_log_entries"], 0);
    assert!(body["total"].as_i64().unwrap() >= 1);

    let logs = app
        .oneshot(
            Request::builder()
                .uri("/intent/logs?page=1&page_size=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(logs.status(), StatusCode::OK);
    let body = body_json(logs).await;
    assert!(body["total"].as_i64().unwrap() >= 1);
    assert_eq!(body["logs"][0]["app_key"], "plm_assistant");
}
