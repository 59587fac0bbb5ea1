//! Integration tests for the REST surface, driven with
//! `tower::ServiceExt::oneshot` against the real `axum::Router` over a
//! temp-file SQLite database — the teacher tests the same way (a real
//! store backing a real server, no mocks), just over `tower` instead of
//! `warp::test`.

use crate::{identity_provider::TrustedClaimsIdentityProvider, router, AppState};
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use base64::Engine;
use mesh_core::{hub::Hub, model::DetectorThresholds, store::{open_pool, Store}};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn bearer_for(sub: &str) -> String {
    let claims = json!({ "sub": sub, "email": format!("{sub}@example.com"), "name": sub });
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(claims.to_string())
}

fn test_state() -> AppState {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    // Each test gets its own directory; leaking it keeps the backing file
    // alive for the process lifetime instead of the temp guard's drop.
    std::mem::forget(dir);
    let pool = open_pool(db_path.to_str().unwrap()).unwrap();
    let store = Store::new(pool);
    let hub = Hub::new(store.clone(), vec![]);
    AppState {
        store,
        hub,
        identity_provider: Arc::new(TrustedClaimsIdentityProvider),
        detector_thresholds: DetectorThresholds::default(),
        upstream_resolvers: vec![],
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_requires_no_auth() {
    let app = router(test_state());
    let response = app.oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn unauthenticated_request_is_rejected() {
    let app = router(test_state());
    let response = app.oneshot(Request::builder().uri("/api/v1/networks").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// The first successfully authenticated principal is promoted to
/// administrator, and a network's first peer must be a jump peer —
/// exercised here end to end through the real auth extractor and
/// validation engine, not just their unit tests.
#[tokio::test]
async fn first_user_can_create_a_network_and_its_first_jump_peer() {
    let app = router(test_state());
    let token = bearer_for("admin");

    let create_network = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/networks")
                .header("Authorization", format!("Bearer {token}"))
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "name": "office", "cidr": "10.10.0.0/24", "dns_domain": "mesh.internal" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(create_network.status(), StatusCode::OK);
    let network = body_json(create_network).await;
    let network_id = network["id"].as_i64().unwrap();

    let rejected = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/networks/{network_id}/peers"))
                .header("Authorization", format!("Bearer {token}"))
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "name": "laptop" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);

    let create_jump = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/networks/{network_id}/peers"))
                .header("Authorization", format!("Bearer {token}"))
                .header("Content-Type", "application/json")
                .body(Body::from(
                    json!({
                        "name": "gateway",
                        "is_jump": true,
                        "endpoint": "gateway.example.com:51820",
                        "listen_port": 51820,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(create_jump.status(), StatusCode::OK);
    let created = body_json(create_jump).await;
    assert!(created["enrollment_token"].is_string());
    assert!(created["public_key"].is_string());
    assert!(created.get("private_key").is_none());
}

#[tokio::test]
async fn enrollment_resolve_is_idempotent() {
    let app = router(test_state());
    let token = bearer_for("admin");

    let network = body_json(
        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/v1/networks")
                    .header("Authorization", format!("Bearer {token}"))
                    .header("Content-Type", "application/json")
                    .body(Body::from(json!({ "name": "n", "cidr": "10.20.0.0/24", "dns_domain": "mesh.internal" }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap(),
    )
    .await;
    let network_id = network["id"].as_i64().unwrap();

    let peer = body_json(
        app.clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(format!("/api/v1/networks/{network_id}/peers"))
                    .header("Authorization", format!("Bearer {token}"))
                    .header("Content-Type", "application/json")
                    .body(Body::from(
                        json!({ "name": "gateway", "is_jump": true, "endpoint": "g.example.com:51820", "listen_port": 51820 }).to_string(),
                    ))
                    .unwrap(),
            )
            .await
            .unwrap(),
    )
    .await;
    let enrollment_token = peer["enrollment_token"].as_str().unwrap().to_string();

    for _ in 0..2 {
        let resolved = body_json(
            app.clone()
                .oneshot(
                    Request::builder()
                        .uri(format!("/api/v1/agent/resolve?token={enrollment_token}"))
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(resolved["network_id"].as_i64(), Some(network_id));
        assert!(resolved["config"].as_str().unwrap().starts_with("[Interface]"));
    }
}

#[tokio::test]
async fn second_user_is_not_an_administrator() {
    let app = router(test_state());

    let _ = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/users/me")
                .header("Authorization", format!("Bearer {}", bearer_for("first")))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let second = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/networks")
                .header("Authorization", format!("Bearer {}", bearer_for("second")))
                .header("Content-Type", "application/json")
                .body(Body::from(json!({ "name": "x", "cidr": "10.30.0.0/24", "dns_domain": "mesh.internal" }).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::FORBIDDEN);
}
