#![allow(clippy::unwrap_used)]

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header::CONTENT_TYPE},
};
use carekey::{
    api::{self, ApiState},
    codes::{AccessCodeManager, CodeScope, GenerateOptions, InMemoryCodeStore},
    crypto::{EncryptionService, KeyRing},
    profile::{InMemoryProfileStore, Profile},
    rate_limit::InMemoryRateLimiter,
};
use chrono::NaiveDate;
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

const KEY_SPEC: &str = "2026-10:AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

struct TestApp {
    router: Router,
    code: String,
    owner_id: Uuid,
    document: Uuid,
}

async fn test_app() -> TestApp {
    let profiles = Arc::new(InMemoryProfileStore::new());
    let owner_id = Uuid::new_v4();
    profiles
        .upsert(Profile {
            owner_id,
            last_name: "Müller".into(),
            first_name: "Anna Lena".into(),
            birth_date: NaiveDate::from_ymd_opt(1958, 2, 27).unwrap(),
        })
        .unwrap();

    let manager = AccessCodeManager::new(
        Arc::new(InMemoryCodeStore::new()),
        profiles,
        Arc::new(InMemoryRateLimiter::default()),
    );
    let document = Uuid::new_v4();
    let code = manager
        .generate(
            owner_id,
            CodeScope::Institution,
            &GenerateOptions::for_document(document),
        )
        .await
        .unwrap();

    let key_ring = KeyRing::from_specs(&[KEY_SPEC.to_string()], "2026-10", None).unwrap();
    let state = Arc::new(ApiState {
        manager,
        encryption: Arc::new(EncryptionService::new(Arc::new(key_ring))),
        pool: None,
    });

    TestApp {
        router: api::app(state),
        code: code.code,
        owner_id,
        document,
    }
}

async fn post_validate(router: &Router, body: Value, client: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/access/validate")
        .header(CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn grants_with_matching_identity() {
    let app = test_app().await;

    let (status, body) = post_validate(
        &app.router,
        json!({
            "code": app.code.to_lowercase(),
            "lastName": "muller",
            "firstName": "Anna",
            "birthDate": "1958-02-27"
        }),
        "203.0.113.10",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["granted"], json!(true));
    assert_eq!(body["ownerId"], json!(app.owner_id));
    assert_eq!(body["documentRef"], json!(app.document));
    assert!(body.get("denyReason").is_none());
}

#[tokio::test]
async fn denials_share_one_public_reason() {
    let app = test_app().await;

    let (unknown_status, unknown) = post_validate(
        &app.router,
        json!({ "code": "ZZZZ9999" }),
        "203.0.113.20",
    )
    .await;
    let (mismatch_status, mismatch) = post_validate(
        &app.router,
        json!({
            "code": app.code,
            "lastName": "Muller",
            "firstName": "Anna",
            "birthDate": "1958-02-28"
        }),
        "203.0.113.21",
    )
    .await;

    assert_eq!(unknown_status, StatusCode::FORBIDDEN);
    assert_eq!(mismatch_status, StatusCode::FORBIDDEN);
    assert_eq!(unknown["denyReason"], json!("invalid_or_expired"));
    assert_eq!(mismatch["denyReason"], json!("invalid_or_expired"));
    assert_eq!(unknown["remainingAttempts"], json!(4));
}

#[tokio::test]
async fn locks_out_after_repeated_failures() {
    let app = test_app().await;
    let client = "198.51.100.7";

    for _ in 0..4 {
        let (status, _) =
            post_validate(&app.router, json!({ "code": "ZZZZ9999" }), client).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/access/validate")
        .header(CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", client)
        .body(Body::from(json!({ "code": "ZZZZ9999" }).to_string()))
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        response
            .headers()
            .get("retry-after")
            .and_then(|value| value.to_str().ok()),
        Some("1800")
    );

    // The correct code is refused while the client is locked out.
    let (status, body) = post_validate(&app.router, json!({ "code": app.code }), client).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["denyReason"], json!("rate_limited"));
    assert!(body["lockoutMinutes"].as_u64().is_some_and(|minutes| minutes >= 29));

    // Other clients are unaffected.
    let (status, _) =
        post_validate(&app.router, json!({ "code": app.code }), "198.51.100.8").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn body_identifier_does_not_reset_the_counter() {
    let app = test_app().await;
    let client = "198.51.100.30";

    let mut statuses = Vec::new();
    for i in 0..6 {
        let (status, _) = post_validate(
            &app.router,
            json!({ "code": "ZZZZ9999", "clientIdentifier": format!("kiosk-{i}") }),
            client,
        )
        .await;
        statuses.push(status);
    }

    assert_eq!(statuses[..4], [StatusCode::FORBIDDEN; 4]);
    assert_eq!(statuses[4], StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn missing_payload_is_bad_request() {
    let app = test_app().await;

    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/access/validate")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_key_ring_without_database() {
    let app = test_app().await;

    let request = Request::builder()
        .method(Method::GET)
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));
    assert!(response.headers().contains_key("x-request-id"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["database"], json!("disabled"));
    assert_eq!(body["activeKeyId"], json!("2026-10"));
}

#[tokio::test]
async fn health_options_has_empty_body() {
    let app = test_app().await;

    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.is_empty());
}
