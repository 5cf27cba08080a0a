use crate::support::{premium, FakeBilling, PORTAL_URL};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use entitlement_orchestrator::{
    config::{
        AuthConfig, BillingConfig, CheckoutConfig, Config, ReconciliationConfig, ServerConfig,
    },
    routes::create_router,
    services::{orchestrator::RESTORE_CONFIRMATION, session_service::Claims},
    AppState,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use time::OffsetDateTime;
use tower::ServiceExt;
use uuid::Uuid;

const JWT_SECRET: &str = "route-test-secret-with-at-least-32-characters";

fn test_config() -> Config {
    Config {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            allowed_origins: vec!["http://localhost:5173".to_string()],
            request_timeout_secs: 30,
        },
        billing: BillingConfig {
            base_url: "https://billing.example.test".to_string(),
            api_key: None,
            request_timeout_ms: 1_000,
            check_entitlement_path: "/functions/v1/check-subscription".to_string(),
            customer_portal_path: "/functions/v1/customer-portal".to_string(),
            checkout_path: "/functions/v1/create-checkout".to_string(),
            activate_trial_path: "/functions/v1/activate-trial".to_string(),
        },
        auth: AuthConfig {
            jwt_secret: JWT_SECRET.to_string(),
            audience: None,
            leeway_secs: 0,
        },
        reconciliation: ReconciliationConfig::default(),
        checkout: CheckoutConfig::default(),
    }
}

fn app() -> Router {
    let billing = FakeBilling::new(Ok(premium()));
    create_router(AppState::with_billing(test_config(), billing))
}

fn access_token(user_id: Uuid) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        exp: OffsetDateTime::now_utc().unix_timestamp() + 3600,
        aud: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap()
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_entitlement_view_for_signed_out_user() {
    let app = app();

    let (status, body) = send(&app, Method::GET, "/api/v1/entitlement", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["snapshot"]["isPremium"], false);
    assert_eq!(body["data"]["isReconciling"], false);
    assert_eq!(body["data"]["celebrationPhase"], "idle");
    assert_eq!(body["data"]["affirmationIndex"], 0);
}

#[tokio::test]
async fn test_complete_outside_ready_conflicts() {
    let app = app();

    let (status, body) = send(&app, Method::POST, "/api/v1/celebration/complete", None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "CONFLICT");
}

#[tokio::test]
async fn test_session_then_checkout_return() {
    let app = app();
    let user_id = Uuid::new_v4();

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/auth/session",
        Some(json!({ "accessToken": access_token(user_id) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["userId"], user_id.to_string());

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/v1/checkout/return",
        Some(json!({ "location": "/space?checkout=success" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["handled"], true);
    assert_eq!(body["data"]["location"], "/space");

    let (_, body) = send(&app, Method::GET, "/api/v1/entitlement", None).await;
    assert_eq!(body["data"]["snapshot"]["isPremium"], true);

    let (status, body) = send(&app, Method::POST, "/api/v1/billing/portal", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["url"], PORTAL_URL);

    let (status, body) = send(&app, Method::DELETE, "/api/v1/auth/session", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Signed out");
}

#[tokio::test]
async fn test_invalid_access_token_is_rejected() {
    let app = app();

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/auth/session",
        Some(json!({ "accessToken": "definitely-not-a-jwt" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_billing_routes_validate_and_require_session() {
    let app = app();

    let (status, body) = send(&app, Method::POST, "/api/v1/billing/portal", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/billing/trial",
        Some(json!({ "promoCode": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_restore_always_confirms() {
    let app = app();

    let (status, body) = send(&app, Method::POST, "/api/v1/entitlement/restore", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], RESTORE_CONFIRMATION);
}

