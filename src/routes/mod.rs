// Route modules
pub mod auth;
pub mod billing;
pub mod celebration;
pub mod checkout;
pub mod entitlement;

use crate::{app_state::AppState, config::ServerConfig, middleware::logging_middleware};
use axum::{
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
};

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    let server = state.config.server.clone();
    Router::new()
        .nest("/api/v1", api_v1_routes())
        .layer(TimeoutLayer::new(Duration::from_secs(server.request_timeout_secs)))
        .layer(cors_layer(&server))
        .with_state(state)
}

/// API v1 routes
fn api_v1_routes() -> Router<AppState> {
    // Presentation contract: read state, restore, finish the celebration
    let presentation_routes = Router::new()
        .route("/entitlement", get(entitlement::get_entitlement))
        .route("/entitlement/restore", post(entitlement::restore_purchases))
        .route("/celebration/complete", post(celebration::complete_celebration))
        .route("/checkout/return", post(checkout::checkout_return));

    // Billing collaborator pass-throughs (require a session)
    let billing_routes = Router::new()
        .route("/billing/portal", post(billing::customer_portal))
        .route("/billing/checkout", post(billing::create_checkout))
        .route("/billing/trial", post(billing::activate_trial));

    let auth_routes = Router::new().route(
        "/auth/session",
        put(auth::set_session).delete(auth::clear_session),
    );

    // Combine all routes with request/response body logging
    Router::new()
        .merge(presentation_routes)
        .merge(billing_routes)
        .merge(auth_routes)
        .layer(middleware::from_fn(logging_middleware))
}

/// Browser access for the configured UI origins only
fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid allowed origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
}
