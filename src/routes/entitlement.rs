use axum::{extract::State, Json};
use tracing::instrument;

use crate::{
    app_state::AppState,
    models::{
        common::{DataResponse, MessageResponse},
        entitlement::EntitlementView,
    },
};

/// GET /api/v1/entitlement
pub async fn get_entitlement(State(state): State<AppState>) -> Json<DataResponse<EntitlementView>> {
    Json(DataResponse::ok(state.orchestrator.view()))
}

/// POST /api/v1/entitlement/restore
///
/// Answers with the same confirmation whether or not anything changed.
#[instrument(skip(state))]
pub async fn restore_purchases(State(state): State<AppState>) -> Json<MessageResponse> {
    let message = state.orchestrator.restore_purchases().await;
    Json(MessageResponse::new(message))
}
