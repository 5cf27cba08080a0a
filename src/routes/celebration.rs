use axum::{extract::State, Json};
use tracing::instrument;

use crate::{
    app_state::AppState,
    error::Result,
    models::{common::DataResponse, entitlement::EntitlementView},
};

/// POST /api/v1/celebration/complete
///
/// 409 unless the celebration is showing its final phase.
#[instrument(skip(state))]
pub async fn complete_celebration(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<EntitlementView>>> {
    state.orchestrator.complete_celebration()?;
    Ok(Json(DataResponse::ok(state.orchestrator.view())))
}
