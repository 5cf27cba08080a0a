use axum::{extract::State, Json};
use tracing::instrument;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    models::{
        billing::{ActivateTrialRequest, RedirectUrl, TrialActivation},
        common::DataResponse,
    },
};

/// POST /api/v1/billing/portal
#[instrument(skip(state))]
pub async fn customer_portal(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<RedirectUrl>>> {
    let redirect = state.orchestrator.open_customer_portal().await?;
    Ok(Json(DataResponse::ok(redirect)))
}

/// POST /api/v1/billing/checkout
#[instrument(skip(state))]
pub async fn create_checkout(
    State(state): State<AppState>,
) -> Result<Json<DataResponse<RedirectUrl>>> {
    let redirect = state.orchestrator.create_checkout_session().await?;
    Ok(Json(DataResponse::ok(redirect)))
}

/// POST /api/v1/billing/trial
#[instrument(skip(state, request))]
pub async fn activate_trial(
    State(state): State<AppState>,
    Json(request): Json<ActivateTrialRequest>,
) -> Result<Json<DataResponse<TrialActivation>>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let activation = state.orchestrator.activate_trial(&request.promo_code).await?;
    Ok(Json(DataResponse::ok(activation)))
}
