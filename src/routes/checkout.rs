use axum::{extract::State, Json};
use tracing::instrument;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    models::{
        billing::{CheckoutReturnData, CheckoutReturnRequest},
        common::DataResponse,
    },
    services::navigation::{InMemoryNavigator, Navigator},
};

/// POST /api/v1/checkout/return
///
/// The client reports the location it landed on; the response carries the
/// location it should switch to.
#[instrument(skip(state, request))]
pub async fn checkout_return(
    State(state): State<AppState>,
    Json(request): Json<CheckoutReturnRequest>,
) -> Result<Json<DataResponse<CheckoutReturnData>>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let navigator = InMemoryNavigator::new(request.location);
    let handled = state.orchestrator.handle_checkout_return(&navigator);

    Ok(Json(DataResponse::ok(CheckoutReturnData {
        handled,
        location: navigator.current_location(),
    })))
}
