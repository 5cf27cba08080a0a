use axum::{extract::State, Json};
use tracing::{info, instrument};
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    models::{
        billing::{SessionData, SessionRequest},
        common::{DataResponse, MessageResponse},
    },
};

/// PUT /api/v1/auth/session
///
/// The host app hands over the access token of the signed-in user.
#[instrument(skip(state, request))]
pub async fn set_session(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<DataResponse<SessionData>>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let session = state.session_service.authenticate(&request.access_token)?;
    let data = SessionData {
        user_id: session.user_id.to_string(),
        expires_at: session.expires_at.unix_timestamp(),
    };

    info!(user_id = %session.user_id, token = %session.fingerprint(), "Session updated");
    state.session_hub.set_session(Some(session));

    Ok(Json(DataResponse::ok(data)))
}

/// DELETE /api/v1/auth/session
#[instrument(skip(state))]
pub async fn clear_session(State(state): State<AppState>) -> Json<MessageResponse> {
    state.session_hub.set_session(None);
    info!("Session cleared");
    Json(MessageResponse::new("Signed out"))
}
