use serde::{Deserialize, Serialize};
use validator::Validate;

/// Redirect target returned by the customer portal and checkout endpoints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedirectUrl {
    pub url: String,
}

/// Result of a promo-code trial activation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialActivation {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// POST /billing/trial body
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ActivateTrialRequest {
    #[validate(length(min = 1, max = 64))]
    pub promo_code: String,
}

/// POST /checkout/return body
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReturnRequest {
    #[validate(length(min = 1, max = 2048))]
    pub location: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutReturnData {
    /// Whether the checkout-success marker was present
    pub handled: bool,
    /// Location the client should display (marker stripped when handled)
    pub location: String,
}

/// PUT /auth/session body
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequest {
    #[validate(length(min = 10, max = 8192))]
    pub access_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub user_id: String,
    pub expires_at: i64,
}
