use crate::{
    config::BillingConfig,
    error::BillingError,
    models::{
        billing::{RedirectUrl, TrialActivation},
        entitlement::{CheckEntitlementResponse, EntitlementSnapshot},
    },
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument};

/// The external billing source of truth
#[async_trait]
pub trait BillingClient: Send + Sync {
    async fn check_entitlement(&self, access_token: &str)
        -> Result<EntitlementSnapshot, BillingError>;

    async fn open_customer_portal(&self, access_token: &str) -> Result<RedirectUrl, BillingError>;

    async fn create_checkout_session(&self, access_token: &str)
        -> Result<RedirectUrl, BillingError>;

    async fn activate_trial(
        &self,
        access_token: &str,
        promo_code: &str,
    ) -> Result<TrialActivation, BillingError>;
}

/// Billing functions reached over HTTPS with the user's bearer token
pub struct HttpBillingClient {
    config: BillingConfig,
    http_client: reqwest::Client,
}

impl HttpBillingClient {
    pub fn new(config: &BillingConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            config: config.clone(),
            http_client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// POST a JSON body to a billing function and decode the JSON reply
    async fn invoke<T: DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
        body: serde_json::Value,
    ) -> Result<T, BillingError> {
        let mut builder = self
            .http_client
            .post(self.endpoint(path))
            .bearer_auth(access_token)
            .json(&body);

        if let Some(ref api_key) = self.config.api_key {
            builder = builder.header("apikey", api_key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BillingError::TransportOrServer(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BillingError::TransportOrServer(format!("failed to read body: {}", e)))?;

        debug!(path = path, status = status.as_u16(), "Billing function replied");

        if !status.is_success() {
            return Err(classify_failure(status, &text));
        }

        serde_json::from_str(&text)
            .map_err(|e| BillingError::MalformedResponse(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl BillingClient for HttpBillingClient {
    #[instrument(skip(self, access_token))]
    async fn check_entitlement(
        &self,
        access_token: &str,
    ) -> Result<EntitlementSnapshot, BillingError> {
        let response: CheckEntitlementResponse = self
            .invoke(
                &self.config.check_entitlement_path,
                access_token,
                serde_json::json!({}),
            )
            .await?;

        // The check function reports some failures inside a 200 body
        if let Some(message) = response.error.as_deref().filter(|m| !m.is_empty()) {
            return Err(classify_failure(StatusCode::OK, message));
        }

        response
            .into_snapshot()
            .map_err(BillingError::MalformedResponse)
    }

    #[instrument(skip(self, access_token))]
    async fn open_customer_portal(&self, access_token: &str) -> Result<RedirectUrl, BillingError> {
        self.invoke(
            &self.config.customer_portal_path,
            access_token,
            serde_json::json!({}),
        )
        .await
    }

    #[instrument(skip(self, access_token))]
    async fn create_checkout_session(
        &self,
        access_token: &str,
    ) -> Result<RedirectUrl, BillingError> {
        self.invoke(&self.config.checkout_path, access_token, serde_json::json!({}))
            .await
    }

    #[instrument(skip(self, access_token))]
    async fn activate_trial(
        &self,
        access_token: &str,
        promo_code: &str,
    ) -> Result<TrialActivation, BillingError> {
        self.invoke(
            &self.config.activate_trial_path,
            access_token,
            serde_json::json!({ "promoCode": promo_code }),
        )
        .await
    }
}

/// Map a failed billing reply onto the error taxonomy.
///
/// The billing backend answers with 401 or an "auth session missing" message when
/// it has not yet seen the session the client just established.
pub fn classify_failure(status: StatusCode, body: &str) -> BillingError {
    let lowered = body.to_lowercase();
    if status == StatusCode::UNAUTHORIZED
        || lowered.contains("auth session missing")
        || lowered.contains("session not found")
    {
        return BillingError::AuthMissing(truncate(body, 200));
    }

    BillingError::TransportOrServer(format!("status {}: {}", status.as_u16(), truncate(body, 200)))
}

fn truncate(body: &str, max_chars: usize) -> String {
    let body = body.trim();
    if body.chars().count() <= max_chars {
        body.to_string()
    } else {
        let head: String = body.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}
