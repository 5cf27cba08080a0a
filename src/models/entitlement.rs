use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::celebration::CelebrationPhase;

/// Entitlement state as reported by the billing source of truth.
///
/// Replaced wholesale on every reconciliation; never patched field by field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSnapshot {
    pub is_premium: bool,
    /// One-time purchase variant of premium
    pub is_lifetime: bool,
    // Trial fields only carry meaning when `is_lifetime` is false
    pub is_trial: bool,
    pub trial_days_remaining: Option<i32>,
    pub trial_expired: bool,
    /// Renewal/expiry marker, display only
    #[serde(with = "time::serde::rfc3339::option")]
    pub subscription_period_end: Option<OffsetDateTime>,
}

impl EntitlementSnapshot {
    /// The all-false snapshot used when no authenticated session exists
    pub fn signed_out() -> Self {
        Self::default()
    }

    /// Premium snapshot used for the optimistic checkout flip
    pub fn premium() -> Self {
        Self {
            is_premium: true,
            ..Self::default()
        }
    }

    pub fn has_active_trial(&self) -> bool {
        !self.is_lifetime && self.is_trial && !self.trial_expired
    }
}

/// Session-scoped entitlement state, as seen by readers of the store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementSessionState {
    pub snapshot: EntitlementSnapshot,
    /// Set once the first reconciliation of the session has settled.
    /// Existing premium users are never celebrated before this flips.
    pub has_completed_initial_check: bool,
    pub is_reconciling: bool,
}

/// Raw body of the billing "check entitlement" endpoint
#[derive(Debug, Deserialize)]
pub struct CheckEntitlementResponse {
    #[serde(default, alias = "isPremium")]
    pub subscribed: bool,
    #[serde(default, alias = "isLifetime")]
    pub is_lifetime: bool,
    #[serde(default, alias = "isTrial")]
    pub is_trial: bool,
    #[serde(default, alias = "trialDaysRemaining")]
    pub trial_days_remaining: Option<i32>,
    #[serde(default, alias = "trialExpired")]
    pub trial_expired: bool,
    #[serde(default, alias = "subscriptionEnd")]
    pub subscription_end: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl CheckEntitlementResponse {
    /// Convert the wire body into a snapshot; an unparsable period end is rejected
    pub fn into_snapshot(self) -> Result<EntitlementSnapshot, String> {
        let subscription_period_end = match self.subscription_end.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(
                OffsetDateTime::parse(raw, &time::format_description::well_known::Rfc3339)
                    .map_err(|e| format!("invalid subscription_end {:?}: {}", raw, e))?,
            ),
        };

        Ok(EntitlementSnapshot {
            is_premium: self.subscribed,
            is_lifetime: self.is_lifetime,
            is_trial: self.is_trial,
            trial_days_remaining: self.trial_days_remaining,
            trial_expired: self.trial_expired,
            subscription_period_end,
        })
    }
}

/// Everything the presentation layer reads in one response
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementView {
    pub snapshot: EntitlementSnapshot,
    pub is_reconciling: bool,
    pub has_completed_initial_check: bool,
    pub celebration_phase: CelebrationPhase,
    pub affirmation_index: u8,
}
