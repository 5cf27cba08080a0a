use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub billing: BillingConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub reconciliation: ReconciliationConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    // Origins of the UI shell allowed to call the API from a browser
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_server_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BillingConfig {
    pub base_url: String,
    // Sent as the `apikey` header when the functions gateway requires one
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_check_entitlement_path")]
    pub check_entitlement_path: String,
    #[serde(default = "default_customer_portal_path")]
    pub customer_portal_path: String,
    #[serde(default = "default_checkout_path")]
    pub checkout_path: String,
    #[serde(default = "default_activate_trial_path")]
    pub activate_trial_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    #[serde(default)]
    pub audience: Option<String>, // e.g. "authenticated"
    #[serde(default = "default_leeway_secs")]
    pub leeway_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconciliationConfig {
    pub poll_interval_secs: u64,
    pub auth_retry_attempts: u32,
    pub auth_retry_delay_ms: u64,
    pub session_wait_poll_ms: u64,
    pub session_wait_timeout_secs: u64,
}

impl Default for ReconciliationConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            auth_retry_attempts: 3,
            auth_retry_delay_ms: 2000,
            session_wait_poll_ms: 1000,
            session_wait_timeout_secs: 30,
        }
    }
}

impl ReconciliationConfig {
    /// Reject values that would stall polling
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(config::ConfigError::Message(
                "reconciliation.poll_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.session_wait_poll_ms == 0 {
            return Err(config::ConfigError::Message(
                "reconciliation.session_wait_poll_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    // Never zero: tokio intervals panic on a zero period
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn session_wait_poll(&self) -> Duration {
        Duration::from_millis(self.session_wait_poll_ms.max(1))
    }

    pub fn session_wait_timeout(&self) -> Duration {
        Duration::from_secs(self.session_wait_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckoutConfig {
    pub marker_param: String,
    pub marker_value: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            marker_param: "checkout".to_string(),
            marker_value: "success".to_string(),
        }
    }
}

fn default_server_request_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_check_entitlement_path() -> String {
    "/functions/v1/check-subscription".to_string()
}

fn default_customer_portal_path() -> String {
    "/functions/v1/customer-portal".to_string()
}

fn default_checkout_path() -> String {
    "/functions/v1/create-checkout".to_string()
}

fn default_activate_trial_path() -> String {
    "/functions/v1/activate-trial".to_string()
}

fn default_leeway_secs() -> u64 {
    30
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for environment variable overrides)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::File::with_name("config").required(true))
            // Allow environment variables to override config file
            .add_source(
                config::Environment::with_prefix("ENTITLEMENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.reconciliation.validate()?;
        Ok(config)
    }
}
