use crate::{
    config::AuthConfig,
    error::{ApiError, Result},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use time::OffsetDateTime;
use tokio::sync::watch;
use uuid::Uuid;

/// An authenticated user session, as supplied by the auth collaborator
#[derive(Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub access_token: String,
    pub expires_at: OffsetDateTime,
}

impl AuthSession {
    pub fn new(user_id: Uuid, access_token: impl Into<String>, expires_at: OffsetDateTime) -> Self {
        Self {
            user_id,
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn is_valid_at(&self, now: OffsetDateTime) -> bool {
        !self.access_token.is_empty() && self.expires_at > now
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(OffsetDateTime::now_utc())
    }

    /// Short, log-safe identifier for the access token
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.access_token.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..12].to_string()
    }
}

// Keep the raw token out of logs and panics
impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("user_id", &self.user_id)
            .field("token", &self.fingerprint())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of the current session and of session-change notifications
pub trait AuthProvider: Send + Sync {
    fn current_session(&self) -> Option<AuthSession>;

    fn subscribe(&self) -> watch::Receiver<Option<AuthSession>>;
}

/// In-process session holder fed by the host application
pub struct SessionHub {
    tx: watch::Sender<Option<AuthSession>>,
}

impl Default for SessionHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHub {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx }
    }

    /// Publish a new session, or `None` on logout
    pub fn set_session(&self, session: Option<AuthSession>) {
        self.tx.send_replace(session);
    }
}

impl AuthProvider for SessionHub {
    fn current_session(&self) -> Option<AuthSession> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<AuthSession>> {
        self.tx.subscribe()
    }
}

/// Access token claims the orchestrator relies on
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user_id)
    pub sub: String,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
}

/// Verifies bearer access tokens issued by the auth backend
pub struct SessionService {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl SessionService {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = config.leeway_secs;
        match config.audience {
            Some(ref audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }

    /// Validate an access token and turn it into a session
    pub fn authenticate(&self, access_token: &str) -> Result<AuthSession> {
        let token_data = decode::<Claims>(access_token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => ApiError::ExpiredToken,
                _ => ApiError::InvalidToken(e.to_string()),
            })?;

        let claims = token_data.claims;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|e| ApiError::InvalidToken(format!("Invalid user_id: {}", e)))?;
        let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp)
            .map_err(|e| ApiError::InvalidToken(format!("Invalid exp: {}", e)))?;

        Ok(AuthSession::new(user_id, access_token, expires_at))
    }
}
