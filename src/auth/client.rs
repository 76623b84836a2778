use async_trait::async_trait;
use poise::serenity_prelude::UserId;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::debug;

use crate::auth::{AuthResult, StudentType};
use crate::error::{BotError, Result};

/// How many identity-service calls may be in flight at once. A burst of
/// joins must not exhaust connections to the service.
const MAX_IN_FLIGHT: usize = 8;

/// The external identity service, as consumed by the verification core.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Get a sign-in link for a member to authenticate themselves with
    async fn generate_auth_link(&self, user: UserId) -> Result<String>;

    /// Authoritatively check whether a member holds a credential that
    /// satisfies `student_type`. A denial from the service is a normal
    /// `authenticated: false` outcome, never an error.
    async fn check_authenticated(&self, user: UserId, student_type: StudentType)
        -> Result<AuthResult>;
}

/// HTTP client for the identity-verification service.
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    limiter: Semaphore,
}

#[derive(Deserialize)]
struct LinkResponse {
    link: String,
}

#[derive(Deserialize)]
struct VerifyResponse {
    code: String,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            limiter: Semaphore::new(MAX_IN_FLIGHT),
        }
    }

    /// Build a client from the AUTH_API_URL environment variable
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("AUTH_API_URL").map_err(|_| BotError::MissingEnv {
            name: "AUTH_API_URL".to_string(),
        })?;
        Ok(Self::new(base_url.trim_end_matches('/')))
    }

    async fn permit(&self) -> Result<tokio::sync::SemaphorePermit<'_>> {
        self.limiter.acquire().await.map_err(|e| BotError::Internal {
            message: format!("identity service limiter closed: {}", e),
        })
    }
}

#[async_trait]
impl Authenticator for AuthClient {
    async fn generate_auth_link(&self, user: UserId) -> Result<String> {
        let _permit = self.permit().await?;

        let response = self
            .http
            .get(format!("{}/auth-link/{}", self.base_url, user))
            .send()
            .await?
            .error_for_status()?;

        let body: LinkResponse = response.json().await?;
        debug!("Generated auth link for user {}", user);
        Ok(body.link)
    }

    async fn check_authenticated(
        &self,
        user: UserId,
        student_type: StudentType,
    ) -> Result<AuthResult> {
        let _permit = self.permit().await?;

        let response = self
            .http
            .get(format!("{}/verify/{}", self.base_url, user))
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            // The service's own business-logic rejection, not an operational error
            return Ok(AuthResult::denied());
        }
        if !status.is_success() {
            return Err(BotError::AuthService {
                message: format!("verify-auth returned {} for user {}", status, user),
            });
        }

        let body: VerifyResponse = response.json().await?;
        Ok(student_type.evaluate(&body.code))
    }
}
