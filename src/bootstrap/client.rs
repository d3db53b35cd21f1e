use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::messages::{Analysis, CreatedSession, Envelope, ErrorBody, InterviewConfig};

const INSUFFICIENT_CREDITS_MESSAGE: &str =
    "You do not have enough tokens. Please purchase more tokens or upgrade your plan.";
const UNAUTHENTICATED_MESSAGE: &str = "Authentication required. Please sign in again.";

/// Failures talking to the interview backend
///
/// Credit and auth failures are terminal for the session and are never
/// retried automatically; everything else may be retried by the user.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("{message}")]
    InsufficientCredits { message: String },

    #[error("{message}")]
    Unauthenticated { message: String },

    #[error("{message}")]
    Failed { status: Option<u16>, message: String },
}

impl BackendError {
    pub fn status(&self) -> Option<u16> {
        match self {
            BackendError::InsufficientCredits { .. } => Some(402),
            BackendError::Unauthenticated { .. } => Some(401),
            BackendError::Failed { status, .. } => *status,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            BackendError::InsufficientCredits { message }
            | BackendError::Unauthenticated { message }
            | BackendError::Failed { message, .. } => message,
        }
    }

    fn transport(e: reqwest::Error) -> Self {
        BackendError::Failed {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

#[async_trait::async_trait]
pub trait InterviewBackend: Send + Sync {
    /// Create a backend session. Billable: callers must not duplicate it.
    async fn create_session(&self, config: &InterviewConfig) -> Result<CreatedSession, BackendError>;

    async fn fetch_analysis(&self, session_id: &str) -> Result<Analysis, BackendError>;
}

/// REST client for the interview backend
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    auth_token: Option<String>,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(base_url: &str, auth_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token,
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/voice-interview/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_envelope<T: DeserializeOwned>(
        response: reqwest::Response,
        what: &str,
    ) -> Result<T, BackendError> {
        let status = response.status();

        if !status.is_success() {
            let body = response.json::<ErrorBody>().await.unwrap_or_default();
            return Err(classify(status, body.error, what));
        }

        let envelope = response
            .json::<Envelope<T>>()
            .await
            .map_err(BackendError::transport)?;

        match envelope.data {
            Some(data) if envelope.success => Ok(data),
            _ => Err(BackendError::Failed {
                status: None,
                message: envelope
                    .error
                    .unwrap_or_else(|| format!("{} failed: empty response", what)),
            }),
        }
    }
}

fn classify(status: StatusCode, error: Option<String>, what: &str) -> BackendError {
    match status {
        StatusCode::PAYMENT_REQUIRED => BackendError::InsufficientCredits {
            message: error.unwrap_or_else(|| INSUFFICIENT_CREDITS_MESSAGE.to_string()),
        },
        StatusCode::UNAUTHORIZED => BackendError::Unauthenticated {
            message: error.unwrap_or_else(|| UNAUTHENTICATED_MESSAGE.to_string()),
        },
        other => BackendError::Failed {
            status: Some(other.as_u16()),
            message: error.unwrap_or_else(|| format!("{} failed: {}", what, other.as_u16())),
        },
    }
}

#[async_trait::async_trait]
impl InterviewBackend for HttpBackend {
    async fn create_session(&self, config: &InterviewConfig) -> Result<CreatedSession, BackendError> {
        info!(
            "Creating interview session: {} ({}) for {}",
            config.job_role, config.interview_type, config.user_id
        );

        let response = self
            .authorize(self.client.post(self.url("create")))
            .json(config)
            .send()
            .await
            .map_err(BackendError::transport)?;

        let created: CreatedSession =
            Self::read_envelope(response, "Create voice interview").await?;

        if created.session_id.is_empty() {
            warn!("Backend accepted the request but returned no session id");
            return Err(BackendError::Failed {
                status: None,
                message: "Create voice interview failed: missing session id".to_string(),
            });
        }

        info!(
            "Interview session created: {} ({} questions)",
            created.session_id, created.total_questions
        );
        Ok(created)
    }

    async fn fetch_analysis(&self, session_id: &str) -> Result<Analysis, BackendError> {
        debug!("Fetching analysis for {}", session_id);

        let response = self
            .authorize(self.client.get(self.url(&format!("{}/analysis", session_id))))
            .send()
            .await
            .map_err(BackendError::transport)?;

        Self::read_envelope(response, "Get voice interview analysis").await
    }
}
