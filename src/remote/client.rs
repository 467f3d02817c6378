// Tollgate — clientIdSecrets HTTP client
//
// Blocking reqwest client authenticated with the organization's bearer
// token. Responses are owned values: every early return drops (and so
// closes) the response before the error propagates.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::store::OrgConfig;

use super::RemoteError;

const SECRETS_PATH: &str = "/v2/clientIdSecrets";
const USER_AGENT: &str = concat!("tollgate/", env!("CARGO_PKG_VERSION"));

// ─── Types ───────────────────────────────────────────────────────────────────

/// Token as returned by the issuing endpoint.
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedToken {
    pub client_id: String,
    pub secret: String,
    #[serde(default)]
    pub org_id: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub token: String,
    #[serde(default)]
    pub generated_on: String,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("client_id", &self.client_id)
            .field("secret", &"[REDACTED]")
            .field("org_id", &self.org_id)
            .field("roles", &self.roles)
            .field("token", &"[REDACTED]")
            .field("generated_on", &self.generated_on)
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct IssueRequest<'a> {
    roles: [&'a str; 1],
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// The two remote operations the lifecycle engine relies on.
pub trait TokenApi: Send + Sync {
    /// Issue a new token bound to the remote role `role_id`.
    fn issue(&self, role_id: &str) -> Result<IssuedToken, RemoteError>;

    /// Delete the token identified by `client_id`.
    /// Succeeds only when the API answers 204 No Content.
    fn delete(&self, client_id: &str) -> Result<(), RemoteError>;
}

/// Builds a `TokenApi` for an organization config.
pub trait ClientFactory: Send + Sync {
    fn build(&self, config: &OrgConfig) -> Result<Arc<dyn TokenApi>, RemoteError>;
}

// ─── HTTP Implementation ─────────────────────────────────────────────────────

pub struct HttpTokenClient {
    base_url: String,
    auth_token: Zeroizing<String>,
    http: reqwest::blocking::Client,
}

impl HttpTokenClient {
    /// Create a client for `config`, bounding every call by `timeout`.
    pub fn new(config: &OrgConfig, timeout: Duration) -> Result<Self, RemoteError> {
        if config.auth_token().trim().is_empty() {
            return Err(RemoteError::InvalidConfig(
                "auth token was not defined".to_string(),
            ));
        }
        if config.url.trim().is_empty() {
            return Err(RemoteError::InvalidConfig(
                "client URL was not defined".to_string(),
            ));
        }

        let http = reqwest::blocking::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            auth_token: Zeroizing::new(config.auth_token().to_string()),
            http,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.base_url, SECRETS_PATH)
    }
}

impl TokenApi for HttpTokenClient {
    fn issue(&self, role_id: &str) -> Result<IssuedToken, RemoteError> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(self.auth_token.as_str())
            .json(&IssueRequest { roles: [role_id] })
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "unable to read response body".to_string());
            tracing::warn!(status = status.as_u16(), "Token issuance rejected upstream");
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token: IssuedToken = response
            .json()
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        tracing::debug!(client_id = %token.client_id, "Token issued upstream");
        Ok(token)
    }

    fn delete(&self, client_id: &str) -> Result<(), RemoteError> {
        let response = self
            .http
            .delete(format!("{}/{}", self.endpoint(), client_id))
            .bearer_auth(self.auth_token.as_str())
            .send()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::NO_CONTENT {
            let body = response.text().unwrap_or_default();
            tracing::warn!(
                client_id = %client_id,
                status = status.as_u16(),
                "Token deletion not confirmed upstream"
            );
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(client_id = %client_id, "Token deleted upstream");
        Ok(())
    }
}

/// Production factory: one `HttpTokenClient` per organization.
#[derive(Debug, Clone)]
pub struct HttpClientFactory {
    timeout: Duration,
}

impl HttpClientFactory {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ClientFactory for HttpClientFactory {
    fn build(&self, config: &OrgConfig) -> Result<Arc<dyn TokenApi>, RemoteError> {
        Ok(Arc::new(HttpTokenClient::new(config, self.timeout)?))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
