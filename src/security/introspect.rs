//! Remote token introspection

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Default token-info endpoint of the assistant's identity provider
pub const DEFAULT_TOKENINFO_URL: &str = "https://api.amazon.com/auth/O2/tokeninfo";

/// Result of a successful introspection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    /// Client id the token was issued to
    pub audience: String,
    /// Remaining validity
    pub expires_in: Duration,
}

/// Validates bearer tokens against an identity provider
#[async_trait]
pub trait TokenIntrospector: Send + Sync {
    /// Introspect `token`
    ///
    /// # Errors
    ///
    /// Returns error if the token is unknown, expired or the call fails
    async fn introspect(&self, token: &str) -> Result<TokenInfo>;
}

#[derive(Debug, Deserialize)]
struct TokenInfoResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    aud: Option<String>,
    #[serde(default)]
    exp: Option<u64>,
}

/// Introspector calling the token-info HTTP endpoint
pub struct HttpIntrospector {
    client: reqwest::Client,
    url: String,
}

impl HttpIntrospector {
    /// Create an introspector for `url` with a request timeout
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl TokenIntrospector for HttpIntrospector {
    async fn introspect(&self, token: &str) -> Result<TokenInfo> {
        let url = format!("{}?access_token={}", self.url, urlencoding::encode(token));
        let response = self.client.get(&url).send().await.map_err(|e| {
            tracing::error!(error = %e, "token introspection request failed");
            e
        })?;

        // the endpoint answers rejected tokens with 400 and a JSON error body
        let status = response.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::BAD_REQUEST {
            return Err(Error::Auth(format!("token introspection failed: {status}")));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !content_type.starts_with("application/json") {
            return Err(Error::Auth(format!(
                "expected application/json but received {content_type}"
            )));
        }

        let body: TokenInfoResponse = response.json().await?;
        if let Some(error) = body.error {
            return Err(Error::Auth(format!(
                "client not authorized: {error} {}",
                body.error_description.unwrap_or_default()
            )));
        }

        let audience = body
            .aud
            .ok_or_else(|| Error::Auth("token info without audience".to_string()))?;
        Ok(TokenInfo {
            audience,
            expires_in: Duration::from_secs(body.exp.unwrap_or_default()),
        })
    }
}
