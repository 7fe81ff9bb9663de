use std::fmt;
use std::future::Future;
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tokio::sync::Mutex;

use crate::Error;
use crate::classify::classify;

/// Tokens expiring within this window are refreshed ahead of time.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// An OAuth 2.0 bearer token.
#[derive(Clone)]
pub struct AccessToken {
    secret: String,
    expires_at: Option<SystemTime>,
}

impl AccessToken {
    /// Creates a token expiring at `expires_at`, or never if `None`.
    pub fn new(secret: impl Into<String>, expires_at: Option<SystemTime>) -> Self {
        Self {
            secret: secret.into(),
            expires_at,
        }
    }

    /// Returns the token value for the `Authorization` header.
    pub fn as_str(&self) -> &str {
        &self.secret
    }

    /// Returns when the token expires.
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    /// Returns `true` if the token can still be used for a while.
    pub fn is_fresh(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => SystemTime::now() + EXPIRY_SKEW < expires_at,
            None => true,
        }
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"[redacted]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Successful response of a token endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl From<TokenResponse> for AccessToken {
    fn from(response: TokenResponse) -> Self {
        let expires_at = response
            .expires_in
            .map(|secs| SystemTime::now() + Duration::from_secs(secs));
        AccessToken::new(response.access_token, expires_at)
    }
}

/// Error response of an OAuth 2.0 token endpoint.
#[derive(Debug, Deserialize)]
struct OAuthError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Sends a token request and parses the token from the response.
///
/// OAuth errors such as `invalid_grant` become [`Error::InvalidCredentials`]; other failures are
/// classified like any storage response.
pub(crate) async fn fetch_token(request: reqwest::RequestBuilder) -> crate::Result<AccessToken> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        let token: TokenResponse = response.json().await?;
        return Ok(token.into());
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    let body = response.bytes().await?;
    tracing::debug!(%status, body = %String::from_utf8_lossy(&body), "token request failed");

    if let Ok(oauth) = serde_json::from_slice::<OAuthError>(&body) {
        let message = match oauth.error_description {
            Some(description) => format!("{}: {description}", oauth.error),
            None => oauth.error,
        };
        return Err(Error::InvalidCredentials { message });
    }

    Err(classify(status, content_type.as_deref(), &body))
}

/// Caches the current access token of a credential.
#[derive(Debug, Default)]
pub(crate) struct TokenCache(Mutex<Option<AccessToken>>);

impl TokenCache {
    /// Creates a cache holding `token`.
    pub fn with_token(token: AccessToken) -> Self {
        Self(Mutex::new(Some(token)))
    }

    /// Returns the cached token, fresh or not.
    pub async fn peek(&self) -> Option<AccessToken> {
        self.0.lock().await.clone()
    }

    /// Returns the cached token if it is fresh, otherwise obtains and caches a new one.
    ///
    /// Concurrent callers wait for a single refresh.
    pub async fn get_or_refresh<F, Fut>(&self, refresh: F) -> crate::Result<AccessToken>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = crate::Result<AccessToken>>,
    {
        let mut guard = self.0.lock().await;
        if let Some(token) = guard.as_ref().filter(|token| token.is_fresh()) {
            return Ok(token.clone());
        }

        tracing::debug!("refreshing access token");
        let token = refresh().await?;
        *guard = Some(token.clone());
        Ok(token)
    }
}
