use std::fmt;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use serde::Deserialize;
use url::Url;

use super::token::{AccessToken, TokenCache, fetch_token};
use crate::Error;

/// The persisted form of user OAuth credentials.
///
/// ```json
/// {
///   "access_token": "ya29.a0Af...",
///   "client_id": "1234.apps.googleusercontent.com",
///   "client_secret": "...",
///   "refresh_token": "1//0g...",
///   "token_expiry": "2024-05-01T12:00:00Z",
///   "token_uri": "https://oauth2.googleapis.com/token"
/// }
/// ```
#[derive(Deserialize)]
struct StoredToken {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_expiry: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    token_uri: Option<Url>,
    #[serde(default)]
    invalid: bool,
}

struct RefreshGrant {
    refresh_token: String,
    client_id: String,
    client_secret: String,
    token_uri: Url,
}

/// User credentials loaded from a stored OAuth token file.
pub struct StoredTokenCredential {
    refresh: Option<RefreshGrant>,
    cache: TokenCache,
}

impl StoredTokenCredential {
    /// Loads the credential from the token file at `path`.
    ///
    /// `default_token_uri` is used when the file does not name a token endpoint.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::Authorization`] if the file does not exist, is empty, is marked invalid
    /// or cannot be parsed.
    pub async fn load(path: &Path, default_token_uri: &Url) -> crate::Result<Self> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(error) if error.kind() == io::ErrorKind::NotFound => String::new(),
            Err(error) => return Err(error.into()),
        };

        if contents.trim().is_empty() {
            return Err(Error::Authorization {
                message: "No credential file present".into(),
            });
        }

        let stored: StoredToken =
            serde_json::from_str(&contents).map_err(|error| Error::Authorization {
                message: format!("Invalid credential file {}: {error}", path.display()),
            })?;

        if stored.invalid {
            return Err(Error::Authorization {
                message: format!("Credential file {} is marked invalid", path.display()),
            });
        }

        Self::from_stored(stored, default_token_uri)
    }

    fn from_stored(stored: StoredToken, default_token_uri: &Url) -> crate::Result<Self> {
        let expires_at = match stored.token_expiry.as_deref() {
            Some(expiry) => Some(humantime::parse_rfc3339_weak(expiry).map_err(|error| {
                Error::Authorization {
                    message: format!("Invalid token expiry {expiry:?}: {error}"),
                }
            })?),
            None => None,
        };

        let refresh = match (stored.refresh_token, stored.client_id, stored.client_secret) {
            (Some(refresh_token), Some(client_id), Some(client_secret)) => Some(RefreshGrant {
                refresh_token,
                client_id,
                client_secret,
                token_uri: stored
                    .token_uri
                    .unwrap_or_else(|| default_token_uri.clone()),
            }),
            _ => None,
        };

        let cache = match stored.access_token {
            Some(access_token) => TokenCache::with_token(AccessToken::new(access_token, expires_at)),
            None if refresh.is_some() => TokenCache::default(),
            None => {
                return Err(Error::Authorization {
                    message: "Credential file holds neither an access nor a refresh token".into(),
                });
            }
        };

        Ok(Self { refresh, cache })
    }

    /// Returns when the currently held token expires.
    pub async fn expires_at(&self) -> Option<SystemTime> {
        self.cache.peek().await.and_then(|token| token.expires_at())
    }

    pub(crate) async fn access_token(&self, http: &reqwest::Client) -> crate::Result<AccessToken> {
        self.cache
            .get_or_refresh(|| async {
                let Some(grant) = &self.refresh else {
                    return Err(Error::Authorization {
                        message: "Stored access token expired and cannot be refreshed".into(),
                    });
                };

                let request = http.post(grant.token_uri.clone()).form(&[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", grant.refresh_token.as_str()),
                    ("client_id", grant.client_id.as_str()),
                    ("client_secret", grant.client_secret.as_str()),
                ]);
                fetch_token(request).await
            })
            .await
    }
}

impl fmt::Debug for StoredTokenCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredTokenCredential")
            .field("refreshable", &self.refresh.is_some())
            .finish_non_exhaustive()
    }
}
