use std::fmt;

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode, get_current_timestamp};
use serde::Serialize;
use url::Url;

use super::token::{AccessToken, TokenCache, fetch_token};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECONDS: u64 = 3600;

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

/// Credentials obtained by exchanging a signed JWT assertion of a service account.
pub struct ServiceAccountCredential {
    account: String,
    encoding_key: EncodingKey,
    scopes: Vec<String>,
    token_uri: Url,
    cache: TokenCache,
}

impl ServiceAccountCredential {
    /// Creates a credential for `account` signing with the PEM encoded RSA key `pem`.
    pub fn new(
        account: impl Into<String>,
        pem: &str,
        scopes: Vec<String>,
        token_uri: Url,
    ) -> crate::Result<Self> {
        Ok(Self {
            account: account.into(),
            encoding_key: EncodingKey::from_rsa_pem(pem.as_bytes())?,
            scopes,
            token_uri,
            cache: TokenCache::default(),
        })
    }

    /// The service account email.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Signs a new assertion for the configured scopes.
    fn sign_assertion(&self) -> crate::Result<String> {
        let iat = get_current_timestamp();
        let claims = AssertionClaims {
            iss: &self.account,
            scope: self.scopes.join(" "),
            aud: self.token_uri.as_str(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECONDS,
        };

        Ok(encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.encoding_key,
        )?)
    }

    pub(crate) async fn access_token(&self, http: &reqwest::Client) -> crate::Result<AccessToken> {
        self.cache
            .get_or_refresh(|| async {
                let assertion = self.sign_assertion()?;
                let request = http
                    .post(self.token_uri.clone())
                    .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())]);
                fetch_token(request).await
            })
            .await
    }
}

impl fmt::Debug for ServiceAccountCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccountCredential")
            .field("account", &self.account)
            .field("scopes", &self.scopes)
            .field("token_uri", &self.token_uri.as_str())
            .finish_non_exhaustive()
    }
}
