use url::Url;

use super::token::{AccessToken, TokenCache, fetch_token};
use crate::environment::{METADATA_FLAVOR, METADATA_FLAVOR_GOOGLE};

const TOKEN_PATH: &str = "computeMetadata/v1/instance/service-accounts/default/token";

/// Credentials of the default service account, served by the instance metadata server.
///
/// This backs both the Compute Engine and the App Engine credential sources.
#[derive(Debug)]
pub struct MetadataCredential {
    token_url: Url,
    scopes: Vec<String>,
    cache: TokenCache,
}

impl MetadataCredential {
    /// Creates a credential fetching tokens from the metadata server at `metadata_host`.
    pub fn new(metadata_host: &Url, scopes: Vec<String>) -> crate::Result<Self> {
        Ok(Self {
            token_url: metadata_host.join(TOKEN_PATH)?,
            scopes,
            cache: TokenCache::default(),
        })
    }

    pub(crate) async fn access_token(&self, http: &reqwest::Client) -> crate::Result<AccessToken> {
        self.cache
            .get_or_refresh(|| async {
                let mut request = http
                    .get(self.token_url.clone())
                    .header(METADATA_FLAVOR, METADATA_FLAVOR_GOOGLE);
                if !self.scopes.is_empty() {
                    request = request.query(&[("scopes", self.scopes.join(","))]);
                }
                fetch_token(request).await
            })
            .await
    }
}
