use std::fmt;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, Response};
use url::Url;

use crate::classify::classify;
use crate::credentials::{Credential, CredentialSource};

/// Query parameter carrying the trace tag.
pub const PARAM_TRACE: &str = "trace";

/// An HTTP client that authorizes every request with the resolved [`Credential`].
pub(crate) struct Transport {
    http: reqwest::Client,
    credential: Credential,
    endpoint: Url,
    trace: Option<String>,
}

impl Transport {
    pub fn new(
        http: reqwest::Client,
        credential: Credential,
        endpoint: Url,
        trace: Option<String>,
    ) -> Self {
        Self {
            http,
            credential,
            endpoint,
            trace,
        }
    }

    pub fn credential_source(&self) -> CredentialSource {
        self.credential.source()
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Builds a URL below the endpoint from the given path segments.
    ///
    /// Segments are percent-encoded, including any `/` they contain.
    pub fn url(&self, segments: &[&str]) -> crate::Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Creates an authorized request.
    pub async fn request(&self, method: Method, url: Url) -> crate::Result<RequestBuilder> {
        let token = self.credential.access_token(&self.http).await?;
        let mut builder = self
            .http
            .request(method, url)
            .bearer_auth(token.as_str());

        if let Some(trace) = &self.trace {
            builder = builder.query(&[(PARAM_TRACE, trace.as_str())]);
        }

        Ok(builder)
    }

    /// Sends the request, turning error responses into classified errors.
    pub async fn send(&self, request: RequestBuilder) -> crate::Result<Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let body = response.bytes().await?;
        tracing::debug!(
            %status,
            content_type = content_type.as_deref(),
            body = %String::from_utf8_lossy(&body),
            "storage request failed"
        );

        Err(classify(status, content_type.as_deref(), &body))
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("credential", &self.credential.source())
            .field("endpoint", &self.endpoint.as_str())
            .field("trace", &self.trace)
            .finish_non_exhaustive()
    }
}
