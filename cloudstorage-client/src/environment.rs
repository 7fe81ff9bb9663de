//! Description of the runtime environment used for credential selection.

use std::time::Duration;

use reqwest::header::HeaderValue;
use url::Url;

/// Environment variable identifying the application server software.
pub const SERVER_SOFTWARE_VAR: &str = "SERVER_SOFTWARE";

/// Prefix of [`SERVER_SOFTWARE_VAR`] in the App Engine sandbox.
const APP_ENGINE_PREFIX: &str = "Google App Engine/";

/// Header sent to and returned by the metadata server.
pub(crate) const METADATA_FLAVOR: &str = "Metadata-Flavor";
pub(crate) const METADATA_FLAVOR_GOOGLE: &str = "Google";

/// A snapshot of the process environment relevant to credential selection.
///
/// Use [`Environment::detect`] to capture the current process environment, or construct one
/// explicitly in tests.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Environment {
    /// Value of the `SERVER_SOFTWARE` environment variable.
    pub server_software: Option<String>,
}

impl Environment {
    /// Captures the environment of the current process.
    pub fn detect() -> Self {
        Self {
            server_software: std::env::var(SERVER_SOFTWARE_VAR).ok(),
        }
    }

    /// Sets the value of `SERVER_SOFTWARE`.
    pub fn with_server_software(mut self, server_software: impl Into<String>) -> Self {
        self.server_software = Some(server_software.into());
        self
    }

    /// Returns `true` when running inside the App Engine sandbox.
    pub fn is_app_engine(&self) -> bool {
        self.server_software
            .as_deref()
            .is_some_and(|s| s.starts_with(APP_ENGINE_PREFIX))
    }
}

/// Checks whether the metadata server at `metadata_host` is reachable.
///
/// The server counts as reachable if it answers within `timeout` with a `Metadata-Flavor: Google`
/// header. Any transport failure, including failure to resolve the host name, yields `false`.
pub async fn probe_metadata_server(
    http: &reqwest::Client,
    metadata_host: &Url,
    timeout: Duration,
) -> bool {
    let response = http
        .get(metadata_host.clone())
        .header(METADATA_FLAVOR, METADATA_FLAVOR_GOOGLE)
        .timeout(timeout)
        .send()
        .await;

    match response {
        Ok(response) => {
            let flavor = response.headers().get(METADATA_FLAVOR);
            let reachable = flavor == Some(&HeaderValue::from_static(METADATA_FLAVOR_GOOGLE));
            tracing::debug!(%metadata_host, reachable, "probed metadata server");
            reachable
        }
        Err(error) => {
            tracing::debug!(
                %metadata_host,
                error = &error as &dyn std::error::Error,
                "metadata server not reachable"
            );
            false
        }
    }
}
