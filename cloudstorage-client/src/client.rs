use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use url::Url;

use crate::config::{AuthMode, Config, PrivateKey, ServiceAccount};
use crate::credentials::{Credential, CredentialResolver, CredentialSource};
use crate::environment::Environment;
use crate::resources::{
    BucketAccessControls, Buckets, Channels, DefaultObjectAccessControls, Objects,
};
use crate::transport::Transport;
use crate::types::Object;

const USER_AGENT: &str = concat!("cloudstorage-client/", env!("CARGO_PKG_VERSION"));

#[derive(Debug)]
struct ClientBuilderInner {
    config: Config,
    environment: Option<Environment>,
    credential: Option<Credential>,
    reqwest_builder: reqwest::ClientBuilder,
}

/// Builder to create a [`Client`].
#[must_use]
#[derive(Debug)]
pub struct ClientBuilder(crate::Result<ClientBuilderInner>);

impl ClientBuilder {
    /// Creates a new [`ClientBuilder`] with the default configuration.
    ///
    /// Without further configuration, the credential is picked automatically from the process
    /// environment when calling [`build`](Self::build).
    pub fn new() -> Self {
        Self::from_config(Config::default())
    }

    /// Creates a new [`ClientBuilder`] from a loaded [`Config`].
    pub fn from_config(config: Config) -> Self {
        let reqwest_builder = reqwest::Client::builder().user_agent(USER_AGENT);

        Self(Ok(ClientBuilderInner {
            config,
            environment: None,
            credential: None,
            reqwest_builder,
        }))
    }

    fn map<F>(self, f: F) -> Self
    where
        F: FnOnce(ClientBuilderInner) -> crate::Result<ClientBuilderInner>,
    {
        Self(self.0.and_then(f))
    }

    /// Sets the base URL of the storage service.
    pub fn endpoint(self, endpoint: impl reqwest::IntoUrl) -> Self {
        self.map(|mut inner| {
            inner.config.endpoint = endpoint.into_url()?;
            Ok(inner)
        })
    }

    /// Attaches `trace` as query parameter to every request.
    pub fn trace(self, trace: impl Into<String>) -> Self {
        self.map(|mut inner| {
            inner.config.trace = Some(trace.into());
            Ok(inner)
        })
    }

    /// Sets the timeout of every request.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.map(|mut inner| {
            inner.config.timeout = Some(timeout);
            Ok(inner)
        })
    }

    /// Authenticates as the given service account.
    ///
    /// Use [`PrivateKey::Callback`] to retrieve the key from a secret store.
    pub fn service_account(self, account: impl Into<String>, key: PrivateKey) -> Self {
        self.map(|mut inner| {
            inner.config.auth.service_account = Some(ServiceAccount {
                account: account.into(),
                key,
            });
            Ok(inner)
        })
    }

    /// Uses the stored OAuth token at `path`, unless a service account is configured or the
    /// process runs on App Engine.
    pub fn token_file(self, path: impl Into<PathBuf>) -> Self {
        self.map(|mut inner| {
            inner.config.auth.token_file = Some(path.into());
            Ok(inner)
        })
    }

    /// Changes how the credential is selected.
    pub fn auth_mode(self, mode: AuthMode) -> Self {
        self.map(|mut inner| {
            inner.config.auth.mode = mode;
            Ok(inner)
        })
    }

    /// Overrides the OAuth 2.0 token endpoint.
    pub fn token_uri(self, token_uri: impl reqwest::IntoUrl) -> Self {
        self.map(|mut inner| {
            inner.config.auth.token_uri = token_uri.into_url()?;
            Ok(inner)
        })
    }

    /// Overrides the base URL of the metadata server.
    pub fn metadata_host(self, metadata_host: impl reqwest::IntoUrl) -> Self {
        self.map(|mut inner| {
            inner.config.auth.metadata_host = metadata_host.into_url()?;
            Ok(inner)
        })
    }

    /// Uses `environment` instead of [`Environment::detect`] for credential selection.
    pub fn environment(self, environment: Environment) -> Self {
        self.map(|mut inner| {
            inner.environment = Some(environment);
            Ok(inner)
        })
    }

    /// Uses an already resolved credential, skipping credential selection.
    pub fn credential(self, credential: Credential) -> Self {
        self.map(|mut inner| {
            inner.credential = Some(credential);
            Ok(inner)
        })
    }

    /// Calls the closure with the underlying [`reqwest::ClientBuilder`].
    pub fn configure_reqwest<F>(self, closure: F) -> Self
    where
        F: FnOnce(reqwest::ClientBuilder) -> reqwest::ClientBuilder,
    {
        self.map(|mut inner| {
            inner.reqwest_builder = closure(inner.reqwest_builder);
            Ok(inner)
        })
    }

    /// Resolves the credential and returns a [`Client`].
    ///
    /// # Errors
    ///
    /// This method fails if:
    /// - a URL passed to the builder is invalid
    /// - the [`reqwest::Client`] fails to build
    /// - no credential source applies, or the selected one cannot be loaded
    pub async fn build(self) -> crate::Result<Client> {
        let ClientBuilderInner {
            config,
            environment,
            credential,
            mut reqwest_builder,
        } = self.0?;

        if let Some(timeout) = config.timeout {
            reqwest_builder = reqwest_builder.timeout(timeout);
        }
        let http = reqwest_builder.build()?;

        let credential = match credential {
            Some(credential) => credential,
            None => {
                let environment = environment.unwrap_or_else(Environment::detect);
                CredentialResolver::new(&config.auth, &environment, &http)
                    .resolve()
                    .await?
            }
        };

        let transport = Transport::new(http, credential, config.endpoint, config.trace);
        Ok(Client {
            inner: Arc::new(transport),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A client for the Google Cloud Storage JSON API. Use [`Client::builder`] to configure and
/// construct it.
///
/// The credential is resolved once when building the client. Cloning is cheap and all clones
/// share the credential and its cached access token.
#[derive(Clone, Debug)]
pub struct Client {
    inner: Arc<Transport>,
}

impl Client {
    /// Convenience function to create a [`ClientBuilder`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Returns where the credential of this client was obtained from.
    pub fn credential_source(&self) -> CredentialSource {
        self.inner.credential_source()
    }

    /// Returns the base URL of the storage service.
    pub fn endpoint(&self) -> &Url {
        self.inner.endpoint()
    }

    /// Access control lists of buckets.
    pub fn bucket_access_controls(&self) -> BucketAccessControls<'_> {
        BucketAccessControls::new(&self.inner)
    }

    /// Buckets of a project.
    pub fn buckets(&self) -> Buckets<'_> {
        Buckets {
            transport: &self.inner,
        }
    }

    /// Notification channels.
    pub fn channels(&self) -> Channels<'_> {
        Channels {
            transport: &self.inner,
        }
    }

    /// Access control lists applied to new objects of a bucket.
    pub fn default_object_access_controls(&self) -> DefaultObjectAccessControls<'_> {
        DefaultObjectAccessControls::new(&self.inner)
    }

    /// Objects within a bucket.
    pub fn objects(&self) -> Objects<'_> {
        Objects {
            transport: &self.inner,
        }
    }

    /// Downloads the content of an object.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn read_file(&self, bucket: &str, name: &str) -> crate::Result<Bytes> {
        self.objects().get_media(bucket, name).await
    }

    /// Uploads `content` to an object, creating or replacing it.
    #[tracing::instrument(level = "debug", skip(self, content))]
    pub async fn write_file(
        &self,
        bucket: &str,
        name: &str,
        content: impl Into<Bytes>,
        content_type: &str,
    ) -> crate::Result<Object> {
        self.objects()
            .insert(bucket, name, content.into(), content_type)
            .await
    }

    /// Retrieves the metadata of an object.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn read_file_metadata(&self, bucket: &str, name: &str) -> crate::Result<Object> {
        self.objects().get(bucket, name).await
    }
}
