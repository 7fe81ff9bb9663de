//! Configuration for the cloudstorage client.
//!
//! Configuration can be loaded from multiple sources with the following precedence (highest to
//! lowest):
//!
//! 1. Environment variables (prefixed with `GCS__`)
//! 2. YAML configuration file
//! 3. Defaults
//!
//! # Environment Variables
//!
//! Environment variables use `GCS__` as a prefix and double underscores (`__`) to denote nested
//! configuration structures. For example:
//!
//! - `GCS__TRACE=email:alice` attaches a trace tag to every request
//! - `GCS__AUTH__TOKEN_FILE=/home/alice/.storage.json` uses a stored OAuth token
//!
//! # YAML Configuration File
//!
//! ```yaml
//! trace: email:alice
//! auth:
//!   service_account:
//!     account: uploader@my-project.iam.gserviceaccount.com
//!     key:
//!       type: file
//!       path: /etc/keys/uploader.pem
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use secrecy::{CloneableSecret, ExposeSecret, SecretBox, SerializableSecret, zeroize::Zeroize};
use serde::{Deserialize, Serialize};
use url::Url;

/// Environment variable prefix for all configuration options.
const ENV_PREFIX: &str = "GCS__";

/// The default storage API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";
/// The default OAuth 2.0 token endpoint.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// The default metadata server of Compute Engine and App Engine.
pub const DEFAULT_METADATA_HOST: &str = "http://metadata.google.internal";
/// The default OAuth scope requested for access tokens.
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/devstorage.read_write";

/// Newtype around `String` that protects against accidental logging of secrets. Use with
/// [`secrecy::SecretBox`].
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConfigSecret(String);

impl ConfigSecret {
    /// Returns the secret as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for ConfigSecret {
    fn from(str: &str) -> Self {
        ConfigSecret(str.to_string())
    }
}

impl fmt::Debug for ConfigSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "[redacted]")
    }
}

impl CloneableSecret for ConfigSecret {}
impl SerializableSecret for ConfigSecret {}
impl Zeroize for ConfigSecret {
    fn zeroize(&mut self) {
        self.0.zeroize();
    }
}

/// A function returning a PEM encoded private key.
#[derive(Clone)]
pub struct KeyFn(Arc<dyn Fn() -> std::io::Result<String> + Send + Sync>);

impl KeyFn {
    /// Wraps a key retrieval function.
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> std::io::Result<String> + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for KeyFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyFn(..)")
    }
}

/// Where the private key of a service account comes from.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PrivateKey {
    /// A PEM file on disk (type `"file"`).
    File {
        /// Path to the PEM file.
        path: PathBuf,
    },
    /// An inline PEM encoded key (type `"pem"`), redacted from logs.
    Pem {
        /// The PEM encoded key.
        pem: SecretBox<ConfigSecret>,
    },
    /// A key retrieval function, only available through the
    /// [`ClientBuilder`](crate::ClientBuilder).
    #[serde(skip)]
    Callback(KeyFn),
}

impl PrivateKey {
    /// Creates a [`PrivateKey::Pem`] from the given string.
    pub fn pem(pem: &str) -> Self {
        Self::Pem {
            pem: SecretBox::new(Box::new(pem.into())),
        }
    }

    /// Retrieves the PEM encoded key.
    pub async fn load(&self) -> crate::Result<String> {
        Ok(match self {
            Self::File { path } => tokio::fs::read_to_string(path).await?,
            Self::Pem { pem } => pem.expose_secret().as_str().to_owned(),
            Self::Callback(KeyFn(f)) => f()?,
        })
    }
}

/// Service account used for signed JWT assertions.
///
/// Used in: [`Auth::service_account`]
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServiceAccount {
    /// The service account email, used as the assertion issuer.
    ///
    /// # Environment Variable
    ///
    /// `GCS__AUTH__SERVICE_ACCOUNT__ACCOUNT`
    pub account: String,

    /// The private key the assertion is signed with.
    ///
    /// # Environment Variables
    ///
    /// - `GCS__AUTH__SERVICE_ACCOUNT__KEY__TYPE=file`
    /// - `GCS__AUTH__SERVICE_ACCOUNT__KEY__PATH=/etc/keys/uploader.pem`
    pub key: PrivateKey,
}

/// How credentials are selected.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Inspect configuration and environment in a fixed order, see
    /// [`CredentialResolver`](crate::credentials::CredentialResolver).
    #[default]
    Auto,
    /// Delegate to the application default credentials chain of [`gcp_auth`].
    ApplicationDefault,
}

/// Authentication configuration.
///
/// Used in: [`Config::auth`]
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Auth {
    /// How credentials are selected.
    ///
    /// # Default
    ///
    /// `auto`
    ///
    /// # Environment Variable
    ///
    /// `GCS__AUTH__MODE`
    pub mode: AuthMode,

    /// Service account for signed JWT assertions. Takes precedence over all other sources.
    ///
    /// # Default
    ///
    /// `None`
    pub service_account: Option<ServiceAccount>,

    /// Path to a stored OAuth token.
    ///
    /// # Default
    ///
    /// `None`
    ///
    /// # Environment Variable
    ///
    /// `GCS__AUTH__TOKEN_FILE`
    pub token_file: Option<PathBuf>,

    /// OAuth scopes requested for access tokens.
    ///
    /// # Default
    ///
    /// [`DEFAULT_SCOPE`]
    pub scopes: Vec<String>,

    /// OAuth 2.0 token endpoint for service account assertions.
    ///
    /// # Default
    ///
    /// [`DEFAULT_TOKEN_URI`]
    pub token_uri: Url,

    /// Base URL of the instance metadata server.
    ///
    /// # Default
    ///
    /// [`DEFAULT_METADATA_HOST`]
    ///
    /// # Environment Variable
    ///
    /// `GCS__AUTH__METADATA_HOST`
    pub metadata_host: Url,

    /// How long to wait for the metadata server when probing for it.
    ///
    /// # Default
    ///
    /// `1s`
    #[serde(with = "humantime_serde")]
    pub probe_timeout: Duration,
}

impl Auth {
    /// Returns the scopes as string slices.
    pub fn scopes(&self) -> Vec<&str> {
        self.scopes.iter().map(String::as_str).collect()
    }
}

impl Default for Auth {
    fn default() -> Self {
        Self {
            mode: AuthMode::Auto,
            service_account: None,
            token_file: None,
            scopes: vec![DEFAULT_SCOPE.to_owned()],
            token_uri: Url::parse(DEFAULT_TOKEN_URI).expect("valid default token uri"),
            metadata_host: Url::parse(DEFAULT_METADATA_HOST).expect("valid default metadata host"),
            probe_timeout: Duration::from_secs(1),
        }
    }
}

/// Client configuration.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Base URL of the storage service.
    ///
    /// # Default
    ///
    /// [`DEFAULT_ENDPOINT`]
    ///
    /// # Environment Variable
    ///
    /// `GCS__ENDPOINT`
    pub endpoint: Url,

    /// A value attached as `trace` query parameter to all outgoing requests.
    ///
    /// # Default
    ///
    /// `None`
    ///
    /// # Environment Variable
    ///
    /// `GCS__TRACE`
    pub trace: Option<String>,

    /// Timeout applied to every request, including token requests.
    ///
    /// # Default
    ///
    /// `None` (no timeout)
    ///
    /// # Environment Variable
    ///
    /// `GCS__TIMEOUT`
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,

    /// Authentication configuration.
    pub auth: Auth,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: Url::parse(DEFAULT_ENDPOINT).expect("valid default endpoint"),
            trace: None,
            timeout: None,
            auth: Auth::default(),
        }
    }
}

impl Config {
    /// Loads configuration from defaults, an optional YAML file and the environment.
    ///
    /// Later sources override earlier ones.
    ///
    /// # Errors
    ///
    /// Returns an error if the YAML file cannot be read or parsed, or if environment variables
    /// contain invalid values.
    pub fn load(path: Option<&Path>) -> crate::Result<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// Returns the [`figment::Figment`] that [`Config::load`] extracts from.
    ///
    /// Applications embedding this configuration can merge additional providers or extract a
    /// larger structure that flattens [`Config`].
    pub fn figment(path: Option<&Path>) -> figment::Figment {
        let mut figment = figment::Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}
