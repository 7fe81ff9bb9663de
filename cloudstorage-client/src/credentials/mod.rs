//! Credential selection and access token management.
//!
//! A [`CredentialResolver`] inspects the [`Auth`] configuration and the [`Environment`] and returns
//! exactly one [`Credential`]. The credential is resolved once per [`Client`](crate::Client) and
//! hands out access tokens, refreshing them when they are about to expire.

use std::fmt;
use std::sync::Arc;

use crate::Error;
use crate::config::{Auth, AuthMode};
use crate::environment::{Environment, probe_metadata_server};

mod metadata;
mod service_account;
mod stored;
mod token;

pub use metadata::MetadataCredential;
pub use service_account::ServiceAccountCredential;
pub use stored::StoredTokenCredential;
pub use token::AccessToken;

/// Where a [`Credential`] was obtained from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CredentialSource {
    /// A signed JWT assertion of a configured service account.
    ServiceAccount,
    /// The App Engine sandbox.
    AppEngine,
    /// A stored OAuth token file.
    StoredToken,
    /// The metadata server of a Compute Engine instance.
    ComputeEngine,
    /// The application default credentials chain of [`gcp_auth`].
    ApplicationDefault,
}

impl CredentialSource {
    /// Returns a short human readable name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServiceAccount => "service account",
            Self::AppEngine => "App Engine",
            Self::StoredToken => "stored OAuth token",
            Self::ComputeEngine => "Compute Engine",
            Self::ApplicationDefault => "application default",
        }
    }
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Credentials backed by the application default credentials chain of [`gcp_auth`].
pub struct ApplicationDefaultCredential {
    provider: Arc<dyn gcp_auth::TokenProvider>,
    scopes: Vec<String>,
}

impl ApplicationDefaultCredential {
    /// Discovers the application default credentials.
    pub async fn discover(scopes: Vec<String>) -> crate::Result<Self> {
        let provider = gcp_auth::provider().await?;
        Ok(Self { provider, scopes })
    }

    async fn access_token(&self) -> crate::Result<AccessToken> {
        let scopes: Vec<&str> = self.scopes.iter().map(String::as_str).collect();
        // gcp_auth caches and refreshes tokens internally.
        let token = self.provider.token(&scopes).await?;
        Ok(AccessToken::new(token.as_str(), None))
    }
}

impl fmt::Debug for ApplicationDefaultCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationDefaultCredential")
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// An authorization handle, tagged by its source.
#[derive(Debug)]
pub enum Credential {
    /// See [`CredentialSource::ServiceAccount`].
    ServiceAccount(ServiceAccountCredential),
    /// See [`CredentialSource::AppEngine`].
    AppEngine(MetadataCredential),
    /// See [`CredentialSource::StoredToken`].
    StoredToken(StoredTokenCredential),
    /// See [`CredentialSource::ComputeEngine`].
    ComputeEngine(MetadataCredential),
    /// See [`CredentialSource::ApplicationDefault`].
    ApplicationDefault(ApplicationDefaultCredential),
}

impl Credential {
    /// Returns where this credential was obtained from.
    pub fn source(&self) -> CredentialSource {
        match self {
            Self::ServiceAccount(_) => CredentialSource::ServiceAccount,
            Self::AppEngine(_) => CredentialSource::AppEngine,
            Self::StoredToken(_) => CredentialSource::StoredToken,
            Self::ComputeEngine(_) => CredentialSource::ComputeEngine,
            Self::ApplicationDefault(_) => CredentialSource::ApplicationDefault,
        }
    }

    /// Returns a fresh access token, refreshing the cached one if needed.
    pub async fn access_token(&self, http: &reqwest::Client) -> crate::Result<AccessToken> {
        match self {
            Self::ServiceAccount(credential) => credential.access_token(http).await,
            Self::AppEngine(credential) | Self::ComputeEngine(credential) => {
                credential.access_token(http).await
            }
            Self::StoredToken(credential) => credential.access_token(http).await,
            Self::ApplicationDefault(credential) => credential.access_token().await,
        }
    }
}

/// Selects the credential for a client.
///
/// With [`AuthMode::Auto`], the first applicable source wins:
///
/// 1. A configured service account.
/// 2. The App Engine sandbox, detected from `SERVER_SOFTWARE`.
/// 3. A configured token file, which must exist and be non-empty.
/// 4. A reachable metadata server.
///
/// If none applies, resolution fails with [`Error::Authorization`].
#[derive(Debug)]
pub struct CredentialResolver<'a> {
    auth: &'a Auth,
    environment: &'a Environment,
    http: &'a reqwest::Client,
}

impl<'a> CredentialResolver<'a> {
    /// Creates a resolver. `http` is used to probe for the metadata server.
    pub fn new(auth: &'a Auth, environment: &'a Environment, http: &'a reqwest::Client) -> Self {
        Self {
            auth,
            environment,
            http,
        }
    }

    /// Resolves the credential.
    pub async fn resolve(&self) -> crate::Result<Credential> {
        let credential = match self.auth.mode {
            AuthMode::Auto => self.resolve_auto().await?,
            AuthMode::ApplicationDefault => Credential::ApplicationDefault(
                ApplicationDefaultCredential::discover(self.auth.scopes.clone()).await?,
            ),
        };

        tracing::info!(source = %credential.source(), "resolved storage credentials");
        Ok(credential)
    }

    async fn resolve_auto(&self) -> crate::Result<Credential> {
        let auth = self.auth;

        if let Some(service_account) = &auth.service_account {
            let pem = service_account.key.load().await?;
            let credential = ServiceAccountCredential::new(
                &service_account.account,
                &pem,
                auth.scopes.clone(),
                auth.token_uri.clone(),
            )?;
            return Ok(Credential::ServiceAccount(credential));
        }

        if self.environment.is_app_engine() {
            let credential = MetadataCredential::new(&auth.metadata_host, auth.scopes.clone())?;
            return Ok(Credential::AppEngine(credential));
        }

        if let Some(token_file) = &auth.token_file {
            let credential = StoredTokenCredential::load(token_file, &auth.token_uri).await?;
            return Ok(Credential::StoredToken(credential));
        }

        if probe_metadata_server(self.http, &auth.metadata_host, auth.probe_timeout).await {
            let credential = MetadataCredential::new(&auth.metadata_host, auth.scopes.clone())?;
            return Ok(Credential::ComputeEngine(credential));
        }

        Err(Error::Authorization {
            message: "No credentials provided".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::time::Duration;

    use cloudstorage_test::server::TestServer;
    use url::Url;

    use super::*;
    use crate::config::{KeyFn, PrivateKey, ServiceAccount};

    const TEST_KEY: &str = include_str!("../../tests/fixtures/service_account.pem");

    /// Auth configuration whose endpoints point to `server`, or to an unresolvable host.
    fn auth(server: Option<&TestServer>) -> Auth {
        let base = match server {
            Some(server) => Url::parse(&server.url("/")).unwrap(),
            None => Url::parse("http://metadata.invalid").unwrap(),
        };

        Auth {
            token_uri: base.join("token").unwrap(),
            metadata_host: base,
            probe_timeout: Duration::from_secs(5),
            ..Default::default()
        }
    }

    fn service_account() -> ServiceAccount {
        ServiceAccount {
            account: "uploader@example.iam.gserviceaccount.com".into(),
            key: PrivateKey::Callback(KeyFn::new(|| Ok(TEST_KEY.into()))),
        }
    }

    fn app_engine() -> Environment {
        Environment::default().with_server_software("Google App Engine/1.9.40")
    }

    async fn resolve(auth: &Auth, environment: &Environment) -> crate::Result<Credential> {
        let http = reqwest::Client::new();
        CredentialResolver::new(auth, environment, &http).resolve().await
    }

    fn token_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn no_credentials() {
        cloudstorage_test::tracing::init();

        let result = resolve(&auth(None), &Environment::default()).await;
        let Err(Error::Authorization { message }) = result else {
            panic!("expected authorization error, got {result:?}");
        };
        assert_eq!(message, "No credentials provided");
    }

    #[tokio::test]
    async fn service_account_wins() {
        let server = TestServer::new().await;
        let file = token_file(r#"{"access_token": "stored"}"#);
        let auth = Auth {
            service_account: Some(service_account()),
            token_file: Some(file.path().into()),
            ..auth(Some(&server))
        };

        let credential = resolve(&auth, &app_engine()).await.unwrap();
        assert_eq!(credential.source(), CredentialSource::ServiceAccount);
    }

    #[tokio::test]
    async fn app_engine_before_token_file() {
        let server = TestServer::new().await;
        let file = token_file(r#"{"access_token": "stored"}"#);
        let auth = Auth {
            token_file: Some(file.path().into()),
            ..auth(Some(&server))
        };

        let credential = resolve(&auth, &app_engine()).await.unwrap();
        assert_eq!(credential.source(), CredentialSource::AppEngine);
    }

    #[tokio::test]
    async fn token_file_before_metadata_server() {
        let server = TestServer::new().await;
        let file = token_file(r#"{"access_token": "stored"}"#);
        let auth = Auth {
            token_file: Some(file.path().into()),
            ..auth(Some(&server))
        };

        let credential = resolve(&auth, &Environment::default()).await.unwrap();
        assert_eq!(credential.source(), CredentialSource::StoredToken);
    }

    #[tokio::test]
    async fn missing_token_file_does_not_fall_through() {
        let server = TestServer::new().await;
        let auth = Auth {
            token_file: Some("/does/not/exist.json".into()),
            ..auth(Some(&server))
        };

        let result = resolve(&auth, &Environment::default()).await;
        let Err(Error::Authorization { message }) = result else {
            panic!("expected authorization error, got {result:?}");
        };
        assert_eq!(message, "No credential file present");
    }

    #[tokio::test]
    async fn metadata_server() {
        let server = TestServer::new().await;

        let credential = resolve(&auth(Some(&server)), &Environment::default())
            .await
            .unwrap();
        assert_eq!(credential.source(), CredentialSource::ComputeEngine);
    }

    #[tokio::test]
    async fn invalid_service_account_key() {
        let auth = Auth {
            service_account: Some(ServiceAccount {
                account: "uploader@example.iam.gserviceaccount.com".into(),
                key: PrivateKey::pem("not a key"),
            }),
            ..auth(None)
        };

        let result = resolve(&auth, &Environment::default()).await;
        assert!(matches!(result, Err(Error::TokenError(_))), "{result:?}");
    }

    #[tokio::test]
    async fn service_account_exchanges_assertion() {
        let server = TestServer::new().await;
        let auth = Auth {
            service_account: Some(service_account()),
            ..auth(Some(&server))
        };
        let http = reqwest::Client::new();
        let credential = CredentialResolver::new(&auth, &Environment::default(), &http)
            .resolve()
            .await
            .unwrap();

        let first = credential.access_token(&http).await.unwrap();
        let second = credential.access_token(&http).await.unwrap();
        assert!(server.is_valid_token(first.as_str()));
        assert_eq!(first.as_str(), second.as_str());

        let grants = server.token_grants();
        assert_eq!(grants, ["urn:ietf:params:oauth:grant-type:jwt-bearer"]);
    }

    #[tokio::test]
    async fn metadata_credential_fetches_token() {
        let server = TestServer::new().await;
        let http = reqwest::Client::new();
        let credential = resolve(&auth(Some(&server)), &app_engine()).await.unwrap();

        let token = credential.access_token(&http).await.unwrap();
        assert!(server.is_valid_token(token.as_str()));
        assert!(token.expires_at().is_some());
    }

    #[tokio::test]
    async fn stored_token_is_refreshed() {
        let server = TestServer::new().await;
        let file = token_file(&format!(
            r#"{{
                "access_token": "expired",
                "token_expiry": "2000-01-01T00:00:00Z",
                "refresh_token": "{}",
                "client_id": "client",
                "client_secret": "secret"
            }}"#,
            TestServer::REFRESH_TOKEN
        ));
        let auth = Auth {
            token_file: Some(file.path().into()),
            ..auth(Some(&server))
        };
        let http = reqwest::Client::new();
        let credential = resolve(&auth, &Environment::default()).await.unwrap();

        let token = credential.access_token(&http).await.unwrap();
        assert_ne!(token.as_str(), "expired");
        assert!(server.is_valid_token(token.as_str()));
        assert_eq!(server.token_grants(), ["refresh_token"]);
    }

    #[tokio::test]
    async fn rejected_refresh_token() {
        let server = TestServer::new().await;
        let file = token_file(
            r#"{"refresh_token": "revoked", "client_id": "client", "client_secret": "secret"}"#,
        );
        let auth = Auth {
            token_file: Some(file.path().into()),
            ..auth(Some(&server))
        };
        let http = reqwest::Client::new();
        let credential = resolve(&auth, &Environment::default()).await.unwrap();

        let result = credential.access_token(&http).await;
        let Err(Error::InvalidCredentials { message }) = result else {
            panic!("expected invalid credentials, got {result:?}");
        };
        assert!(message.starts_with("invalid_grant"));
    }

    #[ignore = "requires application default credentials"]
    #[tokio::test]
    async fn application_default() {
        let auth = Auth {
            mode: AuthMode::ApplicationDefault,
            ..Default::default()
        };
        let http = reqwest::Client::new();
        let credential = resolve(&auth, &Environment::default()).await.unwrap();

        assert_eq!(credential.source(), CredentialSource::ApplicationDefault);
        credential.access_token(&http).await.unwrap();
    }

    /// Collects the formatted fields of every event.
    #[derive(Clone, Default)]
    struct CapturedEvents(Arc<std::sync::Mutex<Vec<String>>>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for CapturedEvents {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            struct Fields(String);

            impl tracing::field::Visit for Fields {
                fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
                    self.0.push_str(&format!("{}={value:?} ", field.name()));
                }
            }

            let mut fields = Fields(String::new());
            event.record(&mut fields);
            self.0.lock().unwrap().push(fields.0);
        }
    }

    #[tokio::test]
    async fn logs_credential_source_once() {
        use tracing_subscriber::prelude::*;

        let events = CapturedEvents::default();
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(events.clone()),
        );

        let file = token_file(r#"{"access_token": "stored"}"#);
        let auth = Auth {
            token_file: Some(file.path().into()),
            ..auth(None)
        };
        resolve(&auth, &Environment::default()).await.unwrap();

        let events = events.0.lock().unwrap();
        let resolved = events
            .iter()
            .find(|fields| fields.contains("resolved storage credentials"))
            .expect("resolution is logged");
        assert_eq!(resolved.matches("stored OAuth token").count(), 1, "{resolved}");
        assert!(resolved.contains("source=stored OAuth token"), "{resolved}");
    }
}
