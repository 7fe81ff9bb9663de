use std::fmt;

use serde::Deserialize;

/// Errors that can happen within the cloudstorage-client.
///
/// Errors reported by the storage service are classified into the variants from
/// [`Authorization`](Self::Authorization) through [`Connection`](Self::Connection), see
/// [`classify`](crate::classify). The remaining variants wrap failures of the underlying libraries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The request was not authorized (`401`, `403`, or reason `authError` / `accessDenied`), or no
    /// usable credentials could be found.
    #[error("authorization error: {message}")]
    Authorization {
        /// The error message.
        message: String,
    },
    /// The bucket or object does not exist (`404` or reason `notFound`).
    #[error("not found: {message}")]
    NotFound {
        /// The error message.
        message: String,
    },
    /// Reason `rateLimitExceeded` or `userRateLimitExceeded`.
    #[error("rate limit exceeded: {message}")]
    RateLimitExceeded {
        /// The error message.
        message: String,
    },
    /// Reason `dailyLimitExceeded`.
    #[error("daily limit exceeded: {message}")]
    DailyLimitExceeded {
        /// The error message.
        message: String,
    },
    /// Reason `quotaExceeded`.
    #[error("quota exceeded: {message}")]
    QuotaExceeded {
        /// The error message.
        message: String,
    },
    /// Reason `invalidParameter`.
    #[error("invalid parameter: {message}")]
    InvalidParameter {
        /// The error message.
        message: String,
    },
    /// Reason `badRequest`.
    #[error("bad request: {message}")]
    BadRequest {
        /// The error message.
        message: String,
    },
    /// Reason `invalidCredentials`, or a rejected OAuth grant.
    #[error("invalid credentials: {message}")]
    InvalidCredentials {
        /// The error message.
        message: String,
    },
    /// Reason `insufficientPermissions`.
    #[error("insufficient permissions: {message}")]
    InsufficientPermissions {
        /// The error message.
        message: String,
    },
    /// Reason `backendError`.
    #[error("backend error: {message}")]
    Backend {
        /// The error message.
        message: String,
    },
    /// The server responded with an error that could not be interpreted.
    #[error("malformed server response: {message}")]
    Interface {
        /// The error message.
        message: String,
    },
    /// Any other error reported by the storage service.
    #[error("service error: {message}")]
    Service {
        /// The error message, including failure details of additional errors.
        message: String,
        /// The records the server reported.
        details: Box<ServiceErrorDetails>,
    },
    /// A non-JSON error response that is neither `401`, `403` nor `404`.
    #[error(
        "Could not connect with Google Cloud Storage server.\n\
         Http response status: {status}\n\
         Http response content:\n{body}"
    )]
    Connection {
        /// The HTTP status code of the response.
        status: u16,
        /// The raw response body.
        body: String,
    },

    /// Any error emitted from the underlying [`reqwest`] client.
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    /// IO errors related to reading key or token files.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Errors de/serializing JSON payloads.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// Error when URL manipulation fails.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Error when signing service account assertions, such as invalid keys.
    #[error(transparent)]
    TokenError(#[from] jsonwebtoken::errors::Error),
    /// Errors from the application default credentials provider.
    #[error("application default credentials: {0}")]
    GcpAuth(#[from] gcp_auth::Error),
    /// Errors loading the configuration.
    #[error("invalid configuration: {0}")]
    Config(Box<figment::Error>),
}

impl From<figment::Error> for Error {
    fn from(error: figment::Error) -> Self {
        Error::Config(Box::new(error))
    }
}

/// A convenience alias that defaults our [`Error`] type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The records behind an [`Error::Service`].
#[derive(Clone, Debug, PartialEq)]
pub struct ServiceErrorDetails {
    /// The error that determined the classification.
    pub primary: ErrorRecord,
    /// All errors the server reported, including the primary one.
    pub errors: Vec<ErrorRecord>,
    /// The job the error relates to, if any.
    pub job_ref: Option<String>,
}

/// A single entry of the `errors` list in a JSON error response.
///
/// ```json
/// {"domain": "global", "reason": "notFound", "message": "No such object: bucket/name"}
/// ```
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ErrorRecord {
    #[serde(default, rename = "error")]
    error_code: Option<String>,
    /// The reason code, see [`ReasonCode`].
    #[serde(default)]
    pub reason: Option<String>,
    /// A human readable description.
    #[serde(default)]
    pub message: Option<String>,
    /// The request element the error refers to, such as a header or parameter name.
    #[serde(default)]
    pub location: Option<String>,
    /// The error domain, usually `global`.
    #[serde(default)]
    pub domain: Option<String>,
}

impl ErrorRecord {
    /// Creates a record with the given reason and message.
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Sets the location of this record.
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    /// Returns the reason code string.
    ///
    /// Some services report it as `error` rather than `reason`; that field takes precedence.
    pub fn reason_str(&self) -> Option<&str> {
        self.error_code
            .as_deref()
            .or(self.reason.as_deref())
            .filter(|reason| !reason.is_empty())
    }

    /// Returns the parsed reason code, if it is one of the known ones.
    pub fn reason_code(&self) -> Option<ReasonCode> {
        self.reason_str().and_then(ReasonCode::parse)
    }
}

/// The reason codes with a dedicated [`Error`] variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ReasonCode {
    /// `authError`
    AuthError,
    /// `notFound`
    NotFound,
    /// `backendError`
    BackendError,
    /// `rateLimitExceeded`
    RateLimitExceeded,
    /// `dailyLimitExceeded`
    DailyLimitExceeded,
    /// `accessDenied`
    AccessDenied,
    /// `invalidParameter`
    InvalidParameter,
    /// `badRequest`
    BadRequest,
    /// `invalidCredentials`
    InvalidCredentials,
    /// `insufficientPermissions`
    InsufficientPermissions,
    /// `userRateLimitExceeded`
    UserRateLimitExceeded,
    /// `quotaExceeded`
    QuotaExceeded,
}

impl ReasonCode {
    /// Parses a reason string, returning `None` for unknown reasons.
    pub fn parse(reason: &str) -> Option<Self> {
        Some(match reason {
            "authError" => Self::AuthError,
            "notFound" => Self::NotFound,
            "backendError" => Self::BackendError,
            "rateLimitExceeded" => Self::RateLimitExceeded,
            "dailyLimitExceeded" => Self::DailyLimitExceeded,
            "accessDenied" => Self::AccessDenied,
            "invalidParameter" => Self::InvalidParameter,
            "badRequest" => Self::BadRequest,
            "invalidCredentials" => Self::InvalidCredentials,
            "insufficientPermissions" => Self::InsufficientPermissions,
            "userRateLimitExceeded" => Self::UserRateLimitExceeded,
            "quotaExceeded" => Self::QuotaExceeded,
            _ => return None,
        })
    }

    /// Returns the reason string as sent by the server.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthError => "authError",
            Self::NotFound => "notFound",
            Self::BackendError => "backendError",
            Self::RateLimitExceeded => "rateLimitExceeded",
            Self::DailyLimitExceeded => "dailyLimitExceeded",
            Self::AccessDenied => "accessDenied",
            Self::InvalidParameter => "invalidParameter",
            Self::BadRequest => "badRequest",
            Self::InvalidCredentials => "invalidCredentials",
            Self::InsufficientPermissions => "insufficientPermissions",
            Self::UserRateLimitExceeded => "userRateLimitExceeded",
            Self::QuotaExceeded => "quotaExceeded",
        }
    }

    /// Builds the error variant this reason maps to.
    pub(crate) fn into_error(self, message: String) -> Error {
        match self {
            Self::AuthError | Self::AccessDenied => Error::Authorization { message },
            Self::NotFound => Error::NotFound { message },
            Self::BackendError => Error::Backend { message },
            Self::RateLimitExceeded | Self::UserRateLimitExceeded => {
                Error::RateLimitExceeded { message }
            }
            Self::DailyLimitExceeded => Error::DailyLimitExceeded { message },
            Self::QuotaExceeded => Error::QuotaExceeded { message },
            Self::InvalidParameter => Error::InvalidParameter { message },
            Self::BadRequest => Error::BadRequest { message },
            Self::InvalidCredentials => Error::InvalidCredentials { message },
            Self::InsufficientPermissions => Error::InsufficientPermissions { message },
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
