//! Configuration of the `gcs` command.
//!
//! Extends the client [`Config`] with a `logging` section. Both are read from the same YAML file
//! and `GCS__` environment variables, for example `GCS__LOGGING__LEVEL=debug`.

use std::fmt;
use std::path::Path;

use cloudstorage_client::Config;
use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Log output format.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// [`LogFormat::Pretty`] when stderr is a terminal, otherwise [`LogFormat::Simplified`].
    #[default]
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///   2025-01-04T12:10:32.512Z  INFO cloudstorage_client::credentials: resolved storage credentials source=Compute Engine
    /// ```
    Pretty,

    /// Single plain text lines.
    ///
    /// ```text
    /// 2025-01-04T12:10:32.512Z  INFO cloudstorage_client::credentials: resolved storage credentials source=Compute Engine
    /// ```
    Simplified,

    /// JSON lines.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let result = match s {
            "" => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("auto") => LogFormat::Auto,
            s if s.eq_ignore_ascii_case("pretty") => LogFormat::Pretty,
            s if s.eq_ignore_ascii_case("simplified") => LogFormat::Simplified,
            s if s.eq_ignore_ascii_case("json") => LogFormat::Json,
            s => return Err(FormatParseError(s.into())),
        };

        Ok(result)
    }
}

/// The logging format parse error.
#[derive(Clone, Debug)]
pub struct FormatParseError(String);

impl fmt::Display for FormatParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"error parsing "{}" as format: expected one of "auto", "pretty", "simplified", "json""#,
            self.0
        )
    }
}

impl std::error::Error for FormatParseError {}

mod display_fromstr {
    pub fn serialize<T, S>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
        T: std::fmt::Display,
    {
        serializer.collect_str(&value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: serde::Deserializer<'de>,
        T: std::str::FromStr,
        <T as std::str::FromStr>::Err: std::fmt::Display,
    {
        use serde::Deserialize;
        let s = <std::borrow::Cow<'de, str>>::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging configuration. Logs are always written to stderr.
#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct Logging {
    /// Minimum log level to output.
    ///
    /// `RUST_LOG` takes precedence, see [`init_tracing`](crate::observability::init_tracing).
    ///
    /// # Default
    ///
    /// `WARN`
    ///
    /// # Environment Variable
    ///
    /// `GCS__LOGGING__LEVEL`
    #[serde(with = "display_fromstr")]
    pub level: LevelFilter,

    /// Log output format.
    ///
    /// # Default
    ///
    /// `auto`
    ///
    /// # Environment Variable
    ///
    /// `GCS__LOGGING__FORMAT`
    pub format: LogFormat,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: LevelFilter::WARN,
            format: LogFormat::Auto,
        }
    }
}

/// Configuration of the `gcs` command.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CliConfig {
    /// Client configuration, at the top level of the file.
    #[serde(flatten)]
    pub client: Config,

    /// Logging configuration.
    pub logging: Logging,
}

impl CliConfig {
    /// Loads configuration from defaults, an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Ok(Config::figment(path).extract()?)
    }
}
