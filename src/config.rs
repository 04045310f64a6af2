//! Configuration manager for saksin.
//!
//! Addresses, lifetimes and CORS origins come from `config.yaml`; API keys
//! and other secrets come from environment variables.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_ACCESS_TOKEN_MINUTES: i64 = 5;
const DEFAULT_REFRESH_TOKEN_DAYS: i64 = 1;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
    /// Instance name, used as JWT issuer and email sender name.
    pub name: String,
    /// Domain name of current instance.
    pub url: String,
    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Whether `/login` requires a one-time code.
    #[serde(default)]
    pub login_otp_required: bool,
    #[serde(default)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
    /// Related to PostgreSQL configuration.
    #[serde(skip_serializing)]
    pub postgres: Option<Postgres>,
    /// Related to Redis configuration.
    #[serde(skip_serializing)]
    pub redis: Option<Redis>,
    /// Related to bearer token configuration.
    #[serde(skip_serializing, default)]
    pub token: Token,
    /// Related to transactional email sending.
    #[serde(skip_serializing)]
    pub mail: Option<Mail>,
    /// Related to the external media host.
    #[serde(skip_serializing)]
    pub media: Option<Media>,
    /// Related to the generative AI provider.
    #[serde(skip_serializing, default)]
    pub llm: Llm,
}

/// PostgreSQL configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Postgres {
    /// Hostname:(?port) for PostgreSQL instance.
    pub address: String,
    /// Database name.
    pub database: Option<String>,
    /// Username credential to connect.
    pub username: Option<String>,
    /// Password credential to connect.
    pub password: Option<String>,
    /// Maximum pool connections.
    pub pool_size: Option<u32>,
}

/// Redis configuration.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
pub struct Redis {
    /// Connection URL, e.g. `redis://127.0.0.1/`.
    pub url: String,
}

/// Bearer token configuration.
///
/// The signing secret comes from the `SECRET` environment variable.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Access token lifetime in minutes.
    pub access_lifetime_minutes: i64,
    /// Refresh token lifetime in days.
    pub refresh_lifetime_days: i64,
    /// Update token audience. Default is the instance URL.
    pub audience: Option<String>,
}

impl Default for Token {
    fn default() -> Self {
        Self {
            access_lifetime_minutes: DEFAULT_ACCESS_TOKEN_MINUTES,
            refresh_lifetime_days: DEFAULT_REFRESH_TOKEN_DAYS,
            audience: None,
        }
    }
}

/// Transactional email (Brevo) configuration.
///
/// The API key comes from the `BREVO_API_KEY` environment variable.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail {
    /// Sender email address.
    pub sender: String,
    /// Sender display name, defaults to the instance name.
    pub sender_name: Option<String>,
}

/// Media host (Cloudinary) configuration.
///
/// `CLOUDINARY_API_KEY` and `CLOUDINARY_API_SECRET` come from the
/// environment.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Media {
    /// Cloudinary cloud name.
    pub cloud_name: String,
}

/// Generative AI (Gemini) configuration.
///
/// API keys come from the `GEMINI_API_KEYS` environment variable as a
/// comma-separated pool; one key is drawn at random per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Llm {
    /// Model identifier.
    pub model: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for Llm {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".into(),
            timeout_seconds: 30,
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    /// Normalizes a URL string by ensuring it starts with a valid scheme
    /// (`http` or `https`).
    fn normalize_url(&self, url: &str) -> Result<String, url::ParseError> {
        let url_with_scheme =
            if url.starts_with("http://") || url.starts_with("https://") {
                url.to_string()
            } else {
                format!("https://{url}")
            };

        let parsed_url = Url::parse(&url_with_scheme)?;
        Ok(parsed_url.to_string())
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Result<Arc<Self>, url::ParseError> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => {
                let mut config: Configuration =
                    match serde_yaml::from_reader(file) {
                        Ok(config) => config,
                        Err(err) => {
                            return Ok(Arc::new(self.error(err)));
                        },
                    };

                // set app version.
                config.version = VERSION.to_owned();

                // normalize URLs.
                config.url = self.normalize_url(&config.url)?;

                Ok(Arc::new(config))
            },
            Err(err) => Ok(Arc::new(self.error(err))),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found");
        Self {
            version: VERSION.to_owned(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_url_adds_scheme() {
        let config = Configuration::default();
        assert_eq!(
            config.normalize_url("saksin.app").unwrap(),
            "https://saksin.app/"
        );
        assert_eq!(
            config.normalize_url("http://localhost:8000").unwrap(),
            "http://localhost:8000/"
        );
    }

    #[test]
    fn test_token_defaults() {
        let token = Token::default();
        assert_eq!(token.access_lifetime_minutes, 5);
        assert_eq!(token.refresh_lifetime_days, 1);
    }
}
