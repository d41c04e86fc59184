use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

pub const DEFAULT_BASE_URL: &str = "https://app.asana.com/api/1.0";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub app: AppConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub name: String,
}

fn default_app_name() -> String {
    "Asana".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub token: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
const fn default_timeout_seconds() -> u64 {
    30
}
const fn default_max_in_flight() -> usize {
    1
}

impl ApiConfig {
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            timeout_seconds: default_timeout_seconds(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
}

pub const fn default_interval_seconds() -> u64 {
    30
}

impl PollConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_seconds: default_interval_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Keep polling after a 429 and lift the latch once `Retry-After` elapses
    #[serde(default)]
    pub resume_after_retry: bool,
    /// Window used when a 429 carries no usable `Retry-After` header
    #[serde(default = "default_retry_after_seconds")]
    pub default_retry_after_seconds: u64,
}

const fn default_retry_after_seconds() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            resume_after_retry: false,
            default_retry_after_seconds: default_retry_after_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Resolve a `${VAR}` reference against the environment. Plain values pass
/// through untouched; an unset variable resolves to `None`.
#[must_use]
pub fn expand_env_reference(value: &str) -> Option<String> {
    value
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
        .map_or_else(|| Some(value.to_string()), |name| env::var(name).ok())
}

fn parse_env<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("{name} is not a valid value: {raw:?}")),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from a TOML file at the specified path
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The file cannot be read
    /// - The TOML content cannot be parsed into the Config structure
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    /// Find the configuration file to use: the explicit path if given,
    /// otherwise the first default location that exists.
    #[must_use]
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }

        let mut candidates = vec![PathBuf::from("asana-extractor.toml")];
        if let Some(config_dir) = dirs::config_dir() {
            candidates.push(config_dir.join("asana-extractor/config.toml"));
        }
        candidates.push(PathBuf::from("/etc/asana-extractor/config.toml"));

        candidates.into_iter().find(|path| path.exists())
    }

    /// Override values with any process environment variables that are set
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric or boolean variable cannot be parsed
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(name) = env::var("APP_NAME") {
            if !name.is_empty() {
                self.app.name = name;
            }
        }

        if let Ok(base_url) = env::var("ASANA_API_ENDPOINT") {
            if !base_url.is_empty() {
                self.api.base_url = base_url;
            }
        }

        if let Ok(token) = env::var("ASANA_TOKEN") {
            self.api.token = Some(token);
        }

        if let Some(timeout) = parse_env("HTTP_CLIENT_TIMEOUT")? {
            self.api.timeout_seconds = timeout;
        }

        if let Some(max_in_flight) = parse_env("ASANA_MAX_IN_FLIGHT")? {
            self.api.max_in_flight = max_in_flight;
        }

        if let Some(interval) = parse_env("EXTRACT_INTERVAL")? {
            self.poll.interval_seconds = interval;
        }

        if let Some(resume) = parse_env("ASANA_RESUME_AFTER_RETRY")? {
            self.rate_limit.resume_after_retry = resume;
        }

        if let Ok(level) = env::var("LOG_LEVEL") {
            self.logging.level = level;
        }

        if let Ok(format) = env::var("LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Load configuration from the given file (or defaults) and the environment.
    ///
    /// A `.env` file in the working directory is read first when present, so
    /// its values behave like regular environment variables.
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - A `.env` file exists but cannot be parsed
    /// - The configuration file cannot be read or parsed
    /// - An environment variable holds an invalid value
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Missing .env is fine; values may come from the real environment.
        match dotenvy::dotenv() {
            Err(e) if !e.not_found() => return Err(e).context("failed to load .env"),
            _ => {}
        }

        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env()?;

        config.api.token = config
            .api
            .token
            .as_deref()
            .and_then(expand_env_reference);

        Ok(config)
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The API token is missing or empty
    /// - The timeout, interval or concurrency limit is zero
    /// - The log format is unknown
    pub fn validate(&self) -> Result<()> {
        if self.api.token.as_deref().map_or(true, str::is_empty) {
            return Err(anyhow!("asana token is empty"));
        }

        if self.api.base_url.is_empty() {
            return Err(anyhow!("API base URL is empty"));
        }

        if self.api.timeout_seconds == 0 {
            return Err(anyhow!("HTTP client timeout must be greater than 0"));
        }

        if self.api.max_in_flight == 0 {
            return Err(anyhow!("max_in_flight must be greater than 0"));
        }

        if self.poll.interval_seconds == 0 {
            return Err(anyhow!("poll interval must be greater than 0"));
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(anyhow!(
                "unknown log format `{}`, expected `text` or `json`",
                self.logging.format
            ));
        }

        Ok(())
    }
}
