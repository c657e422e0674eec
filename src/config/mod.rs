use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default number of task-result polls before giving up
pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;

/// Default delay between task-result polls, in seconds
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 2;

/// Poll delay used while waiting for a deployment, in seconds
pub const DEFAULT_DEPLOY_POLL_INTERVAL_SECS: u64 = 20;

pub const ENV_API_URL: &str = "SQUARE_API_URL";
pub const ENV_VERIFY_SSL: &str = "VERIFY_SSL";
pub const ENV_MAX_ATTEMPTS: &str = "SQUARE_MAX_ATTEMPTS";
pub const ENV_POLL_INTERVAL: &str = "SQUARE_POLL_INTERVAL";
pub const ENV_DEPLOY_POLL_INTERVAL: &str = "SQUARE_DEPLOY_POLL_INTERVAL";
pub const ENV_LENIENT_POLLING: &str = "SQUARE_LENIENT_POLLING";

/// Default config file location: ~/.square/config
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".square")
        .join("config")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("No API URL configured (set SQUARE_API_URL or api_url in the config file)")]
    MissingApiUrl,

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Everything the client needs besides a credential provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the model API, e.g. "https://square.example.org/api"
    #[serde(default)]
    pub api_url: String,

    /// Verify the server's TLS certificate
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_deploy_poll_interval")]
    pub deploy_poll_interval_secs: u64,

    /// Treat only pending statuses as "not ready" while polling; any other
    /// failure aborts the wait. `false` retries every non-200 response.
    #[serde(default = "default_strict_polling")]
    pub strict_polling: bool,

    /// Per-request timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            verify_ssl: default_verify_ssl(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            deploy_poll_interval_secs: DEFAULT_DEPLOY_POLL_INTERVAL_SECS,
            strict_polling: default_strict_polling(),
            request_timeout_secs: None,
        }
    }
}

fn default_verify_ssl() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_deploy_poll_interval() -> u64 {
    DEFAULT_DEPLOY_POLL_INTERVAL_SECS
}

fn default_strict_polling() -> bool {
    true
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            ..Self::default()
        }
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.api_url.trim_end_matches('/')
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn deploy_poll_interval(&self) -> Duration {
        Duration::from_secs(self.deploy_poll_interval_secs)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Fail early when the config cannot reach any server
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.base_url().is_empty() {
            return Err(ConfigError::MissingApiUrl);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_attempts".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// SBIO: Pure business logic (no I/O)
// ============================================================================

/// Parse config from YAML string
pub fn parse_config(content: &str) -> Result<ClientConfig, ConfigError> {
    serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Serialize config to YAML string
pub fn serialize_config(config: &ClientConfig) -> Result<String, ConfigError> {
    serde_yaml::to_string(config).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Overlay environment variables onto `config`.
///
/// `VERIFY_SSL` follows the server convention: only the exact value "1"
/// enables verification.
pub fn apply_env<F>(mut config: ClientConfig, lookup: F) -> Result<ClientConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup(ENV_API_URL) {
        config.api_url = url;
    }
    if let Some(verify) = lookup(ENV_VERIFY_SSL) {
        config.verify_ssl = verify == "1";
    }
    if let Some(value) = lookup(ENV_MAX_ATTEMPTS) {
        config.max_attempts = parse_number(ENV_MAX_ATTEMPTS, &value)?;
    }
    if let Some(value) = lookup(ENV_POLL_INTERVAL) {
        config.poll_interval_secs = parse_number(ENV_POLL_INTERVAL, &value)?;
    }
    if let Some(value) = lookup(ENV_DEPLOY_POLL_INTERVAL) {
        config.deploy_poll_interval_secs = parse_number(ENV_DEPLOY_POLL_INTERVAL, &value)?;
    }
    if let Some(value) = lookup(ENV_LENIENT_POLLING) {
        config.strict_polling = value != "1";
    }
    Ok(config)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

// ============================================================================
// I/O boundary functions
// ============================================================================

/// Load config from a specific path; a missing file yields the defaults
pub fn load_config_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    if !path.exists() {
        return Ok(ClientConfig::default());
    }
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Defaults, then the config file (if any), then the process environment
pub fn load_config(path: Option<&Path>) -> Result<ClientConfig, ConfigError> {
    let base = match path {
        Some(path) => load_config_from(path)?,
        None => load_config_from(&default_config_path())?,
    };
    apply_env(base, |key| std::env::var(key).ok())
}

/// Save config to a specific path
pub fn save_config_to(config: &ClientConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serialize_config(config)?;
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.max_attempts, 50);
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.deploy_poll_interval(), Duration::from_secs(20));
        assert!(config.verify_ssl);
        assert!(config.strict_polling);
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
api_url: https://square.example.org/api/
verify_ssl: false
poll_interval_secs: 5
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.base_url(), "https://square.example.org/api");
        assert!(!config.verify_ssl);
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn test_env_overrides() {
        let config = apply_env(
            ClientConfig::new("http://file"),
            env(&[
                (ENV_API_URL, "http://env"),
                (ENV_VERIFY_SSL, "1"),
                (ENV_MAX_ATTEMPTS, "3"),
                (ENV_LENIENT_POLLING, "1"),
            ]),
        )
        .unwrap();

        assert_eq!(config.api_url, "http://env");
        assert!(config.verify_ssl);
        assert_eq!(config.max_attempts, 3);
        assert!(!config.strict_polling);
    }

    #[test]
    fn test_verify_ssl_only_exact_one() {
        let config = apply_env(ClientConfig::default(), env(&[(ENV_VERIFY_SSL, "true")])).unwrap();
        assert!(!config.verify_ssl);
    }

    #[test]
    fn test_env_invalid_number() {
        let result = apply_env(
            ClientConfig::default(),
            env(&[(ENV_POLL_INTERVAL, "soon")]),
        );
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_validate() {
        assert!(matches!(
            ClientConfig::default().validate(),
            Err(ConfigError::MissingApiUrl)
        ));
        assert!(ClientConfig::new("http://localhost").validate().is_ok());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config");
        let mut config = ClientConfig::new("http://localhost:8443");
        config.verify_ssl = false;

        save_config_to(&config, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let loaded = load_config_from(Path::new("/nonexistent/square/config")).unwrap();
        assert_eq!(loaded, ClientConfig::default());
    }
}
