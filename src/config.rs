//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::measurement::SensorType;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub hub: HubConfig,

    #[serde(default)]
    pub directory: DirectoryConfig,

    #[serde(default)]
    pub sensors: Vec<SensorType>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8090
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl ServerConfig {
    /// Get the socket address string
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Token verification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared HS256 secret
    #[serde(default)]
    pub secret: String,

    /// Clock skew tolerated when checking expiry (seconds)
    #[serde(default = "default_leeway")]
    pub leeway_secs: u64,

    /// Lifetime of tokens issued by the CLI (seconds)
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

fn default_leeway() -> u64 {
    30
}

fn default_token_ttl() -> u64 {
    7 * 24 * 3600 // one week
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            leeway_secs: default_leeway(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

/// Subscription hub configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Messages queued per connection before deliveries to it fail
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_max_connections() -> usize {
    1000
}

fn default_outbound_buffer() -> usize {
    256
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

/// Persons and kits known to the in-memory directory
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DirectoryConfig {
    #[serde(default)]
    pub persons: Vec<PersonEntry>,

    #[serde(default)]
    pub kits: Vec<KitEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PersonEntry {
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct KitEntry {
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub owners: Vec<String>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
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
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    ///
    /// Nothing is logged here; the returned report says what happened so the
    /// caller can log it once logging is set up.
    pub fn load_default() -> (Self, ConfigReport) {
        let config_paths: Vec<PathBuf> = [
            dirs::config_dir().map(|p| p.join("kitstream").join("config.toml")),
            Some(PathBuf::from("/etc/kitstream/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self::load_first(&config_paths)
    }

    /// Load the first existing file that parses, falling back to defaults
    fn load_first(paths: &[PathBuf]) -> (Self, ConfigReport) {
        let mut report = ConfigReport::default();

        for path in paths.iter().filter(|p| p.exists()) {
            match Self::load_with_env(path) {
                Ok(config) => {
                    report.loaded_from = Some(path.clone());
                    return (config, report);
                }
                Err(e) => report.failures.push(e),
            }
        }

        (Self::from_env(), report)
    }

    /// Check settings the server cannot run without
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.secret.is_empty() {
            return Err(ConfigError::Invalid(
                "auth.secret must be set (or KITSTREAM_JWT_SECRET)".to_string(),
            ));
        }
        if self.hub.outbound_buffer == 0 {
            return Err(ConfigError::Invalid(
                "hub.outbound_buffer must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(host) = var("KITSTREAM_HOST") {
            self.server.host = host;
        }
        if let Some(port) = var("KITSTREAM_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }

        if let Some(secret) = var("KITSTREAM_JWT_SECRET") {
            self.auth.secret = secret;
        }

        if let Some(level) = var("KITSTREAM_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("KITSTREAM_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

/// Where [`Config::load_default`] found its settings
#[derive(Debug, Default)]
pub struct ConfigReport {
    /// File the config was read from; `None` means defaults plus environment
    pub loaded_from: Option<PathBuf>,
    /// Files that exist but could not be loaded
    pub failures: Vec<ConfigError>,
}

impl ConfigReport {
    /// Report for a config read from an explicit path
    pub fn from_file(path: &Path) -> Self {
        Self {
            loaded_from: Some(path.to_path_buf()),
            failures: Vec::new(),
        }
    }

    /// Log the outcome. Call after the subscriber is installed.
    pub fn log(&self) {
        for error in &self.failures {
            tracing::warn!(error = %error, "Skipping config file");
        }
        match &self.loaded_from {
            Some(path) => tracing::info!("Loaded config from {:?}", path),
            None => tracing::info!("Using default config with environment overrides"),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Kitstream Configuration
#
# Environment variables override these settings:
# - KITSTREAM_HOST
# - KITSTREAM_PORT
# - KITSTREAM_JWT_SECRET
# - KITSTREAM_LOG_LEVEL
# - KITSTREAM_LOG_FORMAT

[server]
# Host to bind to
host = "0.0.0.0"

# Port to listen on
port = 8090

[auth]
# Shared secret for HS256 tokens (required)
secret = ""

# Clock skew tolerated when checking token expiry (seconds)
leeway_secs = 30

# Lifetime of tokens issued with `kitstream-cli issue-token` (seconds)
token_ttl_secs = 604800

[hub]
# Maximum number of concurrent WebSocket connections
max_connections = 1000

# Messages queued per connection; subscribers that fall this far behind
# are dropped from their subscription groups
outbound_buffer = 256

[[directory.persons]]
username = "alice"

[[directory.kits]]
username = "kit42"
name = "Greenhouse"
owners = ["alice"]

[[sensors]]
id = 1
name = "Air temperature"
brand = "Bosch"
type = "BME280"
unit = "Degrees Celsius"
min_value = -40.0
max_value = 85.0

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.addr(), "0.0.0.0:8090");
        assert_eq!(config.hub.max_connections, 1000);
        assert_eq!(config.hub.outbound_buffer, 256);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_template_parses() {
        let config: Config = toml::from_str(&generate_default_config()).unwrap();
        assert_eq!(config.directory.kits.len(), 1);
        assert_eq!(config.directory.kits[0].owners, vec!["alice"]);
        assert_eq!(config.sensors.len(), 1);
        assert_eq!(config.sensors[0].max_value, Some(85.0));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [server]
            port = 9000

            [auth]
            secret = "s3cret"

            [hub]
            outbound_buffer = 8
            "#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.secret, "s3cret");
        assert_eq!(config.auth.leeway_secs, 30);
        assert_eq!(config.hub.outbound_buffer, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_invalid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[server\nport = ").unwrap();

        let result = Config::load(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let vars: std::collections::HashMap<&str, &str> = [
            ("KITSTREAM_PORT", "9100"),
            ("KITSTREAM_JWT_SECRET", "from-env"),
            ("KITSTREAM_LOG_FORMAT", "json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.auth.secret, "from-env");
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_override_ignores_bad_port() {
        let mut config = Config::default();
        config.apply_overrides(|key| (key == "KITSTREAM_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(config.server.port, 8090);
    }

    #[test]
    fn test_load_first_reports_source() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.toml");
        let good = dir.path().join("good.toml");
        std::fs::write(&broken, "[server\nport = ").unwrap();
        std::fs::write(&good, "[auth]\nsecret = \"s3cret\"\n").unwrap();

        let paths = [dir.path().join("missing.toml"), broken, good.clone()];
        let (config, report) = Config::load_first(&paths);

        assert_eq!(report.loaded_from, Some(good));
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(report.failures[0], ConfigError::Parse { .. }));
        assert!(!config.auth.secret.is_empty());
    }

    #[test]
    fn test_load_first_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (config, report) = Config::load_first(&[dir.path().join("missing.toml")]);

        assert!(report.loaded_from.is_none());
        assert!(report.failures.is_empty());
        assert_eq!(config.hub.outbound_buffer, 256);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/kitstream.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
