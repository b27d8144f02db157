//! Configuration system for webcaptor
//!
//! Provides:
//! - Config file discovery (CLI flag, env var, standard paths)
//! - TOML parsing with serde
//! - Environment variable overrides
//! - Per-field capture toggles and endpoint exclusions

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete capture configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptorConfig {
    /// Global settings
    pub captor: CaptorSettings,

    /// Which event fields are captured
    pub event_details: EventDetails,

    /// Which built-in enrichers run
    pub additional_details: AdditionalDetails,

    /// Response completion settings
    pub response: ResponseSettings,

    /// Requests that are passed through without capture
    pub excluded_endpoints: Vec<ExcludedEndpoint>,
}

/// Global settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptorSettings {
    /// Master switch; when off every request is passed through untouched
    pub enabled: bool,

    /// Log level: trace, debug, info, warn, error
    pub log_level: String,

    /// Capacity of the event broadcast channel
    pub event_buffer_size: usize,
}

impl Default for CaptorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
        }
    }
}

/// Per-field capture toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventDetails {
    pub include_endpoint_exists: bool,
    pub include_full_url: bool,
    pub include_path: bool,
    pub include_method: bool,
    pub include_request_headers: bool,
    pub include_query_params: bool,
    pub include_path_params: bool,
    pub include_request_body: bool,
    /// Capture file parts of multipart bodies (can be expensive)
    pub include_multipart_files: bool,
    pub include_response_headers: bool,
    pub include_response_body: bool,
    pub include_response_status: bool,
    pub include_error_details: bool,
    /// Captured bytes per body. Larger bodies still reach the handler and the
    /// client in full; only the captured copy is cut off.
    pub max_body_bytes: usize,
}

impl Default for EventDetails {
    fn default() -> Self {
        Self {
            include_endpoint_exists: true,
            include_full_url: true,
            include_path: true,
            include_method: true,
            include_request_headers: true,
            include_query_params: true,
            include_path_params: true,
            include_request_body: true,
            include_multipart_files: true,
            include_response_headers: true,
            include_response_body: true,
            include_response_status: true,
            include_error_details: true,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// Built-in enricher toggles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdditionalDetails {
    /// Request duration on the response event
    pub duration: bool,
    /// Resolved client IP
    pub ip_address: bool,
    /// User-Agent header
    pub user_agent: bool,
}

impl Default for AdditionalDetails {
    fn default() -> Self {
        Self {
            duration: true,
            ip_address: true,
            user_agent: true,
        }
    }
}

/// Response completion settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResponseSettings {
    /// Content types whose bodies are streamed through instead of buffered
    pub streaming_content_types: Vec<String>,

    /// How long to wait for an asynchronous body before giving up (ms)
    pub async_timeout_ms: u64,
}

impl Default for ResponseSettings {
    fn default() -> Self {
        Self {
            streaming_content_types: vec![
                "text/event-stream".to_string(),
                "application/x-ndjson".to_string(),
            ],
            async_timeout_ms: 30_000,
        }
    }
}

impl ResponseSettings {
    /// Whether a response with this content type is streamed
    pub fn is_streaming(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim();
        self.streaming_content_types
            .iter()
            .any(|ct| ct.eq_ignore_ascii_case(essence))
    }
}

/// Method + path pattern excluded from capture
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExcludedEndpoint {
    /// Comma-separated methods, or `*` for all
    #[serde(default = "default_excluded_method")]
    pub method: String,

    /// Ant-style path pattern
    pub path: String,
}

fn default_excluded_method() -> String {
    "*".to_string()
}

/// Configuration loader
pub struct ConfigLoader {
    /// Path to config file (if specified via CLI)
    cli_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self { cli_path: None }
    }

    /// Set the config path from CLI argument
    pub fn with_cli_path(mut self, path: Option<PathBuf>) -> Self {
        self.cli_path = path;
        self
    }

    /// Load configuration with the following precedence:
    /// 1. CLI --config flag
    /// 2. WEBCAPTOR_CONFIG environment variable
    /// 3. ~/.config/webcaptor/config.toml
    /// 4. /etc/webcaptor/config.toml
    /// 5. Default values
    pub fn load(&self) -> ConfigResult<CaptorConfig> {
        let config_path = self.find_config_file();

        let mut config = if let Some(path) = config_path {
            info!("Loading configuration from: {}", path.display());
            self.load_from_file(&path)?
        } else {
            debug!("No config file found, using defaults");
            CaptorConfig::default()
        };

        self.apply_env_overrides(&mut config);
        self.validate(&config)?;

        Ok(config)
    }

    /// Find the config file to use
    fn find_config_file(&self) -> Option<PathBuf> {
        if let Some(path) = &self.cli_path {
            if path.exists() {
                return Some(path.clone());
            }
            warn!("CLI config path does not exist: {}", path.display());
        }

        if let Ok(env_path) = std::env::var("WEBCAPTOR_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
            warn!("WEBCAPTOR_CONFIG path does not exist: {}", env_path);
        }

        if let Some(path) = Self::default_config_path() {
            if path.exists() {
                return Some(path);
            }
        }

        #[cfg(unix)]
        {
            let path = PathBuf::from("/etc/webcaptor/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        None
    }

    /// Load configuration from a TOML file
    fn load_from_file(&self, path: &Path) -> ConfigResult<CaptorConfig> {
        let content = std::fs::read_to_string(path)?;
        let config: CaptorConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut CaptorConfig) {
        if let Ok(val) = std::env::var("WEBCAPTOR_ENABLED") {
            config.captor.enabled = val.parse().unwrap_or(config.captor.enabled);
        }
        if let Ok(val) = std::env::var("WEBCAPTOR_LOG_LEVEL") {
            config.captor.log_level = val;
        }

        let details = &mut config.event_details;
        if let Ok(val) = std::env::var("WEBCAPTOR_INCLUDE_REQUEST_BODY") {
            details.include_request_body = val.parse().unwrap_or(details.include_request_body);
        }
        if let Ok(val) = std::env::var("WEBCAPTOR_INCLUDE_RESPONSE_BODY") {
            details.include_response_body = val.parse().unwrap_or(details.include_response_body);
        }
        if let Ok(val) = std::env::var("WEBCAPTOR_INCLUDE_MULTIPART_FILES") {
            details.include_multipart_files =
                val.parse().unwrap_or(details.include_multipart_files);
        }

        if let Ok(val) = std::env::var("WEBCAPTOR_MAX_BODY_BYTES") {
            if let Ok(bytes) = val.parse() {
                details.max_body_bytes = bytes;
            }
        }

        if let Ok(val) = std::env::var("WEBCAPTOR_ASYNC_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                config.response.async_timeout_ms = ms;
            }
        }
    }

    /// Validate configuration
    fn validate(&self, config: &CaptorConfig) -> ConfigResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&config.captor.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                config.captor.log_level, valid_levels
            )));
        }

        if config.captor.event_buffer_size == 0 {
            return Err(ConfigError::ValidationError(
                "Event buffer size cannot be 0".to_string(),
            ));
        }

        if config.event_details.max_body_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "Max body bytes cannot be 0".to_string(),
            ));
        }

        if config.response.async_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Async timeout cannot be 0".to_string(),
            ));
        }

        for endpoint in &config.excluded_endpoints {
            if !endpoint.path.starts_with('/') {
                return Err(ConfigError::ValidationError(format!(
                    "Excluded endpoint path must start with '/': {:?}",
                    endpoint.path
                )));
            }
        }

        Ok(())
    }

    /// Save configuration to a file
    pub fn save(&self, config: &CaptorConfig, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(config).map_err(|e| {
            ConfigError::ValidationError(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        info!("Configuration saved to: {}", path.display());
        Ok(())
    }

    /// Get the default config file path for the current platform
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("webcaptor").join("config.toml"))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper module for platform-specific directories
mod dirs {
    use std::path::PathBuf;

    /// Get the user's config directory
    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        }

        #[cfg(not(target_os = "windows"))]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| {
                    std::env::var("HOME")
                        .ok()
                        .map(|h| PathBuf::from(h).join(".config"))
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CaptorConfig::default();
        assert!(config.captor.enabled);
        assert_eq!(config.captor.log_level, "info");
        assert!(config.event_details.include_request_body);
        assert!(config.event_details.include_multipart_files);
        assert!(config.additional_details.duration);
        assert_eq!(config.response.async_timeout_ms, 30_000);
        assert_eq!(config.event_details.max_body_bytes, 1_048_576);
        assert!(config.excluded_endpoints.is_empty());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
            [event_details]
            include_request_headers = false
        "#;
        let config: CaptorConfig = toml::from_str(toml_str).unwrap();
        assert!(!config.event_details.include_request_headers);
        // Other fields should be default
        assert!(config.event_details.include_response_headers);
        assert!(config.captor.enabled);
    }

    #[test]
    fn test_parse_full_toml() {
        let toml_str = r#"
            [captor]
            enabled = true
            log_level = "debug"

            [event_details]
            include_multipart_files = false
            include_error_details = false
            max_body_bytes = 4096

            [additional_details]
            ip_address = false

            [response]
            streaming_content_types = ["text/event-stream"]
            async_timeout_ms = 500

            [[excluded_endpoints]]
            path = "/actuator/**"

            [[excluded_endpoints]]
            method = "GET,HEAD"
            path = "/health"
        "#;

        let config: CaptorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.captor.log_level, "debug");
        assert!(!config.event_details.include_multipart_files);
        assert!(!config.event_details.include_error_details);
        assert_eq!(config.event_details.max_body_bytes, 4096);
        assert!(!config.additional_details.ip_address);
        assert!(config.additional_details.user_agent);
        assert_eq!(config.response.async_timeout_ms, 500);
        assert_eq!(config.excluded_endpoints.len(), 2);
        assert_eq!(config.excluded_endpoints[0].method, "*");
        assert_eq!(config.excluded_endpoints[1].method, "GET,HEAD");
    }

    #[test]
    fn test_validation_invalid_log_level() {
        let config = CaptorConfig {
            captor: CaptorSettings {
                log_level: "invalid".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let loader = ConfigLoader::new();
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn test_validation_zero_body_limit() {
        let mut config = CaptorConfig::default();
        config.event_details.max_body_bytes = 0;
        assert!(ConfigLoader::new().validate(&config).is_err());
    }

    #[test]
    fn test_validation_relative_exclusion() {
        let config = CaptorConfig {
            excluded_endpoints: vec![ExcludedEndpoint {
                method: "*".into(),
                path: "health".into(),
            }],
            ..Default::default()
        };
        let loader = ConfigLoader::new();
        assert!(loader.validate(&config).is_err());
    }

    #[test]
    fn test_streaming_content_type_match() {
        let settings = ResponseSettings::default();
        assert!(settings.is_streaming("text/event-stream; charset=utf-8"));
        assert!(settings.is_streaming("Application/X-NDJSON"));
        assert!(!settings.is_streaming("application/json"));
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = CaptorConfig::default();
        config.event_details.include_query_params = false;
        config.excluded_endpoints.push(ExcludedEndpoint {
            method: "POST".into(),
            path: "/upload/**".into(),
        });

        let loader = ConfigLoader::new().with_cli_path(Some(path.clone()));
        loader.save(&config, &path).unwrap();
        let loaded = loader.load().unwrap();

        assert!(!loaded.event_details.include_query_params);
        assert_eq!(loaded.excluded_endpoints, config.excluded_endpoints);
    }
}
