//! Configuration structures for the mockroute tool.
//!
//! - [`MocksConfig`] - Where the mock tree lives and how it is walked
//! - [`WatchConfig`] - Watch loop settings (debounce window, channel size)
//! - [`HandlerConfig`] - Handler script settings (extension, time bounds)
//! - [`ServerConfig`] - Listener address and introspection routes
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`] and deserialize with
//! missing fields filled from the defaults, so a config file only needs
//! to mention what it changes.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Port used when neither the config file, the command line, nor `PORT`
/// selects one.
pub const DEFAULT_PORT: u16 = 4000;

/// Configuration for the mock directory tree.
///
/// # Examples
///
/// ```
/// use mr_core::MocksConfig;
///
/// let config = MocksConfig::default();
/// assert_eq!(config.root, "mocks");
/// assert!(!config.follow_links);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MocksConfig {
    /// Root of the mock tree.
    pub root: Utf8PathBuf,

    /// Whether to follow symbolic links while deriving routes.
    pub follow_links: bool,
}

impl Default for MocksConfig {
    fn default() -> Self {
        Self {
            root: Utf8PathBuf::from("mocks"),
            follow_links: false,
        }
    }
}

/// Configuration for the watch loop.
///
/// # Examples
///
/// ```
/// use mr_core::WatchConfig;
///
/// let config = WatchConfig::default();
/// assert_eq!(config.debounce_ms, 100);
/// assert!(config.enabled);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Whether file watching is enabled.
    pub enabled: bool,

    /// Debounce window in milliseconds.
    ///
    /// Notifications arriving within one window are coalesced into a
    /// single rebuild.
    pub debounce_ms: u64,

    /// Capacity of the notification channel between the file watcher
    /// and the watch loop.
    pub channel_capacity: usize,
}

impl WatchConfig {
    /// Returns the debounce window as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            debounce_ms: 100,
            channel_capacity: 64,
        }
    }
}

/// Configuration for handler scripts.
///
/// # Examples
///
/// ```
/// use mr_core::HandlerConfig;
///
/// let config = HandlerConfig::default();
/// assert_eq!(config.script_extension, "lua");
/// assert_eq!(config.load_timeout_ms, 2000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    /// File extension (without the dot) of dynamic handler scripts.
    pub script_extension: String,

    /// Upper bound on evaluating a script at load time.
    pub load_timeout_ms: u64,

    /// Upper bound on a single handler invocation.
    pub call_timeout_ms: u64,
}

impl HandlerConfig {
    /// Returns the load bound as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    /// Returns the call bound as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            script_extension: "lua".to_owned(),
            load_timeout_ms: 2000,
            call_timeout_ms: 5000,
        }
    }
}

/// Configuration for the HTTP listener.
///
/// # Examples
///
/// ```
/// use mr_core::ServerConfig;
///
/// let config = ServerConfig::default();
/// assert_eq!(config.port, 4000);
/// assert_eq!(config.introspection_prefix, "/__mockroute");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,

    /// TCP port to listen on.
    pub port: u16,

    /// Path prefix of the fixed introspection routes.
    pub introspection_prefix: String,
}

impl ServerConfig {
    /// Returns `host:port`.
    #[must_use]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: DEFAULT_PORT,
            introspection_prefix: "/__mockroute".to_owned(),
        }
    }
}

/// Root configuration for the mockroute tool.
///
/// # Examples
///
/// ```
/// use mr_core::Config;
///
/// let config = Config::default();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Mock tree configuration.
    pub mocks: MocksConfig,

    /// Watch loop configuration.
    pub watch: WatchConfig,

    /// Handler script configuration.
    pub handlers: HandlerConfig,

    /// HTTP listener configuration.
    pub server: ServerConfig,
}

impl Config {
    /// Loads a configuration from a JSON file.
    ///
    /// Missing fields take their default values. The result is validated.
    pub fn from_json_file(path: &Utf8Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks option values that deserialization alone cannot rule out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.debounce_ms == 0 {
            return Err(ConfigError::invalid_option(
                "watch.debounce_ms",
                "must be greater than zero",
            ));
        }
        if self.watch.channel_capacity == 0 {
            return Err(ConfigError::invalid_option(
                "watch.channel_capacity",
                "must be greater than zero",
            ));
        }
        if self.handlers.load_timeout_ms == 0 {
            return Err(ConfigError::invalid_option(
                "handlers.load_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.handlers.call_timeout_ms == 0 {
            return Err(ConfigError::invalid_option(
                "handlers.call_timeout_ms",
                "must be greater than zero",
            ));
        }
        let ext = &self.handlers.script_extension;
        if ext.is_empty() || ext.starts_with('.') || ext.eq_ignore_ascii_case("json") {
            return Err(ConfigError::invalid_option(
                "handlers.script_extension",
                "must be a bare extension other than json",
            ));
        }
        let prefix = &self.server.introspection_prefix;
        if !prefix.starts_with('/') {
            return Err(ConfigError::invalid_option(
                "server.introspection_prefix",
                "must start with '/'",
            ));
        }
        // An empty prefix would put the fixed routes over derived mocks.
        if prefix.trim_end_matches('/').is_empty() {
            return Err(ConfigError::invalid_option(
                "server.introspection_prefix",
                "must name at least one path segment",
            ));
        }
        Ok(())
    }

    /// Checks that the mock root exists and is a directory.
    pub fn check_mock_root(&self) -> Result<(), ConfigError> {
        let root = &self.mocks.root;
        if !root.exists() {
            return Err(ConfigError::MissingDirectory(root.clone()));
        }
        if !root.is_dir() {
            return Err(ConfigError::NotADirectory(root.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mocks.root, "mocks");
        assert_eq!(config.watch.debounce(), Duration::from_millis(100));
        assert_eq!(config.handlers.call_timeout(), Duration::from_secs(5));
        assert_eq!(config.server.bind_address(), "0.0.0.0:4000");
    }

    #[test]
    fn test_config_deserialize_with_missing_fields() {
        let json = r#"{"server": {"port": 8080}, "watch": {"debounce_ms": 250}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.watch.debounce_ms, 250);
        assert!(config.watch.enabled);
        assert_eq!(config.handlers.script_extension, "lua");
    }

    #[test]
    fn test_config_serialization_roundtrip() {
        let config = Config::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_validate_rejects_zero_debounce() {
        let mut config = Config::default();
        config.watch.debounce_ms = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("watch.debounce_ms"));
    }

    #[test]
    fn test_validate_rejects_json_script_extension() {
        let mut config = Config::default();
        config.handlers.script_extension = "json".to_owned();
        assert!(config.validate().is_err());
        config.handlers.script_extension = ".lua".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_relative_prefix() {
        let mut config = Config::default();
        config.server.introspection_prefix = "admin".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_root_prefix() {
        let mut config = Config::default();
        config.server.introspection_prefix = "/".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.introspection_prefix"));

        config.server.introspection_prefix = "/admin/".to_owned();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().join("mockroute.json")).unwrap();
        std::fs::write(&path, r#"{"mocks": {"root": "api"}}"#).unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.mocks.root, "api");
        assert_eq!(config.server.port, DEFAULT_PORT);
    }

    #[test]
    fn test_from_json_file_missing() {
        let err = Config::from_json_file(Utf8Path::new("/nonexistent/mockroute.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_check_mock_root() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.mocks.root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        assert!(config.check_mock_root().is_ok());

        config.mocks.root = config.mocks.root.join("absent");
        assert!(matches!(
            config.check_mock_root(),
            Err(ConfigError::MissingDirectory(_))
        ));
    }
}
