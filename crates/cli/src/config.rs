//! Configuration loading from capstan.toml.

use std::path::Path;
use std::time::Duration;

use runtime::{ConnectionConfig, DispatchConfig};
use serde::Deserialize;
use tools::ToolsConfig;

/// Config file picked up from the working directory when `--config` is absent.
pub const CONFIG_FILE: &str = "capstan.toml";

/// Top-level configuration. Every section and key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerSection,
    pub dispatch: DispatchSection,
    pub connection: ConnectionSection,
    pub tools: ToolsSection,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    /// Address the HTTP/WebSocket listener binds to.
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8089".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchSection {
    /// Per-handler execution budget.
    pub timeout_ms: u64,
    /// Handlers running at once; excess calls queue.
    pub max_concurrent: usize,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            timeout_ms: millis(runtime::tools::DEFAULT_TIMEOUT),
            max_concurrent: runtime::tools::DEFAULT_MAX_CONCURRENT,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionSection {
    /// Calls in flight per connection; excess calls are rejected as overloaded.
    pub max_in_flight: usize,
    pub queue_capacity: usize,
    pub close_grace_ms: u64,
    pub max_frame_bytes: usize,
}

impl Default for ConnectionSection {
    fn default() -> Self {
        let defaults = ConnectionConfig::default();
        Self {
            max_in_flight: defaults.max_in_flight,
            queue_capacity: defaults.queue_capacity,
            close_grace_ms: millis(defaults.close_grace),
            max_frame_bytes: defaults.max_frame_bytes,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ToolsSection {
    /// Default user for `github_list_repos`; `GITHUB_USERNAME` when unset.
    pub github_username: Option<String>,
    pub github_api_url: String,
    pub http_timeout_ms: u64,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            github_username: None,
            github_api_url: tools::GITHUB_API_URL.to_string(),
            http_timeout_ms: millis(tools::DEFAULT_HTTP_TIMEOUT),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else `capstan.toml` if present, else defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("server.bind", !self.server.bind.trim().is_empty()),
            ("dispatch.timeout_ms", self.dispatch.timeout_ms > 0),
            ("dispatch.max_concurrent", self.dispatch.max_concurrent > 0),
            ("connection.max_in_flight", self.connection.max_in_flight > 0),
            ("connection.queue_capacity", self.connection.queue_capacity > 0),
            ("connection.max_frame_bytes", self.connection.max_frame_bytes > 0),
            ("tools.http_timeout_ms", self.tools.http_timeout_ms > 0),
        ];
        match positive.into_iter().find(|(_, ok)| !ok) {
            Some((key, _)) => Err(ConfigError::Invalid(format!("{key} must not be zero or empty"))),
            None => Ok(()),
        }
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            timeout: Duration::from_millis(self.dispatch.timeout_ms),
            max_concurrent: self.dispatch.max_concurrent,
        }
    }

    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            max_in_flight: self.connection.max_in_flight,
            queue_capacity: self.connection.queue_capacity,
            close_grace: Duration::from_millis(self.connection.close_grace_ms),
            max_frame_bytes: self.connection.max_frame_bytes,
        }
    }

    /// Tool settings, with `GITHUB_USERNAME` filling an unset username.
    pub fn tools_config(&self) -> ToolsConfig {
        ToolsConfig {
            github_username: self.tools.github_username.clone(),
            github_api_url: self.tools.github_api_url.clone(),
            http_timeout: Duration::from_millis(self.tools.http_timeout_ms),
        }
        .with_env_defaults()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8089");

        let dispatch = config.dispatch_config();
        assert_eq!(dispatch.timeout, Duration::from_secs(30));
        assert_eq!(dispatch.max_concurrent, 64);

        let connection = config.connection_config();
        assert_eq!(connection.max_in_flight, 32);
        assert_eq!(connection.queue_capacity, 64);
        assert_eq!(connection.close_grace, Duration::from_secs(5));
        assert_eq!(connection.max_frame_bytes, 1024 * 1024);

        assert_eq!(config.tools.github_api_url, "https://api.github.com");
        assert_eq!(config.tools.http_timeout_ms, 30_000);
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
            [server]
            bind = "127.0.0.1:9000"

            [dispatch]
            timeout_ms = 1500
            max_concurrent = 4

            [connection]
            max_in_flight = 2
            queue_capacity = 8
            close_grace_ms = 250
            max_frame_bytes = 4096

            [tools]
            github_username = "octocat"
            http_timeout_ms = 2000
        "#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:9000");
        assert_eq!(config.dispatch_config().timeout, Duration::from_millis(1500));
        assert_eq!(config.dispatch_config().max_concurrent, 4);
        assert_eq!(config.connection_config().max_in_flight, 2);
        assert_eq!(config.connection_config().close_grace, Duration::from_millis(250));
        assert_eq!(config.connection_config().max_frame_bytes, 4096);

        let tools = config.tools_config();
        assert_eq!(tools.github_username.as_deref(), Some("octocat"));
        assert_eq!(tools.http_timeout, Duration::from_secs(2));
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = Config::parse("[connection]\nmax_in_flight = 1\n").unwrap();
        assert_eq!(config.connection.max_in_flight, 1);
        assert_eq!(config.connection.queue_capacity, 64);
        assert_eq!(config.dispatch.max_concurrent, 64);
    }

    #[test]
    fn unknown_key_rejected() {
        let err = Config::parse("[dispatch]\ntimeout = 5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_limits_rejected() {
        let err = Config::parse("[dispatch]\nmax_concurrent = 0\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid config: dispatch.max_concurrent must not be zero or empty"
        );
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[server]\nbind = \"127.0.0.1:7000\"\n").unwrap();

        let config = Config::discover(Some(path.as_path())).unwrap();
        assert_eq!(config.server.bind, "127.0.0.1:7000");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::discover(Some(dir.path().join("absent.toml").as_path())).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
