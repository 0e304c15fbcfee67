//! Configuration for deck-server.
//!
//! Supports loading from TOML file with environment variable overrides.
//! Secrets (the maintenance token) are only ever read from the environment,
//! never from the config file.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

/// Top-level configuration for deck-server.
#[derive(Debug, Clone)]
pub struct DeckConfig {
    /// Logging level.
    pub log_level: String,

    /// HTTP server parameters.
    pub server: ServerConfig,

    /// Session lifecycle parameters.
    pub session: SessionConfig,

    /// Market data freshness parameters.
    pub market: MarketConfig,

    /// Exchange backend connection parameters.
    pub upstream: UpstreamConfig,
}

/// HTTP server parameters.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,

    /// Port to listen on.
    pub port: u16,

    /// Enable CORS for frontend development.
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3002,
            enable_cors: true,
        }
    }
}

/// Session lifecycle parameters.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session time-to-live (seconds). TTL is fixed, not sliding.
    pub ttl_secs: u64,

    /// Interval between background expiry sweeps (seconds).
    pub sweep_interval_secs: u64,

    /// Name of the session cookie.
    pub cookie_name: String,

    /// Set the Secure attribute on the session cookie.
    pub cookie_secure: bool,

    /// Shared secret for the maintenance sweep trigger.
    /// Loaded from DECK_MAINTENANCE_TOKEN, never from the config file.
    /// When unset the trigger is unauthenticated.
    pub maintenance_token: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            sweep_interval_secs: 60,
            cookie_name: "deck_session".to_string(),
            cookie_secure: false,
            maintenance_token: None,
        }
    }
}

impl SessionConfig {
    /// Get the session TTL as a Duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Get the sweep interval as a Duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Market data freshness parameters.
#[derive(Debug, Clone)]
pub struct MarketConfig {
    /// Snapshot age below which no refetch happens (seconds).
    pub fresh_secs: u64,

    /// Snapshot age at which a synchronous refetch is attempted before
    /// serving (seconds). Between `fresh_secs` and this ceiling, stale
    /// snapshots are served immediately while refreshing in the background.
    pub serve_ceiling_secs: u64,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            fresh_secs: 300,         // 5 minutes
            serve_ceiling_secs: 1800, // 30 minutes
        }
    }
}

impl MarketConfig {
    /// Age below which a snapshot is served without any refetch.
    pub fn fresh_for(&self) -> Duration {
        Duration::from_secs(self.fresh_secs)
    }

    /// Age at which serving requires a synchronous refetch attempt.
    pub fn serve_ceiling(&self) -> Duration {
        Duration::from_secs(self.serve_ceiling_secs)
    }
}

/// Exchange backend connection parameters.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the exchange backend.
    pub base_url: String,

    /// Request timeout for upstream calls (seconds).
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            timeout_secs: 10,
        }
    }
}

impl UpstreamConfig {
    /// Get the upstream request timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            market: MarketConfig::default(),
            upstream: UpstreamConfig::default(),
        }
    }
}

impl DeckConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        Ok(Self::from(file))
    }

    /// Apply environment variable overrides for sensitive values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("DECK_MAINTENANCE_TOKEN") {
            self.session.maintenance_token = Some(token);
        }

        if let Ok(url) = std::env::var("DECK_UPSTREAM_URL") {
            self.upstream.base_url = url;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_cli_overrides(
        &mut self,
        port: Option<u16>,
        upstream_url: Option<String>,
        log_level: Option<String>,
    ) {
        if let Some(port) = port {
            self.server.port = port;
        }

        if let Some(url) = upstream_url {
            self.upstream.base_url = url;
        }

        if let Some(level) = log_level {
            self.log_level = level;
        }
    }

    /// Validate configuration and return errors for invalid values.
    pub fn validate(&self) -> Result<()> {
        if self.session.ttl_secs == 0 {
            bail!("session.ttl_secs must be positive");
        }
        if self.session.sweep_interval_secs == 0 {
            bail!("session.sweep_interval_secs must be positive");
        }
        if self.session.cookie_name.is_empty() {
            bail!("session.cookie_name must not be empty");
        }

        if self.market.fresh_secs == 0 {
            bail!("market.fresh_secs must be positive");
        }
        if self.market.serve_ceiling_secs <= self.market.fresh_secs {
            bail!("market.serve_ceiling_secs must exceed market.fresh_secs");
        }

        if self.upstream.timeout_secs == 0 {
            bail!("upstream.timeout_secs must be positive");
        }
        if !self.upstream.base_url.starts_with("http://")
            && !self.upstream.base_url.starts_with("https://")
        {
            bail!("upstream.base_url must be an http(s) URL");
        }

        Ok(())
    }
}

// ============================================================================
// TOML deserialization structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    general: GeneralToml,
    #[serde(default)]
    server: ServerToml,
    #[serde(default)]
    session: SessionToml,
    #[serde(default)]
    market: MarketToml,
    #[serde(default)]
    upstream: UpstreamToml,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeneralToml {
    log_level: String,
}

impl Default for GeneralToml {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct ServerToml {
    host: String,
    port: u16,
    enable_cors: bool,
}

impl Default for ServerToml {
    fn default() -> Self {
        let defaults = ServerConfig::default();
        Self {
            host: defaults.host,
            port: defaults.port,
            enable_cors: defaults.enable_cors,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SessionToml {
    ttl_secs: u64,
    sweep_interval_secs: u64,
    cookie_name: String,
    cookie_secure: bool,
}

impl Default for SessionToml {
    fn default() -> Self {
        let defaults = SessionConfig::default();
        Self {
            ttl_secs: defaults.ttl_secs,
            sweep_interval_secs: defaults.sweep_interval_secs,
            cookie_name: defaults.cookie_name,
            cookie_secure: defaults.cookie_secure,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct MarketToml {
    fresh_secs: u64,
    serve_ceiling_secs: u64,
}

impl Default for MarketToml {
    fn default() -> Self {
        let defaults = MarketConfig::default();
        Self {
            fresh_secs: defaults.fresh_secs,
            serve_ceiling_secs: defaults.serve_ceiling_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct UpstreamToml {
    base_url: String,
    timeout_secs: u64,
}

impl Default for UpstreamToml {
    fn default() -> Self {
        let defaults = UpstreamConfig::default();
        Self {
            base_url: defaults.base_url,
            timeout_secs: defaults.timeout_secs,
        }
    }
}

impl From<TomlConfig> for DeckConfig {
    fn from(toml: TomlConfig) -> Self {
        Self {
            log_level: toml.general.log_level,
            server: ServerConfig {
                host: toml.server.host,
                port: toml.server.port,
                enable_cors: toml.server.enable_cors,
            },
            session: SessionConfig {
                ttl_secs: toml.session.ttl_secs,
                sweep_interval_secs: toml.session.sweep_interval_secs,
                cookie_name: toml.session.cookie_name,
                cookie_secure: toml.session.cookie_secure,
                maintenance_token: None, // Set via env var
            },
            market: MarketConfig {
                fresh_secs: toml.market.fresh_secs,
                serve_ceiling_secs: toml.market.serve_ceiling_secs,
            },
            upstream: UpstreamConfig {
                base_url: toml.upstream.base_url,
                timeout_secs: toml.upstream.timeout_secs,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DeckConfig::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.session.ttl_secs, 3600);
        assert_eq!(config.session.sweep_interval_secs, 60);
        assert_eq!(config.market.fresh_secs, 300);
        assert_eq!(config.market.serve_ceiling_secs, 1800);
        assert!(config.session.maintenance_token.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [general]
            log_level = "debug"

            [server]
            port = 4000
            enable_cors = false

            [session]
            ttl_secs = 7200
            cookie_name = "my_session"

            [market]
            fresh_secs = 60
            serve_ceiling_secs = 600

            [upstream]
            base_url = "https://exchange.internal:8443"
            timeout_secs = 5
        "#;

        let config = DeckConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.server.port, 4000);
        assert!(!config.server.enable_cors);
        assert_eq!(config.session.ttl_secs, 7200);
        assert_eq!(config.session.cookie_name, "my_session");
        // Unset values fall back to defaults
        assert_eq!(config.session.sweep_interval_secs, 60);
        assert_eq!(config.market.fresh_secs, 60);
        assert_eq!(config.upstream.base_url, "https://exchange.internal:8443");
        assert_eq!(config.upstream.timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_parse_empty_toml_gives_defaults() {
        let config = DeckConfig::from_toml_str("").unwrap();
        assert_eq!(config.server.port, 3002);
        assert_eq!(config.session.ttl(), Duration::from_secs(3600));
    }

    #[test]
    fn test_cli_overrides() {
        let mut config = DeckConfig::default();

        config.apply_cli_overrides(
            Some(8080),
            Some("http://override:9000".to_string()),
            Some("trace".to_string()),
        );

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.upstream.base_url, "http://override:9000");
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_validate_zero_ttl() {
        let mut config = DeckConfig::default();
        config.session.ttl_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_ceiling_below_fresh() {
        let mut config = DeckConfig::default();
        config.market.fresh_secs = 600;
        config.market.serve_ceiling_secs = 300;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bad_upstream_url() {
        let mut config = DeckConfig::default();
        config.upstream.base_url = "exchange.internal:8443".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_maintenance_token_never_from_toml() {
        // The token is deliberately absent from the TOML schema.
        let toml = r#"
            [session]
            maintenance_token = "leaked"
        "#;

        // Unknown keys are ignored; the token stays unset.
        let config = DeckConfig::from_toml_str(toml).unwrap();
        assert!(config.session.maintenance_token.is_none());
    }
}
