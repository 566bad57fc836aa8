use domain::models::{AuditConfig, FallbackConfig, NotificationConfig};
use domain::services::{RecoveryConfig, SubmissionConfig};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub recovery: RecoveryConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub submissions: SubmissionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

impl From<&DatabaseConfig> for persistence::db::DatabaseConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            connect_timeout_secs: config.connect_timeout_secs,
            idle_timeout_secs: config.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Shared key required in `X-Admin-Key` on admin routes. Empty disables
    /// the admin API.
    #[serde(default)]
    pub admin_api_key: String,

    /// Per-client limit on the public quote routes; 0 disables it.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,
}

/// Outbound email used to deliver quotes and operator alerts.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,

    /// `console` (development) or `sendgrid`.
    #[serde(default = "default_email_provider")]
    pub provider: String,

    #[serde(default)]
    pub sendgrid_api_key: String,

    #[serde(default = "default_sender_email")]
    pub sender_email: String,

    #[serde(default = "default_sender_name")]
    pub sender_name: String,

    #[serde(default = "default_email_timeout")]
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_email_provider(),
            sendgrid_api_key: String::new(),
            sender_email: default_sender_email(),
            sender_name: default_sender_name(),
            timeout_secs: default_email_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_request_timeout() -> u64 {
    30
}
fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    5
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_idle_timeout() -> u64 {
    600
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_rate_limit() -> u32 {
    30
}
fn default_email_provider() -> String {
    "console".to_string()
}
fn default_sender_email() -> String {
    "quotes@quotedesk.example".to_string()
}
fn default_sender_name() -> String {
    "Quote Desk".to_string()
}
fn default_email_timeout() -> u64 {
    10
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. config/default.toml
    /// 2. config/local.toml (optional, not in git)
    /// 3. Environment variables with the QD__ prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(
                config::Environment::with_prefix("QD")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let cfg: Self = config.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Build a configuration from embedded defaults plus overrides, without
    /// touching the file system or validating.
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            request_timeout_secs = 30

            [database]
            url = ""

            [logging]
            level = "info"
            format = "json"

            [security]
            cors_origins = []
            admin_api_key = "test-admin-key"
            rate_limit_per_minute = 0

            [email]
            enabled = false
            provider = "console"

            [notifications]
            channels = ["console", "in_app"]
            rate_limit_minutes = 5
            severity_threshold = "warning"

            [recovery]
            base_delay_ms = 1
            max_delay_ms = 5

            [submissions]
            acquire_wait_ms = 200
        "#;

        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(defaults, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Validate configuration values.
    fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.database.url.is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "QD__DATABASE__URL environment variable must be set".to_string(),
            ));
        }

        if self.server.port == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "Server port cannot be 0".to_string(),
            ));
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigValidationError::InvalidValue(
                "min_connections cannot exceed max_connections".to_string(),
            ));
        }

        if self.email.enabled
            && self.email.provider == "sendgrid"
            && self.email.sendgrid_api_key.is_empty()
        {
            return Err(ConfigValidationError::MissingRequired(
                "email.sendgrid_api_key is required for the sendgrid provider".to_string(),
            ));
        }

        Ok(())
    }

    /// Listen address; falls back to all interfaces when the host is not an
    /// IP literal.
    pub fn socket_addr(&self) -> SocketAddr {
        let ip = self
            .server
            .host
            .parse::<IpAddr>()
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        SocketAddr::new(ip, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::{ChannelKind, FormKind, Severity};

    #[test]
    fn test_config_load_with_defaults() {
        let config =
            Config::load_for_test(&[("database.url", "postgres://qd:qd@localhost:5432/qd")])
                .expect("Failed to load config");

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.database.max_connections, 20);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.submissions.lock_timeout_secs, 30);
        assert_eq!(config.submissions.acquire_wait_ms, 200);
        assert_eq!(config.audit.retention_days, 30);
        assert!(config.fallback.allow_any_active);
    }

    #[test]
    fn test_domain_sections_deserialize() {
        let config = Config::load_for_test(&[]).expect("Failed to load config");

        assert_eq!(
            config.notifications.channels,
            vec![ChannelKind::Console, ChannelKind::InApp]
        );
        assert_eq!(config.notifications.severity_threshold, Severity::Warning);
        assert_eq!(config.recovery.base_delay_ms, 1);
        assert_eq!(config.recovery.max_retries, 3);
    }

    #[test]
    fn test_fallback_defaults_override() {
        let id = "7f3c1d8e-2a4b-4c5d-9e6f-0a1b2c3d4e5f";
        let config = Config::load_for_test(&[
            ("fallback.default_templates.erp", id),
            ("fallback.raise_on_exhausted", "true"),
        ])
        .expect("Failed to load config");

        assert_eq!(
            config.fallback.default_templates[&FormKind::Erp].to_string(),
            id
        );
        assert!(config.fallback.raise_on_exhausted);
    }

    #[test]
    fn test_config_validation_missing_db_url() {
        let config = Config::load_for_test(&[]).expect("Failed to load config");
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("QD__DATABASE__URL"));
    }

    #[test]
    fn test_config_validation_invalid_pool_settings() {
        let config = Config::load_for_test(&[
            ("database.url", "postgres://qd:qd@localhost:5432/qd"),
            ("database.min_connections", "100"),
            ("database.max_connections", "10"),
        ])
        .expect("Failed to load config");

        let result = config.validate();
        assert!(result.unwrap_err().to_string().contains("min_connections"));
    }

    #[test]
    fn test_config_validation_zero_port() {
        let config = Config::load_for_test(&[
            ("database.url", "postgres://qd:qd@localhost:5432/qd"),
            ("server.port", "0"),
        ])
        .expect("Failed to load config");

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sendgrid_requires_api_key() {
        let config = Config::load_for_test(&[
            ("database.url", "postgres://qd:qd@localhost:5432/qd"),
            ("email.enabled", "true"),
            ("email.provider", "sendgrid"),
        ])
        .expect("Failed to load config");

        assert!(config
            .validate()
            .unwrap_err()
            .to_string()
            .contains("sendgrid_api_key"));
    }

    #[test]
    fn test_socket_addr() {
        let config = Config::load_for_test(&[("server.port", "3000")]).unwrap();
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:3000");
    }
}
