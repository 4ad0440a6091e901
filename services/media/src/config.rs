use serde::Deserialize;
use std::time::Duration;
use tradebidz_pipeline::StreamConfig;

/// Flat environment variables the service honoured before the prefixed
/// layout existed, mapped to the key they override.
const LEGACY_OVERRIDES: &[(&str, &str)] = &[
    ("PORT", "api.port"),
    ("SUPABASE_URL", "storage.base_url"),
    ("SUPABASE_KEY", "storage.api_key"),
    ("SUPABASE_BUCKET", "storage.bucket"),
    ("GMAIL_APP_PASSWORD", "email.smtp.password"),
    ("REDIS_URL", "queue.redis_url"),
];

/// Main configuration for the media service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
    /// Object storage configuration
    pub storage: StorageConfig,
    /// Image normalization configuration
    #[serde(default)]
    pub image: ImageConfig,
    /// Email delivery configuration
    #[serde(default)]
    pub email: EmailConfig,
    /// Notification stream configuration
    #[serde(default)]
    pub queue: StreamConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// API configuration for the upload endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Supabase storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Project base URL, e.g. https://xyz.supabase.co
    pub base_url: String,
    /// Service key sent as a bearer token
    #[serde(default)]
    pub api_key: String,
    /// Bucket uploads are written to
    pub bucket: String,
    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Image normalization configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ImageConfig {
    /// Images wider than this are downscaled to it
    #[serde(default = "default_max_width")]
    pub max_width: u32,
    /// JPEG re-encode quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Maximum accepted request body in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

/// Which provider outbound email goes through
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailProvider {
    #[default]
    Smtp,
    HttpApi,
}

/// Email delivery configuration
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub provider: EmailProvider,
    /// Sender address
    #[serde(default = "default_sender_email")]
    pub sender_email: String,
    /// Sender display name
    #[serde(default = "default_sender_name")]
    pub sender_name: String,
    /// Upper bound on a single send, in seconds
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub http_api: HttpApiConfig,
}

/// SMTP submission settings
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Login name; the sender address is used when unset
    pub username: Option<String>,
    /// Login password (a Gmail app password in production)
    pub password: Option<String>,
}

/// HTTP email API settings
#[derive(Debug, Clone, Deserialize)]
pub struct HttpApiConfig {
    #[serde(default = "default_http_api_base_url")]
    pub base_url: String,
    pub api_token: Option<String>,
    #[serde(default = "default_http_api_category")]
    pub category: String,
}

// Default value functions
fn default_service_name() -> String {
    "media-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_width() -> u32 {
    1024
}

fn default_jpeg_quality() -> u8 {
    80
}

fn default_max_upload_bytes() -> usize {
    8 * 1024 * 1024 // 8MB
}

fn default_sender_email() -> String {
    "tradebidz8386@gmail.com".to_string()
}

fn default_sender_name() -> String {
    "TradeBidz".to_string()
}

fn default_send_timeout_secs() -> u64 {
    15
}

fn default_smtp_host() -> String {
    "smtp.gmail.com".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_http_api_base_url() -> String {
    "https://send.api.mailtrap.io".to_string()
}

fn default_http_api_category() -> String {
    "Notification".to_string()
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            // Start with default values
            .set_default("service.name", "media-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/media").required(false))
            .add_source(config::File::with_name("/etc/tradebidz/media").required(false))
            // Override with environment variables
            // MEDIA__STORAGE__BUCKET -> storage.bucket
            .add_source(
                config::Environment::with_prefix("MEDIA")
                    .separator("__")
                    .try_parsing(true),
            );

        for (key, value) in legacy_overrides(|name| std::env::var(name).ok()) {
            builder = builder.set_override(key, value)?;
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the service cannot start with
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.storage.base_url.is_empty() {
            anyhow::bail!("storage.base_url is required (SUPABASE_URL)");
        }
        if self.storage.bucket.is_empty() {
            anyhow::bail!("storage.bucket is required (SUPABASE_BUCKET)");
        }
        if !(1..=100).contains(&self.image.jpeg_quality) {
            anyhow::bail!("image.jpeg_quality must be between 1 and 100");
        }
        if self.image.max_width == 0 {
            anyhow::bail!("image.max_width must be greater than zero");
        }
        self.queue.validate()?;
        Ok(())
    }

    /// Get storage request timeout as Duration
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage.request_timeout_secs)
    }
}

impl EmailConfig {
    /// Get the per-send timeout as Duration
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

/// Collect the legacy variables that are set, as `(config key, value)` pairs
fn legacy_overrides<F>(lookup: F) -> Vec<(&'static str, String)>
where
    F: Fn(&str) -> Option<String>,
{
    LEGACY_OVERRIDES
        .iter()
        .filter_map(|(var, key)| {
            lookup(var)
                .filter(|value| !value.is_empty())
                .map(|value| (*key, value))
        })
        .collect()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_width: default_max_width(),
            jpeg_quality: default_jpeg_quality(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            provider: EmailProvider::default(),
            sender_email: default_sender_email(),
            sender_name: default_sender_name(),
            send_timeout_secs: default_send_timeout_secs(),
            smtp: SmtpConfig::default(),
            http_api: HttpApiConfig::default(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            username: None,
            password: None,
        }
    }
}

impl Default for HttpApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_http_api_base_url(),
            api_token: None,
            category: default_http_api_category(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_json(json: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(json, config::FileFormat::Json))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_default_values() {
        assert_eq!(default_max_width(), 1024);
        assert_eq!(default_jpeg_quality(), 80);
        assert_eq!(default_max_upload_bytes(), 8 << 20);
        assert_eq!(default_smtp_port(), 587);
    }

    #[test]
    fn test_minimal_config_fills_defaults() {
        let config = from_json(
            r#"{"storage": {"base_url": "https://x.supabase.co", "bucket": "products"}}"#,
        );

        assert_eq!(config.api.port, 8080);
        assert_eq!(config.email.provider, EmailProvider::Smtp);
        assert_eq!(config.email.smtp.host, "smtp.gmail.com");
        assert_eq!(config.email.sender_name, "TradeBidz");
        assert_eq!(config.queue.stream, "notification_stream");
        assert_eq!(config.queue.group, "email_workers");
        assert_eq!(config.storage_timeout(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_http_api_provider() {
        let config = from_json(
            r#"{
                "storage": {"base_url": "https://x.supabase.co", "bucket": "products"},
                "email": {"provider": "http_api", "http_api": {"api_token": "tok"}}
            }"#,
        );

        assert_eq!(config.email.provider, EmailProvider::HttpApi);
        assert_eq!(config.email.http_api.api_token.as_deref(), Some("tok"));
        assert_eq!(config.email.http_api.base_url, "https://send.api.mailtrap.io");
    }

    #[test]
    fn test_validate_rejects_bad_quality() {
        let mut config = from_json(
            r#"{"storage": {"base_url": "https://x.supabase.co", "bucket": "products"}}"#,
        );
        config.image.jpeg_quality = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_legacy_overrides() {
        let env: HashMap<&str, &str> = [
            ("PORT", "3001"),
            ("SUPABASE_BUCKET", "images"),
            ("GMAIL_APP_PASSWORD", ""),
        ]
        .into_iter()
        .collect();

        let overrides = legacy_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(
            overrides,
            vec![
                ("api.port", "3001".to_string()),
                ("storage.bucket", "images".to_string()),
            ]
        );
    }
}
