//! Configuration management for Imole services and batch tools
//!
//! Supports loading configuration from:
//! - Default values
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Legacy deployment variables (OPENAI_API_KEY, ANTHROPIC_KEY, DB_*)
//! - Environment variables (prefixed with APP__)
//!
//! The configuration is built once in `main` and handed to every component.

use config::{Config, ConfigError, Environment, File, Map};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// HTTP gateway configuration
    pub server: ServerConfig,

    /// PostgreSQL (pgvector) configuration
    pub database: DatabaseConfig,

    /// OpenAI API credentials
    pub openai: OpenAiConfig,

    /// Anthropic API credentials
    pub anthropic: AnthropicConfig,

    /// Embedding configuration
    pub embedding: EmbeddingConfig,

    /// Per-role generative model settings
    pub models: ModelsConfig,

    /// Retrieval policy
    pub retrieval: RetrievalConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Request timeout in seconds
    pub request_timeout_secs: u64,

    /// Seconds in-flight requests get to finish after a shutdown signal
    pub shutdown_timeout_secs: u64,

    /// Allowed CORS origin ("*" allows any)
    pub cors_origin: String,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: Option<String>,

    /// libpq-style SSL mode: disable, prefer, require, verify-ca, verify-full
    pub ssl_mode: String,

    /// Maximum number of pooled connections
    pub max_connections: u32,

    /// Minimum number of pooled connections
    pub min_connections: u32,

    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    pub idle_timeout_secs: u64,

    /// Apply bundled migrations on startup
    pub run_migrations: bool,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Deserialize, Serialize)]
pub struct AnthropicConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    /// Value of the `anthropic-version` header
    pub api_version: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    pub provider: Provider,

    /// Model to use
    pub model: String,

    /// Embedding dimension; must match the `legal_cases.embedding` column
    pub dimension: usize,

    /// Maximum attempts per embedding request
    pub max_retries: u32,
}

/// Model provider selector
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Mock,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAi => f.write_str("openai"),
            Provider::Anthropic => f.write_str("anthropic"),
            Provider::Mock => f.write_str("mock"),
        }
    }
}

/// Settings for one generative-model role
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelRole {
    pub provider: Provider,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelsConfig {
    /// Hypothetical-answer generation for query augmentation
    pub augment: ModelRole,

    /// Final answer generation
    pub respond: ModelRole,

    /// Rewriting corpus queries into user phrasing
    pub simplify: ModelRole,

    /// Summarizing case documents
    pub summarize: ModelRole,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Number of cases handed to the responder
    pub top_k: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log filter (EnvFilter syntax)
    pub log_level: String,

    /// Enable JSON logging
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    pub metrics_port: u16,
}

/// Legacy variable names from the original deployment, mapped onto config keys
const LEGACY_ENV: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "OPENAI__API_KEY"),
    ("ANTHROPIC_API_KEY", "ANTHROPIC__API_KEY"),
    ("ANTHROPIC_KEY", "ANTHROPIC__API_KEY"),
    ("DB_HOST", "DATABASE__HOST"),
    ("DB_PORT", "DATABASE__PORT"),
    ("DB_NAME", "DATABASE__NAME"),
    ("DB_USER", "DATABASE__USER"),
    ("DB_PASSWORD", "DATABASE__PASSWORD"),
    ("DB_SSLMODE", "DATABASE__SSL_MODE"),
];

impl AppConfig {
    /// Load configuration from files and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(std::env::vars().collect())
    }

    /// Load configuration from files and an explicit environment snapshot
    pub fn load_from(env: Map<String, String>) -> Result<Self, ConfigError> {
        let app_env = env
            .get("APP_ENV")
            .cloned()
            .unwrap_or_else(|| "development".to_string());

        let legacy: Map<String, String> = LEGACY_ENV
            .iter()
            .filter_map(|(from, to)| env.get(*from).map(|v| (to.to_string(), v.clone())))
            .collect();

        let config = Config::builder()
            // Start with defaults
            .add_source(Config::try_from(&AppConfig::default())?)
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", app_env)).required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Legacy variables (OPENAI_API_KEY, DB_HOST, ...)
            .add_source(
                Environment::default()
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(legacy)),
            )
            // APP__ prefixed variables win, e.g. APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
                    .source(Some(env)),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                request_timeout_secs: 120,
                shutdown_timeout_secs: 30,
                cors_origin: "*".to_string(),
            },
            database: DatabaseConfig {
                host: "localhost".to_string(),
                port: 5432,
                name: "imole".to_string(),
                user: "postgres".to_string(),
                password: None,
                ssl_mode: "require".to_string(),
                max_connections: 5,
                min_connections: 0,
                connect_timeout_secs: 10,
                idle_timeout_secs: 300,
                run_migrations: false,
            },
            openai: OpenAiConfig {
                api_key: None,
                api_base: "https://api.openai.com/v1".to_string(),
                timeout_secs: 60,
            },
            anthropic: AnthropicConfig {
                api_key: None,
                api_base: "https://api.anthropic.com/v1".to_string(),
                api_version: "2023-06-01".to_string(),
                timeout_secs: 60,
            },
            embedding: EmbeddingConfig {
                provider: Provider::OpenAi,
                model: crate::DEFAULT_EMBEDDING_MODEL.to_string(),
                dimension: crate::DEFAULT_EMBEDDING_DIMENSION,
                max_retries: 3,
            },
            models: ModelsConfig {
                augment: ModelRole {
                    provider: Provider::OpenAi,
                    model: "gpt-3.5-turbo".to_string(),
                    temperature: None,
                    max_tokens: None,
                },
                respond: ModelRole {
                    provider: Provider::OpenAi,
                    model: "gpt-4-turbo".to_string(),
                    temperature: Some(0.3),
                    max_tokens: Some(1500),
                },
                simplify: ModelRole {
                    provider: Provider::Anthropic,
                    model: "claude-3-5-sonnet-20241022".to_string(),
                    temperature: None,
                    max_tokens: Some(500),
                },
                summarize: ModelRole {
                    provider: Provider::Anthropic,
                    model: "claude-3-5-sonnet-20241022".to_string(),
                    temperature: None,
                    max_tokens: Some(1024),
                },
            },
            retrieval: RetrievalConfig { top_k: 1 },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logging: true,
                metrics_port: 0,
            },
        }
    }
}

fn redact(secret: &Option<String>) -> &'static str {
    if secret.is_some() {
        "<redacted>"
    } else {
        "<unset>"
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &redact(&self.password))
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("idle_timeout_secs", &self.idle_timeout_secs)
            .field("run_migrations", &self.run_migrations)
            .finish()
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_base", &self.api_base)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl fmt::Debug for AnthropicConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnthropicConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.embedding.model, "text-embedding-ada-002");
        assert_eq!(config.embedding.dimension, 1536);
        assert_eq!(config.retrieval.top_k, 1);
        assert_eq!(config.models.respond.temperature, Some(0.3));
    }

    #[test]
    fn test_load_without_overrides_uses_defaults() {
        let config = AppConfig::load_from(env(&[])).unwrap();
        assert_eq!(config.database.ssl_mode, "require");
        assert_eq!(config.models.augment.model, "gpt-3.5-turbo");
        assert_eq!(config.models.simplify.provider, Provider::Anthropic);
    }

    #[test]
    fn test_legacy_variables() {
        let config = AppConfig::load_from(env(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("ANTHROPIC_KEY", "ak-test"),
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "6543"),
            ("DB_NAME", "cases"),
        ]))
        .unwrap();

        assert_eq!(config.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.anthropic.api_key.as_deref(), Some("ak-test"));
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.name, "cases");
    }

    #[test]
    fn test_prefixed_variables_win() {
        let config = AppConfig::load_from(env(&[
            ("DB_HOST", "legacy"),
            ("APP__DATABASE__HOST", "preferred"),
            ("APP__MODELS__RESPOND__MODEL", "gpt-4o"),
        ]))
        .unwrap();

        assert_eq!(config.database.host, "preferred");
        assert_eq!(config.models.respond.model, "gpt-4o");
        assert_eq!(config.models.respond.provider, Provider::OpenAi);
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let mut config = AppConfig::default();
        config.openai.api_key = Some("sk-very-secret".to_string());
        config.database.password = Some("hunter2".to_string());

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("sk-very-secret"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
