//! Application configuration.
//!
//! Layered loading: built-in defaults, then an optional TOML file, then
//! environment variables with the `RIVULET__` prefix (double underscore as
//! the section separator, e.g. `RIVULET__SERVER__PORT=9000`).

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "RIVULET";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "rivulet.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_minutes: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_minutes: crate::auth::DEFAULT_TOKEN_TTL_MINUTES,
        }
    }
}

/// Per-provider credentials and endpoint overrides. Adapters receive these
/// at construction; they never read the process environment themselves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub openai: ProviderEndpoint,
    #[serde(default)]
    pub gemini: ProviderEndpoint,
    #[serde(default)]
    pub anthropic: ProviderEndpoint,
    #[serde(default)]
    pub ollama: ProviderEndpoint,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl AppConfig {
    /// Loads configuration from the given file (if it exists) merged with
    /// `RIVULET__`-prefixed environment variables.
    pub fn load(config_file: &Path) -> Result<Self> {
        let built = Config::builder()
            .set_default("server.host", ServerConfig::default().host)?
            .set_default("server.port", ServerConfig::default().port as i64)?
            .set_default("database.path", DatabaseConfig::default().path)?
            .set_default("auth.jwt_secret", "")?
            .set_default("auth.token_ttl_minutes", AuthConfig::default().token_ttl_minutes)?
            .add_source(
                File::from(config_file)
                    .format(FileFormat::Toml)
                    .required(false),
            )
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .context("building configuration")?;

        let config: AppConfig = built
            .try_deserialize()
            .context("deserializing configuration")?;
        Ok(config)
    }

    /// Writes a commented default config file, creating parent directories.
    pub fn write_default(path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating config directory {}", parent.display()))?;
            }
        }

        let toml =
            toml::to_string_pretty(&AppConfig::default()).context("serializing default config")?;
        let body = format!("# Configuration for rivulet\n# File: {}\n\n{toml}", path.display());
        fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
    }
}
