use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::classify::ClassifierKind;
use crate::db::{Credentials, SslMode};
use crate::error::ConfigError;

/// Settings read from `config.toml`. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub classifier: ClassifierKind,
    pub llm: LlmConfig,
    pub database: DatabaseDefaults,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key. The key itself never
    /// lives in the config file.
    pub api_key_env: String,
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://api.groq.com/openai/v1"),
            model: String::from("llama-3.1-8b-instant"),
            api_key_env: String::from("GROQ_API_KEY"),
            max_tokens: None,
            timeout_secs: 30,
        }
    }
}

impl LlmConfig {
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

/// Login defaults. Never holds a password.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseDefaults {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub user: Option<String>,
    pub ssl_mode: SslMode,
    pub accept_invalid_certs: bool,
    pub ca_cert_path: Option<String>,
}

impl Default for DatabaseDefaults {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: 5432,
            database: None,
            user: None,
            ssl_mode: SslMode::default(),
            accept_invalid_certs: false,
            ca_cert_path: None,
        }
    }
}

impl DatabaseDefaults {
    /// Credentials pre-filled from the defaults, without user or password.
    pub fn credentials(&self) -> Credentials {
        Credentials {
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone().unwrap_or_default(),
            username: self.user.clone().unwrap_or_default(),
            ssl_mode: self.ssl_mode,
            accept_invalid_certs: self.accept_invalid_certs,
            ca_cert_path: self.ca_cert_path.clone(),
            ..Credentials::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Table receiving audit entries, optionally schema-qualified.
    pub table: String,
    pub recent_limit: i64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            table: String::from("chat_logs"),
            recent_limit: 100,
        }
    }
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dbchat")
            .join("config.toml")
    }

    /// Load from `path`, or from the default location when `None`.
    /// A missing default file yields the built-in defaults; a missing
    /// explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config: AppConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse { path, source })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // The audit table name is spliced into SQL, so it must be an identifier.
        if !is_qualified_identifier(&self.audit.table) {
            return Err(ConfigError::InvalidAuditTable(self.audit.table.clone()));
        }
        Ok(())
    }
}

fn is_qualified_identifier(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}
