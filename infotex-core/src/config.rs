//! Configuration management
//!
//! `InfotexConfig` is read from a TOML file; every section falls back to its
//! defaults so an empty file is a valid configuration.

use crate::error::{ErrorContext, InfotexError, InfotexResult};
use crate::logging::LoggingConfig;
use crate::types::UserType;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level client configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InfotexConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub routes: RoutesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// REST backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL every request path is joined onto
    pub base_url: String,
    /// Credential exchange endpoint; never triggers token recovery
    pub login_path: String,
    /// Cookie-authenticated token refresh endpoint; never triggers token recovery
    pub refresh_path: String,
    /// Server-side session termination endpoint
    pub logout_path: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// User agent string
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            login_path: "/auth/login".to_string(),
            refresh_path: "/api/auth/refresh".to_string(),
            logout_path: "/api/auth/logout".to_string(),
            timeout_seconds: 30,
            user_agent: "infotex/0.1".to_string(),
        }
    }
}

/// Where durable client state lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-lifetime only; nothing survives a restart
    Memory,
    /// One JSON file per key under `data_dir`
    File,
}

/// Durable storage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Directory for the file backend; `None` uses the platform data dir
    pub data_dir: Option<PathBuf>,
    /// State slices mirrored to durable storage
    pub tracked_keys: Vec<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: None,
            tracked_keys: vec!["auth".to_string()],
        }
    }
}

impl StorageConfig {
    /// Resolve the directory used by the file backend
    pub fn resolved_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("infotex")
        })
    }
}

/// Navigation targets used by the route guards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Public route unauthenticated users are sent to
    pub landing: String,
    pub candidate_home: String,
    pub company_home: String,
    pub admin_home: String,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            landing: "/".to_string(),
            candidate_home: "/candidato/ofertas".to_string(),
            company_home: "/empresa/dashboard".to_string(),
            admin_home: "/admin/resumen".to_string(),
        }
    }
}

impl RoutesConfig {
    /// Default destination for a user of the given type
    pub fn home_for(&self, user_type: UserType) -> &str {
        match user_type {
            UserType::Candidate => &self.candidate_home,
            UserType::Company => &self.company_home,
            UserType::Admin => &self.admin_home,
        }
    }
}

impl InfotexConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> InfotexResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| InfotexError::Config {
            message: format!("Failed to read config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("read_file")
                .with_suggestion("Check if the config file exists and is readable"),
        })?;

        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> InfotexResult<Self> {
        toml::from_str(content).map_err(|e| InfotexError::Config {
            message: format!("Failed to parse config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("parse_toml")
                .with_suggestion("Check TOML syntax in config file"),
        })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> InfotexResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| InfotexError::Config {
            message: format!("Failed to serialize config: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config").with_operation("serialize_toml"),
        })?;

        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(path, content).map_err(|e| InfotexError::Config {
            message: format!("Failed to write config file: {}", e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("write_file")
                .with_suggestion("Check if the directory exists and is writable"),
        })?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> InfotexResult<()> {
        url::Url::parse(&self.api.base_url).map_err(|e| InfotexError::Config {
            message: format!("Invalid api.base_url '{}': {}", self.api.base_url, e),
            source: Some(Box::new(e)),
            context: ErrorContext::new("config")
                .with_operation("validate")
                .with_suggestion("Use an absolute URL such as http://localhost:3000"),
        })?;

        for (name, path) in [
            ("api.login_path", &self.api.login_path),
            ("api.refresh_path", &self.api.refresh_path),
            ("api.logout_path", &self.api.logout_path),
        ] {
            if !path.starts_with('/') {
                return Err(InfotexError::Config {
                    message: format!("{} must start with '/'", name),
                    source: None,
                    context: ErrorContext::new("config")
                        .with_operation("validate")
                        .with_metadata("field", name),
                });
            }
        }

        if self.api.timeout_seconds == 0 {
            return Err(InfotexError::Config {
                message: "api.timeout_seconds must be greater than 0".to_string(),
                source: None,
                context: ErrorContext::new("config")
                    .with_operation("validate")
                    .with_suggestion("Set api.timeout_seconds to a positive value"),
            });
        }

        if self
            .storage
            .tracked_keys
            .iter()
            .any(|key| key.trim().is_empty())
        {
            return Err(InfotexError::Config {
                message: "storage.tracked_keys must not contain empty keys".to_string(),
                source: None,
                context: ErrorContext::new("config").with_operation("validate"),
            });
        }

        Ok(())
    }
}
