//! TOML configuration: storage backend, session API endpoints and logging

use crate::error::{EdulinkError, EdulinkResult, ErrorContext};
use crate::logging::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdulinkConfig {
    pub storage: StorageConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

/// Where the session keys are persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// JSON file holding the keys when `backend = "file"`; `~` expands to the home directory
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    File,
}

/// Remote session API endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    /// Credential exchange endpoint, relative to `base_url`
    pub login_path: String,
    /// Profile endpoint of the signed-in user, relative to `base_url`
    pub profile_path: String,
    pub timeout_seconds: u64,
    pub user_agent: String,
    /// Attempts for idempotent requests (profile fetch)
    pub max_attempts: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: "~/.edulink/session.json".to_string(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            login_path: "/auth/login".to_string(),
            profile_path: "/users/me".to_string(),
            timeout_seconds: 30,
            user_agent: format!("edulink/{}", env!("CARGO_PKG_VERSION")),
            max_attempts: 3,
        }
    }
}

impl EdulinkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> EdulinkResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            config_failure(
                format!("Cannot read {}: {}", path.display(), e),
                "read_file",
                "Pass --config with an existing file or run 'edulink config --init'",
                e,
            )
        })?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text; missing sections keep their defaults
    pub fn from_toml_str(content: &str) -> EdulinkResult<Self> {
        toml::from_str(content).map_err(|e| {
            config_failure(
                format!("Invalid configuration TOML: {}", e),
                "parse_toml",
                "Fix the reported line or compare with 'edulink config --show'",
                e,
            )
        })
    }

    pub fn to_toml_string(&self) -> EdulinkResult<String> {
        toml::to_string_pretty(self).map_err(|e| {
            config_failure(
                format!("Cannot render configuration: {}", e),
                "serialize_toml",
                "Report this as a bug",
                e,
            )
        })
    }

    /// Write the configuration as TOML, creating the parent directory
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> EdulinkResult<()> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                config_failure(
                    format!("Cannot create {}: {}", parent.display(), e),
                    "write_file",
                    "Check permissions on the configuration directory",
                    e,
                )
            })?;
        }

        std::fs::write(path, content).map_err(|e| {
            config_failure(
                format!("Cannot write {}: {}", path.display(), e),
                "write_file",
                "Check permissions on the configuration directory",
                e,
            )
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> EdulinkResult<()> {
        match url::Url::parse(&self.api.base_url) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
            Ok(url) => {
                return Err(invalid(
                    format!("Unsupported API scheme: {}", url.scheme()),
                    "Use an http:// or https:// api.base_url",
                ));
            }
            Err(e) => {
                return Err(invalid(
                    format!("Invalid api.base_url '{}': {}", self.api.base_url, e),
                    "Set api.base_url to an absolute URL",
                ));
            }
        }

        for (name, path) in [
            ("api.login_path", &self.api.login_path),
            ("api.profile_path", &self.api.profile_path),
        ] {
            if !path.starts_with('/') {
                return Err(invalid(
                    format!("{} must start with '/'", name),
                    "Use a path relative to api.base_url, e.g. /auth/login",
                ));
            }
        }

        if self.api.timeout_seconds == 0 {
            return Err(invalid(
                "API timeout_seconds must be greater than 0".to_string(),
                "Set api.timeout_seconds to a positive value",
            ));
        }

        if self.api.max_attempts == 0 {
            return Err(invalid(
                "API max_attempts must be greater than 0".to_string(),
                "Set api.max_attempts to 1 to disable retries",
            ));
        }

        if self.storage.backend == StorageBackend::File && self.storage.path.trim().is_empty() {
            return Err(invalid(
                "storage.path is required for the file backend".to_string(),
                "Set storage.path or switch storage.backend to \"memory\"",
            ));
        }

        Ok(())
    }
}

fn config_failure<E>(message: String, operation: &str, suggestion: &str, source: E) -> EdulinkError
where
    E: std::error::Error + Send + Sync + 'static,
{
    EdulinkError::Config {
        message,
        source: Some(Box::new(source)),
        context: ErrorContext::new("config")
            .with_operation(operation)
            .with_suggestion(suggestion),
    }
}

fn invalid(message: String, suggestion: &str) -> EdulinkError {
    EdulinkError::Config {
        message,
        source: None,
        context: ErrorContext::new("config")
            .with_operation("validate")
            .with_suggestion(suggestion),
    }
}
