use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::access::Role;
use crate::error::{PmoError, Result};

/// Top-level configuration for the decision pipeline service.
///
/// Loaded from `~/.pmo/config.toml` by default. Each section corresponds
/// to a bounded context or cross-cutting concern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PmoConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl PmoConfig {
    /// Load configuration from a TOML file.
    ///
    /// Returns an error if the file cannot be read, parsed, or fails validation.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PmoConfig = toml::from_str(&content)?;
        config.validate()?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Load configuration if the file exists, otherwise use defaults.
    ///
    /// Unlike [`PmoConfig::load_or_default`], a file that is present but
    /// fails to parse or validate is an error, never silently replaced.
    pub fn load_if_present(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!("No config file at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| PmoError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.server.requests_per_second == 0 {
            return Err(PmoError::Config(
                "server.requests_per_second must be greater than 0".to_string(),
            ));
        }
        if self.execution.handler_timeout_secs == 0 {
            return Err(PmoError::Config(
                "execution.handler_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.execution.audit_default_limit == 0
            || self.execution.audit_default_limit > self.execution.audit_max_limit
        {
            return Err(PmoError::Config(format!(
                "execution.audit_default_limit must be between 1 and audit_max_limit ({})",
                self.execution.audit_max_limit
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for entry in &self.auth.tokens {
            if entry.token.len() < 16 {
                return Err(PmoError::Config(format!(
                    "auth token for user '{}' is shorter than 16 characters",
                    entry.user_id
                )));
            }
            if entry.user_id.trim().is_empty() || entry.organization_id.trim().is_empty() {
                return Err(PmoError::Config(
                    "auth tokens require non-empty user_id and organization_id".to_string(),
                ));
            }
            if !seen.insert(entry.token.as_str()) {
                return Err(PmoError::Config(format!(
                    "duplicate auth token configured for user '{}'",
                    entry.user_id
                )));
            }
        }
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.pmo/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address.
    pub host: String,
    /// API server port.
    pub port: u16,
    /// Origins allowed by CORS. Empty disables cross-origin access.
    pub cors_origins: Vec<String>,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
    /// Requests allowed per second across protected routes.
    pub requests_per_second: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3040,
            cors_origins: vec![],
            max_body_bytes: 256 * 1024,
            requests_per_second: 100,
        }
    }
}

/// SQLite storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file name, relative to `general.data_dir`.
    pub db_file: String,
    /// How long a writer waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_file: "pmo.db".to_string(),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Execution dispatcher and audit reader settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Upper bound on a single handler run before it is recorded as FAILED.
    pub handler_timeout_secs: u64,
    /// Page size for audit listings when the caller gives none.
    pub audit_default_limit: u32,
    /// Hard cap on audit page size.
    pub audit_max_limit: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            handler_timeout_secs: 30,
            audit_default_limit: 50,
            audit_max_limit: 500,
        }
    }
}

/// Bearer token authentication.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub tokens: Vec<ApiTokenConfig>,
}

impl AuthConfig {
    /// Find the token entry matching a presented bearer token.
    pub fn find(&self, token: &str) -> Option<&ApiTokenConfig> {
        self.tokens.iter().find(|t| t.token == token)
    }
}

/// A bearer token bound to one user in one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiTokenConfig {
    pub token: String,
    pub user_id: String,
    pub organization_id: String,
    pub role: Role,
}
