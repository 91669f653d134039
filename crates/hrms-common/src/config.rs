//! ---
//! hrms_section: "01-core-functionality"
//! hrms_subsection: "module"
//! hrms_type: "source"
//! hrms_scope: "code"
//! hrms_description: "Shared primitives for the access service runtime."
//! hrms_version: "v0.0.0-prealpha"
//! hrms_owner: "tbd"
//! ---
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::LogFormat;

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_api_listen() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 8080))
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_implicit_attendance() -> bool {
    true
}

/// Primary configuration object for the access service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub access: AccessConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "HRMS_CONFIG";

    /// Load configuration from disk, respecting the `HRMS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.store.validate()?;
        self.access.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_listen")]
    pub listen: SocketAddr,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: default_api_listen(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

/// Backing store for the section catalog and role grants.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    /// Volatile store seeded from the built-in catalog.
    #[default]
    Memory,
    /// JSON document persisted at [`StoreConfig::path`].
    Document,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Secondary document consulted when the primary store cannot be read.
    #[serde(default)]
    pub fallback_path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kind == StoreKind::Document && self.path.is_none() {
            return Err(anyhow!("store.kind = \"document\" requires store.path"));
        }
        if let (Some(primary), Some(fallback)) = (&self.path, &self.fallback_path) {
            if primary == fallback {
                return Err(anyhow!(
                    "store.fallback_path must differ from store.path ({})",
                    primary.display()
                ));
            }
        }
        Ok(())
    }
}

/// Which override source wins when both a stored role grant and a
/// session-carried section hint are present.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OverridePrecedence {
    /// Stored role grants dominate session hints.
    #[default]
    ServerFirst,
    /// Session hints dominate stored role grants.
    AccountFirst,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    #[serde(default)]
    pub precedence: OverridePrecedence,
    /// Grant the attendance feature group to roles with no other source of access.
    #[serde(default = "default_implicit_attendance")]
    pub implicit_attendance: bool,
    /// Replaces the built-in role default table when present.
    #[serde(default)]
    pub role_defaults: Option<IndexMap<String, Vec<String>>>,
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            precedence: OverridePrecedence::default(),
            implicit_attendance: default_implicit_attendance(),
            role_defaults: None,
            audit_log: None,
        }
    }
}

impl AccessConfig {
    pub fn validate(&self) -> Result<()> {
        if let Some(defaults) = &self.role_defaults {
            if let Some(blank) = defaults.keys().find(|role| role.trim().is_empty()) {
                return Err(anyhow!(
                    "access.role_defaults contains a blank role key ({blank:?})"
                ));
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for OverridePrecedence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "server-first" | "server" => Ok(OverridePrecedence::ServerFirst),
            "account-first" | "account" => Ok(OverridePrecedence::AccountFirst),
            other => Err(format!("unknown override precedence: {}", other)),
        }
    }
}
