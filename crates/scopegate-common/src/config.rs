//! ---
//! sg_section: "06-configuration"
//! sg_subsection: "module"
//! sg_type: "source"
//! sg_scope: "code"
//! sg_description: "TOML runtime configuration with environment override."
//! sg_version: "v0.1.0"
//! sg_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

/// Longest role cache lifetime accepted.
pub const MAX_ROLE_CACHE_TTL: Duration = Duration::from_secs(300);

fn default_store_timeout() -> Duration {
    Duration::from_millis(250)
}

fn default_reject_unknown() -> bool {
    true
}

fn default_scheme_version() -> u32 {
    2
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

/// Primary configuration object for scopegate binaries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub authz: AuthzConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    pub source: PathBuf,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "SCOPEGATE_CONFIG";

    /// Load configuration from disk, respecting the `SCOPEGATE_CONFIG` override.
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

    /// Read, parse and validate one file.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.authz.validate()
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

/// Authorization engine tunables.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthzConfig {
    #[serde(rename = "store_timeout_ms", default = "default_store_timeout")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub store_timeout: Duration,
    #[serde(rename = "role_cache_ttl_secs", default)]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub role_cache_ttl: Duration,
    #[serde(default = "default_reject_unknown")]
    pub reject_unknown_permissions: bool,
    #[serde(default = "default_scheme_version")]
    pub scheme_version: u32,
    #[serde(default)]
    pub audit_log: Option<PathBuf>,
    #[serde(default)]
    pub catalog: Option<PathBuf>,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        Self {
            store_timeout: default_store_timeout(),
            role_cache_ttl: Duration::ZERO,
            reject_unknown_permissions: default_reject_unknown(),
            scheme_version: default_scheme_version(),
            audit_log: None,
            catalog: None,
        }
    }
}

impl AuthzConfig {
    pub fn validate(&self) -> Result<()> {
        if self.store_timeout.is_zero() {
            return Err(anyhow!("authz.store_timeout_ms must be greater than zero"));
        }
        if self.role_cache_ttl > MAX_ROLE_CACHE_TTL {
            return Err(anyhow!(
                "authz.role_cache_ttl_secs must not exceed {} seconds",
                MAX_ROLE_CACHE_TTL.as_secs()
            ));
        }
        Ok(())
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
    /// File prefix for a dedicated decision log; decision events also reach the main file.
    #[serde(default)]
    pub decision_log: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            decision_log: None,
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
