//! Configuration management.

use serde::Deserialize;

use crate::error::Result;
use crate::security::roles::SecurityRoles;
use crate::telemetry::logging::LoggingConfig;

/// Environment variable prefix; `VIGIL__INTERCEPTOR__DEFAULT_READ_ONLY=false`
/// overrides `interceptor.default_read_only`.
pub const ENV_PREFIX: &str = "VIGIL";

/// Main security-core configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityConfig {
    /// Distinguished users and groups
    #[serde(default)]
    pub roles: SecurityRoles,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-call wrapper configuration
    #[serde(default)]
    pub interceptor: InterceptorConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterceptorConfig {
    /// Treat calls without a read-only annotation as read-only
    #[serde(default = "default_read_only")]
    pub default_read_only: bool,

    /// Fail a read-only call that recorded audit logs
    #[serde(default = "default_fail_on_read_only_logs")]
    pub fail_on_read_only_logs: bool,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            default_read_only: default_read_only(),
            fail_on_read_only_logs: default_fail_on_read_only_logs(),
        }
    }
}

fn default_read_only() -> bool { true }
fn default_fail_on_read_only_logs() -> bool { true }

impl SecurityConfig {
    /// Load configuration from the environment only.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: SecurityConfig = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides on top.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;

        let cfg: SecurityConfig = config.try_deserialize()?;
        Ok(cfg)
    }
}
