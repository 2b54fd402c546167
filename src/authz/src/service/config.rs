//! Permission service configuration

use crate::error::{AuthzError, Result};
use crate::types::RoleKeyKind;
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable selecting the role key (`name` or `id`)
pub const ENV_ROLE_KEY: &str = "RBAC_ROLE_KEY";
/// Environment variable for the periodic reload interval in seconds
pub const ENV_RELOAD_INTERVAL_SECS: &str = "RBAC_RELOAD_INTERVAL_SECS";
/// Environment variable toggling binding refresh of known users on reload
pub const ENV_RELOAD_KNOWN_USERS: &str = "RBAC_RELOAD_KNOWN_USERS";
/// Environment variable bounding concurrent user loads
pub const ENV_USER_LOAD_CONCURRENCY: &str = "RBAC_USER_LOAD_CONCURRENCY";
/// Environment variable toggling metrics collection
pub const ENV_ENABLE_METRICS: &str = "RBAC_ENABLE_METRICS";

/// Permission service configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PermissionServiceConfig {
    /// Role field the checker is keyed by
    pub role_key: RoleKeyKind,

    /// Periodic full reload interval; `None` disables the reload task
    pub reload_interval_secs: Option<u64>,

    /// Refresh bindings of users already in the checker on full reload
    pub reload_known_users: bool,

    /// Maximum concurrent repository calls during bulk user loads
    pub user_load_concurrency: usize,

    /// Enable metrics collection
    pub enable_metrics: bool,
}

impl Default for PermissionServiceConfig {
    fn default() -> Self {
        Self {
            role_key: RoleKeyKind::Name,
            reload_interval_secs: None,
            reload_known_users: false,
            user_load_concurrency: 8,
            enable_metrics: true,
        }
    }
}

impl PermissionServiceConfig {
    /// Load configuration from `RBAC_*` environment variables
    ///
    /// Unset variables keep their defaults; unparsable values are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_ROLE_KEY) {
            config.role_key = value.parse().map_err(|e: String| {
                AuthzError::InvalidConfig(format!("{}: {}", ENV_ROLE_KEY, e))
            })?;
        }
        if let Some(value) = lookup(ENV_RELOAD_INTERVAL_SECS) {
            let secs: u64 = parse_var(ENV_RELOAD_INTERVAL_SECS, &value)?;
            config.reload_interval_secs = (secs > 0).then_some(secs);
        }
        if let Some(value) = lookup(ENV_RELOAD_KNOWN_USERS) {
            config.reload_known_users = parse_bool(ENV_RELOAD_KNOWN_USERS, &value)?;
        }
        if let Some(value) = lookup(ENV_USER_LOAD_CONCURRENCY) {
            config.user_load_concurrency = parse_var(ENV_USER_LOAD_CONCURRENCY, &value)?;
        }
        if let Some(value) = lookup(ENV_ENABLE_METRICS) {
            config.enable_metrics = parse_bool(ENV_ENABLE_METRICS, &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<()> {
        if self.user_load_concurrency == 0 {
            return Err(AuthzError::InvalidConfig(
                "user_load_concurrency must be at least 1".to_string(),
            ));
        }
        if self.reload_interval_secs == Some(0) {
            return Err(AuthzError::InvalidConfig(
                "reload_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Reload interval as a duration, if periodic reload is enabled
    pub fn reload_interval(&self) -> Option<Duration> {
        self.reload_interval_secs.map(Duration::from_secs)
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AuthzError::InvalidConfig(format!("{}: invalid value '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AuthzError::InvalidConfig(format!(
            "{}: invalid boolean '{}'",
            key, value
        ))),
    }
}
