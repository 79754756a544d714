//! Agent configuration from the environment.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use jobagent_core::AgentId;

pub const DEFAULT_POOL_SIZE: u32 = 8;
pub const DEFAULT_STEP_POOL_SIZE: u32 = 2;
pub const DEFAULT_NOTIFY_CHANNEL: &str = "jobagent:status";
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{name} has an invalid value {value:?}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Agent configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentConfig {
    /// Catalog database (`DATABASE_URL`).
    pub database_url: String,
    /// Claim owner written to claimed jobs (`JOBAGENT_AGENT_ID`, default: process id).
    pub agent_id: AgentId,
    /// Max pooled catalog connections (`JOBAGENT_POOL_SIZE`).
    pub pool_size: u32,
    /// Max connections per SQL step target (`JOBAGENT_STEP_POOL_SIZE`).
    pub step_pool_size: u32,
    pub acquire_timeout: Duration,
    /// Apply the bundled schema on start (`JOBAGENT_AUTO_MIGRATE`).
    pub auto_migrate: bool,
    /// Parent directory for batch step scratch directories (`JOBAGENT_SCRATCH_DIR`).
    pub scratch_dir: Option<PathBuf>,
    /// Redis notification transport (`REDIS_URL`).
    pub redis_url: Option<String>,
    /// Redis channel (`JOBAGENT_NOTIFY_CHANNEL`).
    pub notify_channel: String,
}

impl AgentConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            agent_id: AgentId::from_process(),
            pool_size: DEFAULT_POOL_SIZE,
            step_pool_size: DEFAULT_STEP_POOL_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            auto_migrate: false,
            scratch_dir: None,
            redis_url: None,
            notify_channel: DEFAULT_NOTIFY_CHANNEL.to_string(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let mut config = Self::new(database_url);

        if let Some(raw) = var("JOBAGENT_AGENT_ID") {
            config.agent_id = parse("JOBAGENT_AGENT_ID", &raw)?;
        }
        if let Some(raw) = var("JOBAGENT_POOL_SIZE") {
            config.pool_size = positive("JOBAGENT_POOL_SIZE", &raw)?;
        }
        if let Some(raw) = var("JOBAGENT_STEP_POOL_SIZE") {
            config.step_pool_size = positive("JOBAGENT_STEP_POOL_SIZE", &raw)?;
        }
        if let Some(raw) = var("JOBAGENT_AUTO_MIGRATE") {
            config.auto_migrate = flag("JOBAGENT_AUTO_MIGRATE", &raw)?;
        }
        config.scratch_dir = var("JOBAGENT_SCRATCH_DIR").map(PathBuf::from);
        config.redis_url = var("REDIS_URL");
        if let Some(channel) = var("JOBAGENT_NOTIFY_CHANNEL") {
            config.notify_channel = channel;
        }

        Ok(config)
    }

    pub fn with_agent_id(mut self, agent_id: AgentId) -> Self {
        self.agent_id = agent_id;
        self
    }

    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_step_pool_size(mut self, size: u32) -> Self {
        self.step_pool_size = size;
        self
    }

    pub fn with_auto_migrate(mut self, enabled: bool) -> Self {
        self.auto_migrate = enabled;
        self
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub fn with_redis(mut self, url: impl Into<String>, channel: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self.notify_channel = channel.into();
        self
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn positive(name: &'static str, raw: &str) -> Result<u32, ConfigError> {
    match parse::<u32>(name, raw)? {
        0 => Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
            reason: "must be at least 1".to_string(),
        }),
        n => Ok(n),
    }
}

fn flag(name: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: raw.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = AgentConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://db/jobs")])).unwrap();

        assert_eq!(config.database_url, "postgres://db/jobs");
        assert_eq!(config.agent_id, AgentId::from_process());
        assert_eq!(config.pool_size, DEFAULT_POOL_SIZE);
        assert_eq!(config.step_pool_size, DEFAULT_STEP_POOL_SIZE);
        assert!(!config.auto_migrate);
        assert_eq!(config.redis_url, None);
        assert_eq!(config.notify_channel, DEFAULT_NOTIFY_CHANNEL);
    }

    #[test]
    fn overrides() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/jobs"),
            ("JOBAGENT_AGENT_ID", " 77 "),
            ("JOBAGENT_POOL_SIZE", "3"),
            ("JOBAGENT_AUTO_MIGRATE", "yes"),
            ("JOBAGENT_SCRATCH_DIR", "/var/tmp/jobagent"),
            ("REDIS_URL", "redis://cache"),
            ("JOBAGENT_NOTIFY_CHANNEL", "ops"),
        ]))
        .unwrap();

        assert_eq!(config.agent_id, AgentId::new(77));
        assert_eq!(config.pool_size, 3);
        assert!(config.auto_migrate);
        assert_eq!(config.scratch_dir, Some(PathBuf::from("/var/tmp/jobagent")));
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache"));
        assert_eq!(config.notify_channel, "ops");
    }

    #[test]
    fn database_url_is_required() {
        assert_eq!(
            AgentConfig::from_lookup(lookup(&[("DATABASE_URL", "  ")])),
            Err(ConfigError::Missing("DATABASE_URL"))
        );
    }

    #[test]
    fn rejects_bad_values() {
        let zero = AgentConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/jobs"),
            ("JOBAGENT_POOL_SIZE", "0"),
        ]));
        assert!(matches!(zero, Err(ConfigError::Invalid { name: "JOBAGENT_POOL_SIZE", .. })));

        let flag = AgentConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/jobs"),
            ("JOBAGENT_AUTO_MIGRATE", "maybe"),
        ]));
        assert!(matches!(flag, Err(ConfigError::Invalid { name: "JOBAGENT_AUTO_MIGRATE", .. })));
    }
}
