use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SkylockError};
use crate::types::{HolderId, LockConfiguration, Schedule};

pub const DEFAULT_TABLE: &str = "shedlock";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_HOLD: Duration = Duration::from_secs(5 * 60);

/// Top-level config (skylock.toml + SKYLOCK_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkylockConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub defaults: LockDefaults,
    #[serde(default)]
    pub instance: InstanceConfig,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Lease table name. Must be a plain SQL identifier.
    #[serde(default = "default_table")]
    pub table: String,
    /// How long a transaction waits for a competing writer before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            table: default_table(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

/// Hold durations applied to tasks that don't set their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockDefaults {
    #[serde(default = "default_max_hold", with = "humantime_serde")]
    pub max_hold: Duration,
    #[serde(default, with = "humantime_serde")]
    pub min_hold: Duration,
}

impl Default for LockDefaults {
    fn default() -> Self {
        Self {
            max_hold: DEFAULT_MAX_HOLD,
            min_hold: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstanceConfig {
    /// Holder id written to `locked_by`. Defaults to `hostname-pid`.
    pub holder_id: Option<String>,
}

impl InstanceConfig {
    pub fn holder(&self) -> HolderId {
        match self.holder_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => HolderId::new(id),
            _ => HolderId::local(),
        }
    }
}

/// One scheduled, lock-guarded task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    pub schedule: Schedule,
    #[serde(default, with = "humantime_serde::option")]
    pub min_hold: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub max_hold: Option<Duration>,
    /// How long the demo work keeps the lease busy.
    #[serde(default, with = "humantime_serde")]
    pub work_for: Duration,
}

impl TaskConfig {
    /// Resolve the task's lock timing against the configured defaults.
    pub fn lock_configuration(&self, defaults: &LockDefaults) -> Result<LockConfiguration> {
        self.schedule.validate()?;
        LockConfiguration::new(
            self.name.clone(),
            self.min_hold.unwrap_or(defaults.min_hold),
            self.max_hold.unwrap_or(defaults.max_hold),
        )
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.skylock/skylock.db", home)
}
fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}
fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}
fn default_max_hold() -> Duration {
    DEFAULT_MAX_HOLD
}

impl SkylockConfig {
    /// Load config from a TOML file with SKYLOCK_* env var overrides.
    ///
    /// Nested keys use a double underscore: `SKYLOCK_DATABASE__BUSY_TIMEOUT_MS=250`.
    /// A missing file is not an error; every section has defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| SkylockError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(SkylockConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("SKYLOCK_").split("__").ignore(&["config"]))
    }

    /// Resolve every configured task, failing on the first invalid one.
    pub fn lock_configurations(&self) -> Result<Vec<(LockConfiguration, &TaskConfig)>> {
        self.tasks
            .iter()
            .map(|t| Ok((t.lock_configuration(&self.defaults)?, t)))
            .collect()
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.skylock/skylock.toml", home)
}

/// `Duration` <-> humantime strings ("30s", "5m", "1h 30m").
mod humantime_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&humantime::format_duration(*d).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match d {
                Some(d) => super::serialize(d, s),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}
