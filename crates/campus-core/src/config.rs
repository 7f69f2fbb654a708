use chrono::FixedOffset;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PORT: u16 = 8085;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Top-level config (campus.toml + CAMPUS_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampusConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Recurring-task scheduler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// When false the engine is never started and repeating tasks stay unscheduled.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Offset of the reference timezone that stored due dates/times are written in.
    ///
    /// Fixed offset only: wall-clock values are taken literally, with no DST shifts.
    #[serde(default)]
    pub utc_offset_minutes: i32,
    /// Optional cap on how far ahead a timer may be armed.
    /// Tasks due later are picked up by the next bootstrap instead.
    #[serde(default)]
    pub max_timer_delay_secs: Option<u64>,
    /// Re-run bootstrap on this period so far-future tasks get armed as they approach.
    #[serde(default)]
    pub rehydrate_interval_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            utc_offset_minutes: 0,
            max_timer_delay_secs: None,
            rehydrate_interval_secs: None,
        }
    }
}

impl SchedulerConfig {
    /// The reference timezone as a chrono offset.
    pub fn reference_offset(&self) -> crate::error::Result<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                crate::error::CampusError::Config(format!(
                    "scheduler.utc_offset_minutes out of range: {}",
                    self.utc_offset_minutes
                ))
            })
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.campus/campus.db", home)
}

impl CampusConfig {
    /// Load config from a TOML file with CAMPUS_* env var overrides.
    ///
    /// Nested keys are separated by a double underscore, e.g.
    /// `CAMPUS_SCHEDULER__UTC_OFFSET_MINUTES=120`.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.campus/campus.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);
        tracing::debug!(path = %path, "loading config");

        let config: CampusConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("CAMPUS_").split("__"))
            .extract()
            .map_err(|e| crate::error::CampusError::Config(e.to_string()))?;

        config.scheduler.reference_offset()?;
        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.campus/campus.toml", home)
}
