use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Top-level config (skynet.toml + SKYNET_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkynetConfig {
    pub agent: AgentConfig,
    /// Bound on how long shutdown waits for in-flight channel leases to
    /// drain before force-cancelling them (§5: "Shutdown drains in-flight
    /// leases up to a configured grace, then force-cancels").
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
    #[serde(default)]
    pub skills: SkillsConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub knowledge: MemoryConfig,
}

impl Default for SkynetConfig {
    fn default() -> Self {
        Self {
            agent: AgentConfig::default(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
            database: DatabaseConfig::default(),
            channels: ChannelsConfig::default(),
            scheduler: SchedulerConfig::default(),
            reminders: RemindersConfig::default(),
            skills: SkillsConfig::default(),
            memory: MemoryConfig::default(),
            knowledge: MemoryConfig::default(),
        }
    }
}

/// The external LLM agent subprocess.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_binary_path")]
    pub binary_path: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Default per-invocation deadline; the caller may shorten it but never
    /// extend past `max_timeout_secs`.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub max_timeout_secs: u64,
    /// Working directory containing the agent's own configuration.
    pub workdir: Option<String>,
    /// Grace period between SIGTERM and SIGKILL when a lease is cancelled.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    /// Per-invocation stdout byte cap (§4.1 `oversize`).
    #[serde(default = "default_oversize_bytes")]
    pub oversize_bytes: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            binary_path: default_binary_path(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            max_timeout_secs: default_timeout_secs(),
            workdir: None,
            grace_secs: default_grace_secs(),
            oversize_bytes: default_oversize_bytes(),
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
        Self { path: default_db_path() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// When true, group messages are only processed when the bot is mentioned.
    #[serde(default)]
    pub require_mention: bool,
    /// When true, direct messages are accepted. Defaults to true.
    #[serde(default = "bool_true")]
    pub dm_allowed: bool,
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: usize,
}

/// Scheduler (C5) process-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA timezone name used for quiet hours, e.g. "Europe/London".
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_quiet_start")]
    pub quiet_hours_start: String,
    #[serde(default = "default_quiet_end")]
    pub quiet_hours_end: String,
    /// Path to the declarative schedule document.
    #[serde(default = "default_schedule_path")]
    pub schedule_path: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            quiet_hours_start: default_quiet_start(),
            quiet_hours_end: default_quiet_end(),
            schedule_path: default_schedule_path(),
        }
    }
}

/// Reminder Store (C6) polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemindersConfig {
    #[serde(default = "default_reminder_poll_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_reminder_max_failures")]
    pub max_delivery_failures: u32,
}

impl Default for RemindersConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_reminder_poll_secs(),
            max_delivery_failures: default_reminder_max_failures(),
        }
    }
}

/// Skill Registry (C7) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillsConfig {
    #[serde(default = "default_skills_dir")]
    pub skills_dir: String,
}

impl Default for SkillsConfig {
    fn default() -> Self {
        Self { skills_dir: default_skills_dir() }
    }
}

/// Best-effort long-term memory service (black-box HTTP put/query).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MemoryConfig {
    pub base_url: Option<String>,
    #[serde(default = "default_memory_timeout_ms")]
    pub timeout_ms: u64,
}

fn bool_true() -> bool {
    true
}
fn default_binary_path() -> String {
    "claude".to_string()
}
fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}
fn default_timeout_secs() -> u64 {
    600 // hard default deadline of 10 minutes, per C1 contract
}
fn default_grace_secs() -> u64 {
    5
}
fn default_oversize_bytes() -> usize {
    1024 * 1024 // ≈ 1 MiB per §4.1 oversize cap
}
fn default_shutdown_grace_secs() -> u64 {
    10
}
fn default_max_attachment_bytes() -> usize {
    20 * 1024 * 1024
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_quiet_start() -> String {
    "23:00".to_string()
}
fn default_quiet_end() -> String {
    "06:00".to_string()
}
fn default_schedule_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.skynet/schedule.txt", home)
}
fn default_reminder_poll_secs() -> u64 {
    15 // within the ≤30s cadence bound of §4.6
}
fn default_reminder_max_failures() -> u32 {
    3
}
fn default_skills_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.skynet/skills", home)
}
fn default_memory_timeout_ms() -> u64 {
    1500
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.skynet/skynet.db", home)
}

impl SkynetConfig {
    /// Load config from a TOML file with SKYNET_* env var overrides.
    ///
    /// Checks in order: explicit path argument, then `~/.skynet/skynet.toml`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: SkynetConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("SKYNET_").split("_"))
            .extract()
            .map_err(|e| crate::error::SkynetError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.skynet/skynet.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_ten_minute_agent_deadline() {
        let cfg = SkynetConfig::default();
        assert_eq!(cfg.agent.timeout_secs, 600);
    }

    #[test]
    fn default_reminder_poll_interval_within_spec_bound() {
        let cfg = SkynetConfig::default();
        assert!(cfg.reminders.poll_interval_secs <= 30);
    }
}
