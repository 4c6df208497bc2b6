use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSecondsWithFrac};
use tracing::debug;

use crate::error::ConfigError;
use crate::safety::rules::{default_rules, AbortThresholds, SafetyRule};

fn default_host() -> String {
    "192.168.10.1".to_owned()
}

fn default_port() -> u16 {
    8889
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_telemetry_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(7)
}

fn default_takeoff_settle() -> Duration {
    Duration::from_secs(3)
}

fn default_land_settle() -> Duration {
    Duration::from_secs(3)
}

fn default_rotate_settle() -> Duration {
    Duration::from_secs(1)
}

fn default_capture_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_move_wait() -> Duration {
    Duration::from_secs(10)
}

fn default_poll_period() -> Duration {
    Duration::from_secs(1)
}

/// Complete runtime configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightConfig {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
}

impl FlightConfig {
    pub const ENV_CONFIG_PATH: &'static str = "FLIGHTCORE_CONFIG";

    /// Load the first existing candidate, or the file named by
    /// `FLIGHTCORE_CONFIG`. Falls back to defaults when nothing exists.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                return Self::from_path(PathBuf::from(env_path));
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                return Self::from_path(candidate.as_ref().to_path_buf());
            }
        }

        debug!("no configuration file found, using defaults");
        Ok(Self::default())
    }

    pub fn from_path(path: PathBuf) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<FlightConfig>()
            .with_context(|| format!("failed to load config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.link.host.trim().is_empty() {
            return Err(ConfigError::EmptyHost);
        }
        let durations = [
            ("link.connect_timeout", self.link.connect_timeout),
            ("link.telemetry_timeout", self.link.telemetry_timeout),
            ("executor.command_timeout", self.executor.command_timeout),
            ("safety.poll_period", self.safety.poll_period),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        if let Some(index) = self
            .safety
            .rules
            .iter()
            .position(|rule| rule.name.trim().is_empty())
        {
            return Err(ConfigError::UnnamedRule(index));
        }
        Ok(())
    }
}

impl std::str::FromStr for FlightConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: FlightConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_connect_timeout")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub connect_timeout: Duration,
    #[serde(default = "default_telemetry_timeout")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub telemetry_timeout: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            connect_timeout: default_connect_timeout(),
            telemetry_timeout: default_telemetry_timeout(),
        }
    }
}

/// Per-command timeout and the settle times waited after each action.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default = "default_command_timeout")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub command_timeout: Duration,
    #[serde(default = "default_takeoff_settle")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub takeoff_settle: Duration,
    #[serde(default = "default_land_settle")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub land_settle: Duration,
    #[serde(default = "default_rotate_settle")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub rotate_settle: Duration,
    #[serde(default = "default_capture_delay")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub capture_delay: Duration,
    #[serde(default = "default_max_move_wait")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub max_move_wait: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            command_timeout: default_command_timeout(),
            takeoff_settle: default_takeoff_settle(),
            land_settle: default_land_settle(),
            rotate_settle: default_rotate_settle(),
            capture_delay: default_capture_delay(),
            max_move_wait: default_max_move_wait(),
        }
    }
}

/// How a critical violation reaches the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Escalation {
    /// Raise the abort flag; the executor stops at its next waypoint boundary.
    #[default]
    Boundary,
    /// Raise the abort flag and send the emergency command right away.
    Immediate,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyConfig {
    #[serde(default = "default_poll_period")]
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub poll_period: Duration,
    #[serde(default)]
    pub hard_abort: AbortThresholds,
    #[serde(default)]
    pub escalation: Escalation,
    #[serde(default = "default_rules")]
    pub rules: Vec<SafetyRule>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            poll_period: default_poll_period(),
            hard_abort: AbortThresholds::default(),
            escalation: Escalation::default(),
            rules: default_rules(),
        }
    }
}
