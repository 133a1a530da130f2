/*!
 * Configuration for the Warden control plane
 *
 * One TOML file with a section per component. Every field has a default, so
 * an empty file is a valid configuration.
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::Level;
use warden_bus::BusConfig;
use warden_command::CommandConfig;
use warden_sentinel::{SentinelPolicy, WatchLevel};

use crate::error::{Result, WardenError};

/// Top-level configuration
///
/// ```toml
/// [bus]
/// max_redeliveries = 2
///
/// [sentinel]
/// degraded_after = 3
///
/// [command]
/// essential_commands = ["ping", "status"]
///
/// [escalation]
/// lockdown_at_watch_level = "SENTINEL"
///
/// [logging]
/// level = "debug"
/// format = "json"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub bus: BusConfig,
    pub sentinel: SentinelPolicy,
    pub command: CommandConfig,
    pub escalation: EscalationPolicy,
    pub logging: LoggingConfig,
}

/// When the control plane locks itself down without being asked to
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationPolicy {
    /// Lock down once the watch level is raised to this level or above
    ///
    /// **Default:** none (watch level changes never lock down)
    pub lockdown_at_watch_level: Option<WatchLevel>,

    /// Lock down when a guardian reaches FAILED
    ///
    /// **Default:** false
    pub lockdown_on_guardian_failure: bool,
}

impl EscalationPolicy {
    /// Whether moving to `level` should lock the system down
    pub fn locks_down_at(&self, level: WatchLevel) -> bool {
        self.lockdown_at_watch_level
            .is_some_and(|threshold| level >= threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// **Default:** info
    pub level: LogLevel,

    /// **Default:** compact
    pub format: LogFormat,

    /// Write logs to this file (always JSON) instead of stderr
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Compact,
    Json,
}

impl WardenConfig {
    /// Load and validate a configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: WardenConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| WardenError::Config(format!("failed to serialize configuration: {}", e)))
    }

    /// Check every section; the first problem found is reported with its section name
    pub fn validate(&self) -> Result<()> {
        let sections = [
            ("bus", self.bus.validate()),
            ("sentinel", self.sentinel.validate()),
            ("command", self.command.validate()),
        ];
        for (section, result) in sections {
            result.map_err(|e| WardenError::Config(format!("[{}] {}", section, e)))?;
        }
        Ok(())
    }
}
