//! Command center configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_core_resilience::CircuitBreakerConfig;

/// Commands allowed while the system is locked down
pub const DEFAULT_ESSENTIAL_COMMANDS: [&str; 3] = ["ping", "status", "health"];

/// Topic on which bus-carried directives are consumed
pub const DIRECTIVE_TOPIC: &str = "command.directive";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    /// Consecutive module failures before its breaker opens
    ///
    /// **Default:** 5
    pub breaker_failure_threshold: u32,

    /// **Default:** 30000 ms
    pub breaker_cooldown_ms: u64,

    /// Records kept in the command audit trail
    ///
    /// **Default:** 500
    pub audit_capacity: usize,

    /// Alerts and commands included in status and diagnostics
    ///
    /// **Default:** 20
    pub recent_limit: usize,

    /// Deadline for each module health check during diagnostics
    ///
    /// **Default:** 5000 ms
    pub health_check_timeout_ms: u64,

    /// Consume directives published on `command.directive`
    ///
    /// **Default:** true
    pub consume_bus_directives: bool,

    /// **Default:** `ping`, `status`, `health`
    pub essential_commands: Vec<String>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            breaker_failure_threshold: 5,
            breaker_cooldown_ms: 30_000,
            audit_capacity: 500,
            recent_limit: 20,
            health_check_timeout_ms: 5_000,
            consume_bus_directives: true,
            essential_commands: DEFAULT_ESSENTIAL_COMMANDS
                .iter()
                .map(|c| c.to_string())
                .collect(),
        }
    }
}

impl CommandConfig {
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker_failure_threshold,
            cooldown: Duration::from_millis(self.breaker_cooldown_ms),
        }
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.breaker_failure_threshold == 0 {
            return Err("breaker_failure_threshold must be at least 1".to_string());
        }
        if self.audit_capacity == 0 {
            return Err("audit_capacity must be at least 1".to_string());
        }
        if self.health_check_timeout_ms == 0 {
            return Err("health_check_timeout_ms must be greater than 0".to_string());
        }
        if self.essential_commands.iter().any(|c| c.trim().is_empty()) {
            return Err("essential_commands must not contain empty names".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CommandConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.essential_commands, vec!["ping", "status", "health"]);
        assert_eq!(config.breaker_config().failure_threshold, 5);
    }

    #[test]
    fn test_partial_override() {
        let config: CommandConfig =
            serde_json::from_value(serde_json::json!({"audit_capacity": 10})).unwrap();
        assert_eq!(config.audit_capacity, 10);
        assert_eq!(config.recent_limit, 20);
    }

    #[test]
    fn test_rejects_zero_threshold() {
        let config = CommandConfig {
            breaker_failure_threshold: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
