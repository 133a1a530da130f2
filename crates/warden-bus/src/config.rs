//! Bus configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_core_resilience::CircuitBreakerConfig;

/// Name of the topic exchange every bus is created with
pub const DEFAULT_EXCHANGE: &str = "warden.topic";

/// Message bus configuration
///
/// Loaded from the `[bus]` section of the warden configuration file; every field
/// falls back to its default when omitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Time-to-live applied when a publish does not set one
    ///
    /// **Default:** 60000 (one minute)
    pub default_ttl_ms: u64,

    /// Priority applied when a publish does not set one (0 = most urgent)
    ///
    /// **Default:** 5
    pub default_priority: u8,

    /// Extra delivery attempts after a handler fails
    ///
    /// **Default:** 0 (fire once, then dead-letter)
    pub max_redeliveries: u32,

    /// Consecutive handler failures that open a subscription's breaker
    pub breaker_failure_threshold: u32,

    /// Time an open breaker waits before admitting a trial delivery
    pub breaker_cooldown_ms: u64,

    /// Number of dead letters retained before the oldest is evicted
    pub dead_letter_capacity: usize,

    /// Dead-letter publishes that matched no destination
    pub dead_letter_unroutable: bool,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 60_000,
            default_priority: 5,
            max_redeliveries: 0,
            breaker_failure_threshold: 5,
            breaker_cooldown_ms: 30_000,
            dead_letter_capacity: 1000,
            dead_letter_unroutable: false,
        }
    }
}

impl BusConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.breaker_failure_threshold,
            cooldown: Duration::from_millis(self.breaker_cooldown_ms),
        }
    }

    /// Validate the bus configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.default_ttl_ms == 0 {
            return Err("default_ttl_ms must be greater than 0".to_string());
        }

        if self.default_priority > crate::message::MAX_PRIORITY {
            return Err(format!(
                "default_priority must be between 0 and {}",
                crate::message::MAX_PRIORITY
            ));
        }

        if self.breaker_failure_threshold == 0 {
            return Err("breaker_failure_threshold must be at least 1".to_string());
        }

        Ok(())
    }
}
