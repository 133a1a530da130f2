//! Sentinel Policy
//!
//! Defines the windows, thresholds and timings the Sentinel monitors with.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Sentinel operational policy
///
/// Loaded from the `[sentinel]` section of the configuration file. Watch levels
/// scale the sensitivity values below; they never loosen them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelPolicy {
    /// Samples kept per metric series
    ///
    /// **Default:** 1000
    pub metric_window: usize,

    /// Events kept for pattern matching
    ///
    /// **Default:** 1000
    pub event_log_capacity: usize,

    /// Standard deviations from the baseline mean before a spike is flagged
    ///
    /// **Default:** 3.0
    pub spike_threshold: f64,

    /// Consecutive out-of-band history samples that make a sustained anomaly
    ///
    /// **Default:** 5
    pub sustained_samples: usize,

    /// Consecutive guardian failures before a target is degraded
    ///
    /// **Default:** 2
    pub degraded_after: u32,

    /// Consecutive guardian failures before a target is failed
    ///
    /// **Default:** 5
    pub failed_after: u32,

    /// Guardian check interval when a deploy does not set one
    ///
    /// **Default:** 30000 (30 seconds)
    pub check_interval_ms: u64,

    /// Deadline for one guardian check or canary probe; overruns count as failures
    ///
    /// **Default:** 5000
    pub check_timeout_ms: u64,

    /// Publish raised alerts on the bus as `sentinel.alert.<severity>`
    ///
    /// **Default:** true
    pub publish_alerts: bool,
}

impl Default for SentinelPolicy {
    fn default() -> Self {
        Self {
            metric_window: 1000,
            event_log_capacity: 1000,
            spike_threshold: 3.0,
            sustained_samples: 5,
            degraded_after: 2,
            failed_after: 5,
            check_interval_ms: 30_000,
            check_timeout_ms: 5_000,
            publish_alerts: true,
        }
    }
}

impl SentinelPolicy {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn check_timeout(&self) -> Duration {
        Duration::from_millis(self.check_timeout_ms)
    }

    /// Validate the policy configuration
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.metric_window == 0 {
            return Err("metric_window must be at least 1".to_string());
        }

        if !self.spike_threshold.is_finite() || self.spike_threshold <= 0.0 {
            return Err("spike_threshold must be a positive number".to_string());
        }

        if self.degraded_after == 0 {
            return Err("degraded_after must be at least 1".to_string());
        }

        if self.failed_after <= self.degraded_after {
            return Err(format!(
                "failed_after ({}) must be greater than degraded_after ({})",
                self.failed_after, self.degraded_after
            ));
        }

        if self.check_interval_ms == 0 {
            return Err("check_interval_ms must be greater than 0".to_string());
        }

        if self.check_timeout_ms == 0 {
            return Err("check_timeout_ms must be greater than 0".to_string());
        }

        Ok(())
    }
}
