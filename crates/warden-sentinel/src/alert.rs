//! Alerts raised by the Sentinel
//!
//! The Sentinel does not own an alert ledger. It hands every alert to an
//! [`AlertSink`]; the control plane plugs its ledger in there.

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Threshold,
    Anomaly,
    Pattern,
    GuardianDegraded,
    GuardianFailed,
    GuardianRecovered,
    CanaryFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentinelAlert {
    pub kind: AlertKind,
    pub severity: Severity,
    /// `metric:<name>`, `guardian:<id>`, `canary:<name>` or `pattern:<name>`
    pub source: String,
    pub message: String,
}

impl SentinelAlert {
    pub fn new(
        kind: AlertKind,
        severity: Severity,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            source: source.into(),
            message: message.into(),
        }
    }
}

/// Destination for Sentinel alerts
///
/// Called synchronously from metric recording and from scheduler tasks, so
/// implementations must not block.
pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: &SentinelAlert);
}

/// Default sink: writes alerts to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn raise(&self, alert: &SentinelAlert) {
        match alert.severity {
            Severity::Info => info!(source = %alert.source, kind = ?alert.kind, "{}", alert.message),
            Severity::Warning => warn!(source = %alert.source, kind = ?alert.kind, "{}", alert.message),
            Severity::Critical => error!(source = %alert.source, kind = ?alert.kind, "{}", alert.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert_eq!(Severity::Critical.to_string(), "critical");
    }

    #[test]
    fn test_alert_serializes() {
        let alert = SentinelAlert::new(
            AlertKind::GuardianFailed,
            Severity::Critical,
            "guardian:db",
            "db failed",
        );
        let value = serde_json::to_value(&alert).unwrap();
        assert_eq!(value["kind"], "guardian_failed");
        assert_eq!(value["severity"], "critical");
    }
}
