//! Alert ledger
//!
//! Append-only: alerts are acknowledged in place and never removed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{error, info, warn};
use uuid::Uuid;
use warden_sentinel::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(Uuid);

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub id: AlertId,
    pub severity: Severity,
    pub source: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AlertCounts {
    pub total: usize,
    pub active: usize,
    pub active_critical: usize,
}

#[derive(Debug, Default)]
pub struct AlertLedger {
    alerts: RwLock<Vec<Alert>>,
}

impl AlertLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Alert>> {
        self.alerts.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Alert>> {
        self.alerts.write().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn is_poisoned(&self) -> bool {
        self.alerts.is_poisoned()
    }

    pub fn raise(
        &self,
        severity: Severity,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> AlertId {
        let alert = Alert {
            id: AlertId(Uuid::new_v4()),
            severity,
            source: source.into(),
            message: message.into(),
            raised_at: Utc::now(),
            acknowledged: false,
            acknowledged_at: None,
        };
        match severity {
            Severity::Critical => error!(source = %alert.source, "🚨 {}", alert.message),
            Severity::Warning => warn!(source = %alert.source, "{}", alert.message),
            Severity::Info => info!(source = %alert.source, "{}", alert.message),
        }
        let id = alert.id;
        self.write().push(alert);
        id
    }

    /// Mark an alert handled; false if unknown or already acknowledged
    pub fn acknowledge(&self, id: AlertId) -> bool {
        let mut alerts = self.write();
        match alerts.iter_mut().find(|a| a.id == id) {
            Some(alert) if !alert.acknowledged => {
                alert.acknowledged = true;
                alert.acknowledged_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: AlertId) -> Option<Alert> {
        self.read().iter().find(|a| a.id == id).cloned()
    }

    /// Unacknowledged alerts, most recent first
    pub fn active_alerts(&self) -> Vec<Alert> {
        self.read()
            .iter()
            .rev()
            .filter(|a| !a.acknowledged)
            .cloned()
            .collect()
    }

    /// Every alert in the order raised
    pub fn all(&self) -> Vec<Alert> {
        self.read().clone()
    }

    /// The last `limit` alerts, most recent first
    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        self.read().iter().rev().take(limit).cloned().collect()
    }

    pub fn counts(&self) -> AlertCounts {
        let alerts = self.read();
        let mut counts = AlertCounts {
            total: alerts.len(),
            ..Default::default()
        };
        for alert in alerts.iter().filter(|a| !a.acknowledged) {
            counts.active += 1;
            if alert.severity == Severity::Critical {
                counts.active_critical += 1;
            }
        }
        counts
    }
}
