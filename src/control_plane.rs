//! ControlPlane: the bus, the Sentinel and the command center wired together

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use warden_bus::MessageBus;
use warden_command::{CenterStatus, CommandCenter, Diagnostics, WeakCommandCenter};
use warden_sentinel::{AlertKind, AlertSink, LogSink, Sentinel, SentinelAlert, WatchLevel};

use crate::config::{EscalationPolicy, WardenConfig};
use crate::error::Result;

/// The assembled control plane
///
/// One bus is shared by the Sentinel (alert publishing) and the command
/// center (lifecycle events and bus directives). Sentinel alerts land in the
/// center's ledger and, depending on the [`EscalationPolicy`], can lock the
/// system down.
///
/// This struct is cheaply cloneable; clones share every component.
///
/// # Example
///
/// ```rust,no_run
/// use warden::{ControlPlane, WardenConfig};
/// use warden_sentinel::WatchLevel;
///
/// # async fn example() -> anyhow::Result<()> {
/// let plane = ControlPlane::new(WardenConfig::default())?;
/// plane.initialize()?;
/// plane.activate()?;
///
/// plane.set_watch_level(WatchLevel::Elevated).await;
/// let diagnostics = plane.diagnostics().await;
/// println!("{}", serde_json::to_string_pretty(&diagnostics)?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct ControlPlane {
    bus: MessageBus,
    sentinel: Sentinel,
    center: CommandCenter,
    escalation: EscalationPolicy,
}

/// Compact view used by the CLI
#[derive(Debug, Clone, Serialize)]
pub struct ControlPlaneStatus {
    pub center: CenterStatus,
    pub escalation: EscalationPolicy,
}

impl ControlPlane {
    /// Validate `config` and build every component
    pub fn new(config: WardenConfig) -> Result<Self> {
        config.validate()?;

        let bus = MessageBus::new(config.bus);
        let sentinel = Sentinel::with_bus(config.sentinel, bus.clone());
        let center = CommandCenter::new(config.command, bus.clone(), Some(sentinel.clone()));

        sentinel.set_alert_sink(Arc::new(EscalatingSink {
            center: center.downgrade(),
            lockdown_on_guardian_failure: config.escalation.lockdown_on_guardian_failure,
        }));

        info!(
            "🛰️  Control plane assembled | lockdown at watch level: {} | on guardian failure: {}",
            config
                .escalation
                .lockdown_at_watch_level
                .map(|level| level.to_string())
                .unwrap_or_else(|| "never".to_string()),
            config.escalation.lockdown_on_guardian_failure
        );

        Ok(Self {
            bus,
            sentinel,
            center,
            escalation: config.escalation,
        })
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn sentinel(&self) -> &Sentinel {
        &self.sentinel
    }

    pub fn center(&self) -> &CommandCenter {
        &self.center
    }

    pub fn escalation(&self) -> &EscalationPolicy {
        &self.escalation
    }

    pub fn initialize(&self) -> Result<()> {
        Ok(self.center.initialize()?)
    }

    pub fn activate(&self) -> Result<()> {
        Ok(self.center.activate()?)
    }

    /// Change the Sentinel watch level; returns the previous level
    ///
    /// Crossing the configured escalation level initiates a lockdown.
    pub async fn set_watch_level(&self, level: WatchLevel) -> WatchLevel {
        let previous = self.sentinel.set_watch_level(level);

        if self.escalation.locks_down_at(level) && !self.escalation.locks_down_at(previous) {
            let reason = format!("watch level raised to {}", level);
            self.center.initiate_lockdown(&reason).await;
        }
        previous
    }

    pub fn status(&self) -> ControlPlaneStatus {
        ControlPlaneStatus {
            center: self.center.get_status(),
            escalation: self.escalation.clone(),
        }
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        self.center.get_full_diagnostics().await
    }

    /// Stop every Sentinel task; returns how many were running
    pub fn shutdown(&self) -> usize {
        let stopped = self.sentinel.shutdown();
        info!("Control plane shut down ({} sentinel tasks stopped)", stopped);
        stopped
    }
}

/// Forwards Sentinel alerts to the ledger and applies guardian escalation
struct EscalatingSink {
    center: WeakCommandCenter,
    lockdown_on_guardian_failure: bool,
}

impl AlertSink for EscalatingSink {
    fn raise(&self, alert: &SentinelAlert) {
        let Some(center) = self.center.upgrade() else {
            LogSink.raise(alert);
            return;
        };
        center.raise(alert);

        if !(self.lockdown_on_guardian_failure && alert.kind == AlertKind::GuardianFailed) {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(source = %alert.source, "no tokio runtime, guardian failure not escalated");
            return;
        };
        let reason = format!("{} failed", alert.source);
        handle.spawn(async move {
            center.initiate_lockdown(&reason).await;
        });
    }
}
