/*!
 * Warden - in-process control plane
 *
 * Three cooperating components:
 * - A topic-routed message bus with queues, exchanges, request/reply and
 *   dead-lettering (`warden-bus`)
 * - The Sentinel: metric thresholds, anomaly detection, security patterns,
 *   guardians and canaries under a graduated watch level (`warden-sentinel`)
 * - The command center: module registry, directives, broadcasts, workflows,
 *   alerts and lockdown (`warden-command`)
 *
 * This crate wires them into a [`ControlPlane`], loads the TOML
 * configuration and sets up logging for the `warden` binary.
 */

pub mod config;
pub mod control_plane;
pub mod demo;
pub mod error;
pub mod logging;

pub use config::{EscalationPolicy, LogFormat, LogLevel, LoggingConfig, WardenConfig};
pub use control_plane::{ControlPlane, ControlPlaneStatus};
pub use demo::{run_demo, DemoReport};
pub use error::{Result, WardenError};

pub use warden_bus as bus;
pub use warden_command as command;
pub use warden_sentinel as sentinel;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
