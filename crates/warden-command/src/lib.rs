//! Warden Command: the control plane's command center
//!
//! # Overview
//!
//! - **Modules** implement [`ControlModule`] and are registered by unique name;
//!   each gets its own circuit breaker
//! - **Directives** go to one module, **broadcasts** to all of them at once
//! - **Workflows** are named, ordered directive sequences with a receipt per run
//! - **Alerts** are kept in an append-only ledger; Sentinel alerts arrive through
//!   the [`warden_sentinel::AlertSink`] implementation
//! - **System state** moves DORMANT -> READY -> ACTIVE, with LOCKDOWN reachable
//!   from anywhere and left only through [`CommandCenter::lift_lockdown`]
//!
//! Directives can also arrive over the bus: anything published on
//! `command.directive` with a `{target, command, payload}` body is dispatched,
//! and answered when it carries a correlation id.

pub mod alerts;
pub mod audit;
pub mod center;
pub mod config;
pub mod directive;
pub mod error;
pub mod module;
pub mod registry;
pub mod state;
pub mod workflow;

pub use alerts::{Alert, AlertCounts, AlertId, AlertLedger};
pub use audit::{AuditEventType, AuditRecord, AuditTrail};
pub use center::{
    CenterStatus, CommandCenter, Diagnostics, DirectiveCounts, ModuleDiagnostics,
    ModuleHealthCounts, WeakCommandCenter,
};
pub use config::{CommandConfig, DEFAULT_ESSENTIAL_COMMANDS, DIRECTIVE_TOPIC};
pub use directive::{BroadcastReport, Directive, DirectiveOptions, DirectiveOutcome};
pub use error::CommandError;
pub use module::{ControlModule, FnModule};
pub use registry::{ModuleId, ModuleInfo, ModuleOptions};
pub use state::{StateSnapshot, SystemState};
pub use workflow::{StepOutcome, StepReceipt, Workflow, WorkflowReceipt};
