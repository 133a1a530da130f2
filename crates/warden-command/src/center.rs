//! The Command Center
//!
//! Owns the module registry, dispatches directives and broadcasts, runs
//! workflows, keeps the alert ledger and the system state. Modules are called
//! directly through their own circuit breaker; the bus carries lifecycle events
//! and bus-delivered directives.

use crate::alerts::{Alert, AlertCounts, AlertLedger};
use crate::audit::{AuditEventType, AuditRecord, AuditTrail};
use crate::config::{CommandConfig, DIRECTIVE_TOPIC};
use crate::directive::{BroadcastReport, Directive, DirectiveOptions, DirectiveOutcome};
use crate::error::CommandError;
use crate::module::ControlModule;
use crate::registry::{ModuleEntry, ModuleId, ModuleInfo, ModuleOptions, ModuleRegistry};
use crate::state::{StateSnapshot, SystemState};
use crate::workflow::{StepOutcome, StepReceipt, Workflow, WorkflowReceipt};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use warden_bus::{
    BusStats, HandlerError, Message, MessageBus, MessageKind, PublishOptions, SubscriptionId,
};
use warden_core_resilience::{CircuitBreakerStats, CircuitError, Classify};
use warden_sentinel::{
    AlertSink, Sentinel, SentinelAlert, SentinelHealth, SentinelStatus, Severity, WatchLevel,
};

const SOURCE: &str = "command-center";

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|p| p.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|p| p.into_inner())
}

#[derive(Debug, Default)]
struct Counters {
    directives: AtomicU64,
    directive_failures: AtomicU64,
    broadcasts: AtomicU64,
    workflows_run: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DirectiveCounts {
    pub sent: u64,
    pub failed: u64,
    pub broadcasts: u64,
    pub workflows_run: u64,
}

/// Cheap, synchronous snapshot of the center
#[derive(Debug, Clone, Serialize)]
pub struct CenterStatus {
    pub state: SystemState,
    pub state_since: DateTime<Utc>,
    pub lockdown_reason: Option<String>,
    pub uptime_secs: u64,
    pub modules: usize,
    pub essential_modules: usize,
    pub workflows: usize,
    pub open_circuits: Vec<String>,
    pub alerts: AlertCounts,
    pub directives: DirectiveCounts,
    pub watch_level: Option<WatchLevel>,
    pub recent_alerts: Vec<Alert>,
    pub recent_commands: Vec<AuditRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleDiagnostics {
    #[serde(flatten)]
    pub info: ModuleInfo,
    pub healthy: bool,
    pub health_error: Option<String>,
    pub circuit: CircuitBreakerStats,
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ModuleHealthCounts {
    pub healthy: usize,
    pub unhealthy: usize,
    pub essential_unhealthy: usize,
}

/// Everything the center knows, including live module health
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub status: CenterStatus,
    /// An essential module is unhealthy or internal state was poisoned
    pub degraded: bool,
    pub module_health: ModuleHealthCounts,
    pub modules: Vec<ModuleDiagnostics>,
    pub poisoned_locks: Vec<String>,
    pub bus: BusStats,
    pub sentinel: Option<SentinelStatus>,
    pub sentinel_health: Option<SentinelHealth>,
}

struct CenterInner {
    config: CommandConfig,
    registry: ModuleRegistry,
    workflows: RwLock<HashMap<String, Workflow>>,
    alerts: AlertLedger,
    audit: AuditTrail,
    state: RwLock<StateSnapshot>,
    essential: RwLock<BTreeSet<String>>,
    bus: MessageBus,
    sentinel: Option<Sentinel>,
    started_at: Instant,
    counters: Counters,
    directive_subscription: Mutex<Option<SubscriptionId>>,
}

impl Drop for CenterInner {
    fn drop(&mut self) {
        let subscription = self
            .directive_subscription
            .get_mut()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if let Some(id) = subscription {
            self.bus.unsubscribe(id);
        }
    }
}

/// The command center
///
/// Cloning is cheap and clones share state.
///
/// # Example
///
/// ```no_run
/// use serde_json::{json, Value};
/// use warden_bus::{HandlerError, MessageBus};
/// use warden_command::{CommandCenter, CommandConfig, DirectiveOptions, FnModule, ModuleOptions};
///
/// # async fn example() -> Result<(), warden_command::CommandError> {
/// let center = CommandCenter::new(CommandConfig::default(), MessageBus::default(), None);
/// center.initialize()?;
///
/// center.register_module(
///     "vault",
///     FnModule::new().on("ping", |_| async { Ok::<Value, HandlerError>(json!("pong")) }),
///     ModuleOptions::default(),
/// )?;
///
/// let pong = center
///     .send_directive("vault", "ping", Value::Null, DirectiveOptions::default())
///     .await?;
/// assert_eq!(pong, json!("pong"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CommandCenter {
    inner: Arc<CenterInner>,
}

impl std::fmt::Debug for CommandCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandCenter")
            .field("state", &self.state())
            .field("modules", &self.inner.registry.len())
            .finish_non_exhaustive()
    }
}

/// Non-owning handle to a [`CommandCenter`]
///
/// Held by components the center itself owns, such as a Sentinel alert sink.
#[derive(Clone)]
pub struct WeakCommandCenter {
    inner: Weak<CenterInner>,
}

impl WeakCommandCenter {
    pub fn upgrade(&self) -> Option<CommandCenter> {
        self.inner.upgrade().map(|inner| CommandCenter { inner })
    }
}

impl std::fmt::Debug for WeakCommandCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakCommandCenter")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl CommandCenter {
    /// Create a DORMANT center
    ///
    /// An invalid configuration is replaced by the default one.
    pub fn new(config: CommandConfig, bus: MessageBus, sentinel: Option<Sentinel>) -> Self {
        let config = match config.validate() {
            Ok(()) => config,
            Err(e) => {
                warn!("Invalid command center configuration ({}), using defaults", e);
                CommandConfig::default()
            }
        };

        let inner = Arc::new(CenterInner {
            registry: ModuleRegistry::new(config.breaker_config()),
            audit: AuditTrail::new(config.audit_capacity),
            essential: RwLock::new(config.essential_commands.iter().cloned().collect()),
            config,
            workflows: RwLock::new(HashMap::new()),
            alerts: AlertLedger::new(),
            state: RwLock::new(StateSnapshot::default()),
            bus,
            sentinel,
            started_at: Instant::now(),
            counters: Counters::default(),
            directive_subscription: Mutex::new(None),
        });

        let center = Self { inner };
        if center.inner.config.consume_bus_directives {
            center.subscribe_directives();
        }
        info!("🎛️  Command center created (state: {})", SystemState::Dormant);
        center
    }

    fn subscribe_directives(&self) {
        let weak = Arc::downgrade(&self.inner);
        let subscribed = self.inner.bus.subscribe(DIRECTIVE_TOPIC, move |message: Message| {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => CommandCenter { inner }.handle_bus_directive(message).await,
                    None => Ok(()),
                }
            }
        });

        match subscribed {
            Ok(id) => {
                *self
                    .inner
                    .directive_subscription
                    .lock()
                    .unwrap_or_else(|p| p.into_inner()) = Some(id);
                debug!(topic = DIRECTIVE_TOPIC, "consuming bus directives");
            }
            Err(e) => error!("Failed to subscribe to {}: {}", DIRECTIVE_TOPIC, e),
        }
    }

    pub fn downgrade(&self) -> WeakCommandCenter {
        WeakCommandCenter {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &CommandConfig {
        &self.inner.config
    }

    pub fn bus(&self) -> &MessageBus {
        &self.inner.bus
    }

    pub fn sentinel(&self) -> Option<&Sentinel> {
        self.inner.sentinel.as_ref()
    }

    pub fn alerts(&self) -> &AlertLedger {
        &self.inner.alerts
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.inner.audit
    }

    // ------------------------------------------------------------------
    // System state
    // ------------------------------------------------------------------

    pub fn state(&self) -> SystemState {
        read(&self.inner.state).state
    }

    pub fn state_snapshot(&self) -> StateSnapshot {
        read(&self.inner.state).clone()
    }

    /// DORMANT -> READY
    pub fn initialize(&self) -> Result<(), CommandError> {
        self.transition(SystemState::Ready)
    }

    /// READY -> ACTIVE
    pub fn activate(&self) -> Result<(), CommandError> {
        self.transition(SystemState::Active)
    }

    fn transition(&self, next: SystemState) -> Result<(), CommandError> {
        let from = {
            let mut state = write(&self.inner.state);
            let from = state.state;
            if from == SystemState::Lockdown || !from.can_transition_to(next) {
                return Err(CommandError::InvalidTransition { from, to: next });
            }
            state.enter(next)
        };

        info!("System state: {} -> {}", from, next);
        self.inner.audit.record(
            AuditEventType::StateChange,
            SOURCE,
            json!({"from": from, "to": next}),
        );
        self.emit("system.state", json!({"from": from, "to": next}));
        Ok(())
    }

    /// Enter LOCKDOWN; false if already locked down
    pub async fn initiate_lockdown(&self, reason: &str) -> bool {
        let previous = {
            let mut state = write(&self.inner.state);
            if state.state == SystemState::Lockdown {
                debug!(reason, "lockdown already in effect");
                return false;
            }
            let previous = state.enter(SystemState::Lockdown);
            state.lockdown_reason = Some(reason.to_string());
            previous
        };

        self.inner.alerts.raise(
            Severity::Critical,
            SOURCE,
            format!("Lockdown initiated: {}", reason),
        );
        self.inner.audit.record(
            AuditEventType::Lockdown,
            SOURCE,
            json!({"reason": reason, "previous": previous}),
        );

        let published = self
            .inner
            .bus
            .publish(
                "system.lockdown",
                json!({"reason": reason, "previous": previous}),
                PublishOptions::default().with_priority(0),
            )
            .await;
        if let Err(e) = published {
            warn!("Failed to publish lockdown event: {}", e);
        }
        true
    }

    /// LOCKDOWN -> READY; false when not locked down
    pub async fn lift_lockdown(&self, actor: &str) -> bool {
        let reason = {
            let mut state = write(&self.inner.state);
            if state.state != SystemState::Lockdown {
                return false;
            }
            let reason = state.lockdown_reason.take();
            state.enter(SystemState::Ready);
            reason
        };

        self.inner.alerts.raise(
            Severity::Info,
            SOURCE,
            format!("Lockdown lifted by {}", actor),
        );
        self.inner.audit.record(
            AuditEventType::LockdownLifted,
            actor,
            json!({"reason": reason}),
        );

        let published = self
            .inner
            .bus
            .publish(
                "system.lockdown.lifted",
                json!({"actor": actor, "reason": reason}),
                PublishOptions::default().with_priority(0),
            )
            .await;
        if let Err(e) = published {
            warn!("Failed to publish lockdown lift: {}", e);
        }
        true
    }

    pub fn is_essential(&self, command: &str) -> bool {
        read(&self.inner.essential).contains(command)
    }

    /// Replace the set of commands allowed during lockdown
    pub fn set_essential_commands<I, S>(&self, commands: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *write(&self.inner.essential) = commands.into_iter().map(Into::into).collect();
    }

    pub fn essential_commands(&self) -> Vec<String> {
        read(&self.inner.essential).iter().cloned().collect()
    }

    /// Reject calls the current state does not allow
    fn admit(&self, command: &str) -> Result<(), CommandError> {
        match self.state() {
            SystemState::Dormant => Err(CommandError::Dormant),
            SystemState::Lockdown if !self.is_essential(command) => Err(CommandError::Lockdown {
                command: command.to_string(),
            }),
            _ => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Modules
    // ------------------------------------------------------------------

    pub fn register_module<M: ControlModule>(
        &self,
        name: &str,
        module: M,
        options: ModuleOptions,
    ) -> Result<ModuleId, CommandError> {
        self.register_module_arc(name, Arc::new(module), options)
    }

    pub fn register_module_arc(
        &self,
        name: &str,
        module: Arc<dyn ControlModule>,
        options: ModuleOptions,
    ) -> Result<ModuleId, CommandError> {
        let info = self.inner.registry.register(name, module, options)?;
        let event = json!({
            "name": info.name,
            "id": info.id,
            "capabilities": info.capabilities,
            "priority": info.priority,
            "essential": info.essential,
        });
        self.inner
            .audit
            .record(AuditEventType::ModuleRegistered, SOURCE, event.clone());
        self.emit("command.module.registered", event);
        Ok(info.id)
    }

    /// Remove a module and its breaker; false if it was not registered
    pub fn unregister_module(&self, name: &str) -> bool {
        let Some(info) = self.inner.registry.unregister(name) else {
            return false;
        };
        let event = json!({"name": info.name, "id": info.id});
        self.inner
            .audit
            .record(AuditEventType::ModuleUnregistered, SOURCE, event.clone());
        self.emit("command.module.unregistered", event);
        true
    }

    /// Registered modules, by priority then name
    pub fn modules(&self) -> Vec<ModuleInfo> {
        self.inner
            .registry
            .entries()
            .iter()
            .map(|e| e.info.clone())
            .collect()
    }

    pub fn module(&self, name: &str) -> Option<ModuleInfo> {
        self.inner.registry.get(name).map(|e| e.info.clone())
    }

    pub fn module_circuit(&self, name: &str) -> Option<CircuitBreakerStats> {
        self.inner.registry.get(name).map(|e| e.breaker.stats())
    }

    /// Close a module's breaker by hand
    pub fn reset_module_circuit(&self, name: &str) -> bool {
        match self.inner.registry.get(name) {
            Some(entry) => {
                entry.breaker.reset();
                info!("Circuit reset for module: {}", name);
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Directives
    // ------------------------------------------------------------------

    /// Send `command` to one module and return its result
    pub async fn send_directive(
        &self,
        target: &str,
        command: &str,
        payload: Value,
        options: DirectiveOptions,
    ) -> Result<Value, CommandError> {
        self.dispatch_as("api", target, command, payload, options)
            .await
    }

    async fn dispatch_as(
        &self,
        actor: &str,
        target: &str,
        command: &str,
        payload: Value,
        options: DirectiveOptions,
    ) -> Result<Value, CommandError> {
        let started = Instant::now();
        let result = self.dispatch(target, command, payload).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        let counters = &self.inner.counters;
        counters.directives.fetch_add(1, Ordering::Relaxed);
        if result.is_err() {
            counters.directive_failures.fetch_add(1, Ordering::Relaxed);
        }

        self.inner.audit.record(
            AuditEventType::Directive,
            actor,
            json!({
                "target": target,
                "command": command,
                "priority": options.priority,
                "ok": result.is_ok(),
                "error": result.as_ref().err().map(|e| e.to_string()),
                "duration_ms": duration_ms,
            }),
        );

        match &result {
            Ok(_) => debug!(target, command, duration_ms, "directive completed"),
            Err(e) => warn!(target, command, kind = %e.kind(), "directive failed: {}", e),
        }
        result
    }

    async fn dispatch(
        &self,
        target: &str,
        command: &str,
        payload: Value,
    ) -> Result<Value, CommandError> {
        if target.trim().is_empty() {
            return Err(CommandError::Validation("target is empty".to_string()));
        }
        if command.trim().is_empty() {
            return Err(CommandError::Validation("command is empty".to_string()));
        }
        self.admit(command)?;

        let entry = self
            .inner
            .registry
            .get(target)
            .ok_or_else(|| CommandError::ModuleNotFound(target.to_string()))?;
        invoke(&entry, command, payload).await
    }

    /// Send `command` to every module at once
    ///
    /// During lockdown a non-essential command is rejected before any module is
    /// contacted.
    pub async fn broadcast(
        &self,
        command: &str,
        payload: Value,
    ) -> Result<BroadcastReport, CommandError> {
        if command.trim().is_empty() {
            return Err(CommandError::Validation("command is empty".to_string()));
        }
        if let Err(e) = self.admit(command) {
            self.inner.audit.record(
                AuditEventType::Broadcast,
                "api",
                json!({"command": command, "rejected": e.to_string()}),
            );
            warn!(command, "broadcast rejected: {}", e);
            return Err(e);
        }

        let entries = self.inner.registry.entries();
        let calls = entries.iter().map(|entry| {
            let payload = payload.clone();
            async move {
                let outcome = DirectiveOutcome::from(invoke(entry, command, payload).await);
                (entry.info.name.clone(), outcome)
            }
        });
        let report = BroadcastReport {
            command: command.to_string(),
            outcomes: join_all(calls).await.into_iter().collect(),
        };

        self.inner.counters.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.inner.audit.record(
            AuditEventType::Broadcast,
            "api",
            json!({
                "command": command,
                "modules": report.outcomes.len(),
                "succeeded": report.succeeded(),
                "failed": report.failed(),
            }),
        );
        info!(
            "📣 Broadcast '{}': {}/{} succeeded",
            command,
            report.succeeded(),
            report.outcomes.len()
        );
        Ok(report)
    }

    /// Run a directive received on the bus
    ///
    /// Dispatch failures are already audited by `dispatch_as` and are
    /// acknowledged, so a failing target never trips the subscription's breaker.
    /// Only a malformed payload is handed back to the bus as a handler error.
    async fn handle_bus_directive(&self, message: Message) -> Result<(), HandlerError> {
        let (result, malformed) =
            match serde_json::from_value::<Directive>(message.payload().clone()) {
                Ok(directive) => {
                    let options = directive.options();
                    let result = self
                        .dispatch_as(
                            "bus",
                            &directive.target,
                            &directive.command,
                            directive.payload,
                            options,
                        )
                        .await;
                    (result, false)
                }
                Err(e) => (
                    Err(CommandError::Validation(format!("malformed directive: {}", e))),
                    true,
                ),
            };

        if message.correlation_id().is_some() && message.reply_to().is_some() {
            let reply = match &result {
                Ok(value) => json!({"ok": true, "result": value}),
                Err(e) => json!({"ok": false, "error": e.to_string(), "kind": e.kind()}),
            };
            if let Err(e) = self.inner.bus.reply(&message, reply).await {
                warn!("Failed to reply to directive {}: {}", message.id(), e);
            }
            return Ok(());
        }

        match result {
            Err(e) if malformed => Err(HandlerError(e.to_string())),
            Err(e) => {
                debug!(message = %message.id(), "bus directive acknowledged after failure: {}", e);
                Ok(())
            }
            Ok(_) => Ok(()),
        }
    }

    // ------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------

    /// Register or replace a workflow
    pub fn register_workflow(&self, workflow: Workflow) -> Result<(), CommandError> {
        workflow.validate()?;
        debug!(workflow = %workflow.name, steps = workflow.steps.len(), "workflow registered");
        write(&self.inner.workflows).insert(workflow.name.clone(), workflow);
        Ok(())
    }

    pub fn workflows(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.inner.workflows).keys().cloned().collect();
        names.sort();
        names
    }

    /// Run a workflow's steps in order
    ///
    /// The first failure skips the remaining steps unless the workflow is fault
    /// tolerant. Step failures are reported in the receipt, not as errors.
    pub async fn execute_workflow(&self, name: &str) -> Result<WorkflowReceipt, CommandError> {
        let workflow = read(&self.inner.workflows)
            .get(name)
            .cloned()
            .ok_or_else(|| CommandError::WorkflowNotFound(name.to_string()))?;

        let actor = format!("workflow:{}", workflow.name);
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut halted = false;
        let mut steps = Vec::with_capacity(workflow.steps.len());

        for (index, step) in workflow.steps.iter().enumerate() {
            let outcome = if halted {
                StepOutcome::Skipped
            } else {
                let result = self
                    .dispatch_as(
                        &actor,
                        &step.target,
                        &step.command,
                        step.payload.clone(),
                        step.options(),
                    )
                    .await;
                if result.is_err() && !workflow.fault_tolerant {
                    halted = true;
                }
                StepOutcome::from(DirectiveOutcome::from(result))
            };
            steps.push(StepReceipt {
                index,
                target: step.target.clone(),
                command: step.command.clone(),
                outcome,
            });
        }

        let receipt = WorkflowReceipt {
            workflow: workflow.name.clone(),
            fault_tolerant: workflow.fault_tolerant,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            steps,
        };

        self.inner.counters.workflows_run.fetch_add(1, Ordering::Relaxed);
        self.inner.audit.record(
            AuditEventType::Workflow,
            &actor,
            json!({
                "success": receipt.success(),
                "failed": receipt.failed(),
                "skipped": receipt.skipped(),
            }),
        );
        if receipt.success() {
            info!("Workflow '{}' completed ({} steps)", name, receipt.steps.len());
        } else {
            warn!(
                "Workflow '{}' finished with {} failed and {} skipped steps",
                name,
                receipt.failed(),
                receipt.skipped()
            );
        }
        Ok(receipt)
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// Most recent directives and broadcasts first
    pub fn recent_commands(&self, limit: usize) -> Vec<AuditRecord> {
        self.inner.audit.recent_where(limit, |r| {
            matches!(
                r.event_type,
                AuditEventType::Directive | AuditEventType::Broadcast | AuditEventType::Workflow
            )
        })
    }

    pub fn get_status(&self) -> CenterStatus {
        let inner = &self.inner;
        let snapshot = self.state_snapshot();
        let entries = inner.registry.entries();
        let limit = inner.config.recent_limit;
        let counters = &inner.counters;

        CenterStatus {
            state: snapshot.state,
            state_since: snapshot.since,
            lockdown_reason: snapshot.lockdown_reason,
            uptime_secs: inner.started_at.elapsed().as_secs(),
            modules: entries.len(),
            essential_modules: entries.iter().filter(|e| e.info.essential).count(),
            workflows: read(&inner.workflows).len(),
            open_circuits: entries
                .iter()
                .filter(|e| e.breaker.is_open())
                .map(|e| e.info.name.clone())
                .collect(),
            alerts: inner.alerts.counts(),
            directives: DirectiveCounts {
                sent: counters.directives.load(Ordering::Relaxed),
                failed: counters.directive_failures.load(Ordering::Relaxed),
                broadcasts: counters.broadcasts.load(Ordering::Relaxed),
                workflows_run: counters.workflows_run.load(Ordering::Relaxed),
            },
            watch_level: inner.sentinel.as_ref().map(Sentinel::watch_level),
            recent_alerts: inner.alerts.recent(limit),
            recent_commands: self.recent_commands(limit),
        }
    }

    /// Status plus live module health checks, bus and Sentinel state
    pub async fn get_full_diagnostics(&self) -> Diagnostics {
        let inner = &self.inner;
        let timeout = inner.config.health_check_timeout();
        let entries = inner.registry.entries();

        let checks = entries.iter().map(|entry| async move {
            let probe = AssertUnwindSafe(entry.module.health_check()).catch_unwind();
            let health = match tokio::time::timeout(timeout, probe).await {
                Ok(Ok(Ok(()))) => Ok(()),
                Ok(Ok(Err(e))) => Err(e.0),
                Ok(Err(_)) => Err("health check panicked".to_string()),
                Err(_) => Err(format!("health check timed out after {:?}", timeout)),
            };
            ModuleDiagnostics {
                info: entry.info.clone(),
                healthy: health.is_ok(),
                health_error: health.err(),
                circuit: entry.breaker.stats(),
            }
        });
        let modules: Vec<ModuleDiagnostics> = join_all(checks).await;

        let mut module_health = ModuleHealthCounts::default();
        for module in &modules {
            if module.healthy {
                module_health.healthy += 1;
            } else {
                module_health.unhealthy += 1;
                if module.info.essential {
                    module_health.essential_unhealthy += 1;
                }
            }
        }

        let mut poisoned_locks = Vec::new();
        for (name, poisoned) in [
            ("registry", inner.registry.is_poisoned()),
            ("workflows", inner.workflows.is_poisoned()),
            ("alerts", inner.alerts.is_poisoned()),
            ("audit", inner.audit.is_poisoned()),
            ("state", inner.state.is_poisoned()),
            ("essential", inner.essential.is_poisoned()),
        ] {
            if poisoned {
                poisoned_locks.push(name.to_string());
            }
        }

        Diagnostics {
            status: self.get_status(),
            degraded: module_health.essential_unhealthy > 0 || !poisoned_locks.is_empty(),
            module_health,
            modules,
            poisoned_locks,
            bus: inner.bus.stats(),
            sentinel: inner.sentinel.as_ref().map(Sentinel::get_status),
            sentinel_health: inner.sentinel.as_ref().map(Sentinel::health_check),
        }
    }

    /// Publish a lifecycle event without waiting for delivery
    fn emit(&self, topic: &str, payload: Value) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(topic, "no tokio runtime, event not published");
            return;
        };
        let bus = self.inner.bus.clone();
        let topic = topic.to_string();
        handle.spawn(async move {
            let options = PublishOptions::default().with_kind(MessageKind::Event);
            if let Err(e) = bus.publish(&topic, payload, options).await {
                warn!("Failed to publish {}: {}", topic, e);
            }
        });
    }
}

/// Run one command on one module through its breaker
async fn invoke(entry: &ModuleEntry, command: &str, payload: Value) -> Result<Value, CommandError> {
    let name = &entry.info.name;
    if !entry.info.supports(command) {
        return Err(CommandError::UnsupportedCommand {
            module: name.clone(),
            command: command.to_string(),
        });
    }

    let module = entry.module.clone();
    let result = entry
        .breaker
        .execute(|| async move {
            AssertUnwindSafe(module.handle(command, payload))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(HandlerError::new("module panicked")))
        })
        .await;

    match result {
        Ok(value) => Ok(value),
        Err(CircuitError::Open { retry_in, .. }) => Err(CommandError::CircuitOpen {
            module: name.clone(),
            retry_in,
        }),
        Err(CircuitError::Inner(e)) => Err(CommandError::Handler {
            module: name.clone(),
            command: command.to_string(),
            message: e.0,
        }),
    }
}

/// Sentinel alerts land in the ledger
impl AlertSink for CommandCenter {
    fn raise(&self, alert: &SentinelAlert) {
        self.inner.alerts.raise(
            alert.severity,
            format!("sentinel/{}", alert.source),
            alert.message.clone(),
        );
    }
}
