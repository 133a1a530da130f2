//! Scripted walk through the control plane, used by `warden demo`

use serde::Serialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::info;
use warden_bus::HandlerError;
use warden_command::{
    BroadcastReport, Diagnostics, Directive, DirectiveOptions, FnModule, ModuleOptions,
    SystemState, Workflow, WorkflowReceipt,
};
use warden_sentinel::{
    CheckOutcome, GuardianOptions, GuardianReport, GuardianStatus, GuardianTarget, ThresholdRule,
    WatchLevel,
};

use crate::control_plane::ControlPlane;
use crate::error::Result;

/// Everything the scenario observed, printed as JSON by the CLI
#[derive(Debug, Clone, Serialize)]
pub struct DemoReport {
    pub directive: Value,
    pub broadcast: BroadcastReport,
    pub workflow: WorkflowReceipt,
    pub guardian: Option<GuardianReport>,
    /// Why a non-essential directive was refused during lockdown
    pub lockdown_rejection: Option<String>,
    /// Reply to an essential command during lockdown
    pub lockdown_ping: Option<Value>,
    pub diagnostics: Diagnostics,
}

fn vault() -> FnModule {
    FnModule::new()
        .on("ping", |_: Value| async { Ok::<Value, HandlerError>(json!("pong")) })
        .on("status", |_: Value| async {
            Ok::<Value, HandlerError>(json!({"sealed": false}))
        })
        .on("store", |payload: Value| async move {
            Ok::<Value, HandlerError>(json!({"stored": payload}))
        })
        .on("rotate", |_: Value| async {
            Ok::<Value, HandlerError>(json!({"rotated": true}))
        })
}

fn telemetry() -> FnModule {
    FnModule::new()
        .on("ping", |_: Value| async { Ok::<Value, HandlerError>(json!("pong")) })
        .on("collect", |_: Value| async {
            Ok::<Value, HandlerError>(json!({"samples": 3}))
        })
}

fn relay() -> FnModule {
    FnModule::new()
        .on("ping", |_: Value| async {
            Err::<Value, _>(HandlerError::new("upstream unreachable"))
        })
        .with_health(|| async { Err::<(), _>(HandlerError::new("upstream unreachable")) })
}

/// Run the scenario against `plane`
///
/// Registers three modules, dispatches, broadcasts, runs a workflow, drives a
/// guardian to FAILED, locks the system down and lifts the lockdown again.
pub async fn run_demo(plane: &ControlPlane) -> Result<DemoReport> {
    let center = plane.center();
    let sentinel = plane.sentinel();

    if center.state() == SystemState::Dormant {
        plane.initialize()?;
    }
    if center.state() == SystemState::Ready {
        plane.activate()?;
    }

    center.register_module("vault", vault(), ModuleOptions::default().essential())?;
    center.register_module("telemetry", telemetry(), ModuleOptions::default().with_priority(3))?;
    center.register_module("relay", relay(), ModuleOptions::default().with_priority(8))?;

    let directive = center
        .send_directive(
            "vault",
            "store",
            json!({"key": "db-password"}),
            DirectiveOptions::with_priority(1),
        )
        .await?;

    let broadcast = center.broadcast("ping", Value::Null).await?;
    info!(
        "Broadcast ping: {} ok, {} failed",
        broadcast.succeeded(),
        broadcast.failed()
    );

    center.register_workflow(
        Workflow::new("rotate-credentials")
            .step(Directive::new("telemetry", "collect"))
            .step(Directive::new("vault", "rotate"))
            .step(Directive::new("vault", "store").with_payload(json!({"key": "rotated"}))),
    )?;
    let workflow = center.execute_workflow("rotate-credentials").await?;

    sentinel.set_metric_threshold("cpu", ThresholdRule::gt(80.0, 95.0));
    for value in [42.0, 47.5, 51.0, 88.0] {
        sentinel.record_metric("cpu", value);
    }

    plane.set_watch_level(WatchLevel::Elevated).await;

    let guardian_id = sentinel.deploy_guardian(
        "relay-upstream",
        GuardianTarget::new("relay", || async {
            Err::<(), _>(anyhow::anyhow!("connection refused"))
        }),
        GuardianOptions::every(Duration::from_secs(3600)),
    );
    for _ in 0..sentinel.policy().failed_after {
        let outcome = sentinel.check_guardian_now(&guardian_id).await;
        if outcome == CheckOutcome::Completed(GuardianStatus::Failed) {
            break;
        }
    }
    let guardian = sentinel.get_guardian_status(&guardian_id);
    tokio::task::yield_now().await;

    center
        .initiate_lockdown("guardian relay-upstream failed")
        .await;

    let lockdown_rejection = center
        .send_directive("vault", "store", Value::Null, DirectiveOptions::default())
        .await
        .err()
        .map(|e| e.to_string());
    let lockdown_ping = center
        .send_directive("vault", "ping", Value::Null, DirectiveOptions::default())
        .await
        .ok();

    center.lift_lockdown("demo").await;
    sentinel.recall_guardian(&guardian_id);

    let diagnostics = plane.diagnostics().await;
    Ok(DemoReport {
        directive,
        broadcast,
        workflow,
        guardian,
        lockdown_rejection,
        lockdown_ping,
        diagnostics,
    })
}
