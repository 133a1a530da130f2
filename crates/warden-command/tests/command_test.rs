//! Command center behaviour end to end

use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use warden_bus::{BusConfig, FailureReason, HandlerError, Message, MessageBus, PublishOptions};
use warden_command::{
    CommandCenter, CommandConfig, CommandError, Directive, DirectiveOptions, DirectiveOutcome,
    FnModule, ModuleOptions, StepOutcome, SystemState, Workflow,
};
use warden_core_resilience::{Classify, ErrorKind};
use warden_sentinel::Severity;

fn ready_center() -> CommandCenter {
    let center = CommandCenter::new(CommandConfig::default(), MessageBus::default(), None);
    center.initialize().unwrap();
    center
}

fn ping_module() -> FnModule {
    FnModule::new()
        .on("ping", |payload: Value| async move {
            Ok::<Value, HandlerError>(json!({"pong": payload["n"]}))
        })
        .on("purge", |_| async { Ok::<Value, HandlerError>(json!("purged")) })
}

fn failing_module() -> FnModule {
    FnModule::new()
        .on("ping", |_| async { Err::<Value, _>(HandlerError::new("sensor offline")) })
        .on("purge", |_| async { Err::<Value, _>(HandlerError::new("sensor offline")) })
}

#[tokio::test]
async fn test_directive_round_trip_and_unregister() {
    let center = ready_center();
    center
        .register_module("X", ping_module(), ModuleOptions::default())
        .unwrap();

    let result = center
        .send_directive("X", "ping", json!({"n": 1}), DirectiveOptions::default())
        .await
        .unwrap();
    assert_eq!(result, json!({"pong": 1}));

    assert!(center.unregister_module("X"));
    assert!(!center.unregister_module("X"));

    let err = center
        .send_directive("X", "ping", json!({"n": 1}), DirectiveOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("module not found"));
    assert_eq!(err.kind(), ErrorKind::Unavailable);
}

#[tokio::test]
async fn test_duplicate_module_name_rejected() {
    let center = ready_center();
    center
        .register_module("vault", ping_module(), ModuleOptions::default())
        .unwrap();
    let err = center
        .register_module("vault", ping_module(), ModuleOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_undeclared_command_is_validation_error() {
    let center = ready_center();
    center
        .register_module(
            "vault",
            ping_module(),
            ModuleOptions::default().with_capabilities(["ping"]),
        )
        .unwrap();

    let err = center
        .send_directive("vault", "purge", Value::Null, DirectiveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::UnsupportedCommand { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_handler_error_is_returned() {
    let center = ready_center();
    center
        .register_module("sensor", failing_module(), ModuleOptions::default())
        .unwrap();

    let err = center
        .send_directive("sensor", "ping", Value::Null, DirectiveOptions::default())
        .await
        .unwrap_err();
    match err {
        CommandError::Handler { module, message, .. } => {
            assert_eq!(module, "sensor");
            assert_eq!(message, "sensor offline");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(center.get_status().directives.failed, 1);
}

#[tokio::test]
async fn test_panicking_module_does_not_crash_center() {
    let center = ready_center();
    center
        .register_module(
            "bad",
            FnModule::new().on("ping", |_| async {
                if true {
                    panic!("boom");
                }
                Ok::<Value, HandlerError>(Value::Null)
            }),
            ModuleOptions::default(),
        )
        .unwrap();

    let err = center
        .send_directive("bad", "ping", Value::Null, DirectiveOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Handler);
    assert_eq!(center.state(), SystemState::Ready);
}

#[tokio::test(start_paused = true)]
async fn test_open_breaker_reported_distinctly() {
    let config = CommandConfig {
        breaker_failure_threshold: 2,
        breaker_cooldown_ms: 10_000,
        ..Default::default()
    };
    let center = CommandCenter::new(config, MessageBus::default(), None);
    center.initialize().unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    center
        .register_module(
            "flaky",
            FnModule::new().on("ping", move |_: Value| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<Value, _>(HandlerError::new("timeout talking to device"))
                }
            }),
            ModuleOptions::default(),
        )
        .unwrap();

    for _ in 0..2 {
        let err = center
            .send_directive("flaky", "ping", Value::Null, DirectiveOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Handler { .. }));
    }

    let err = center
        .send_directive("flaky", "ping", Value::Null, DirectiveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::CircuitOpen { .. }));
    assert_eq!(err.kind(), ErrorKind::Unavailable);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(center.get_status().open_circuits, vec!["flaky"]);

    // half-open trial after the cooldown reaches the module again
    tokio::time::advance(Duration::from_secs(11)).await;
    let _ = center
        .send_directive("flaky", "ping", Value::Null, DirectiveOptions::default())
        .await;
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_broadcast_isolates_failures() {
    let center = ready_center();
    center
        .register_module("a", ping_module(), ModuleOptions::default())
        .unwrap();
    center
        .register_module("b", failing_module(), ModuleOptions::default())
        .unwrap();
    center
        .register_module("c", ping_module(), ModuleOptions::default())
        .unwrap();

    let report = center.broadcast("ping", json!({"n": 7})).await.unwrap();
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    assert_eq!(
        report.outcome("a"),
        Some(&DirectiveOutcome::Ok {
            result: json!({"pong": 7})
        })
    );
    assert!(matches!(
        report.outcome("b"),
        Some(DirectiveOutcome::Failed {
            kind: ErrorKind::Handler,
            ..
        })
    ));
}

#[tokio::test]
async fn test_lockdown_blocks_non_essential_commands() {
    let center = ready_center();
    center
        .register_module("X", ping_module(), ModuleOptions::default())
        .unwrap();

    assert!(center.initiate_lockdown("incident").await);
    assert_eq!(center.state(), SystemState::Lockdown);

    let err = center.broadcast("purge", Value::Null).await.unwrap_err();
    assert!(matches!(err, CommandError::Lockdown { .. }));
    assert_eq!(err.kind(), ErrorKind::Unavailable);

    let err = center
        .send_directive("X", "purge", Value::Null, DirectiveOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, CommandError::Lockdown { .. }));

    // essential commands still go through
    let report = center.broadcast("ping", json!({"n": 1})).await.unwrap();
    assert_eq!(report.succeeded(), 1);

    assert!(center.lift_lockdown("operator").await);
    assert_eq!(center.state(), SystemState::Ready);
    assert!(center.broadcast("purge", Value::Null).await.is_ok());
}

#[tokio::test]
async fn test_lockdown_is_idempotent() {
    let center = ready_center();
    assert!(center.initiate_lockdown("first").await);
    assert!(!center.initiate_lockdown("second").await);

    let critical: Vec<_> = center
        .alerts()
        .all()
        .into_iter()
        .filter(|a| a.severity == Severity::Critical)
        .collect();
    assert_eq!(critical.len(), 1);
    assert!(critical[0].message.contains("first"));
    assert_eq!(
        center.get_status().lockdown_reason.as_deref(),
        Some("first")
    );

    assert!(center.initialize().is_err());
    assert!(center.lift_lockdown("operator").await);
    assert!(!center.lift_lockdown("operator").await);
}

#[tokio::test]
async fn test_lockdown_published_on_bus() {
    let bus = MessageBus::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe("system.lockdown", move |message: Message| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(message.payload().clone());
            Ok::<(), HandlerError>(())
        }
    })
    .unwrap();

    let center = CommandCenter::new(CommandConfig::default(), bus, None);
    center.initiate_lockdown("tamper detected").await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0]["reason"], "tamper detected");
    assert_eq!(seen[0]["previous"], "DORMANT");
}

#[tokio::test]
async fn test_workflow_short_circuits() {
    let center = ready_center();
    center
        .register_module("ok", ping_module(), ModuleOptions::default())
        .unwrap();
    center
        .register_module("bad", failing_module(), ModuleOptions::default())
        .unwrap();

    center
        .register_workflow(
            Workflow::new("seal")
                .step(Directive::new("ok", "ping"))
                .step(Directive::new("bad", "ping"))
                .step(Directive::new("ok", "purge")),
        )
        .unwrap();

    let receipt = center.execute_workflow("seal").await.unwrap();
    assert!(!receipt.success());
    assert!(matches!(receipt.steps[0].outcome, StepOutcome::Ok { .. }));
    assert!(matches!(receipt.steps[1].outcome, StepOutcome::Failed { .. }));
    assert!(matches!(receipt.steps[2].outcome, StepOutcome::Skipped));
    assert_eq!(receipt.skipped(), 1);
}

#[tokio::test]
async fn test_fault_tolerant_workflow_runs_every_step() {
    let center = ready_center();
    center
        .register_module("ok", ping_module(), ModuleOptions::default())
        .unwrap();
    center
        .register_module("bad", failing_module(), ModuleOptions::default())
        .unwrap();

    center
        .register_workflow(
            Workflow::new("sweep")
                .step(Directive::new("bad", "ping"))
                .step(Directive::new("ok", "purge"))
                .fault_tolerant(),
        )
        .unwrap();

    let receipt = center.execute_workflow("sweep").await.unwrap();
    assert_eq!(receipt.failed(), 1);
    assert_eq!(receipt.skipped(), 0);
    assert!(matches!(receipt.steps[1].outcome, StepOutcome::Ok { .. }));

    let err = center.execute_workflow("unknown").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_bus_directive_request_reply() {
    let bus = MessageBus::new(BusConfig::default());
    let center = CommandCenter::new(CommandConfig::default(), bus.clone(), None);
    center.initialize().unwrap();
    center
        .register_module("X", ping_module(), ModuleOptions::default())
        .unwrap();

    let reply = bus
        .request(
            "command.directive",
            json!({"target": "X", "command": "ping", "payload": {"n": 3}}),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert_eq!(reply, json!({"ok": true, "result": {"pong": 3}}));

    let reply = bus
        .request(
            "command.directive",
            json!({"target": "Y", "command": "ping"}),
            Duration::from_secs(1),
        )
        .await
        .unwrap();
    assert_eq!(reply["ok"], false);
    assert_eq!(reply["error"], "module not found: Y");
    assert_eq!(reply["kind"], "unavailable");

    let recent = center.recent_commands(5);
    assert_eq!(recent[0].actor, "bus");
}

#[tokio::test]
async fn test_failing_bus_directives_do_not_block_healthy_targets() {
    let bus = MessageBus::new(BusConfig::default());
    let center = CommandCenter::new(CommandConfig::default(), bus.clone(), None);
    center.initialize().unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    center
        .register_module(
            "X",
            FnModule::new().on("ping", move |_: Value| {
                let counted = counted.clone();
                async move {
                    counted.fetch_add(1, Ordering::SeqCst);
                    Ok::<Value, HandlerError>(json!("pong"))
                }
            }),
            ModuleOptions::default(),
        )
        .unwrap();

    for _ in 0..6 {
        let receipt = bus
            .publish(
                "command.directive",
                json!({"target": "ghost", "command": "ping"}),
                PublishOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(receipt.delivered, 1);
    }

    let receipt = bus
        .publish(
            "command.directive",
            json!({"target": "X", "command": "ping"}),
            PublishOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(receipt.delivered, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(bus
        .dead_letters()
        .iter()
        .all(|entry| !matches!(entry.failure_reason, FailureReason::CircuitOpen)));
    assert!(bus
        .dead_letters()
        .iter()
        .all(|entry| entry.item.topic() != "command.directive"));

    let status = center.get_status();
    assert_eq!(status.directives.sent, 7);
    assert_eq!(status.directives.failed, 6);
}

#[tokio::test]
async fn test_malformed_bus_directive_is_dead_lettered() {
    let bus = MessageBus::new(BusConfig::default());
    let center = CommandCenter::new(CommandConfig::default(), bus.clone(), None);
    center.initialize().unwrap();

    let receipt = bus
        .publish(
            "command.directive",
            json!({"command": "ping"}),
            PublishOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(receipt.delivered, 0);

    let letters: Vec<_> = bus
        .dead_letters()
        .into_iter()
        .filter(|entry| entry.item.topic() == "command.directive")
        .collect();
    assert_eq!(letters.len(), 1);
    assert!(letters[0].last_error.contains("malformed directive"));
}

#[tokio::test]
async fn test_diagnostics_never_fail() {
    let center = ready_center();
    center
        .register_module(
            "door",
            FnModule::new()
                .on("ping", |_| async { Ok::<Value, HandlerError>(Value::Null) })
                .with_health(|| async { Err::<(), _>(HandlerError::new("lock jammed")) }),
            ModuleOptions::default().essential(),
        )
        .unwrap();
    center
        .register_module("camera", ping_module(), ModuleOptions::default())
        .unwrap();
    center.alerts().raise(Severity::Warning, "test", "battery low");

    let diagnostics = center.get_full_diagnostics().await;
    assert!(diagnostics.degraded);
    assert_eq!(diagnostics.module_health.healthy, 1);
    assert_eq!(diagnostics.module_health.essential_unhealthy, 1);
    let door = diagnostics
        .modules
        .iter()
        .find(|m| m.info.name == "door")
        .unwrap();
    assert_eq!(door.health_error.as_deref(), Some("lock jammed"));
    assert_eq!(diagnostics.status.recent_alerts.len(), 1);
    assert!(diagnostics.poisoned_locks.is_empty());
    assert!(serde_json::to_value(&diagnostics).is_ok());
}
