//! Sentinel behaviour on a paused tokio clock

use serde_json::json;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use warden_bus::{MessageBus, MessageKind};
use warden_sentinel::{
    AlertKind, AlertSink, AnomalyKind, Baseline, CanarySpec, CheckOutcome, GuardianOptions,
    GuardianStatus, GuardianTarget, MetricStats, PatternSpec, SecurityEvent, Sentinel,
    SentinelAlert, SentinelPolicy, Severity, WatchLevel,
};

#[derive(Default)]
struct Recorder(Mutex<Vec<SentinelAlert>>);

impl Recorder {
    fn kinds(&self) -> Vec<AlertKind> {
        self.0.lock().unwrap().iter().map(|a| a.kind).collect()
    }
}

impl AlertSink for Recorder {
    fn raise(&self, alert: &SentinelAlert) {
        self.0.lock().unwrap().push(alert.clone());
    }
}

fn sentinel_with_recorder(policy: SentinelPolicy) -> (Sentinel, Arc<Recorder>) {
    let sentinel = Sentinel::new(policy);
    let recorder = Arc::new(Recorder::default());
    sentinel.set_alert_sink(recorder.clone());
    (sentinel, recorder)
}

/// Probe whose health is flipped from the test
fn switchable(healthy: Arc<AtomicBool>) -> GuardianTarget {
    GuardianTarget::new("switchable", move || {
        let healthy = healthy.clone();
        async move {
            if healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(anyhow::anyhow!("target unreachable"))
            }
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_guardian_active_before_first_check() {
    let sentinel = Sentinel::default();
    let id = sentinel.deploy_guardian(
        "db",
        switchable(Arc::new(AtomicBool::new(false))),
        GuardianOptions::every(Duration::from_secs(60)),
    );

    let report = sentinel.get_guardian_status(&id).unwrap();
    assert_eq!(report.status, GuardianStatus::Active);
    assert_eq!(report.total_checks, 0);
    assert!(report.last_checked_at.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_guardian_ladder_and_recovery() {
    let (sentinel, recorder) = sentinel_with_recorder(SentinelPolicy {
        degraded_after: 2,
        failed_after: 4,
        ..Default::default()
    });
    let healthy = Arc::new(AtomicBool::new(false));
    sentinel.deploy_guardian(
        "db",
        switchable(healthy.clone()),
        GuardianOptions::every(Duration::from_secs(1)),
    );

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    assert_eq!(sentinel.get_guardian_status("db").unwrap().status, GuardianStatus::Active);

    tokio::time::sleep(Duration::from_secs(1)).await;
    let report = sentinel.get_guardian_status("db").unwrap();
    assert_eq!(report.status, GuardianStatus::Degraded);
    assert_eq!(report.last_error.as_deref(), Some("target unreachable"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(sentinel.get_guardian_status("db").unwrap().status, GuardianStatus::Failed);

    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(1)).await;
    let report = sentinel.get_guardian_status("db").unwrap();
    assert_eq!(report.status, GuardianStatus::Active);
    assert_eq!(report.consecutive_failures, 0);

    assert_eq!(
        recorder.kinds(),
        vec![
            AlertKind::GuardianDegraded,
            AlertKind::GuardianFailed,
            AlertKind::GuardianRecovered
        ]
    );
    let alerts = recorder.0.lock().unwrap();
    assert_eq!(alerts[1].severity, Severity::Critical);
    assert_eq!(alerts[1].source, "guardian:db");
}

#[tokio::test(start_paused = true)]
async fn test_manual_check_does_not_overlap() {
    let sentinel = Sentinel::default();
    let started = Arc::new(AtomicUsize::new(0));
    let counter = started.clone();
    sentinel.deploy_guardian(
        "slow",
        GuardianTarget::new("slow", move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok::<(), anyhow::Error>(())
            }
        }),
        GuardianOptions {
            check_interval: Some(Duration::from_secs(3_600)),
            timeout: Some(Duration::from_secs(30)),
        },
    );

    let background = {
        let sentinel = sentinel.clone();
        tokio::spawn(async move { sentinel.check_guardian_now("slow").await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert!(sentinel.get_guardian_status("slow").unwrap().check_in_flight);
    assert_eq!(sentinel.check_guardian_now("slow").await, CheckOutcome::AlreadyRunning);

    assert_eq!(
        background.await.unwrap(),
        CheckOutcome::Completed(GuardianStatus::Active)
    );
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(sentinel.check_guardian_now("missing").await, CheckOutcome::NotFound);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_probe_counts_as_failure() {
    let sentinel = Sentinel::default();
    sentinel.deploy_guardian(
        "hung",
        GuardianTarget::new("hung", || async {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok::<(), anyhow::Error>(())
        }),
        GuardianOptions {
            check_interval: Some(Duration::from_secs(3_600)),
            timeout: Some(Duration::from_secs(2)),
        },
    );

    sentinel.check_guardian_now("hung").await;
    let report = sentinel.get_guardian_status("hung").unwrap();
    assert_eq!(report.consecutive_failures, 1);
    assert!(report.last_error.unwrap().contains("timed out"));
}

#[tokio::test(start_paused = true)]
async fn test_recall_stops_checks() {
    let sentinel = Sentinel::default();
    sentinel.deploy_guardian(
        "db",
        switchable(Arc::new(AtomicBool::new(true))),
        GuardianOptions::every(Duration::from_secs(1)),
    );
    assert_eq!(sentinel.get_status().scheduled_tasks, 1);

    assert!(sentinel.recall_guardian("db"));
    assert!(!sentinel.recall_guardian("db"));
    assert!(sentinel.get_guardian_status("db").is_none());
    assert_eq!(sentinel.get_status().scheduled_tasks, 0);
}

#[tokio::test(start_paused = true)]
async fn test_watch_level_shortens_ladder() {
    let sentinel = Sentinel::new(SentinelPolicy {
        degraded_after: 2,
        failed_after: 5,
        ..Default::default()
    });
    sentinel.set_watch_level(WatchLevel::Sentinel);
    sentinel.deploy_guardian(
        "db",
        switchable(Arc::new(AtomicBool::new(false))),
        GuardianOptions::every(Duration::from_secs(3_600)),
    );

    // ladder at SENTINEL: degraded after 1, failed after 2
    assert_eq!(
        sentinel.check_guardian_now("db").await,
        CheckOutcome::Completed(GuardianStatus::Degraded)
    );
    assert_eq!(
        sentinel.check_guardian_now("db").await,
        CheckOutcome::Completed(GuardianStatus::Failed)
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_ladder_still_degrades_first_at_sentinel() {
    let sentinel = Sentinel::new(SentinelPolicy {
        degraded_after: 2,
        failed_after: 3,
        ..Default::default()
    });
    sentinel.set_watch_level(WatchLevel::Sentinel);
    sentinel.deploy_guardian(
        "cache",
        switchable(Arc::new(AtomicBool::new(false))),
        GuardianOptions::every(Duration::from_secs(3_600)),
    );

    // both thresholds scale to 1; failed is kept one step above degraded
    assert_eq!(
        sentinel.check_guardian_now("cache").await,
        CheckOutcome::Completed(GuardianStatus::Degraded)
    );
    assert_eq!(sentinel.get_guardian_status("cache").unwrap().consecutive_failures, 1);
    assert_eq!(
        sentinel.check_guardian_now("cache").await,
        CheckOutcome::Completed(GuardianStatus::Failed)
    );
}

#[test]
fn test_spike_detection_against_baseline() {
    let (sentinel, recorder) = sentinel_with_recorder(SentinelPolicy {
        spike_threshold: 2.0,
        ..Default::default()
    });
    sentinel.set_baseline("latency_ms", Baseline::new(50.0, 5.0));

    let quiet = MetricStats::from_samples(&[52.0]);
    assert!(sentinel.analyze("latency_ms", &quiet, &[52.0]).is_empty());

    let spike = MetricStats::from_samples(&[70.0]);
    let anomalies = sentinel.analyze("latency_ms", &spike, &[70.0]);
    assert_eq!(anomalies.len(), 1);
    assert_eq!(anomalies[0].kind, AnomalyKind::Spike);

    // analyze alone raises nothing
    assert!(recorder.kinds().is_empty());

    let record = sentinel.record_metric("latency_ms", 70.0);
    assert!(record.anomalies.iter().any(|a| a.kind == AnomalyKind::Spike));
    assert_eq!(recorder.kinds(), vec![AlertKind::Anomaly]);
}

#[test]
fn test_watch_level_tightens_anomaly_band() {
    let sentinel = Sentinel::new(SentinelPolicy {
        spike_threshold: 2.0,
        ..Default::default()
    });
    sentinel.set_baseline("latency_ms", Baseline::new(50.0, 5.0));
    let observed = MetricStats::from_samples(&[58.0]);

    // 8 is inside 2 * 5 at PASSIVE, outside 2 * 0.6 * 5 at VIGILANT
    assert!(sentinel.analyze("latency_ms", &observed, &[]).is_empty());
    sentinel.set_watch_level(WatchLevel::Vigilant);
    assert_eq!(sentinel.analyze("latency_ms", &observed, &[]).len(), 1);
}

#[test]
fn test_sustained_deviation_is_critical() {
    let (sentinel, recorder) = sentinel_with_recorder(SentinelPolicy {
        spike_threshold: 2.0,
        sustained_samples: 3,
        ..Default::default()
    });
    sentinel.set_baseline("queue_depth", Baseline::new(10.0, 1.0));

    for _ in 0..2 {
        let record = sentinel.record_metric("queue_depth", 20.0);
        assert!(!record.anomalies.iter().any(|a| a.kind == AnomalyKind::Sustained));
    }
    let record = sentinel.record_metric("queue_depth", 20.0);
    let sustained = record
        .anomalies
        .iter()
        .find(|a| a.kind == AnomalyKind::Sustained)
        .unwrap();
    assert_eq!(sustained.severity, Severity::Critical);
    assert!(recorder
        .0
        .lock()
        .unwrap()
        .iter()
        .any(|a| a.severity == Severity::Critical));
}

#[tokio::test(start_paused = true)]
async fn test_frequency_pattern() {
    let (sentinel, recorder) = sentinel_with_recorder(SentinelPolicy::default());
    sentinel.register_pattern(
        "brute-force",
        PatternSpec::Frequency {
            event_kind: "login_failed".to_string(),
            threshold: 3,
            window: Duration::from_secs(60),
        },
    );

    let failed = || SecurityEvent::new("login_failed").from_source("10.0.0.7");
    assert!(sentinel.record_event(failed()).is_empty());
    assert!(sentinel.record_event(failed()).is_empty());
    assert_eq!(sentinel.record_event(failed()), vec!["brute-force".to_string()]);

    // old events fall out of the window
    tokio::time::advance(Duration::from_secs(120)).await;
    assert!(sentinel.record_event(failed()).is_empty());

    assert_eq!(recorder.kinds(), vec![AlertKind::Pattern]);
    assert_eq!(sentinel.get_status().pattern_matches, 1);
}

#[tokio::test(start_paused = true)]
async fn test_sequence_pattern() {
    let sentinel = Sentinel::default();
    sentinel.register_pattern(
        "escalation",
        PatternSpec::Sequence {
            kinds: vec!["login".into(), "sudo".into(), "shadow_read".into()],
            window: Duration::from_secs(30),
        },
    );

    assert!(sentinel.record_event(SecurityEvent::new("login")).is_empty());
    assert!(sentinel.record_event(SecurityEvent::new("ls")).is_empty());
    assert!(sentinel.record_event(SecurityEvent::new("sudo")).is_empty());
    assert_eq!(
        sentinel.record_event(SecurityEvent::new("shadow_read")),
        vec!["escalation".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_canary_runs_and_reports() {
    let (sentinel, recorder) = sentinel_with_recorder(SentinelPolicy::default());
    let healthy = Arc::new(AtomicBool::new(true));
    let flag = healthy.clone();
    sentinel.deploy_canary(
        "checkout",
        CanarySpec::new(
            move || {
                let flag = flag.clone();
                async move {
                    if flag.load(Ordering::SeqCst) {
                        Ok(())
                    } else {
                        Err(anyhow::anyhow!("checkout returned 503"))
                    }
                }
            },
            Duration::from_secs(5),
        ),
    );

    tokio::time::sleep(Duration::from_secs(11)).await;
    let report = sentinel.canary_status("checkout").unwrap();
    assert_eq!(report.passes, 2);
    assert_eq!(report.failures, 0);

    healthy.store(false, Ordering::SeqCst);
    let result = sentinel.run_canary_now("checkout").await.unwrap();
    assert!(!result.passed);
    assert_eq!(result.error.as_deref(), Some("checkout returned 503"));
    assert_eq!(recorder.kinds(), vec![AlertKind::CanaryFailed]);

    assert!(sentinel.run_canary_now("unknown").await.is_none());
    assert!(sentinel.recall_canary("checkout"));
}

#[tokio::test(start_paused = true)]
async fn test_alerts_published_on_bus() {
    let bus = MessageBus::default();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    bus.subscribe("sentinel.alert.#", move |message: warden_bus::Message| {
        let sink = sink.clone();
        async move {
            sink.lock().unwrap().push(message);
            Ok::<(), warden_bus::HandlerError>(())
        }
    })
    .unwrap();

    let sentinel = Sentinel::with_bus(SentinelPolicy::default(), bus);
    sentinel.set_metric_threshold("cpu", warden_sentinel::ThresholdRule::gt(80.0, 95.0));
    sentinel.record_metric("cpu", 99.0);

    tokio::time::sleep(Duration::from_millis(10)).await;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].topic(), "sentinel.alert.critical");
    assert_eq!(seen[0].kind(), MessageKind::Alert);
    assert_eq!(seen[0].payload()["kind"], json!("threshold"));
}

#[tokio::test(start_paused = true)]
async fn test_status_health_and_shutdown() {
    let sentinel = Sentinel::default();
    sentinel.record_metric("cpu", 10.0);
    sentinel.record_metric("cpu", 20.0);
    sentinel.record_metric("mem", f64::NAN);
    sentinel.deploy_guardian(
        "a",
        switchable(Arc::new(AtomicBool::new(true))),
        GuardianOptions::every(Duration::from_secs(1)),
    );
    sentinel.deploy_guardian(
        "b",
        switchable(Arc::new(AtomicBool::new(true))),
        GuardianOptions::every(Duration::from_secs(1)),
    );

    let status = sentinel.get_status();
    assert_eq!(status.metric_series, 1);
    assert_eq!(status.samples_held, 2);
    assert_eq!(status.metrics_ignored, 1);
    assert_eq!(status.guardians.active, 2);
    assert_eq!(status.watch_level, WatchLevel::Passive);

    let health = sentinel.health_check();
    assert!(health.healthy);
    assert_eq!(health.tasks_alive, 2);

    assert_eq!(sentinel.shutdown(), 2);
    assert_eq!(sentinel.health_check().scheduled_tasks, 0);
}
