//! Baseline anomaly detection

use crate::alert::Severity;
use crate::metrics::MetricStats;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Expected behaviour of a metric
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub mean: f64,
    pub std_dev: f64,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl Baseline {
    pub fn new(mean: f64, std_dev: f64) -> Self {
        Self {
            mean,
            std_dev,
            min: None,
            max: None,
        }
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    /// Mean moved above the baseline band
    Spike,
    /// Mean moved below the baseline band
    Drop,
    /// Observed min/max left the baseline range
    RangeBreach,
    /// The trailing history stayed outside the band
    Sustained,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anomaly {
    pub metric: String,
    pub kind: AnomalyKind,
    pub severity: Severity,
    pub observed: f64,
    pub expected: f64,
    /// Distance from the baseline mean in standard deviations
    pub deviation: f64,
}

impl Anomaly {
    pub fn describe(&self) -> String {
        format!(
            "{} {:?}: observed {:.3}, expected {:.3} ({:.2} sd)",
            self.metric, self.kind, self.observed, self.expected, self.deviation
        )
    }
}

/// Compares observed statistics with per-metric baselines
#[derive(Debug, Clone)]
pub struct AnomalyDetector {
    baselines: HashMap<String, Baseline>,
    spike_threshold: f64,
    sustained_samples: usize,
}

impl AnomalyDetector {
    pub fn new(spike_threshold: f64, sustained_samples: usize) -> Self {
        Self {
            baselines: HashMap::new(),
            spike_threshold,
            sustained_samples,
        }
    }

    pub fn set_baseline(&mut self, metric: impl Into<String>, baseline: Baseline) {
        self.baselines.insert(metric.into(), baseline);
    }

    pub fn baseline(&self, metric: &str) -> Option<&Baseline> {
        self.baselines.get(metric)
    }

    pub fn spike_threshold(&self) -> f64 {
        self.spike_threshold
    }

    pub fn baseline_count(&self) -> usize {
        self.baselines.len()
    }

    /// Analyze with full sensitivity
    pub fn analyze(&self, metric: &str, observed: &MetricStats, history: &[f64]) -> Vec<Anomaly> {
        self.analyze_scaled(metric, observed, history, 1.0)
    }

    /// Analyze with the spike threshold multiplied by `sensitivity` (watch level factor)
    ///
    /// Empty when the metric has no baseline or nothing was observed.
    pub fn analyze_scaled(
        &self,
        metric: &str,
        observed: &MetricStats,
        history: &[f64],
        sensitivity: f64,
    ) -> Vec<Anomaly> {
        let Some(baseline) = self.baselines.get(metric) else {
            return Vec::new();
        };
        if observed.count == 0 || !observed.mean.is_finite() {
            return Vec::new();
        }

        let band = self.spike_threshold * sensitivity * baseline.std_dev;
        let deviation_of = |value: f64| {
            if baseline.std_dev > 0.0 {
                (value - baseline.mean) / baseline.std_dev
            } else {
                0.0
            }
        };
        let outside_band = |value: f64| (value - baseline.mean).abs() > band;

        let mut anomalies = Vec::new();
        let anomaly = |kind, severity, observed: f64| Anomaly {
            metric: metric.to_string(),
            kind,
            severity,
            observed,
            expected: baseline.mean,
            deviation: deviation_of(observed),
        };

        if outside_band(observed.mean) {
            let kind = if observed.mean > baseline.mean {
                AnomalyKind::Spike
            } else {
                AnomalyKind::Drop
            };
            anomalies.push(anomaly(kind, Severity::Warning, observed.mean));
        }

        if baseline.min.is_some_and(|min| observed.min < min) {
            anomalies.push(anomaly(AnomalyKind::RangeBreach, Severity::Warning, observed.min));
        } else if baseline.max.is_some_and(|max| observed.max > max) {
            anomalies.push(anomaly(AnomalyKind::RangeBreach, Severity::Warning, observed.max));
        }

        if self.sustained_samples > 0 && history.len() >= self.sustained_samples {
            let trailing = &history[history.len() - self.sustained_samples..];
            if trailing.iter().all(|value| outside_band(*value)) {
                let last = trailing[trailing.len() - 1];
                anomalies.push(anomaly(AnomalyKind::Sustained, Severity::Critical, last));
            }
        }

        anomalies
    }
}
