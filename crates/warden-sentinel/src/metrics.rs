//! Metric series and threshold rules
//!
//! Each series keeps a bounded rolling window of samples; statistics are
//! recomputed from the window on every record.

use crate::alert::Severity;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

/// Summary statistics over a metric window
///
/// `std_dev` is the population standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
    pub std_dev: f64,
}

impl MetricStats {
    /// Compute statistics over `samples`; all zero when empty
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a f64> + Clone) -> Self {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;

        for &value in samples.clone() {
            count += 1;
            sum += value;
            min = min.min(value);
            max = max.max(value);
        }

        if count == 0 {
            return Self::default();
        }

        let mean = sum / count as f64;
        let variance = samples
            .into_iter()
            .map(|value| (value - mean).powi(2))
            .sum::<f64>()
            / count as f64;

        Self {
            count,
            mean,
            min,
            max,
            std_dev: variance.sqrt(),
        }
    }
}

/// Bounded rolling window for one metric
#[derive(Debug, Clone)]
pub struct MetricSeries {
    samples: VecDeque<f64>,
    capacity: usize,
    total_recorded: u64,
    stats: MetricStats,
}

impl MetricSeries {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            total_recorded: 0,
            stats: MetricStats::default(),
        }
    }

    /// Append a sample, evicting the oldest when full, and return fresh stats
    pub fn record(&mut self, value: f64) -> MetricStats {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
        self.total_recorded += 1;
        self.stats = MetricStats::from_samples(&self.samples);
        self.stats
    }

    pub fn stats(&self) -> MetricStats {
        self.stats
    }

    pub fn samples(&self) -> &VecDeque<f64> {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn total_recorded(&self) -> u64 {
        self.total_recorded
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparison {
    /// Breach when the value rises above the limit
    Gt,
    /// Breach when the value falls below the limit
    Lt,
}

impl Comparison {
    fn breaches(&self, value: f64, limit: f64) -> bool {
        match self {
            Comparison::Gt => value > limit,
            Comparison::Lt => value < limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdRule {
    pub warning: Option<f64>,
    pub critical: Option<f64>,
    pub comparison: Comparison,
}

impl ThresholdRule {
    pub fn gt(warning: f64, critical: f64) -> Self {
        Self {
            warning: Some(warning),
            critical: Some(critical),
            comparison: Comparison::Gt,
        }
    }

    pub fn lt(warning: f64, critical: f64) -> Self {
        Self {
            warning: Some(warning),
            critical: Some(critical),
            comparison: Comparison::Lt,
        }
    }

    /// Critical takes precedence when both limits are breached
    pub fn evaluate(&self, metric: &str, value: f64) -> Option<ThresholdViolation> {
        let breach = |limit: Option<f64>| limit.filter(|l| self.comparison.breaches(value, *l));

        let (severity, limit) = if let Some(limit) = breach(self.critical) {
            (Severity::Critical, limit)
        } else if let Some(limit) = breach(self.warning) {
            (Severity::Warning, limit)
        } else {
            return None;
        };

        Some(ThresholdViolation {
            metric: metric.to_string(),
            severity,
            value,
            limit,
            comparison: self.comparison,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ThresholdId(Uuid);

impl ThresholdId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for ThresholdId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdViolation {
    pub metric: String,
    pub severity: Severity,
    pub value: f64,
    pub limit: f64,
    pub comparison: Comparison,
}

impl ThresholdViolation {
    pub fn describe(&self) -> String {
        let op = match self.comparison {
            Comparison::Gt => ">",
            Comparison::Lt => "<",
        };
        format!(
            "{} {} threshold: {} {} {}",
            self.metric, self.severity, self.value, op, self.limit
        )
    }
}
