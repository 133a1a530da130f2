//! Event pattern matching
//!
//! Events are appended to a bounded log. After each append every registered
//! pattern is evaluated against the log; a pattern only fires on the event that
//! completes it, so a burst does not re-report the same match for unrelated events.
//! A sequence must be completed by the newest event, and the events it consumed
//! cannot complete it again.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// An observed event fed to [`crate::Sentinel::record_event`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub kind: String,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub details: Value,
}

impl SecurityEvent {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            source: String::new(),
            details: Value::Null,
        }
    }

    pub fn from_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternSpec {
    /// `threshold` events of `event_kind` within `window`
    Frequency {
        event_kind: String,
        threshold: usize,
        window: Duration,
    },
    /// `kinds` observed in this order within `window`, other events may interleave
    Sequence { kinds: Vec<String>, window: Duration },
}

#[derive(Debug, Clone)]
struct LoggedEvent {
    seq: u64,
    kind: String,
    at: Instant,
}

#[derive(Debug)]
struct Registered {
    name: String,
    spec: PatternSpec,
    /// Sequence number of the event that last completed this pattern
    last_completed: Option<u64>,
}

#[derive(Debug)]
pub struct PatternMatcher {
    patterns: Vec<Registered>,
    log: VecDeque<LoggedEvent>,
    capacity: usize,
    next_seq: u64,
    matches: u64,
}

impl PatternMatcher {
    pub fn new(capacity: usize) -> Self {
        Self {
            patterns: Vec::new(),
            log: VecDeque::new(),
            capacity: capacity.max(1),
            next_seq: 0,
            matches: 0,
        }
    }

    /// Register or replace a pattern
    pub fn register(&mut self, name: impl Into<String>, spec: PatternSpec) {
        let name = name.into();
        match self.patterns.iter_mut().find(|p| p.name == name) {
            Some(slot) => {
                slot.spec = spec;
                slot.last_completed = None;
            }
            None => self.patterns.push(Registered {
                name,
                spec,
                last_completed: None,
            }),
        }
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub fn logged_events(&self) -> usize {
        self.log.len()
    }

    pub fn total_matches(&self) -> u64 {
        self.matches
    }

    /// Append an event observed at `now` and return the names of completed patterns
    pub fn record(&mut self, kind: &str, now: Instant) -> Vec<String> {
        if self.log.len() >= self.capacity {
            self.log.pop_front();
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.log.push_back(LoggedEvent {
            seq,
            kind: kind.to_string(),
            at: now,
        });

        let mut matched = Vec::new();
        for pattern in &mut self.patterns {
            if completes(&self.log, pattern, kind, seq, now) {
                pattern.last_completed = Some(seq);
                matched.push(pattern.name.clone());
            }
        }
        self.matches += matched.len() as u64;
        matched
    }
}

fn within(
    log: &VecDeque<LoggedEvent>,
    window: Duration,
    now: Instant,
) -> impl Iterator<Item = &LoggedEvent> {
    log.iter()
        .filter(move |event| now.saturating_duration_since(event.at) <= window)
}

/// Whether the event `seq` of `kind`, just appended, completes `pattern`
fn completes(
    log: &VecDeque<LoggedEvent>,
    pattern: &Registered,
    kind: &str,
    seq: u64,
    now: Instant,
) -> bool {
    match &pattern.spec {
        PatternSpec::Frequency {
            event_kind,
            threshold,
            window,
        } => {
            event_kind == kind
                && within(log, *window, now)
                    .filter(|event| event.kind == *event_kind)
                    .count()
                    >= *threshold
        }
        PatternSpec::Sequence { kinds, window } => {
            let Some((last, prefix)) = kinds.split_last() else {
                return false;
            };
            if last != kind {
                return false;
            }
            // Events used by an earlier completion are not reused
            let mut expected = prefix.iter().peekable();
            for event in within(log, *window, now)
                .filter(|event| event.seq < seq)
                .filter(|event| pattern.last_completed.map_or(true, |done| event.seq > done))
            {
                if expected.peek().is_some_and(|k| **k == event.kind) {
                    expected.next();
                }
            }
            expected.peek().is_none()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frequency(kind: &str, threshold: usize, secs: u64) -> PatternSpec {
        PatternSpec::Frequency {
            event_kind: kind.to_string(),
            threshold,
            window: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_frequency_fires_at_threshold() {
        let mut matcher = PatternMatcher::new(100);
        matcher.register("brute_force", frequency("login_failed", 3, 60));
        let now = Instant::now();

        assert!(matcher.record("login_failed", now).is_empty());
        assert!(matcher.record("login_failed", now).is_empty());
        assert!(matcher.record("door_open", now).is_empty());
        assert_eq!(matcher.record("login_failed", now), vec!["brute_force"]);
        // Still at or above the threshold
        assert_eq!(matcher.record("login_failed", now), vec!["brute_force"]);
    }

    #[test]
    fn test_frequency_window_slides() {
        let mut matcher = PatternMatcher::new(100);
        matcher.register("burst", frequency("ping", 2, 10));
        let start = Instant::now();

        matcher.record("ping", start);
        let later = start + Duration::from_secs(11);
        assert!(matcher.record("ping", later).is_empty());
        assert_eq!(matcher.record("ping", later), vec!["burst"]);
    }

    #[test]
    fn test_sequence_in_order() {
        let mut matcher = PatternMatcher::new(100);
        matcher.register(
            "exfil",
            PatternSpec::Sequence {
                kinds: vec!["login".into(), "escalate".into(), "download".into()],
                window: Duration::from_secs(60),
            },
        );
        let now = Instant::now();

        assert!(matcher.record("download", now).is_empty());
        matcher.record("login", now);
        matcher.record("noise", now);
        matcher.record("escalate", now);
        assert_eq!(matcher.record("download", now), vec!["exfil"]);
        assert_eq!(matcher.total_matches(), 1);
    }

    #[test]
    fn test_sequence_fires_once_per_occurrence() {
        let mut matcher = PatternMatcher::new(100);
        matcher.register(
            "exfil",
            PatternSpec::Sequence {
                kinds: vec!["login".into(), "escalate".into(), "download".into()],
                window: Duration::from_secs(60),
            },
        );
        let now = Instant::now();

        matcher.record("login", now);
        matcher.record("escalate", now);
        assert_eq!(matcher.record("download", now), vec!["exfil"]);

        // A later download alone does not complete it again
        assert!(matcher.record("download", now).is_empty());
        assert!(matcher.record("noise", now).is_empty());
        assert!(matcher.record("download", now).is_empty());

        // A fresh occurrence does
        matcher.record("login", now);
        matcher.record("escalate", now);
        assert_eq!(matcher.record("download", now), vec!["exfil"]);
        assert_eq!(matcher.total_matches(), 2);
    }

    #[test]
    fn test_sequence_of_repeated_kind_uses_fresh_events() {
        let mut matcher = PatternMatcher::new(100);
        matcher.register(
            "double_tap",
            PatternSpec::Sequence {
                kinds: vec!["tap".into(), "tap".into()],
                window: Duration::from_secs(60),
            },
        );
        let now = Instant::now();

        assert!(matcher.record("tap", now).is_empty());
        assert_eq!(matcher.record("tap", now), vec!["double_tap"]);
        assert!(matcher.record("tap", now).is_empty());
        assert_eq!(matcher.record("tap", now), vec!["double_tap"]);
    }

    #[test]
    fn test_sequence_out_of_order_does_not_match() {
        let mut matcher = PatternMatcher::new(100);
        matcher.register(
            "ordered",
            PatternSpec::Sequence {
                kinds: vec!["a".into(), "b".into()],
                window: Duration::from_secs(60),
            },
        );
        let now = Instant::now();
        matcher.record("b", now);
        assert!(matcher.record("b", now).is_empty());
    }

    #[test]
    fn test_log_is_bounded() {
        let mut matcher = PatternMatcher::new(2);
        let now = Instant::now();
        for _ in 0..5 {
            matcher.record("x", now);
        }
        assert_eq!(matcher.logged_events(), 2);
    }

    #[test]
    fn test_register_replaces() {
        let mut matcher = PatternMatcher::new(10);
        matcher.register("p", frequency("a", 1, 1));
        matcher.register("p", frequency("b", 1, 1));
        assert_eq!(matcher.pattern_count(), 1);
        assert_eq!(matcher.record("b", Instant::now()), vec!["p"]);
    }
}
