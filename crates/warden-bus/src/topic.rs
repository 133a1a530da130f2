//! Topic names and binding patterns
//!
//! Topics are dot-delimited (`security.alert.login`). Patterns use two wildcards,
//! each of which must occupy a whole segment:
//!
//! - `*` matches exactly one segment: `security.*` matches `security.alert`
//!   but not `security.alert.login`
//! - `#` matches zero or more segments: `security.#` matches `security`,
//!   `security.alert` and `security.alert.login`

use crate::error::BusError;
use serde::Serialize;

const SINGLE: &str = "*";
const MULTI: &str = "#";

/// Check that a concrete topic is publishable
pub fn validate_topic(topic: &str) -> Result<(), BusError> {
    let invalid = |reason: &str| BusError::InvalidTopic {
        topic: topic.to_string(),
        reason: reason.to_string(),
    };

    if topic.is_empty() {
        return Err(invalid("topic is empty"));
    }
    if topic.contains(['*', '#']) {
        return Err(invalid("wildcards are only allowed in patterns"));
    }
    if topic.split('.').any(str::is_empty) {
        return Err(invalid("empty segment"));
    }
    Ok(())
}

/// A compiled binding or subscription pattern
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TopicPattern {
    raw: String,
    #[serde(skip)]
    segments: Vec<String>,
}

impl TopicPattern {
    pub fn parse(pattern: &str) -> Result<Self, BusError> {
        let invalid = |reason: &str| BusError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if pattern.is_empty() {
            return Err(invalid("pattern is empty"));
        }

        let segments: Vec<String> = pattern.split('.').map(str::to_string).collect();
        for segment in &segments {
            if segment.is_empty() {
                return Err(invalid("empty segment"));
            }
            if segment != SINGLE && segment != MULTI && segment.contains(['*', '#']) {
                return Err(invalid("wildcards must occupy a whole segment"));
            }
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True when the pattern contains no wildcard
    pub fn is_literal(&self) -> bool {
        self.segments.iter().all(|s| s != SINGLE && s != MULTI)
    }

    pub fn matches(&self, topic: &str) -> bool {
        let topic: Vec<&str> = topic.split('.').collect();
        let pattern: Vec<&str> = self.segments.iter().map(String::as_str).collect();
        match_segments(&pattern, &topic)
    }
}

impl std::fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

fn match_segments(pattern: &[&str], topic: &[&str]) -> bool {
    match pattern.split_first() {
        None => topic.is_empty(),
        Some((&MULTI, rest)) => (0..=topic.len()).any(|skip| match_segments(rest, &topic[skip..])),
        Some((&SINGLE, rest)) => !topic.is_empty() && match_segments(rest, &topic[1..]),
        Some((segment, rest)) => {
            topic.first() == Some(segment) && match_segments(rest, &topic[1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, topic: &str) -> bool {
        TopicPattern::parse(pattern).unwrap().matches(topic)
    }

    #[test]
    fn test_single_segment_wildcard() {
        assert!(matches("security.*", "security.alert"));
        assert!(!matches("security.*", "ai.alert"));
        assert!(!matches("security.*", "security.alert.login"));
        assert!(!matches("security.*", "security"));
        assert!(matches("*.alert", "ai.alert"));
    }

    #[test]
    fn test_multi_segment_wildcard() {
        assert!(matches("security.#", "security"));
        assert!(matches("security.#", "security.alert"));
        assert!(matches("security.#", "security.alert.login"));
        assert!(matches("#", "anything.at.all"));
        assert!(matches("a.#.z", "a.z"));
        assert!(matches("a.#.z", "a.b.c.z"));
        assert!(!matches("a.#.z", "a.b.c"));
    }

    #[test]
    fn test_literal_pattern() {
        let pattern = TopicPattern::parse("metrics.cpu").unwrap();
        assert!(pattern.is_literal());
        assert!(pattern.matches("metrics.cpu"));
        assert!(!pattern.matches("metrics.cpu.load"));
    }

    #[test]
    fn test_invalid_patterns() {
        assert!(TopicPattern::parse("").is_err());
        assert!(TopicPattern::parse("a..b").is_err());
        assert!(TopicPattern::parse("sec*.alert").is_err());
    }

    #[test]
    fn test_validate_topic() {
        assert!(validate_topic("security.alert").is_ok());
        assert!(validate_topic("_reply.5f1c").is_ok());
        assert!(validate_topic("").is_err());
        assert!(validate_topic("security.*").is_err());
        assert!(validate_topic("security.").is_err());
    }
}
