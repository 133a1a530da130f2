//! Graduated watch levels

use serde::{Deserialize, Serialize};

/// Sentinel-wide alertness
///
/// Each level carries a sensitivity factor in `(0, 1]` that scales the anomaly
/// spike band and the guardian failure ladder. Factors never increase with the
/// level, so raising the level can only tighten monitoring.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u8)]
pub enum WatchLevel {
    #[default]
    Passive = 0,
    Observant = 1,
    Elevated = 2,
    Vigilant = 3,
    Sentinel = 4,
}

impl WatchLevel {
    pub const ALL: [WatchLevel; 5] = [
        WatchLevel::Passive,
        WatchLevel::Observant,
        WatchLevel::Elevated,
        WatchLevel::Vigilant,
        WatchLevel::Sentinel,
    ];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Self> {
        Self::ALL.get(ordinal as usize).copied()
    }

    pub fn sensitivity_factor(self) -> f64 {
        match self {
            WatchLevel::Passive => 1.0,
            WatchLevel::Observant => 0.9,
            WatchLevel::Elevated => 0.75,
            WatchLevel::Vigilant => 0.6,
            WatchLevel::Sentinel => 0.5,
        }
    }

    /// Scale a failure count threshold; never below 1
    pub fn scale_threshold(self, base: u32) -> u32 {
        ((base as f64 * self.sensitivity_factor()).floor() as u32).max(1)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WatchLevel::Passive => "PASSIVE",
            WatchLevel::Observant => "OBSERVANT",
            WatchLevel::Elevated => "ELEVATED",
            WatchLevel::Vigilant => "VIGILANT",
            WatchLevel::Sentinel => "SENTINEL",
        }
    }
}

impl std::fmt::Display for WatchLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WatchLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown watch level: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitivity_never_loosens() {
        for pair in WatchLevel::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
            assert!(pair[1].sensitivity_factor() <= pair[0].sensitivity_factor());
            for base in 1..=20 {
                assert!(pair[1].scale_threshold(base) <= pair[0].scale_threshold(base));
            }
        }
    }

    #[test]
    fn test_scaled_threshold_floor_of_one() {
        assert_eq!(WatchLevel::Passive.scale_threshold(5), 5);
        assert_eq!(WatchLevel::Sentinel.scale_threshold(5), 2);
        assert_eq!(WatchLevel::Sentinel.scale_threshold(1), 1);
        assert_eq!(WatchLevel::Vigilant.scale_threshold(0), 1);
    }

    #[test]
    fn test_ordinals_and_parsing() {
        assert_eq!(WatchLevel::from_ordinal(2), Some(WatchLevel::Elevated));
        assert_eq!(WatchLevel::from_ordinal(5), None);
        assert_eq!("vigilant".parse::<WatchLevel>(), Ok(WatchLevel::Vigilant));
        assert!("panic".parse::<WatchLevel>().is_err());
        assert_eq!(serde_json::to_value(WatchLevel::Sentinel).unwrap(), "SENTINEL");
    }
}
