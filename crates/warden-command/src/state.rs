//! Process-wide system state
//!
//! ```text
//!  DORMANT ──initialize──> READY ──activate──> ACTIVE
//!     │                      ▲                   │
//!     └───── lockdown ───────┼─── lockdown ──────┘
//!                 │          │
//!                 ▼          │
//!              LOCKDOWN ──lift_lockdown
//! ```
//!
//! LOCKDOWN is reachable from every state and only left through an explicit lift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemState {
    #[default]
    Dormant,
    Ready,
    Active,
    Lockdown,
}

impl SystemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemState::Dormant => "DORMANT",
            SystemState::Ready => "READY",
            SystemState::Active => "ACTIVE",
            SystemState::Lockdown => "LOCKDOWN",
        }
    }

    /// Whether the ordinary lifecycle allows `self -> next`
    pub fn can_transition_to(self, next: SystemState) -> bool {
        matches!(
            (self, next),
            (SystemState::Dormant, SystemState::Ready)
                | (SystemState::Ready, SystemState::Active)
                | (SystemState::Lockdown, SystemState::Ready)
                | (SystemState::Dormant | SystemState::Ready | SystemState::Active, SystemState::Lockdown)
        )
    }
}

impl std::fmt::Display for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current state plus how it was reached
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state: SystemState,
    pub since: DateTime<Utc>,
    pub lockdown_reason: Option<String>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            state: SystemState::Dormant,
            since: Utc::now(),
            lockdown_reason: None,
        }
    }
}

impl StateSnapshot {
    pub(crate) fn enter(&mut self, state: SystemState) -> SystemState {
        let previous = self.state;
        self.state = state;
        self.since = Utc::now();
        if state != SystemState::Lockdown {
            self.lockdown_reason = None;
        }
        previous
    }
}
