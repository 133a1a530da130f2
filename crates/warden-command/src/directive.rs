//! Directives, broadcasts and their reports

use crate::error::CommandError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use warden_core_resilience::{Classify, ErrorKind};

/// Priority used when a directive does not name one
pub const DEFAULT_DIRECTIVE_PRIORITY: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectiveOptions {
    /// 0 is most urgent
    pub priority: u8,
}

impl Default for DirectiveOptions {
    fn default() -> Self {
        Self {
            priority: DEFAULT_DIRECTIVE_PRIORITY,
        }
    }
}

impl DirectiveOptions {
    pub fn with_priority(priority: u8) -> Self {
        Self { priority }
    }
}

/// A command addressed to one module
///
/// Also the payload format of bus-carried directives on `command.directive`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub target: String,
    pub command: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default = "default_priority")]
    pub priority: u8,
}

fn default_priority() -> u8 {
    DEFAULT_DIRECTIVE_PRIORITY
}

impl Directive {
    pub fn new(target: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            command: command.into(),
            payload: Value::Null,
            priority: DEFAULT_DIRECTIVE_PRIORITY,
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    pub fn options(&self) -> DirectiveOptions {
        DirectiveOptions::with_priority(self.priority)
    }
}

/// Result of one directive inside a broadcast or workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DirectiveOutcome {
    Ok { result: Value },
    Failed { error: String, kind: ErrorKind },
}

impl DirectiveOutcome {
    pub fn is_ok(&self) -> bool {
        matches!(self, DirectiveOutcome::Ok { .. })
    }
}

impl From<Result<Value, CommandError>> for DirectiveOutcome {
    fn from(result: Result<Value, CommandError>) -> Self {
        match result {
            Ok(result) => DirectiveOutcome::Ok { result },
            Err(e) => DirectiveOutcome::Failed {
                kind: e.kind(),
                error: e.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BroadcastReport {
    pub command: String,
    /// Keyed by module name
    pub outcomes: BTreeMap<String, DirectiveOutcome>,
}

impl BroadcastReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn outcome(&self, module: &str) -> Option<&DirectiveOutcome> {
        self.outcomes.get(module)
    }
}
