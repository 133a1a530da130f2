//! Named, ordered sequences of directives

use crate::directive::{Directive, DirectiveOutcome};
use crate::error::CommandError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use warden_core_resilience::ErrorKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub name: String,
    pub steps: Vec<Directive>,
    /// Keep going after a failed step
    #[serde(default)]
    pub fault_tolerant: bool,
}

impl Workflow {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            fault_tolerant: false,
        }
    }

    pub fn step(mut self, directive: Directive) -> Self {
        self.steps.push(directive);
        self
    }

    pub fn fault_tolerant(mut self) -> Self {
        self.fault_tolerant = true;
        self
    }

    pub fn validate(&self) -> Result<(), CommandError> {
        if self.name.trim().is_empty() {
            return Err(CommandError::Validation("workflow name is empty".to_string()));
        }
        if self.steps.is_empty() {
            return Err(CommandError::Validation(format!(
                "workflow '{}' has no steps",
                self.name
            )));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if step.target.trim().is_empty() || step.command.trim().is_empty() {
                return Err(CommandError::Validation(format!(
                    "workflow '{}' step {} needs a target and a command",
                    self.name, index
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Ok { result: Value },
    Failed { error: String, kind: ErrorKind },
    /// Not run because an earlier step failed
    Skipped,
}

impl From<DirectiveOutcome> for StepOutcome {
    fn from(outcome: DirectiveOutcome) -> Self {
        match outcome {
            DirectiveOutcome::Ok { result } => StepOutcome::Ok { result },
            DirectiveOutcome::Failed { error, kind } => StepOutcome::Failed { error, kind },
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepReceipt {
    pub index: usize,
    pub target: String,
    pub command: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReceipt {
    pub workflow: String,
    pub fault_tolerant: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub steps: Vec<StepReceipt>,
}

impl WorkflowReceipt {
    /// Every step ran and succeeded
    pub fn success(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.outcome, StepOutcome::Ok { .. }))
    }

    pub fn skipped(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Skipped))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed { .. }))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        assert!(Workflow::new("").step(Directive::new("a", "b")).validate().is_err());
        assert!(Workflow::new("empty").validate().is_err());
        assert!(Workflow::new("bad").step(Directive::new("", "b")).validate().is_err());
        assert!(Workflow::new("ok").step(Directive::new("a", "b")).validate().is_ok());
    }

    #[test]
    fn test_parse_from_toml_shape() {
        let workflow: Workflow = serde_json::from_value(serde_json::json!({
            "name": "seal",
            "steps": [{"target": "vault", "command": "seal"}]
        }))
        .unwrap();
        assert!(!workflow.fault_tolerant);
        assert_eq!(workflow.steps[0].command, "seal");
    }
}
