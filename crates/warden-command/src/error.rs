//! Error types for the warden-command crate

use crate::state::SystemState;
use std::time::Duration;
use thiserror::Error;
use warden_bus::BusError;
use warden_core_resilience::{Classify, ErrorKind};

#[derive(Error, Debug, Clone)]
pub enum CommandError {
    #[error("Invalid directive: {0}")]
    Validation(String),

    #[error("module not found: {0}")]
    ModuleNotFound(String),

    #[error("Module already registered: {0}")]
    ModuleExists(String),

    #[error("Module '{module}' does not support command '{command}'")]
    UnsupportedCommand { module: String, command: String },

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: SystemState, to: SystemState },

    #[error("Circuit open for module '{module}', retry in {retry_in:?}")]
    CircuitOpen { module: String, retry_in: Duration },

    #[error("Command center is dormant")]
    Dormant,

    #[error("System in lockdown, '{command}' is not an essential command")]
    Lockdown { command: String },

    #[error("Module '{module}' failed on '{command}': {message}")]
    Handler {
        module: String,
        command: String,
        message: String,
    },

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),
}

impl CommandError {
    /// True for rejections that never reached a module
    pub fn is_rejection(&self) -> bool {
        !matches!(self, CommandError::Handler { .. })
    }
}

impl Classify for CommandError {
    fn kind(&self) -> ErrorKind {
        match self {
            CommandError::Validation(_)
            | CommandError::ModuleExists(_)
            | CommandError::UnsupportedCommand { .. }
            | CommandError::WorkflowNotFound(_)
            | CommandError::InvalidTransition { .. } => ErrorKind::Validation,
            CommandError::ModuleNotFound(_)
            | CommandError::CircuitOpen { .. }
            | CommandError::Dormant
            | CommandError::Lockdown { .. } => ErrorKind::Unavailable,
            CommandError::Handler { .. } => ErrorKind::Handler,
            CommandError::Bus(e) => e.kind(),
        }
    }
}
