/*!
 * Error types for the Warden control plane
 */

use thiserror::Error;
use warden_bus::BusError;
use warden_command::CommandError;
use warden_core_resilience::{Classify, ErrorKind};

pub type Result<T> = std::result::Result<T, WardenError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FATAL: i32 = 2;
pub const EXIT_CONFIG: i32 = 3;

#[derive(Debug, Error)]
pub enum WardenError {
    /// Configuration failed validation
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Bus(#[from] BusError),
}

impl WardenError {
    /// Process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            WardenError::Config(_) | WardenError::Toml(_) => EXIT_CONFIG,
            _ => EXIT_FATAL,
        }
    }
}

impl Classify for WardenError {
    fn kind(&self) -> ErrorKind {
        match self {
            WardenError::Config(_) | WardenError::Toml(_) => ErrorKind::Validation,
            WardenError::Io(_) => ErrorKind::Unavailable,
            WardenError::Command(e) => e.kind(),
            WardenError::Bus(e) => e.kind(),
        }
    }
}
