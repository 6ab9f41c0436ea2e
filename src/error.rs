//! Structured error handling and exit codes.

use serde::Serialize;

use crate::actions::TransferError;
use crate::config::ConfigError;
use crate::duplicates::FinderError;
use crate::scanner::FilelistError;

/// Exit codes for the copyall binary.
///
/// - 0: Success
/// - 1: General error (unexpected failure)
/// - 2: Invalid configuration (rejected before any I/O)
/// - 3: Partial success (some files failed)
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Every file was handled.
    Success = 0,
    /// An unexpected error occurred.
    GeneralError = 1,
    /// Inputs were rejected before touching the filesystem.
    InvalidConfiguration = 2,
    /// The run completed but some files failed.
    PartialSuccess = 3,
    /// The run was interrupted by the user.
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "CA000",
            Self::GeneralError => "CA001",
            Self::InvalidConfiguration => "CA002",
            Self::PartialSuccess => "CA003",
            Self::Interrupted => "CA130",
        }
    }

    /// Exit code for a run-stopping error.
    #[must_use]
    pub fn for_error(err: &anyhow::Error) -> Self {
        if let Some(e) = err.downcast_ref::<TransferError>() {
            return match e {
                TransferError::Interrupted => Self::Interrupted,
                e if e.is_configuration() => Self::InvalidConfiguration,
                _ => Self::GeneralError,
            };
        }
        if let Some(FinderError::Interrupted) = err.downcast_ref::<FinderError>() {
            return Self::Interrupted;
        }
        if err.downcast_ref::<FilelistError>().is_some() || err.downcast_ref::<ConfigError>().is_some()
        {
            return Self::InvalidConfiguration;
        }
        Self::GeneralError
    }
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "CA001")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
