//! Exit codes following sysexits.h conventions.
//!
//! These codes let scripts tell a missing input apart from a card that simply
//! was not recognized.

use cardsnake_core::CardError;

/// General error (catch-all).
pub const GENERAL_ERROR: i32 = 1;

/// Command line usage error (invalid arguments or configuration).
/// Maps to EX_USAGE from sysexits.h.
pub const USAGE_ERROR: i32 = 64;

/// No confident match.
/// Maps to EX_DATAERR from sysexits.h.
pub const NO_MATCH: i32 = 65;

/// Cannot open input file.
/// Maps to EX_NOINPUT from sysexits.h.
pub const INPUT_ERROR: i32 = 66;

/// I/O error (cannot write output file).
/// Maps to EX_IOERR from sysexits.h.
pub const IO_ERROR: i32 = 74;

/// Represents an exit code with optional error context.
pub struct ExitCode {
    pub code: i32,
    pub message: Option<String>,
}

impl ExitCode {
    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");

        let config_error = err
            .chain()
            .filter_map(|cause| cause.downcast_ref::<CardError>())
            .any(|cause| matches!(cause, CardError::ConfigError(_)));

        // Classify error by inspecting the chain
        let code = if config_error {
            USAGE_ERROR
        } else if message.contains("Failed to read") {
            INPUT_ERROR
        } else if message.contains("No match") || message.contains("Low confidence") {
            NO_MATCH
        } else if message.contains("Failed to write") || message.contains("Failed to save") {
            IO_ERROR
        } else {
            GENERAL_ERROR
        };

        Self::error(code, message)
    }
}
