//! Deterministic exit codes for scripted operators.
//!
//! Codes are stable so wrapper scripts can branch on them:
//!
//! - **0**: success
//! - **10-19**: input validation and policy refusals
//! - **20-29**: delivery and backend faults

/// Exit code constants.
pub mod codes {
    /// Success.
    pub const SUCCESS: u8 = 0;

    /// Invalid or incomplete arguments.
    pub const VALIDATION_ERROR: u8 = 10;

    /// The referenced identity does not exist.
    pub const NOT_FOUND: u8 = 12;

    /// The operation was refused by policy (e.g. revoking an identity
    /// this system did not provision).
    pub const REFUSED: u8 = 13;

    /// The grant was created but the access email was not delivered.
    pub const DELIVERY_ERROR: u8 = 20;

    /// Fallback for unmapped errors.
    pub const GENERIC_ERROR: u8 = 25;
}

use sudogate_core::SudoError;

/// Maps a core error to its exit code.
pub fn code_for(error: &SudoError) -> u8 {
    match error {
        SudoError::MissingData(_) | SudoError::AlreadyExists(_) => codes::VALIDATION_ERROR,
        SudoError::NotFound(_) => codes::NOT_FOUND,
        SudoError::NotProvisioned { .. } => codes::REFUSED,
        SudoError::DeliveryFailure { .. } => codes::DELIVERY_ERROR,
        _ => codes::GENERIC_ERROR,
    }
}
