//! Core error and denial types.
//!
//! Two distinct vocabularies live here:
//!
//! - [`SudoError`] — faults surfaced to the operator (incomplete input, missing identities,
//!   refused revocations, storage failures, mail delivery failures).
//! - [`Denial`] — *expected* negative outcomes of token redemption. A denial is not an error: the
//!   redeemer returns it inside `Ok(Outcome::Denied(_))` because an expired probe is routine
//!   traffic, not a fault in this process.

use thiserror::Error;

use crate::IdentityId;

/// Result type alias for core operations.
pub type SudoResult<T> = std::result::Result<T, SudoError>;

/// Faults surfaced by provisioning, issuance, revocation, and
/// collaborator calls.
///
/// # Non-exhaustive
///
/// This enum is marked `#[non_exhaustive]` — new variants may be added
/// in future minor releases without a semver-breaking change. Downstream
/// match expressions must include a wildcard arm (`_ =>`).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SudoError {
    /// Provisioning input was incomplete: creating a new identity
    /// requires both a name and an email.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// Identity lookup failed.
    #[error("Identity not found: {0}")]
    NotFound(String),

    /// Revocation was attempted on an identity this system did not
    /// create. Refused for safety — sudogate never deletes identities
    /// it does not own.
    #[error("Identity {id} was not provisioned by this system")]
    NotProvisioned {
        /// The identity the caller tried to revoke.
        id: IdentityId,
    },

    /// A directory uniqueness constraint was violated.
    #[error("Identity already exists: {0}")]
    AlreadyExists(String),

    /// Outbound mail could not be delivered.
    ///
    /// Reported, never rolled back: the identity and grant created
    /// before the send remain valid so the operator can retransmit the
    /// link out-of-band.
    #[error("Mail delivery failed: {message}")]
    DeliveryFailure {
        /// Description of the delivery failure.
        message: String,
        /// The underlying transport error, when available.
        #[source]
        source: Option<sudogate_storage::BoxError>,
    },

    /// A scheduled job carried a payload the handler cannot interpret.
    #[error("Invalid job payload: {0}")]
    InvalidJobPayload(String),

    /// Storage backend error.
    ///
    /// Wraps the original [`StorageError`] to preserve the full error
    /// source chain for debugging and structured logging.
    ///
    /// [`StorageError`]: sudogate_storage::StorageError
    #[error("Storage error: {0}")]
    Storage(
        /// The underlying storage error.
        #[from]
        #[source]
        sudogate_storage::StorageError,
    ),
}

impl SudoError {
    /// Creates a new `DeliveryFailure` with the given message.
    #[must_use]
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::DeliveryFailure { message: message.into(), source: None }
    }

    /// Creates a new `DeliveryFailure` with a message and source error.
    #[must_use]
    pub fn delivery_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::DeliveryFailure { message: message.into(), source: Some(std::sync::Arc::new(source)) }
    }
}

/// Expected negative outcomes of token redemption.
///
/// Every denial is fail-closed: whenever a check cannot be evaluated,
/// the redeemer denies rather than allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// The token is expired or was never valid.
    ///
    /// Deliberately a single variant: the response must not reveal
    /// whether the token ever existed. Not audited — routine expiry
    /// probing would flood the log.
    Expired,

    /// The grant restricts the source address and the caller's address
    /// does not match. Always audited.
    IpMismatch {
        /// The address the grant is restricted to.
        expected: std::net::IpAddr,
        /// The address the redemption attempt came from.
        actual: std::net::IpAddr,
    },
}

impl std::fmt::Display for Denial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expired => write!(f, "this access link has expired or is invalid"),
            Self::IpMismatch { .. } => write!(f, "source address mismatch"),
        }
    }
}
