//! # sudogate core
//!
//! Short-lived, auditable administrative access without long-term
//! credentials. An operator requests temporary elevated access for a
//! named identity; sudogate resolves or provisions the identity, issues
//! a single time-bounded bearer token (optionally bound to a source
//! address), delivers it out-of-band, and autonomously revokes the
//! access — deleting any identity it created — at expiry.
//!
//! This crate is the token lifecycle and access-control state machine:
//!
//! - **[`provisioner`]**: resolves or creates the target identity and marks provisioned identities
//!   as reclaimable
//! - **[`grants`]**: mints tokens, persists grants with store-level TTL, links the active token to
//!   its identity
//! - **[`redeemer`]**: the request-time state machine — validate, authorize (IP check),
//!   authenticate, log
//! - **[`reaper`]**: scheduled jobs guaranteeing eventual revocation of every provisioned identity
//!   and pruning of stale audit records
//! - **[`scheduler`]**: crash-recoverable one-shot and recurring job execution over the key-value
//!   store
//!
//! Collaborators (identity directory, audit sink, mail sender) are
//! narrow capability traits wired explicitly at startup; request context
//! (source address, acting identity) is threaded through every call
//! rather than pulled from ambient state.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use sudogate_core::{
//!     audit::MemoryAuditSink, config::SudoConfig, directory::MemoryDirectory,
//!     mail::MemoryMailSender, service::SudoService,
//! };
//! use sudogate_storage::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = SudoService::builder()
//!     .store(Arc::new(MemoryStore::new()))
//!     .directory(Arc::new(MemoryDirectory::new()))
//!     .audit(Arc::new(MemoryAuditSink::new()))
//!     .mail(Arc::new(MemoryMailSender::new()))
//!     .config(SudoConfig::default())
//!     .build();
//! service.start().await?;
//!
//! let outcome = service
//!     .create_access("support_user", "support@agency.com", "administrator", Duration::from_secs(3600), None)
//!     .await?;
//! println!("link: {}", outcome.link);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Append-only audit event sink and actions.
pub mod audit;
/// Runtime configuration record.
pub mod config;
/// Identity directory collaborator.
pub mod directory;
/// Core error and denial types.
pub mod error;
/// Grant records, token issuance, and the grant store.
pub mod grants;
/// Outbound mail delivery collaborator.
pub mod mail;
/// Identity provisioning.
pub mod provisioner;
/// Lease reaper jobs: identity reclamation and audit retention.
pub mod reaper;
/// Login redemption state machine.
pub mod redeemer;
/// Explicit operator-triggered revocation.
pub mod revoke;
/// Persistent job scheduling.
pub mod scheduler;
/// Wiring and operator-facing operations.
pub mod service;

pub use audit::{AuditAction, AuditEvent, AuditSink};
pub use config::{RetentionPolicy, SudoConfig};
pub use directory::{Identity, IdentityDirectory};
pub use error::{Denial, SudoError, SudoResult};
pub use grants::{Grant, GrantStore, TokenIssuer};
pub use mail::MailSender;
pub use redeemer::{LoginRedeemer, Outcome};
pub use service::{AccessGrant, IdentityView, SudoService};
pub use sudogate_storage::IdentityId;
