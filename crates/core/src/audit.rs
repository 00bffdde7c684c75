//! Append-only audit log for security-relevant events.
//!
//! Every component appends here: logins, denials, revocations, and
//! system cleanup all leave an immutable record of who did what, from
//! where, and when. Events are deleted only in bulk — by the retention
//! sweep or an explicit purge.
//!
//! # Architecture
//!
//! The [`AuditSink`] trait enables different backends:
//!
//! - [`MemoryAuditSink`]: in-process append-only log, the authoritative sink for single-process
//!   deployments and tests.
//! - [`TracingAuditSink`]: decorator that mirrors every append to structured `tracing` events at
//!   INFO, suitable for log aggregation and SIEM forwarding, then delegates to an inner sink.
//!
//! Tokens are secrets and must never appear in audit details; events
//! reference identities and actions only.

use std::{fmt, net::IpAddr, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::{IdentityId, SudoResult};

/// Security-relevant action recorded in the audit log.
///
/// Closed enumeration; the `Display` form is the stable wire tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// A provisioned identity was explicitly revoked.
    SudoUserRevoked,
    /// A token was successfully redeemed for a session.
    SudoLoginSuccess,
    /// A redemption was denied because the source address did not match
    /// the grant's restriction.
    FailedLoginIpMismatch,
    /// The reaper deleted a provisioned identity at lease expiry.
    SystemUserCleanup,
    /// The audit log was purged manually.
    SystemLogPurge,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SudoUserRevoked => write!(f, "sudo_user_revoked"),
            Self::SudoLoginSuccess => write!(f, "sudo_login_success"),
            Self::FailedLoginIpMismatch => write!(f, "failed_login_ip_mismatch"),
            Self::SystemUserCleanup => write!(f, "system_user_cleanup"),
            Self::SystemLogPurge => write!(f, "system_log_purge"),
        }
    }
}

/// Immutable audit record.
///
/// Captures who performed an action (actor `0` = the system itself),
/// what happened, free-text detail, the source address when the event
/// was request-triggered, and when it occurred.
#[derive(Debug, Clone, bon::Builder)]
pub struct AuditEvent {
    /// When the event occurred (defaults to now).
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    /// The identity performing the action; [`IdentityId::SYSTEM`] for
    /// scheduled jobs.
    #[builder(default = IdentityId::SYSTEM)]
    pub actor: IdentityId,
    /// The action that was performed.
    pub action: AuditAction,
    /// Free-text detail. Must never contain a token.
    #[builder(into, default)]
    pub detail: String,
    /// Source address, for request-triggered events.
    pub source_address: Option<IpAddr>,
}

/// Append-only event sink consumed by all other components.
///
/// Implementations should be durable where possible. Appends must not
/// fail silently — delivery problems should surface through the
/// observability stack.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Records an audit event.
    async fn append(&self, event: AuditEvent) -> SudoResult<()>;

    /// Returns up to `limit` most recent events, newest first.
    async fn list_recent(&self, limit: usize) -> SudoResult<Vec<AuditEvent>>;

    /// Deletes events older than `days` days. Returns the number of
    /// events removed. Safe to call with zero matching rows.
    async fn delete_older_than(&self, days: u32) -> SudoResult<usize>;

    /// Deletes every event. Returns the number removed.
    async fn purge_all(&self) -> SudoResult<usize>;
}

#[async_trait]
impl<S: AuditSink + ?Sized> AuditSink for Arc<S> {
    async fn append(&self, event: AuditEvent) -> SudoResult<()> {
        (**self).append(event).await
    }

    async fn list_recent(&self, limit: usize) -> SudoResult<Vec<AuditEvent>> {
        (**self).list_recent(limit).await
    }

    async fn delete_older_than(&self, days: u32) -> SudoResult<usize> {
        (**self).delete_older_than(days).await
    }

    async fn purge_all(&self) -> SudoResult<usize> {
        (**self).purge_all().await
    }
}

/// In-process append-only audit log.
///
/// Events are held in insertion order under an [`RwLock`]. Cloning is
/// cheap and clones share the same log.
#[derive(Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    /// Creates a new, empty audit sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events currently retained.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Whether the log holds no events.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: AuditEvent) -> SudoResult<()> {
        self.events.write().push(event);
        Ok(())
    }

    async fn list_recent(&self, limit: usize) -> SudoResult<Vec<AuditEvent>> {
        let events = self.events.read();
        Ok(events.iter().rev().take(limit).cloned().collect())
    }

    async fn delete_older_than(&self, days: u32) -> SudoResult<usize> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(days));
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|event| event.created_at >= cutoff);
        Ok(before - events.len())
    }

    async fn purge_all(&self) -> SudoResult<usize> {
        let mut events = self.events.write();
        let removed = events.len();
        events.clear();
        Ok(removed)
    }
}

/// Decorator that mirrors every appended event to `tracing` at INFO.
///
/// Field mapping:
/// - `audit.created_at` — ISO 8601 timestamp
/// - `audit.actor` — acting identity id (0 = system)
/// - `audit.action` — stable action tag (e.g., "sudo_login_success")
/// - `audit.detail` — free-text detail
/// - `audit.source` — source address when present
pub struct TracingAuditSink<S> {
    inner: S,
}

impl<S: AuditSink> TracingAuditSink<S> {
    /// Wraps `inner`, mirroring appends to `tracing`.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Returns a reference to the inner sink.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait]
impl<S: AuditSink> AuditSink for TracingAuditSink<S> {
    async fn append(&self, event: AuditEvent) -> SudoResult<()> {
        tracing::info!(
            audit.created_at = %event.created_at.to_rfc3339(),
            audit.actor = %event.actor,
            audit.action = %event.action,
            audit.detail = %event.detail,
            audit.source = event.source_address.map(|ip| ip.to_string()).unwrap_or_default(),
            "audit_event"
        );
        self.inner.append(event).await
    }

    async fn list_recent(&self, limit: usize) -> SudoResult<Vec<AuditEvent>> {
        self.inner.list_recent(limit).await
    }

    async fn delete_older_than(&self, days: u32) -> SudoResult<usize> {
        self.inner.delete_older_than(days).await
    }

    async fn purge_all(&self) -> SudoResult<usize> {
        self.inner.purge_all().await
    }
}
