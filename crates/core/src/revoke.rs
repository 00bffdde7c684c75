//! Explicit operator-triggered revocation.
//!
//! Revocation deletes a provisioned identity ahead of its lease expiry,
//! removes its active grant, and leaves an audit record naming the
//! acting operator. Identities this system did not create are refused:
//! sudogate never deletes what it does not own.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    audit::{AuditAction, AuditEvent, AuditSink},
    config::SudoConfig,
    directory::IdentityDirectory,
    grants::GrantStore,
    IdentityId, SudoError, SudoResult,
};

/// Revokes provisioned identities on operator request.
#[derive(Clone)]
pub struct Revoker {
    directory: Arc<dyn IdentityDirectory>,
    grants: GrantStore,
    audit: Arc<dyn AuditSink>,
    config: Arc<RwLock<SudoConfig>>,
}

impl Revoker {
    /// Creates a revoker over the directory, grant store, and audit log.
    pub fn new(
        directory: Arc<dyn IdentityDirectory>,
        grants: GrantStore,
        audit: Arc<dyn AuditSink>,
        config: Arc<RwLock<SudoConfig>>,
    ) -> Self {
        Self { directory, grants, audit, config }
    }

    /// Revokes `id` on behalf of `actor`.
    ///
    /// Removes the identity's active grant, deletes the identity with
    /// its content reassigned to the fallback owner, and audits
    /// `sudo_user_revoked`.
    ///
    /// # Errors
    ///
    /// - [`SudoError::NotFound`] when no such identity exists.
    /// - [`SudoError::NotProvisioned`] when the identity was not created
    ///   by this system.
    pub async fn revoke(&self, id: IdentityId, actor: IdentityId) -> SudoResult<()> {
        let identity = self
            .directory
            .find_by_id(id)
            .await?
            .ok_or_else(|| SudoError::NotFound(format!("identity {id}")))?;

        if !identity.provisioned {
            return Err(SudoError::NotProvisioned { id });
        }

        if let Some(token) = &identity.active_token {
            self.grants.remove(token).await?;
        }

        let fallback = self.config.read().fallback_owner;
        self.directory.delete(id, fallback).await?;

        self.audit
            .append(
                AuditEvent::builder()
                    .actor(actor)
                    .action(AuditAction::SudoUserRevoked)
                    .detail(format!("identity '{}' revoked", identity.name))
                    .build(),
            )
            .await?;

        tracing::info!(identity = %id, name = %identity.name, %actor, "revoked identity");
        Ok(())
    }
}
