//! Lease reaper jobs: identity reclamation and audit retention.
//!
//! Two handlers run under the scheduler:
//!
//! - [`ReclaimHandler`] fires once per provisioned identity, at lease expiry. It re-checks the
//!   `provisioned` flag at fire time so an identity promoted to permanent status outside this
//!   system is left alone, then deletes the identity and audits `system_user_cleanup`.
//! - [`RetentionHandler`] runs daily and prunes audit events older than the configured retention
//!   window.
//!
//! Both are idempotent: reclaiming an already-deleted identity is a
//! no-op with no duplicate audit event, and a second retention pass over
//! the same window deletes nothing.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{
    audit::{AuditAction, AuditEvent, AuditSink},
    config::SudoConfig,
    directory::IdentityDirectory,
    grants::GrantStore,
    scheduler::JobHandler,
    IdentityId, SudoError, SudoResult,
};

/// Job name for one-shot identity reclamation.
pub const RECLAIM_JOB: &str = "reclaim_identity";

/// Job name for the recurring audit retention sweep.
pub const RETENTION_JOB: &str = "audit_retention";

#[derive(Serialize, Deserialize)]
struct ReclaimPayload {
    identity: IdentityId,
}

/// Builds the payload for a reclamation job targeting `id`.
pub fn reclaim_payload(id: IdentityId) -> serde_json::Value {
    serde_json::json!({ "identity": id })
}

/// Deletes a provisioned identity when its lease expires.
pub struct ReclaimHandler {
    directory: Arc<dyn IdentityDirectory>,
    grants: GrantStore,
    audit: Arc<dyn AuditSink>,
    config: Arc<RwLock<SudoConfig>>,
}

impl ReclaimHandler {
    /// Creates the reclamation handler.
    pub fn new(
        directory: Arc<dyn IdentityDirectory>,
        grants: GrantStore,
        audit: Arc<dyn AuditSink>,
        config: Arc<RwLock<SudoConfig>>,
    ) -> Self {
        Self { directory, grants, audit, config }
    }
}

#[async_trait]
impl JobHandler for ReclaimHandler {
    async fn run(&self, payload: serde_json::Value) -> SudoResult<()> {
        let payload: ReclaimPayload = serde_json::from_value(payload)
            .map_err(|e| SudoError::InvalidJobPayload(e.to_string()))?;
        let id = payload.identity;

        let Some(identity) = self.directory.find_by_id(id).await? else {
            // Already revoked manually; nothing to do, nothing to log.
            return Ok(());
        };

        // Flag drift: the identity was promoted outside this system
        // since the job was scheduled. It is no longer ours to delete.
        if !identity.provisioned {
            tracing::info!(identity = %id, "skipping reclamation of unprovisioned identity");
            return Ok(());
        }

        if let Some(token) = &identity.active_token {
            self.grants.remove(token).await?;
        }

        let fallback = self.config.read().fallback_owner;
        if !self.directory.delete(id, fallback).await? {
            return Ok(());
        }

        self.audit
            .append(
                AuditEvent::builder()
                    .action(AuditAction::SystemUserCleanup)
                    .detail(format!("identity '{}' removed at lease expiry", identity.name))
                    .build(),
            )
            .await?;

        tracing::info!(identity = %id, name = %identity.name, "reclaimed expired identity");
        Ok(())
    }
}

/// Prunes audit events older than the configured retention window.
pub struct RetentionHandler {
    audit: Arc<dyn AuditSink>,
    config: Arc<RwLock<SudoConfig>>,
}

impl RetentionHandler {
    /// Creates the retention handler.
    pub fn new(audit: Arc<dyn AuditSink>, config: Arc<RwLock<SudoConfig>>) -> Self {
        Self { audit, config }
    }
}

#[async_trait]
impl JobHandler for RetentionHandler {
    async fn run(&self, _payload: serde_json::Value) -> SudoResult<()> {
        let days = self.config.read().retention.days();
        let Some(days) = days else {
            return Ok(());
        };

        let removed = self.audit.delete_older_than(days).await?;
        if removed > 0 {
            tracing::info!(removed, days, "pruned audit events past retention");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use sudogate_storage::{KeyValueStore, MemoryStore};

    use super::*;
    use crate::{
        audit::MemoryAuditSink,
        config::RetentionPolicy,
        directory::MemoryDirectory,
        grants::TokenIssuer,
    };

    struct Fixture {
        handler: ReclaimHandler,
        directory: Arc<MemoryDirectory>,
        audit: Arc<MemoryAuditSink>,
        issuer: TokenIssuer,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let config = Arc::new(RwLock::new(SudoConfig::default()));
        let grants = GrantStore::new(store);
        let issuer = TokenIssuer::new(grants.clone(), directory.clone());
        let handler = ReclaimHandler::new(directory.clone(), grants, audit.clone(), config);
        Fixture { handler, directory, audit, issuer }
    }

    #[tokio::test]
    async fn test_reclaims_provisioned_identity() {
        let f = fixture();
        let id = f.directory.create("temp", "t@x.com", "s").await.unwrap();
        f.directory.mark_provisioned(id).await.unwrap();
        let token =
            f.issuer.issue(id, std::time::Duration::from_secs(3600), None).await.unwrap();

        f.handler.run(reclaim_payload(id)).await.unwrap();

        assert!(f.directory.find_by_id(id).await.unwrap().is_none());
        assert!(f.issuer.grants().lookup(&token).await.unwrap().is_none(), "grant removed");
        let events = f.audit.list_recent(10).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::SystemUserCleanup);
        assert_eq!(events[0].actor, IdentityId::SYSTEM);
        assert!(!events[0].detail.contains(&token), "token must never reach the audit log");
    }

    #[tokio::test]
    async fn test_reclaim_is_idempotent() {
        let f = fixture();
        let id = f.directory.create("temp", "t@x.com", "s").await.unwrap();
        f.directory.mark_provisioned(id).await.unwrap();

        f.handler.run(reclaim_payload(id)).await.unwrap();
        f.handler.run(reclaim_payload(id)).await.unwrap();

        assert_eq!(f.audit.len(), 1, "second run must not emit a duplicate event");
    }

    #[tokio::test]
    async fn test_reclaim_skips_unprovisioned_identity() {
        let f = fixture();
        let id = f.directory.create("promoted", "p@x.com", "s").await.unwrap();
        // Never marked provisioned: simulates promotion to permanent.

        f.handler.run(reclaim_payload(id)).await.unwrap();

        assert!(f.directory.find_by_id(id).await.unwrap().is_some(), "identity left alone");
        assert!(f.audit.is_empty());
    }

    #[tokio::test]
    async fn test_reclaim_rejects_bad_payload() {
        let f = fixture();
        let err = f.handler.run(serde_json::json!({"who": "?"})).await.unwrap_err();
        assert!(matches!(err, SudoError::InvalidJobPayload(_)));
    }

    #[tokio::test]
    async fn test_retention_sweep_twice_deletes_once() {
        let audit = Arc::new(MemoryAuditSink::new());
        let config = Arc::new(RwLock::new(SudoConfig {
            retention: RetentionPolicy::Weekly,
            ..SudoConfig::default()
        }));
        let handler = RetentionHandler::new(audit.clone(), config);

        audit
            .append(
                AuditEvent::builder()
                    .created_at(Utc::now() - chrono::Duration::days(10))
                    .action(AuditAction::SudoLoginSuccess)
                    .build(),
            )
            .await
            .unwrap();
        audit
            .append(AuditEvent::builder().action(AuditAction::SudoLoginSuccess).build())
            .await
            .unwrap();

        handler.run(serde_json::Value::Null).await.unwrap();
        assert_eq!(audit.len(), 1);

        handler.run(serde_json::Value::Null).await.unwrap();
        assert_eq!(audit.len(), 1, "immediate second sweep deletes nothing");
    }

    #[tokio::test]
    async fn test_retention_never_keeps_everything() {
        let audit = Arc::new(MemoryAuditSink::new());
        let config = Arc::new(RwLock::new(SudoConfig::default()));
        let handler = RetentionHandler::new(audit.clone(), config);

        audit
            .append(
                AuditEvent::builder()
                    .created_at(Utc::now() - chrono::Duration::days(365))
                    .action(AuditAction::SudoLoginSuccess)
                    .build(),
            )
            .await
            .unwrap();

        handler.run(serde_json::Value::Null).await.unwrap();
        assert_eq!(audit.len(), 1);
    }
}
