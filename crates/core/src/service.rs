//! Wiring and operator-facing operations.
//!
//! [`SudoService`] composes the provisioner, issuer, redeemer, revoker,
//! and scheduler over the injected collaborators and exposes the
//! operations the operator surface maps onto: create access, list,
//! info, revoke, redeem, configuration, purge, and teardown.

use std::{net::IpAddr, sync::Arc, time::Duration};

use parking_lot::RwLock;
use sudogate_storage::KeyValueStore;

use crate::{
    audit::{AuditAction, AuditEvent, AuditSink},
    config::SudoConfig,
    directory::{Identity, IdentityDirectory},
    grants::{access_link, GrantStore, TokenIssuer},
    mail::{compose_access_email, MailSender},
    provisioner::IdentityProvisioner,
    reaper::{ReclaimHandler, RetentionHandler, RECLAIM_JOB, RETENTION_JOB},
    redeemer::{LoginRedeemer, Outcome},
    revoke::Revoker,
    scheduler::{Scheduler, StoreScheduler},
    IdentityId, SudoError, SudoResult,
};

/// Storage key holding the persisted configuration.
const CONFIG_KEY: &[u8] = b"config";

/// Result of a create-access request.
#[derive(Debug, Clone)]
pub struct AccessGrant {
    /// The identity access was granted to.
    pub identity: Identity,
    /// The redeemable link (contains the token).
    pub link: String,
    /// Whether the identity was created by this request.
    pub created: bool,
    /// Set when the access email could not be delivered. The grant is
    /// valid regardless; the operator retransmits the link out-of-band.
    pub mail_error: Option<String>,
}

/// An identity with its live access link, for list/info views.
#[derive(Debug, Clone)]
pub struct IdentityView {
    /// The identity record.
    pub identity: Identity,
    /// The active access link, when an unexpired grant exists.
    pub link: Option<String>,
}

/// The assembled temporary-access service.
pub struct SudoService {
    store: Arc<dyn KeyValueStore>,
    directory: Arc<dyn IdentityDirectory>,
    audit: Arc<dyn AuditSink>,
    mail: Arc<dyn MailSender>,
    config: Arc<RwLock<SudoConfig>>,
    issuer: TokenIssuer,
    redeemer: LoginRedeemer,
    provisioner: IdentityProvisioner,
    revoker: Revoker,
    scheduler: StoreScheduler,
}

#[bon::bon]
impl SudoService {
    /// Wires the service together. Background jobs do not run until
    /// [`start`](Self::start) is called.
    #[builder]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        directory: Arc<dyn IdentityDirectory>,
        audit: Arc<dyn AuditSink>,
        mail: Arc<dyn MailSender>,
        #[builder(default)] config: SudoConfig,
    ) -> Self {
        let config = Arc::new(RwLock::new(config));
        let grants = GrantStore::new(store.clone());
        let issuer = TokenIssuer::new(grants.clone(), directory.clone());
        let redeemer = LoginRedeemer::new(grants.clone(), directory.clone(), audit.clone());
        let revoker = Revoker::new(directory.clone(), grants.clone(), audit.clone(), config.clone());

        let scheduler = StoreScheduler::new(store.clone());
        scheduler.register(
            RECLAIM_JOB,
            Arc::new(ReclaimHandler::new(
                directory.clone(),
                grants,
                audit.clone(),
                config.clone(),
            )),
        );
        scheduler
            .register(RETENTION_JOB, Arc::new(RetentionHandler::new(audit.clone(), config.clone())));

        let provisioner = IdentityProvisioner::new(
            directory.clone(),
            Arc::new(scheduler.clone()) as Arc<dyn Scheduler>,
        );

        Self {
            store,
            directory,
            audit,
            mail,
            config,
            issuer,
            redeemer,
            provisioner,
            revoker,
            scheduler,
        }
    }
}

impl SudoService {
    /// Starts the background tick loop and registers the daily retention
    /// sweep. Idempotent.
    pub async fn start(&self) -> SudoResult<()> {
        self.scheduler.schedule_recurring(Duration::from_secs(24 * 3600), RETENTION_JOB).await?;
        self.scheduler.start();
        Ok(())
    }

    /// Stops background processing.
    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Provisions (or resolves) the identity, issues a token, and emails
    /// the access link.
    ///
    /// A delivery failure is reported in the returned record, never
    /// rolled back: the link is still returned for out-of-band delivery.
    pub async fn create_access(
        &self,
        name: &str,
        email: &str,
        role: &str,
        ttl: Duration,
        restrict_ip: Option<IpAddr>,
    ) -> SudoResult<AccessGrant> {
        let (identity, created) =
            self.provisioner.resolve_or_create(name, email, role, ttl).await?;

        let token = self.issuer.issue(identity.id, ttl, restrict_ip).await?;
        let link = access_link(&self.config.read().base_url, &token);

        let (subject, body) = compose_access_email(&identity.name, &link, ttl);
        let mail_error = match self.mail.send(&identity.email, &subject, &body).await {
            Ok(()) => None,
            Err(error) => {
                tracing::warn!(identity = %identity.id, %error, "access email not delivered");
                Some(error.to_string())
            }
        };

        // Re-read so the returned record carries the fresh token link.
        let identity = self
            .directory
            .find_by_id(identity.id)
            .await?
            .ok_or_else(|| SudoError::NotFound(format!("identity {} vanished", identity.id)))?;

        Ok(AccessGrant { identity, link, created, mail_error })
    }

    /// Redeems a presented token. See [`LoginRedeemer::redeem`].
    pub async fn redeem(&self, token: Option<&str>, source: IpAddr) -> SudoResult<Outcome> {
        self.redeemer.redeem(token, source).await
    }

    /// Resolves a name-or-email query to an identity.
    pub async fn find(&self, query: &str) -> SudoResult<Option<Identity>> {
        if let Some(identity) = self.directory.find_by_name(query).await? {
            return Ok(Some(identity));
        }
        self.directory.find_by_email(query).await
    }

    /// Lists every provisioned identity with its live link.
    pub async fn list(&self) -> SudoResult<Vec<IdentityView>> {
        let base_url = self.config.read().base_url.clone();
        let mut views = Vec::new();
        for identity in self.directory.list_provisioned().await? {
            let link = self.issuer.active_link(&identity, &base_url).await?;
            views.push(IdentityView { identity, link });
        }
        Ok(views)
    }

    /// Looks up one identity by name or email, with its live link.
    pub async fn info(&self, query: &str) -> SudoResult<Option<IdentityView>> {
        let Some(identity) = self.find(query).await? else {
            return Ok(None);
        };
        let base_url = self.config.read().base_url.clone();
        let link = self.issuer.active_link(&identity, &base_url).await?;
        Ok(Some(IdentityView { identity, link }))
    }

    /// Revokes a provisioned identity. See [`Revoker::revoke`].
    pub async fn revoke(&self, id: IdentityId, actor: IdentityId) -> SudoResult<()> {
        self.revoker.revoke(id, actor).await
    }

    /// Snapshot of the current configuration.
    pub fn config(&self) -> SudoConfig {
        self.config.read().clone()
    }

    /// Replaces the configuration and persists it in the store.
    pub async fn set_config(&self, config: SudoConfig) -> SudoResult<()> {
        let value = serde_json::to_vec(&config).map_err(|e| {
            sudogate_storage::StorageError::serialization_with_source("encoding config", e)
        })?;
        self.store.set(CONFIG_KEY.to_vec(), value).await?;
        *self.config.write() = config;
        Ok(())
    }

    /// Applies `f` to a copy of the configuration, then persists it.
    pub async fn update_config(&self, f: impl FnOnce(&mut SudoConfig)) -> SudoResult<SudoConfig> {
        let mut config = self.config();
        f(&mut config);
        self.set_config(config.clone()).await?;
        Ok(config)
    }

    /// Loads the persisted configuration, if any, replacing the current
    /// one. Returns the effective configuration.
    pub async fn load_config(&self) -> SudoResult<SudoConfig> {
        if let Some(bytes) = self.store.get(CONFIG_KEY).await? {
            let config: SudoConfig = serde_json::from_slice(&bytes).map_err(|e| {
                sudogate_storage::StorageError::serialization_with_source("decoding config", e)
            })?;
            *self.config.write() = config;
        }
        Ok(self.config())
    }

    /// Revokes every provisioned identity and purges the audit log.
    ///
    /// Returns (identities revoked, audit events purged). The purge
    /// itself is recorded as a fresh `system_log_purge` event so the log
    /// never silently loses history.
    pub async fn purge(&self, actor: IdentityId) -> SudoResult<(usize, usize)> {
        let identities = self.directory.list_provisioned().await?;
        let revoked = identities.len();
        for identity in identities {
            self.revoker.revoke(identity.id, actor).await?;
        }

        self.issuer.grants().purge_all().await?;
        let purged = self.audit.purge_all().await?;

        self.audit
            .append(
                AuditEvent::builder()
                    .actor(actor)
                    .action(AuditAction::SystemLogPurge)
                    .detail(format!("manual purge: {revoked} identities, {purged} events"))
                    .build(),
            )
            .await?;

        Ok((revoked, purged))
    }

    /// Uninstall-style cleanup: deletes every provisioned identity,
    /// removes all grants, cancels scheduled work, and, when
    /// `delete_data_on_uninstall` is set, drops the audit log.
    pub async fn teardown(&self) -> SudoResult<()> {
        let (fallback, delete_data) = {
            let config = self.config.read();
            (config.fallback_owner, config.delete_data_on_uninstall)
        };

        for identity in self.directory.list_provisioned().await? {
            self.directory.delete(identity.id, fallback).await?;
        }
        self.issuer.grants().purge_all().await?;

        self.scheduler.cancel(RECLAIM_JOB).await?;
        self.scheduler.cancel(RETENTION_JOB).await?;
        self.scheduler.shutdown();

        if delete_data {
            self.audit.purge_all().await?;
        }
        Ok(())
    }

    /// The underlying scheduler, for deterministic ticking in tests and
    /// embedders that drive their own loop.
    pub fn scheduler(&self) -> &StoreScheduler {
        &self.scheduler
    }

    /// The audit sink.
    pub fn audit(&self) -> &Arc<dyn AuditSink> {
        &self.audit
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sudogate_storage::MemoryStore;

    use super::*;
    use crate::{
        audit::MemoryAuditSink, config::RetentionPolicy, directory::MemoryDirectory,
        mail::MemoryMailSender,
    };

    struct Fixture {
        service: SudoService,
        directory: Arc<MemoryDirectory>,
        mail: Arc<MemoryMailSender>,
        audit: Arc<MemoryAuditSink>,
        store: Arc<MemoryStore>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let mail = Arc::new(MemoryMailSender::new());
        let service = SudoService::builder()
            .store(store.clone() as Arc<dyn KeyValueStore>)
            .directory(directory.clone() as Arc<dyn IdentityDirectory>)
            .audit(audit.clone() as Arc<dyn AuditSink>)
            .mail(mail.clone() as Arc<dyn MailSender>)
            .build();
        Fixture { service, directory, mail, audit, store }
    }

    const TTL: Duration = Duration::from_secs(3600);

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_create_access_provisions_and_emails() {
        let f = fixture();

        let grant = f.service.create_access("alice", "alice@x.com", "editor", TTL, None)
            .await
            .unwrap();

        assert!(grant.created);
        assert!(grant.mail_error.is_none());
        assert_eq!(grant.identity.name, "alice");
        assert!(grant.link.contains("sudo_token="));

        let sent = f.mail.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "alice@x.com");
        assert!(sent[0].body.contains(&grant.link));
    }

    #[tokio::test]
    async fn test_mail_failure_leaves_grant_redeemable() {
        let f = fixture();
        f.mail.fail_sends(true);

        let grant = f.service.create_access("alice", "alice@x.com", "editor", TTL, None)
            .await
            .unwrap();
        assert!(grant.mail_error.is_some());

        let token = grant.link.split("sudo_token=").nth(1).unwrap();
        let outcome = f.service.redeem(Some(token), ip("10.0.0.1")).await.unwrap();
        assert!(matches!(outcome, Outcome::Session(_)));
    }

    #[tokio::test]
    async fn test_list_and_info_show_live_links() {
        let f = fixture();
        f.service.create_access("alice", "alice@x.com", "editor", TTL, None).await.unwrap();

        let views = f.service.list().await.unwrap();
        assert_eq!(views.len(), 1);
        assert!(views[0].link.is_some());

        let view = f.service.info("alice@x.com").await.unwrap().unwrap();
        assert_eq!(view.identity.name, "alice");
        assert!(view.link.is_some());

        assert!(f.service.info("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoke_refuses_preexisting_identity() {
        let f = fixture();
        let id = f.directory.create("owner", "o@x.com", "s").await.unwrap();

        let err = f.service.revoke(id, IdentityId::from(1)).await.unwrap_err();
        assert!(matches!(err, SudoError::NotProvisioned { .. }));
    }

    #[tokio::test]
    async fn test_config_persists_across_service_instances() {
        let f = fixture();
        f.service
            .update_config(|c| {
                c.retention = RetentionPolicy::Weekly;
                c.delete_data_on_uninstall = true;
            })
            .await
            .unwrap();

        let directory = Arc::new(MemoryDirectory::new());
        let second = SudoService::builder()
            .store(f.store.clone() as Arc<dyn KeyValueStore>)
            .directory(directory as Arc<dyn IdentityDirectory>)
            .audit(Arc::new(MemoryAuditSink::new()) as Arc<dyn AuditSink>)
            .mail(Arc::new(MemoryMailSender::new()) as Arc<dyn MailSender>)
            .build();

        let config = second.load_config().await.unwrap();
        assert_eq!(config.retention, RetentionPolicy::Weekly);
        assert!(config.delete_data_on_uninstall);
    }

    #[tokio::test]
    async fn test_purge_revokes_all_and_records_itself() {
        let f = fixture();
        f.service.create_access("a", "a@x.com", "editor", TTL, None).await.unwrap();
        f.service.create_access("b", "b@x.com", "editor", TTL, None).await.unwrap();

        let (revoked, _) = f.service.purge(IdentityId::from(1)).await.unwrap();
        assert_eq!(revoked, 2);

        assert!(f.service.list().await.unwrap().is_empty());
        let events = f.audit.list_recent(10).await.unwrap();
        assert_eq!(events.len(), 1, "only the purge record survives");
        assert_eq!(events[0].action, AuditAction::SystemLogPurge);
    }

    #[tokio::test]
    async fn test_teardown_honors_delete_data_flag() {
        let f = fixture();
        let grant = f.service.create_access("a", "a@x.com", "editor", TTL, None).await.unwrap();
        let token = grant.link.split("sudo_token=").nth(1).unwrap();
        f.service.redeem(Some(token), ip("10.0.0.1")).await.unwrap();

        // Default config keeps the log.
        f.service.teardown().await.unwrap();
        assert!(f.directory.list_provisioned().await.unwrap().is_empty());
        assert!(f.service.scheduler().pending_once().await.unwrap() == 0);
        assert!(!f.audit.is_empty(), "log kept when delete_data_on_uninstall is false");
    }

    #[tokio::test]
    async fn test_reclamation_fires_through_scheduler() {
        let f = fixture();
        let grant =
            f.service.create_access("temp", "t@x.com", "editor", Duration::ZERO, None)
                .await
                .unwrap();
        let id = grant.identity.id;

        // The lease is already due; one tick reclaims it.
        f.service.scheduler().run_pending().await.unwrap();

        assert!(f.directory.find_by_id(id).await.unwrap().is_none());
        let events = f.audit.list_recent(10).await.unwrap();
        assert!(events.iter().any(|e| e.action == AuditAction::SystemUserCleanup));
    }
}
