//! Login redemption state machine.
//!
//! Redemption is the request-time path: a presented token either opens a
//! session for the granted identity or is denied. The machine is
//! fail-closed at every step — an absent grant, an expired grant, a
//! source-address mismatch, or an identity that vanished between grant
//! and redemption all deny. Denials never reveal whether a token ever
//! existed.
//!
//! Grants are multi-use: a successful redemption leaves the grant in
//! place until it expires or is revoked.

use std::{net::IpAddr, sync::Arc};

use crate::{
    audit::{AuditAction, AuditEvent, AuditSink},
    directory::{Identity, IdentityDirectory},
    error::Denial,
    grants::GrantStore,
    SudoResult,
};

/// Result of a redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No token was presented; the request is not a redemption attempt
    /// and passes through untouched.
    NoAttempt,
    /// The token was rejected. [`Denial`] says why; the caller-facing
    /// message comes from its `Display`.
    Denied(Denial),
    /// The token was accepted; a session should be opened for this
    /// identity.
    Session(Identity),
}

/// Validates presented tokens and opens sessions.
#[derive(Clone)]
pub struct LoginRedeemer {
    grants: GrantStore,
    directory: Arc<dyn IdentityDirectory>,
    audit: Arc<dyn AuditSink>,
}

impl LoginRedeemer {
    /// Creates a redeemer over the grant store, directory, and audit log.
    pub fn new(
        grants: GrantStore,
        directory: Arc<dyn IdentityDirectory>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { grants, directory, audit }
    }

    /// Redeems a presented token.
    ///
    /// Outcomes, in evaluation order:
    ///
    /// 1. No token: [`Outcome::NoAttempt`].
    /// 2. Unknown or expired token: [`Denial::Expired`]. Not audited —
    ///    routine expiry probing would flood the log, and the uniform
    ///    response leaks nothing.
    /// 3. Source restriction violated: [`Denial::IpMismatch`], audited
    ///    as `failed_login_ip_mismatch` with both addresses.
    /// 4. Otherwise a session for the granted identity, audited as
    ///    `sudo_login_success`.
    ///
    /// Storage or directory faults propagate as errors; callers must
    /// treat an error as a denial (fail-closed).
    pub async fn redeem(&self, token: Option<&str>, source: IpAddr) -> SudoResult<Outcome> {
        let Some(token) = token else {
            return Ok(Outcome::NoAttempt);
        };

        let Some(grant) = self.grants.lookup(token).await? else {
            return Ok(Outcome::Denied(Denial::Expired));
        };

        if let Some(expected) = grant.restrict_ip {
            if expected != source {
                self.audit
                    .append(
                        AuditEvent::builder()
                            .actor(grant.identity)
                            .action(AuditAction::FailedLoginIpMismatch)
                            .detail(format!("expected {expected}, attempted from {source}"))
                            .source_address(source)
                            .build(),
                    )
                    .await?;
                return Ok(Outcome::Denied(Denial::IpMismatch { expected, actual: source }));
            }
        }

        // The grant may outlive its identity (manual directory edits);
        // deny rather than open a session for a ghost.
        let Some(identity) = self.directory.find_by_id(grant.identity).await? else {
            return Ok(Outcome::Denied(Denial::Expired));
        };

        self.audit
            .append(
                AuditEvent::builder()
                    .actor(identity.id)
                    .action(AuditAction::SudoLoginSuccess)
                    .detail(format!("session opened for '{}'", identity.name))
                    .source_address(source)
                    .build(),
            )
            .await?;

        Ok(Outcome::Session(identity))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use sudogate_storage::{KeyValueStore, MemoryStore};

    use super::*;
    use crate::{audit::MemoryAuditSink, directory::MemoryDirectory, grants::TokenIssuer};

    struct Fixture {
        redeemer: LoginRedeemer,
        issuer: TokenIssuer,
        directory: Arc<MemoryDirectory>,
        audit: Arc<MemoryAuditSink>,
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        let audit = Arc::new(MemoryAuditSink::new());
        let grants = GrantStore::new(store);
        let issuer = TokenIssuer::new(grants.clone(), directory.clone());
        let redeemer = LoginRedeemer::new(grants, directory.clone(), audit.clone());
        Fixture { redeemer, issuer, directory, audit }
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_no_token_passes_through() {
        let f = fixture();
        let outcome = f.redeemer.redeem(None, ip("10.0.0.1")).await.unwrap();
        assert_eq!(outcome, Outcome::NoAttempt);
        assert!(f.audit.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_token_denied_without_audit() {
        let f = fixture();
        let outcome = f.redeemer.redeem(Some("nope"), ip("10.0.0.1")).await.unwrap();
        assert_eq!(outcome, Outcome::Denied(Denial::Expired));
        assert!(f.audit.is_empty(), "expiry probes are not audited");
    }

    #[tokio::test]
    async fn test_valid_token_opens_session_and_stays_redeemable() {
        let f = fixture();
        let id = f.directory.create("alice", "a@x.com", "s").await.unwrap();
        let token = f.issuer.issue(id, Duration::from_secs(3600), None).await.unwrap();

        let outcome = f.redeemer.redeem(Some(&token), ip("10.0.0.1")).await.unwrap();
        let Outcome::Session(identity) = outcome else {
            panic!("expected session, got {outcome:?}");
        };
        assert_eq!(identity.id, id);

        // Multi-use: a second redemption also succeeds.
        let again = f.redeemer.redeem(Some(&token), ip("10.0.0.2")).await.unwrap();
        assert!(matches!(again, Outcome::Session(_)));

        let events = f.audit.list_recent(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.action == AuditAction::SudoLoginSuccess));
        assert!(events.iter().all(|e| !e.detail.contains(&token)));
    }

    #[tokio::test]
    async fn test_expired_token_denied_same_as_unknown() {
        let f = fixture();
        let id = f.directory.create("alice", "a@x.com", "s").await.unwrap();
        let token = f.issuer.issue(id, Duration::ZERO, None).await.unwrap();

        let outcome = f.redeemer.redeem(Some(&token), ip("10.0.0.1")).await.unwrap();
        assert_eq!(outcome, Outcome::Denied(Denial::Expired));
        assert!(f.audit.is_empty());
    }

    #[tokio::test]
    async fn test_ip_mismatch_denied_and_audited_once() {
        let f = fixture();
        let id = f.directory.create("alice", "a@x.com", "s").await.unwrap();
        let token =
            f.issuer.issue(id, Duration::from_secs(3600), Some(ip("192.0.2.1"))).await.unwrap();

        let outcome = f.redeemer.redeem(Some(&token), ip("198.51.100.9")).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Denied(Denial::IpMismatch {
                expected: ip("192.0.2.1"),
                actual: ip("198.51.100.9"),
            })
        );

        let events = f.audit.list_recent(10).await.unwrap();
        assert_eq!(events.len(), 1, "exactly one audit event per mismatch");
        assert_eq!(events[0].action, AuditAction::FailedLoginIpMismatch);
        assert_eq!(events[0].source_address, Some(ip("198.51.100.9")));
        assert!(!events[0].detail.contains(&token));

        // The matching address still redeems.
        let outcome = f.redeemer.redeem(Some(&token), ip("192.0.2.1")).await.unwrap();
        assert!(matches!(outcome, Outcome::Session(_)));
    }

    #[tokio::test]
    async fn test_grant_without_identity_denies() {
        let f = fixture();
        let id = f.directory.create("alice", "a@x.com", "s").await.unwrap();
        let token = f.issuer.issue(id, Duration::from_secs(3600), None).await.unwrap();
        f.directory.delete(id, sudogate_storage::IdentityId::from(1)).await.unwrap();

        let outcome = f.redeemer.redeem(Some(&token), ip("10.0.0.1")).await.unwrap();
        assert_eq!(outcome, Outcome::Denied(Denial::Expired));
    }
}
