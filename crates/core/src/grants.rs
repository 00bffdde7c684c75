//! Grant records, token issuance, and the grant store.
//!
//! A grant is the unit of temporary authorization: an opaque 256-bit
//! bearer token mapped to an identity, an absolute expiry, and an
//! optional source-address restriction. Grants live in the expiring
//! key-value store under `grant/{token}`, so expiry is enforced twice:
//! by the store's own TTL (even if the reaper never runs, the store
//! will not return an expired grant) and by the `expires_at` timestamp
//! checked at redemption.
//!
//! Tokens are secrets. They are returned to the caller for out-of-band
//! delivery and referenced by the active-token-link, but never written
//! to the audit log.

use std::{net::IpAddr, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use sudogate_storage::{prefix_range, KeyValueStore, StorageError};

use crate::{
    directory::{Identity, IdentityDirectory},
    IdentityId, SudoResult,
};

/// Storage key prefix for grant records.
pub const GRANT_PREFIX: &str = "grant/";

/// Token length in bytes before hex encoding (256 bits of entropy).
const TOKEN_BYTES: usize = 32;

/// A token-bound, time-limited authorization record.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Grant {
    /// The identity this grant authorizes.
    pub identity: IdentityId,
    /// Absolute expiry; the grant is valid iff `now < expires_at`.
    pub expires_at: DateTime<Utc>,
    /// Optional source-address restriction (absent = unrestricted).
    pub restrict_ip: Option<IpAddr>,
}

/// Generates a fresh bearer token: 32 bytes from the OS CSPRNG,
/// hex-encoded for safe transport in a URL.
///
/// With 256 bits of entropy no uniqueness check is needed; the store's
/// insert-if-absent still rejects the astronomically unlikely collision.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn grant_key(token: &str) -> Vec<u8> {
    let mut key = GRANT_PREFIX.as_bytes().to_vec();
    key.extend_from_slice(token.as_bytes());
    key
}

/// Repository for grant records over the expiring key-value store.
#[derive(Clone)]
pub struct GrantStore {
    store: Arc<dyn KeyValueStore>,
}

impl GrantStore {
    /// Creates a grant store over the given backend.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Persists a grant keyed by `token`, expiring after `ttl`.
    ///
    /// Uses insert-if-absent so an accidental token collision is
    /// rejected rather than overwriting an active grant.
    pub async fn insert(&self, token: &str, grant: &Grant, ttl: Duration) -> SudoResult<()> {
        let value = serde_json::to_vec(grant)
            .map_err(|e| StorageError::serialization_with_source("encoding grant", e))?;
        self.store.insert_with_ttl(grant_key(token), value, ttl).await?;
        Ok(())
    }

    /// Looks up a grant by token.
    ///
    /// Returns `None` when the token is unknown, store-expired, or past
    /// its own `expires_at` (second layer on top of the store TTL).
    pub async fn lookup(&self, token: &str) -> SudoResult<Option<Grant>> {
        let Some(bytes) = self.store.get(&grant_key(token)).await? else {
            return Ok(None);
        };

        let grant: Grant = serde_json::from_slice(&bytes)
            .map_err(|e| StorageError::serialization_with_source("decoding grant", e))?;

        if Utc::now() >= grant.expires_at {
            return Ok(None);
        }

        Ok(Some(grant))
    }

    /// Removes a single grant. No-op if the token is unknown.
    pub async fn remove(&self, token: &str) -> SudoResult<()> {
        self.store.delete(&grant_key(token)).await?;
        Ok(())
    }

    /// Removes every grant record.
    pub async fn purge_all(&self) -> SudoResult<()> {
        self.store.clear_range(prefix_range(GRANT_PREFIX.as_bytes())).await?;
        Ok(())
    }
}

/// Mints tokens, writes grants, and maintains the active-token-link.
#[derive(Clone)]
pub struct TokenIssuer {
    grants: GrantStore,
    directory: Arc<dyn IdentityDirectory>,
}

impl TokenIssuer {
    /// Creates an issuer over the grant store and directory.
    pub fn new(grants: GrantStore, directory: Arc<dyn IdentityDirectory>) -> Self {
        Self { grants, directory }
    }

    /// Issues a new token for `identity_id`, valid for `ttl`.
    ///
    /// The active-token-link on the identity is overwritten; a prior
    /// grant, if still unexpired, remains independently valid until its
    /// own expiry (deliberate multi-active-grant allowance).
    pub async fn issue(
        &self,
        identity_id: IdentityId,
        ttl: Duration,
        restrict_ip: Option<IpAddr>,
    ) -> SudoResult<String> {
        let token = generate_token();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let grant = Grant { identity: identity_id, expires_at, restrict_ip };

        self.grants.insert(&token, &grant, ttl).await?;
        self.directory.set_active_token(identity_id, Some(token.clone())).await?;

        tracing::debug!(identity = %identity_id, ttl_secs = ttl.as_secs(), "issued grant");
        Ok(token)
    }

    /// Returns the identity's active access link, lazily clearing the
    /// back-reference when the underlying grant has expired.
    pub async fn active_link(
        &self,
        identity: &Identity,
        base_url: &str,
    ) -> SudoResult<Option<String>> {
        let Some(token) = identity.active_token.as_deref() else {
            return Ok(None);
        };

        if self.grants.lookup(token).await?.is_none() {
            // Stale cache entry: the grant is gone, clear the link.
            self.directory.set_active_token(identity.id, None).await?;
            return Ok(None);
        }

        Ok(Some(access_link(base_url, token)))
    }

    /// Access to the underlying grant store.
    pub fn grants(&self) -> &GrantStore {
        &self.grants
    }
}

/// Builds the redeemable URL for a token.
pub fn access_link(base_url: &str, token: &str) -> String {
    let separator = if base_url.contains('?') { '&' } else { '?' };
    format!("{base_url}{separator}sudo_token={token}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use sudogate_storage::MemoryStore;

    use super::*;
    use crate::directory::MemoryDirectory;

    fn issuer_fixture() -> (TokenIssuer, Arc<MemoryDirectory>) {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let directory = Arc::new(MemoryDirectory::new());
        let issuer = TokenIssuer::new(GrantStore::new(store), directory.clone());
        (issuer, directory)
    }

    #[test]
    fn test_generated_tokens_are_unique_and_hex() {
        let mut seen = HashSet::new();
        for _ in 0..64 {
            let token = generate_token();
            assert_eq!(token.len(), 64, "32 bytes hex-encode to 64 chars");
            assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
            assert!(seen.insert(token), "tokens must not repeat");
        }
    }

    #[test]
    fn test_access_link_formats() {
        assert_eq!(access_link("https://x.com", "abc"), "https://x.com?sudo_token=abc");
        assert_eq!(access_link("https://x.com?p=1", "abc"), "https://x.com?p=1&sudo_token=abc");
    }

    #[tokio::test]
    async fn test_issue_and_lookup() {
        let (issuer, directory) = issuer_fixture();
        let id = directory.create("alice", "alice@x.com", "s").await.unwrap();

        let token = issuer.issue(id, Duration::from_secs(3600), None).await.unwrap();

        let grant = issuer.grants().lookup(&token).await.unwrap().unwrap();
        assert_eq!(grant.identity, id);
        assert_eq!(grant.restrict_ip, None);
        assert!(grant.expires_at > Utc::now());

        // Link back-reference updated.
        let identity = directory.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(identity.active_token.as_deref(), Some(token.as_str()));
    }

    #[tokio::test]
    async fn test_lookup_expired_grant_returns_none() {
        let (issuer, directory) = issuer_fixture();
        let id = directory.create("alice", "alice@x.com", "s").await.unwrap();

        let token = issuer.issue(id, Duration::ZERO, None).await.unwrap();
        assert!(issuer.grants().lookup(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prior_grant_stays_valid_after_reissue() {
        let (issuer, directory) = issuer_fixture();
        let id = directory.create("alice", "alice@x.com", "s").await.unwrap();

        let first = issuer.issue(id, Duration::from_secs(3600), None).await.unwrap();
        let second = issuer.issue(id, Duration::from_secs(3600), None).await.unwrap();

        // Both grants remain redeemable; only the newest is linked.
        assert!(issuer.grants().lookup(&first).await.unwrap().is_some());
        assert!(issuer.grants().lookup(&second).await.unwrap().is_some());

        let identity = directory.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(identity.active_token.as_deref(), Some(second.as_str()));
    }

    #[tokio::test]
    async fn test_active_link_lazily_clears_stale_reference() {
        let (issuer, directory) = issuer_fixture();
        let id = directory.create("alice", "alice@x.com", "s").await.unwrap();

        let token = issuer.issue(id, Duration::from_secs(3600), None).await.unwrap();
        let identity = directory.find_by_id(id).await.unwrap().unwrap();

        let link = issuer.active_link(&identity, "https://x.com").await.unwrap().unwrap();
        assert!(link.contains(&token));

        // Grant removed out from under the link.
        issuer.grants().remove(&token).await.unwrap();
        let identity = directory.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(issuer.active_link(&identity, "https://x.com").await.unwrap(), None);

        // The stale back-reference was cleared.
        let identity = directory.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(identity.active_token, None);
    }

    #[tokio::test]
    async fn test_purge_all_removes_grants() {
        let (issuer, directory) = issuer_fixture();
        let id = directory.create("alice", "alice@x.com", "s").await.unwrap();

        let token = issuer.issue(id, Duration::from_secs(3600), None).await.unwrap();
        issuer.grants().purge_all().await.unwrap();

        assert!(issuer.grants().lookup(&token).await.unwrap().is_none());
    }
}
