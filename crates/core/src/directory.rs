//! Identity directory collaborator.
//!
//! The directory is the user store sudogate provisions into and reclaims
//! from. It is deliberately narrow: lookups, creation, role assignment,
//! the active-token back-reference, and deletion with content
//! reassignment. Anything richer (profiles, permissions, sessions)
//! belongs to the host system, not here.
//!
//! # Ownership
//!
//! The provisioner owns identity writes; the reaper and explicit
//! revocation own deletion. Identities with `provisioned == false` were
//! not created by sudogate and must never be deleted through it.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::{IdentityId, SudoError, SudoResult};

/// An account in the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Directory-assigned identifier.
    pub id: IdentityId,
    /// Unique login name.
    pub name: String,
    /// Unique email address.
    pub email: String,
    /// Role tag (e.g., "administrator").
    pub role: String,
    /// True when sudogate created this identity, making it reclaimable.
    pub provisioned: bool,
    /// Most-recently-issued token for this identity.
    ///
    /// Display-only cache: the referenced grant may have expired, in
    /// which case the link is stale and is lazily cleared on next read.
    /// Never used for authorization decisions.
    pub active_token: Option<String>,
}

/// Narrow capability interface over the host's user store.
///
/// Implementations must provide atomic read/check/write per identity;
/// no application-level locking is layered on top.
#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Looks up an identity by exact name.
    async fn find_by_name(&self, name: &str) -> SudoResult<Option<Identity>>;

    /// Looks up an identity by exact email.
    async fn find_by_email(&self, email: &str) -> SudoResult<Option<Identity>>;

    /// Looks up an identity by id.
    async fn find_by_id(&self, id: IdentityId) -> SudoResult<Option<Identity>>;

    /// Whether an identity with this exact name exists.
    async fn exists(&self, name: &str) -> SudoResult<bool>;

    /// Creates a new identity with the given credential.
    ///
    /// The credential is write-only: it is stored for the host system's
    /// benefit and never read back, transmitted, or logged by sudogate.
    ///
    /// # Errors
    ///
    /// [`SudoError::AlreadyExists`] if the name or email is taken.
    async fn create(&self, name: &str, email: &str, credential: &str) -> SudoResult<IdentityId>;

    /// Assigns a role to an identity.
    async fn set_role(&self, id: IdentityId, role: &str) -> SudoResult<()>;

    /// Flags an identity as provisioned by sudogate (reclaimable).
    async fn mark_provisioned(&self, id: IdentityId) -> SudoResult<()>;

    /// Updates the active-token back-reference.
    async fn set_active_token(&self, id: IdentityId, token: Option<String>) -> SudoResult<()>;

    /// Deletes an identity, reassigning any content it owns to
    /// `reassign_to`.
    ///
    /// Returns `Ok(true)` when an identity was deleted and `Ok(false)`
    /// when no such identity existed — deletion is idempotent so the
    /// reaper can safely race manual revocation.
    async fn delete(&self, id: IdentityId, reassign_to: IdentityId) -> SudoResult<bool>;

    /// Lists every identity with the provisioned flag set.
    async fn list_provisioned(&self) -> SudoResult<Vec<Identity>>;
}

#[derive(Default)]
struct DirectoryInner {
    next_id: i64,
    by_id: HashMap<IdentityId, Identity>,
    /// Credentials are held write-only, keyed by identity.
    credentials: HashMap<IdentityId, String>,
}

/// In-memory identity directory.
///
/// Cloning is cheap; clones share the same records.
#[derive(Clone, Default)]
pub struct MemoryDirectory {
    inner: Arc<RwLock<DirectoryInner>>,
}

impl MemoryDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdentityDirectory for MemoryDirectory {
    async fn find_by_name(&self, name: &str) -> SudoResult<Option<Identity>> {
        let inner = self.inner.read();
        Ok(inner.by_id.values().find(|identity| identity.name == name).cloned())
    }

    async fn find_by_email(&self, email: &str) -> SudoResult<Option<Identity>> {
        let inner = self.inner.read();
        Ok(inner.by_id.values().find(|identity| identity.email == email).cloned())
    }

    async fn find_by_id(&self, id: IdentityId) -> SudoResult<Option<Identity>> {
        let inner = self.inner.read();
        Ok(inner.by_id.get(&id).cloned())
    }

    async fn exists(&self, name: &str) -> SudoResult<bool> {
        let inner = self.inner.read();
        Ok(inner.by_id.values().any(|identity| identity.name == name))
    }

    async fn create(&self, name: &str, email: &str, credential: &str) -> SudoResult<IdentityId> {
        let mut inner = self.inner.write();

        if inner.by_id.values().any(|identity| identity.name == name) {
            return Err(SudoError::AlreadyExists(format!("name '{name}' is taken")));
        }
        if inner.by_id.values().any(|identity| identity.email == email) {
            return Err(SudoError::AlreadyExists(format!("email '{email}' is taken")));
        }

        inner.next_id += 1;
        let id = IdentityId::from(inner.next_id);
        inner.by_id.insert(
            id,
            Identity {
                id,
                name: name.to_owned(),
                email: email.to_owned(),
                role: String::new(),
                provisioned: false,
                active_token: None,
            },
        );
        inner.credentials.insert(id, credential.to_owned());

        Ok(id)
    }

    async fn set_role(&self, id: IdentityId, role: &str) -> SudoResult<()> {
        let mut inner = self.inner.write();
        let identity = inner
            .by_id
            .get_mut(&id)
            .ok_or_else(|| SudoError::NotFound(format!("identity {id}")))?;
        identity.role = role.to_owned();
        Ok(())
    }

    async fn mark_provisioned(&self, id: IdentityId) -> SudoResult<()> {
        let mut inner = self.inner.write();
        let identity = inner
            .by_id
            .get_mut(&id)
            .ok_or_else(|| SudoError::NotFound(format!("identity {id}")))?;
        identity.provisioned = true;
        Ok(())
    }

    async fn set_active_token(&self, id: IdentityId, token: Option<String>) -> SudoResult<()> {
        let mut inner = self.inner.write();
        let identity = inner
            .by_id
            .get_mut(&id)
            .ok_or_else(|| SudoError::NotFound(format!("identity {id}")))?;
        identity.active_token = token;
        Ok(())
    }

    async fn delete(&self, id: IdentityId, _reassign_to: IdentityId) -> SudoResult<bool> {
        let mut inner = self.inner.write();
        inner.credentials.remove(&id);
        // The in-memory directory holds no owned content to reassign;
        // host-backed implementations move content to `reassign_to`.
        Ok(inner.by_id.remove(&id).is_some())
    }

    async fn list_provisioned(&self) -> SudoResult<Vec<Identity>> {
        let inner = self.inner.read();
        let mut identities: Vec<Identity> =
            inner.by_id.values().filter(|identity| identity.provisioned).cloned().collect();
        identities.sort_by_key(|identity| identity.id);
        Ok(identities)
    }
}
