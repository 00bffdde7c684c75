//! Identity provisioning.
//!
//! Resolves the target of an access request to an existing identity, or
//! creates one when none matches. Created identities are the only ones
//! this system will ever delete: they carry the `provisioned` flag and a
//! one-shot reclamation job scheduled at lease expiry, so every
//! provisioned identity is eventually reclaimed even if the process
//! crashes in between.

use std::{sync::Arc, time::Duration};

use chrono::Utc;

use crate::{
    directory::{Identity, IdentityDirectory},
    grants::generate_token,
    reaper::{self, RECLAIM_JOB},
    scheduler::Scheduler,
    SudoError, SudoResult,
};

/// Resolves or creates the identity an access request targets.
#[derive(Clone)]
pub struct IdentityProvisioner {
    directory: Arc<dyn IdentityDirectory>,
    scheduler: Arc<dyn Scheduler>,
}

impl IdentityProvisioner {
    /// Creates a provisioner over the directory and scheduler.
    pub fn new(directory: Arc<dyn IdentityDirectory>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { directory, scheduler }
    }

    /// Resolves `name`/`email` to an identity, creating one if needed.
    ///
    /// Lookup order is name first, then email, skipping empty inputs. A
    /// found identity is returned unchanged: no role change, no
    /// reclamation job, `was_created == false`. Granting access to an
    /// existing identity must never mutate it.
    ///
    /// Creation requires both a name and an email
    /// ([`SudoError::MissingData`] otherwise). The new identity gets a
    /// high-entropy credential that is never logged or transmitted, the
    /// requested role, the `provisioned` flag, and a reclamation job due
    /// at now + `grant_ttl`.
    pub async fn resolve_or_create(
        &self,
        name: &str,
        email: &str,
        role: &str,
        grant_ttl: Duration,
    ) -> SudoResult<(Identity, bool)> {
        if !name.is_empty() {
            if let Some(identity) = self.directory.find_by_name(name).await? {
                return Ok((identity, false));
            }
        }
        if !email.is_empty() {
            if let Some(identity) = self.directory.find_by_email(email).await? {
                return Ok((identity, false));
            }
        }

        if name.is_empty() || email.is_empty() {
            return Err(SudoError::MissingData(
                "to create a new identity, both name and email are required".into(),
            ));
        }

        // A different identity may own this name (the lookups above only
        // ran against non-empty inputs in order). Disambiguate instead
        // of failing: the caller asked for access, not for a name.
        let name = if self.directory.exists(name).await? {
            format!("{name}_{}", Utc::now().timestamp())
        } else {
            name.to_owned()
        };

        let credential = generate_token();
        let id = self.directory.create(&name, email, &credential).await?;
        self.directory.set_role(id, role).await?;
        self.directory.mark_provisioned(id).await?;

        let due = chrono::Duration::from_std(grant_ttl)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(chrono::DateTime::<Utc>::MAX_UTC);
        self.scheduler.schedule_once(due, RECLAIM_JOB, reaper::reclaim_payload(id)).await?;

        tracing::info!(identity = %id, %name, "provisioned identity");

        let identity = self
            .directory
            .find_by_id(id)
            .await?
            .ok_or_else(|| SudoError::NotFound(format!("identity {id} vanished after create")))?;
        Ok((identity, true))
    }
}
