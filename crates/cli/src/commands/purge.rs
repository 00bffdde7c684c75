//! `sudogate purge` — revoke everything and drop the audit log.

use sudogate_core::{IdentityId, SudoService};

use crate::exit_codes::{code_for, codes};

/// Arguments for `sudogate purge`.
#[derive(Debug, clap::Args)]
pub struct PurgeArgs {
    /// Confirm the purge. Without this flag nothing is deleted.
    #[arg(long)]
    pub yes: bool,
    /// Acting operator's identity id, recorded in the audit log.
    #[arg(long, default_value_t = 1)]
    pub actor: i64,
}

/// Revoke every provisioned identity and purge the audit log.
pub async fn run(service: &SudoService, args: &PurgeArgs) -> u8 {
    if !args.yes {
        eprintln!("refusing to purge without --yes");
        eprintln!("this revokes every provisioned identity and drops the audit log");
        return codes::VALIDATION_ERROR;
    }

    match service.purge(IdentityId::from(args.actor)).await {
        Ok((revoked, purged)) => {
            println!("revoked {revoked} identities, purged {purged} audit events");
            codes::SUCCESS
        }
        Err(error) => {
            eprintln!("ERROR: {error}");
            code_for(&error)
        }
    }
}
