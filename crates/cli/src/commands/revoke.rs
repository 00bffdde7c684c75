//! `sudogate revoke` — delete a provisioned identity ahead of expiry.

use sudogate_core::{IdentityId, SudoService};

use crate::exit_codes::{code_for, codes};

/// Arguments for `sudogate revoke`.
#[derive(Debug, clap::Args)]
pub struct RevokeArgs {
    /// Name or email of the identity to revoke.
    pub query: String,
    /// Acting operator's identity id, recorded in the audit log.
    #[arg(long, default_value_t = 1)]
    pub actor: i64,
}

/// Revoke one provisioned identity.
pub async fn run(service: &SudoService, args: &RevokeArgs) -> u8 {
    let identity = match service.find(&args.query).await {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            eprintln!("ERROR: no identity matches '{}'", args.query);
            return codes::NOT_FOUND;
        }
        Err(error) => {
            eprintln!("ERROR: {error}");
            return code_for(&error);
        }
    };

    if let Err(error) = service.revoke(identity.id, IdentityId::from(args.actor)).await {
        eprintln!("ERROR: {error}");
        return code_for(&error);
    }

    println!("revoked '{}' ({})", identity.name, identity.id);
    codes::SUCCESS
}
