//! `sudogate create` — provision an identity and issue an access link.

use std::{net::IpAddr, time::Duration};

use sudogate_core::SudoService;

use crate::exit_codes::{code_for, codes};

/// Arguments for `sudogate create`.
#[derive(Debug, clap::Args)]
pub struct CreateArgs {
    /// Login name of the identity to grant access to.
    pub name: String,
    /// Email address; required when the identity does not exist yet.
    #[arg(long, default_value = "")]
    pub email: String,
    /// Role assigned to a newly created identity.
    #[arg(long, default_value = "administrator")]
    pub role: String,
    /// Grant lifetime in hours (defaults to the configured TTL).
    #[arg(long)]
    pub expiry_hours: Option<u64>,
    /// Restrict redemption to this source address.
    #[arg(long)]
    pub ip: Option<IpAddr>,
    /// Output machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

/// Provision (or resolve) the identity, issue a token, email the link.
pub async fn run(service: &SudoService, args: &CreateArgs) -> u8 {
    let ttl = match args.expiry_hours {
        Some(hours) => Duration::from_secs(hours * 3600),
        None => service.config().default_ttl,
    };

    let grant = match service
        .create_access(&args.name, &args.email, &args.role, ttl, args.ip)
        .await
    {
        Ok(grant) => grant,
        Err(error) => {
            eprintln!("ERROR: {error}");
            return code_for(&error);
        }
    };

    if args.json {
        let value = serde_json::json!({
            "identity": grant.identity.id,
            "name": grant.identity.name,
            "created": grant.created,
            "link": grant.link,
            "mail_error": grant.mail_error,
        });
        match serde_json::to_string_pretty(&value) {
            Ok(json) => println!("{json}"),
            Err(error) => {
                eprintln!("ERROR: cannot serialize result: {error}");
                return codes::GENERIC_ERROR;
            }
        }
    } else {
        if grant.created {
            println!("created identity '{}' ({})", grant.identity.name, grant.identity.id);
        } else {
            println!("using existing identity '{}' ({})", grant.identity.name, grant.identity.id);
        }
        println!("access link: {}", grant.link);
    }

    if let Some(error) = &grant.mail_error {
        eprintln!("WARNING: access email not delivered: {error}");
        eprintln!("the link above is still valid; deliver it out-of-band");
        return codes::DELIVERY_ERROR;
    }

    codes::SUCCESS
}
