//! `sudogate info` — one identity by name or email.

use sudogate_core::SudoService;

use crate::{
    commands::{render_view, view_to_json},
    exit_codes::{code_for, codes},
};

/// Arguments for `sudogate info`.
#[derive(Debug, clap::Args)]
pub struct InfoArgs {
    /// Name or email of the identity.
    pub query: String,
    /// Output machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

/// Show one identity with its live link.
pub async fn run(service: &SudoService, args: &InfoArgs) -> u8 {
    let view = match service.info(&args.query).await {
        Ok(Some(view)) => view,
        Ok(None) => {
            eprintln!("ERROR: no identity matches '{}'", args.query);
            return codes::NOT_FOUND;
        }
        Err(error) => {
            eprintln!("ERROR: {error}");
            return code_for(&error);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&view_to_json(&view)) {
            Ok(json) => println!("{json}"),
            Err(error) => {
                eprintln!("ERROR: cannot serialize result: {error}");
                return codes::GENERIC_ERROR;
            }
        }
    } else {
        println!("{}", render_view(&view));
    }
    codes::SUCCESS
}
