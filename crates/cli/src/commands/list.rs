//! `sudogate list` — every provisioned identity with its live link.

use sudogate_core::SudoService;

use crate::{
    commands::{render_view, view_to_json},
    exit_codes::{code_for, codes},
};

/// Arguments for `sudogate list`.
#[derive(Debug, clap::Args)]
pub struct ListArgs {
    /// Output machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

/// List provisioned identities.
pub async fn run(service: &SudoService, args: &ListArgs) -> u8 {
    let views = match service.list().await {
        Ok(views) => views,
        Err(error) => {
            eprintln!("ERROR: {error}");
            return code_for(&error);
        }
    };

    if args.json {
        let value: Vec<_> = views.iter().map(view_to_json).collect();
        match serde_json::to_string_pretty(&value) {
            Ok(json) => println!("{json}"),
            Err(error) => {
                eprintln!("ERROR: cannot serialize result: {error}");
                return codes::GENERIC_ERROR;
            }
        }
        return codes::SUCCESS;
    }

    if views.is_empty() {
        println!("no provisioned identities");
        return codes::SUCCESS;
    }

    for view in &views {
        println!("{}", render_view(view));
    }
    codes::SUCCESS
}
