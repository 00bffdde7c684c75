//! `sudogate config` — read or update persisted settings.

use sudogate_core::{RetentionPolicy, SudoService};

use crate::exit_codes::{code_for, codes};

/// Arguments for `sudogate config`.
#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    /// Setting to change: `retention`, `delete_data`, or `base_url`.
    /// Omit to print the current configuration.
    pub key: Option<String>,
    /// New value for the setting.
    pub value: Option<String>,
}

/// Show or update configuration.
pub async fn run(service: &SudoService, args: &ConfigArgs) -> u8 {
    let Some(key) = &args.key else {
        return print_config(service);
    };
    let Some(value) = &args.value else {
        eprintln!("ERROR: a value is required to set '{key}'");
        return codes::VALIDATION_ERROR;
    };

    let result = match key.as_str() {
        "retention" => match value.parse::<RetentionPolicy>() {
            Ok(policy) => service.update_config(|c| c.retention = policy).await,
            Err(error) => {
                eprintln!("ERROR: {error}");
                return codes::VALIDATION_ERROR;
            }
        },
        "delete_data" => match value.parse::<bool>() {
            Ok(flag) => service.update_config(|c| c.delete_data_on_uninstall = flag).await,
            Err(_) => {
                eprintln!("ERROR: delete_data must be 'true' or 'false'");
                return codes::VALIDATION_ERROR;
            }
        },
        "base_url" => service.update_config(|c| c.base_url = value.clone()).await,
        other => {
            eprintln!("ERROR: unknown setting '{other}' (retention|delete_data|base_url)");
            return codes::VALIDATION_ERROR;
        }
    };

    match result {
        Ok(_) => {
            println!("{key} = {value}");
            codes::SUCCESS
        }
        Err(error) => {
            eprintln!("ERROR: {error}");
            code_for(&error)
        }
    }
}

fn print_config(service: &SudoService) -> u8 {
    let config = service.config();
    println!("retention   = {}", config.retention);
    println!("delete_data = {}", config.delete_data_on_uninstall);
    println!("base_url    = {}", config.base_url);
    println!("default_ttl = {}h", config.default_ttl.as_secs() / 3600);
    codes::SUCCESS
}
