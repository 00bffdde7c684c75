//! Operator command line for sudogate.
//!
//! Maps 1:1 onto the core operations:
//!
//! ```text
//! sudogate create <name> [--email ..] [--role ..] [--expiry-hours ..] [--ip ..]
//! sudogate list
//! sudogate info <name-or-email>
//! sudogate revoke <name-or-email>
//! sudogate config [<key> <value>]
//! sudogate purge --yes
//! ```
//!
//! Each invocation assembles the service over the in-process backends
//! and an SMTP sender when `--smtp-host` is given; without one, access
//! links are printed only.

mod commands;
mod exit_codes;

use std::{process::ExitCode, sync::Arc};

use clap::{Parser, Subcommand};
use sudogate_core::{
    audit::{MemoryAuditSink, TracingAuditSink},
    directory::MemoryDirectory,
    mail::{MailSender, MemoryMailSender, SmtpMailSender},
    AuditSink, IdentityDirectory, SudoService,
};
use sudogate_storage::{KeyValueStore, MemoryStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::{config, create, info, list, purge, revoke};
use exit_codes::codes;

/// Short-lived, auditable administrative access.
#[derive(Parser)]
#[command(name = "sudogate")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// SMTP relay host for access-link delivery.
    #[arg(long, global = true)]
    smtp_host: Option<String>,

    /// Sender address for access-link delivery.
    #[arg(long, global = true, default_value = "sudogate@localhost")]
    smtp_from: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grant temporary access to an identity, creating it if needed.
    Create(create::CreateArgs),
    /// List provisioned identities with their live links.
    List(list::ListArgs),
    /// Show one identity by name or email.
    Info(info::InfoArgs),
    /// Revoke a provisioned identity ahead of its expiry.
    Revoke(revoke::RevokeArgs),
    /// Show or update configuration.
    Config(config::ConfigArgs),
    /// Revoke every provisioned identity and purge the audit log.
    Purge(purge::PurgeArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mail: Arc<dyn MailSender> = match &cli.smtp_host {
        Some(host) => match SmtpMailSender::new(host, cli.smtp_from.clone()) {
            Ok(sender) => Arc::new(sender),
            Err(error) => {
                eprintln!("ERROR: cannot configure SMTP: {error}");
                return ExitCode::from(codes::VALIDATION_ERROR);
            }
        },
        None => Arc::new(MemoryMailSender::new()),
    };

    let service = SudoService::builder()
        .store(Arc::new(MemoryStore::new()) as Arc<dyn KeyValueStore>)
        .directory(Arc::new(MemoryDirectory::new()) as Arc<dyn IdentityDirectory>)
        .audit(Arc::new(TracingAuditSink::new(MemoryAuditSink::new())) as Arc<dyn AuditSink>)
        .mail(mail)
        .build();

    if let Err(error) = service.load_config().await {
        eprintln!("ERROR: cannot load configuration: {error}");
        return ExitCode::from(codes::GENERIC_ERROR);
    }

    let code = match &cli.command {
        Commands::Create(args) => create::run(&service, args).await,
        Commands::List(args) => list::run(&service, args).await,
        Commands::Info(args) => info::run(&service, args).await,
        Commands::Revoke(args) => revoke::run(&service, args).await,
        Commands::Config(args) => config::run(&service, args).await,
        Commands::Purge(args) => purge::run(&service, args).await,
    };

    service.shutdown();
    ExitCode::from(code)
}
