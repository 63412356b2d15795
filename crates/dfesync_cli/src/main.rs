//! dfesync CLI
//!
//! Command-line front end for the document distribution sync engine.
//!
//! # Commands
//!
//! - `run` - Poll every registered credential until interrupted
//! - `poll` - Run a single cycle for one credential
//! - `credential` - Register, remove and list credentials
//! - `cursor` - Show or reset a credential's cursor
//! - `documents` - List and show stored documents, fetch complete versions
//! - `compact` - Compact the store logs

mod commands;
mod config;
mod output;

use clap::{Parser, Subcommand};
use commands::{credential, cursor, documents, open_store};
use config::FileConfig;
use dfesync_protocol::ServiceKind;
use output::OutputFormat;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Fiscal document distribution synchronization.
#[derive(Parser)]
#[command(name = "dfesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the data directory
    #[arg(global = true, short, long)]
    data_dir: Option<PathBuf>,

    /// Path to a TOML configuration file
    #[arg(global = true, short, long)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    /// Output format
    #[arg(global = true, short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every registered credential until Ctrl-C
    Run,

    /// Run one polling cycle for a credential
    Poll {
        /// CNPJ or CPF
        identity: String,
    },

    /// Manage credentials
    #[command(subcommand)]
    Credential(CredentialCommand),

    /// Inspect or reset cursors
    #[command(subcommand)]
    Cursor(CursorCommand),

    /// Inspect stored documents
    #[command(subcommand)]
    Documents(DocumentsCommand),

    /// Compact the store logs
    Compact,
}

#[derive(Subcommand)]
enum CredentialCommand {
    /// Register or replace a credential
    Add {
        /// CNPJ or CPF
        identity: String,

        /// PKCS#12 certificate file
        #[arg(long)]
        certificate: PathBuf,

        /// Environment variable holding the certificate passphrase
        #[arg(long, default_value = "DFESYNC_CERT_PASSPHRASE")]
        passphrase_env: String,

        /// Two-digit state code of the requester
        #[arg(long)]
        region: String,

        /// Use the national NFS-e service instead of NF-e
        #[arg(long)]
        nfse: bool,

        /// Display name
        #[arg(long)]
        label: Option<String>,
    },

    /// Remove a credential with its cursor and cooldown
    Remove {
        /// CNPJ or CPF
        identity: String,
    },

    /// List registered credentials
    List,
}

#[derive(Subcommand)]
enum CursorCommand {
    /// Show the cursor and cooldown of a credential
    Show {
        /// CNPJ or CPF
        identity: String,
    },

    /// Set the cursor, zero for a full resync
    Reset {
        /// CNPJ or CPF
        identity: String,

        /// Sequence number to restart from
        #[arg(long)]
        to: Option<String>,
    },
}

#[derive(Subcommand)]
enum DocumentsCommand {
    /// List documents of a credential
    List {
        /// CNPJ or CPF
        identity: String,

        /// Only summaries
        #[arg(long)]
        summaries: bool,

        /// Only invoices
        #[arg(long)]
        invoices: bool,
    },

    /// Show one document
    Show {
        /// Access key or event identifier
        key: String,

        /// Print the stored payload
        #[arg(long)]
        payload: bool,
    },

    /// Request complete versions of summary invoices
    FetchComplete {
        /// CNPJ or CPF
        identity: String,

        /// Maximum keys to request
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over the default level
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let data_dir = file.data_dir(cli.data_dir.clone())?;
    let format = cli.output;

    match cli.command {
        Commands::Run => {
            let config = file.engine_config()?;
            commands::run::run(open_store(&data_dir)?, config, format).await?;
        }
        Commands::Poll { identity } => {
            let config = file.engine_config()?;
            commands::poll::poll(open_store(&data_dir)?, config, &identity, format).await?;
        }
        Commands::Credential(command) => {
            let store = open_store(&data_dir)?;
            match command {
                CredentialCommand::Add {
                    identity,
                    certificate,
                    passphrase_env,
                    region,
                    nfse,
                    label,
                } => {
                    let passphrase = std::env::var(&passphrase_env)
                        .map_err(|_| format!("environment variable {passphrase_env} is not set"))?;
                    let view = credential::add(
                        &store,
                        credential::AddArgs {
                            identity,
                            certificate,
                            passphrase,
                            region,
                            service: if nfse {
                                ServiceKind::NfseNational
                            } else {
                                ServiceKind::Nfe
                            },
                            label,
                        },
                    )?;
                    format.emit(&view, |view| {
                        println!("Registered {}", view.identity);
                    })?;
                }
                CredentialCommand::Remove { identity } => {
                    if credential::remove(&store, &identity)? {
                        println!("Removed {identity}");
                    } else {
                        return Err(format!("no credential registered for {identity}").into());
                    }
                }
                CredentialCommand::List => {
                    format.emit(&credential::list(&store), |views| credential::print_list(views))?;
                }
            }
        }
        Commands::Cursor(command) => {
            let store = open_store(&data_dir)?;
            let view = match command {
                CursorCommand::Show { identity } => cursor::show(&store, &identity)?,
                CursorCommand::Reset { identity, to } => {
                    cursor::reset(&store, &identity, to.as_deref())?
                }
            };
            format.emit(&view, cursor::print)?;
        }
        Commands::Documents(command) => match command {
            DocumentsCommand::List {
                identity,
                summaries,
                invoices,
            } => {
                let store = open_store(&data_dir)?;
                let filter = documents::ListFilter {
                    summaries_only: summaries,
                    invoices_only: invoices,
                };
                let rows = documents::list(&store, &identity, filter)?;
                format.emit(&rows, |rows| documents::print_list(rows))?;
            }
            DocumentsCommand::Show { key, payload } => {
                let store = open_store(&data_dir)?;
                let record = documents::show(&store, &key, payload)?;
                format.emit(&record, documents::print_record)?;
            }
            DocumentsCommand::FetchComplete { identity, limit } => {
                let config = file.engine_config()?;
                commands::poll::fetch_complete(open_store(&data_dir)?, config, &identity, limit, format)
                    .await?;
            }
        },
        Commands::Compact => {
            let store = open_store(&data_dir)?;
            let stats = commands::compact::run(&store, &data_dir)?;
            format.emit(&stats, commands::compact::print)?;
        }
    }

    Ok(())
}
