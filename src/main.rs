use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;

use tracing_subscriber::EnvFilter;

use contactgraph::config::load_config;
use contactgraph::contactgraph::ContactGraph;
use contactgraph::errors::Result;
use contactgraph::rpc::RpcServer;
use contactgraph::types::*;

/// Customer identity reconciliation over a contact graph.
#[derive(Parser)]
#[command(
    name = "contactgraph",
    version,
    about = "Customer identity reconciliation over a contact graph"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directory, configuration and database
    Init {
        /// Deployment root (default: current directory)
        path: Option<String>,
    },
    /// Reconcile an email and/or phone number and print the consolidated contact
    Identify {
        /// Email address
        #[arg(short, long)]
        email: Option<String>,
        /// Phone number
        #[arg(short = 'n', long = "phone")]
        phone_number: Option<String>,
        /// Deployment root
        #[arg(short, long)]
        path: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Show the cluster a contact belongs to
    Show {
        /// Contact id
        id: i64,
        /// Deployment root
        #[arg(short, long)]
        path: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Soft-delete a contact
    Delete {
        /// Contact id
        id: i64,
        /// Deployment root
        #[arg(short, long)]
        path: Option<String>,
    },
    /// Show store statistics
    Status {
        /// Deployment root
        #[arg(short, long)]
        path: Option<String>,
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },
    /// Serve JSON-RPC requests on stdin/stdout
    Serve {
        /// Deployment root
        #[arg(short, long)]
        path: Option<String>,
    },
}

impl Commands {
    fn path(&self) -> Option<&str> {
        match self {
            Commands::Init { path }
            | Commands::Identify { path, .. }
            | Commands::Show { path, .. }
            | Commands::Delete { path, .. }
            | Commands::Status { path, .. }
            | Commands::Serve { path } => path.as_deref(),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let root = resolve_path(cli.command.path());
    init_tracing(&root);

    if let Err(e) = run(cli, &root).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Installs the stderr log subscriber. `RUST_LOG` wins over the configured
/// level.
fn init_tracing(root: &Path) {
    let level = load_config(root)
        .map(|config| config.log_level)
        .unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

async fn run(cli: Cli, root: &Path) -> Result<()> {
    match cli.command {
        Commands::Init { .. } => {
            let cg = ContactGraph::init(root)?;
            println!("Initialized contact graph at {}", root.display());
            cg.close()?;
        }
        Commands::Identify {
            email,
            phone_number,
            json,
            ..
        } => {
            let cg = ContactGraph::open(root)?;
            let request = IdentifyRequest {
                email,
                phone_number,
            };
            let contact = cg.identify(&request)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&IdentifyResponse { contact })?
                );
            } else {
                print_consolidated(&contact);
            }
            cg.close()?;
        }
        Commands::Show { id, json, .. } => {
            let cg = ContactGraph::open(root)?;
            let contact = cg.lookup(id)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&contact)?);
            } else {
                print_consolidated(&contact);
            }
            cg.close()?;
        }
        Commands::Delete { id, .. } => {
            let cg = ContactGraph::open(root)?;
            cg.delete_contact(id)?;
            println!("Deleted contact {}", id);
            cg.close()?;
        }
        Commands::Status { json, .. } => {
            let cg = ContactGraph::open(root)?;
            let stats = cg.get_stats()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Contact graph status");
                println!("  Contacts:   {}", stats.contact_count);
                println!("  Primary:    {}", stats.primary_count);
                println!("  Secondary:  {}", stats.secondary_count);
                println!("  Deleted:    {}", stats.deleted_count);
                println!("  DB Size:    {} bytes", stats.db_size_bytes);
            }
            cg.close()?;
        }
        Commands::Serve { .. } => {
            let server = RpcServer::new(ContactGraph::open(root)?);
            server.run().await?;
            server.into_inner().close()?;
        }
    }
    Ok(())
}

fn print_consolidated(contact: &ConsolidatedContact) {
    println!("Primary contact: {}", contact.primary_contact_id);
    println!("  Emails:        {}", contact.emails.join(", "));
    println!("  Phone numbers: {}", contact.phone_numbers.join(", "));
    let secondaries: Vec<String> = contact
        .secondary_contact_ids
        .iter()
        .map(|id| id.to_string())
        .collect();
    println!("  Secondaries:   {}", secondaries.join(", "));
}

/// Resolves an optional path argument to a `PathBuf`.
///
/// Defaults to the current working directory if no path is provided.
fn resolve_path(path: Option<&str>) -> PathBuf {
    match path {
        Some(p) => PathBuf::from(p),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}
