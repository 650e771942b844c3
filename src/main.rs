//! # ragchat CLI
//!
//! ## Usage
//!
//! ```bash
//! ragchat --config ./config/ragchat.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat init` | Create the SQLite database and run schema migrations |
//! | `ragchat serve` | Start the HTTP server |
//! | `ragchat ingest <FILE>...` | Index local files |
//! | `ragchat documents` | List stored documents |
//! | `ragchat delete <ID>` | Delete a document |
//! | `ragchat search "<query>"` | Similarity search |
//! | `ragchat chat "<message>"` | One grounded chat turn, streamed to stdout |
//!
//! Logging goes to stderr and is controlled by `RUST_LOG`
//! (default `ragchat=info,tower_http=info`).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ragchat::{chat, config, documents, ingest, migrate, search, server};

const DEFAULT_LOG_FILTER: &str = "ragchat=info,ragchat_core=info,tower_http=info";

/// ragchat: retrieval-augmented chat over uploaded documents.
#[derive(Parser)]
#[command(name = "ragchat", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ragchat.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Extract, embed and store local files (text, PDF, DOCX).
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// List stored documents, newest first.
    Documents,

    /// Delete a document by id.
    Delete { id: String },

    /// Rank stored documents by similarity to a query.
    Search {
        query: String,

        /// Minimum similarity (defaults to `retrieval.match_threshold`).
        #[arg(long)]
        threshold: Option<f64>,

        /// Maximum number of results (defaults to `retrieval.match_count`).
        #[arg(long)]
        count: Option<usize>,

        /// Print the assembled context block instead of a ranked list.
        #[arg(long)]
        context: bool,
    },

    /// Ask a single question grounded in the stored documents.
    Chat {
        message: String,

        /// System instruction (defaults to `chat.default_system_prompt`).
        #[arg(long)]
        system: Option<String>,
    },
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Ingest { files } => {
            ingest::run_ingest(&cfg, &files).await?;
        }
        Commands::Documents => {
            documents::run_documents(&cfg).await?;
        }
        Commands::Delete { id } => {
            documents::run_delete(&cfg, &id).await?;
        }
        Commands::Search {
            query,
            threshold,
            count,
            context,
        } => {
            search::run_search(&cfg, &query, threshold, count, context).await?;
        }
        Commands::Chat { message, system } => {
            chat::run_chat(&cfg, &message, system.as_deref()).await?;
        }
    }

    Ok(())
}
