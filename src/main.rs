//! # Pagewise CLI (`pagewise`)
//!
//! The `pagewise` binary is the primary interface for Pagewise. It provides
//! commands for database initialization, token management, document
//! ingestion, ad-hoc questions, and starting the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! pagewise --config ./config/pagewise.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pagewise init` | Create the SQLite database and run schema migrations |
//! | `pagewise token create --user <id>` | Mint an API bearer token |
//! | `pagewise ingest <path> --user <id>` | Upload and index a document |
//! | `pagewise ask <document-id> "<question>" --user <id>` | Ask a question against a document |
//! | `pagewise serve` | Start the HTTP API server |
//!
//! ## Examples
//!
//! ```bash
//! # Initialize the database
//! pagewise init --config ./config/pagewise.toml
//!
//! # Mint a token for the web client
//! pagewise token create --user alice
//!
//! # Ingest a PDF
//! pagewise ingest ./lease.pdf --user alice
//!
//! # Ask about it from the shell
//! pagewise ask 3f6f... "When does the lease end?" --user alice
//!
//! # Start the API server
//! pagewise serve --config ./config/pagewise.toml
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pagewise::{ask, config, ingest, migrate, server, token_cmd};

/// Pagewise CLI — a chat-with-your-documents backend.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/pagewise.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "pagewise",
    about = "Pagewise — chat with your documents over a retrieval-augmented pipeline",
    version,
    long_about = "Pagewise ingests uploaded documents (PDF, plain text, markdown), splits them \
    into embedded passages in a per-document SQLite vector namespace, and answers questions with \
    retrieval-augmented generation via a CLI and an HTTP API."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pagewise.toml`. Database, server, upload,
    /// embedding, and completion settings are read from this file.
    #[arg(long, global = true, default_value = "./config/pagewise.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and all required tables
    /// (documents, passages, messages, api_tokens).
    /// This command is idempotent — running it multiple times is safe.
    Init,

    /// Manage API bearer tokens.
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Upload and index a document from the local filesystem.
    ///
    /// Runs the full ingestion pipeline: extract text, split into passages,
    /// embed, and index. Exits non-zero if ingestion ends in FAILED.
    Ingest {
        /// Path to the file to ingest (.pdf, .txt, or .md).
        path: String,

        /// User id that will own the document.
        #[arg(long)]
        user: String,

        /// Display name override (defaults to the file name).
        #[arg(long)]
        name: Option<String>,
    },

    /// Ask a question against an ingested document.
    ///
    /// Runs one chat turn through the same pipeline as `POST /api/message`
    /// and prints the answer. Both the question and the answer are appended
    /// to the document's conversation log.
    Ask {
        /// Document id (printed by `ingest`).
        document_id: String,

        /// The question to ask.
        question: String,

        /// User id to act as; must own the document.
        #[arg(long)]
        user: String,
    },

    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// chat and document endpoints.
    Serve,
}

/// Token management subcommands.
#[derive(Subcommand)]
enum TokenAction {
    /// Mint a new API token for a user.
    ///
    /// Prints the plaintext token exactly once; only a digest is stored.
    Create {
        /// User id the token authenticates as.
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Token { action } => match action {
            TokenAction::Create { user } => {
                token_cmd::run_token_create(&cfg, &user).await?;
            }
        },
        Commands::Ingest { path, user, name } => {
            ingest::run_ingest(&cfg, &path, &user, name).await?;
        }
        Commands::Ask {
            document_id,
            question,
            user,
        } => {
            ask::run_ask(&cfg, &document_id, &question, &user).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
