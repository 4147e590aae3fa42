//! # Lectern CLI (`lectern`)
//!
//! Builds and queries a vector index over a directory of course material.
//!
//! ## Usage
//!
//! ```bash
//! lectern --config ./lectern.toml <command> <root>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lectern init <root>` | Create an empty index for a corpus root |
//! | `lectern index <root>` | Index every file not already in the index |
//! | `lectern search <root> "<query>"` | Filtered semantic search |
//! | `lectern stats <root>` | Summarize what is indexed |
//!
//! ## Examples
//!
//! ```bash
//! # Index a course folder tree
//! lectern index ./courses
//!
//! # Search one course, top 3
//! lectern search ./courses "duty of care" -k 3 --filter course=HMG6228
//!
//! # Machine-readable results
//! lectern search ./courses "revenue management" --json
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use lectern::{config, indexer, search, stats, store};

/// Lectern: incremental vector indexing and filtered semantic search over
/// course material.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/lectern.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "lectern",
    about = "Lectern: incremental vector indexing and filtered semantic search over course material",
    version,
    long_about = "Lectern walks a corpus laid out as <root>/<course>/..., extracts text from \
    PowerPoint, PDF, and HTML files, chunks and embeds it, and keeps an append-only vector index \
    that can be searched with metadata filters."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./lectern.toml`. If the file does not exist, built-in
    /// defaults are used.
    #[arg(long, global = true, default_value = "./lectern.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Create an empty index for a corpus root.
    ///
    /// Writes the configured backend's files without indexing anything.
    /// Running it on an existing index leaves the entries untouched.
    Init {
        /// Corpus root directory.
        root: PathBuf,
    },

    /// Index new files under a corpus root.
    ///
    /// Discovers `.pptx`, `.pdf`, and `.html` files, skips those already in
    /// the index, extracts, chunks, and embeds the rest, and appends them.
    /// Files that fail to extract are reported and skipped.
    Index {
        /// Corpus root directory.
        root: PathBuf,
    },

    /// Search the index.
    ///
    /// Embeds the query and returns the most similar chunks, optionally
    /// restricted by exact metadata matches.
    Search {
        /// Corpus root directory.
        root: PathBuf,

        /// The search query string.
        query: String,

        /// Maximum number of results to return.
        #[arg(short, long, default_value_t = 5)]
        k: usize,

        /// Metadata constraint as `key=value` (repeatable), e.g.
        /// `course=HMG6228`, `filetype=.pdf`, `slide_number=2`.
        /// `course_name` and `collection_name` are aliases for `course`.
        #[arg(long = "filter", value_parser = parse_key_val)]
        filters: Vec<(String, String)>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats {
        /// Corpus root directory.
        root: PathBuf,
    },
}

/// Parse a `key=value` pair for `--filter` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config_or_default(&cli.config)?;

    match cli.command {
        Commands::Init { root } => {
            store::run_init(&cfg, &root).await?;
        }
        Commands::Index { root } => {
            indexer::run_index(&cfg, &root).await?;
        }
        Commands::Search {
            root,
            query,
            k,
            filters,
            json,
        } => {
            search::run_search(&cfg, &root, &query, k, &filters, json).await?;
        }
        Commands::Stats { root } => {
            stats::run_stats(&cfg, &root).await?;
        }
    }

    Ok(())
}
