//! Command-line argument parsing and subcommand dispatch.

pub mod commands;

use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Parser, Subcommand};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Code-aware retrieval engine.
#[derive(Parser)]
#[command(
    name = "codescope",
    version = env!("CARGO_PKG_VERSION"),
    about = "Code-aware retrieval engine",
    long_about = "Index a repository and answer natural-language queries by fusing lexical, semantic, symbol, and graph search.",
    styles = clap_cargo_style()
)]
pub struct Cli {
    /// Path to a settings.toml file (overrides the default search path)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit results as a structured JSON envelope instead of a table
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the index for a repository
    Index {
        /// Repository root to index
        path: PathBuf,

        /// Stable identifier for this repository (defaults to the directory name)
        #[arg(long)]
        repo_id: Option<String>,
    },

    /// Run a natural-language query against the index
    Query {
        /// Repository root that was previously indexed
        path: PathBuf,

        /// The query text
        query: String,

        /// Token budget for the packed context
        #[arg(long, default_value_t = 4000)]
        token_budget: usize,
    },

    /// Direct lookups that bypass the fusion pipeline
    Retrieve {
        /// Repository root that was previously indexed
        path: PathBuf,

        #[command(subcommand)]
        kind: RetrieveKind,
    },

    /// Start the MCP server (stdio transport)
    ServeMcp {
        /// Repository root to serve
        path: PathBuf,
    },

    /// Print the active configuration
    Config,
}

#[derive(Subcommand)]
pub enum RetrieveKind {
    /// Find a symbol by name
    Symbol {
        /// Symbol name
        name: String,
    },
    /// List callers of a function
    Callers {
        /// Function name
        name: String,
    },
    /// List functions a given function calls
    Calls {
        /// Function name
        name: String,
    },
}
