use clap::Parser;

use codescope::cli::commands::{config, index, query, retrieve, serve_mcp};
use codescope::cli::{Cli, Commands};
use codescope::config::Settings;
use codescope::logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let settings = Settings::load().unwrap_or_else(|error| {
        eprintln!("configuration error: {error}, using defaults");
        Settings::default()
    });
    logging::init_with_config(&settings.logging);

    let exit_code = match cli.command {
        Commands::Index { path, repo_id } => index::run(path, repo_id, &settings, cli.json),
        Commands::Query { path, query: q, token_budget } => query::run(path, q, token_budget, &settings, cli.json).await,
        Commands::Retrieve { path, kind } => retrieve::run(path, kind, &settings, cli.json),
        Commands::ServeMcp { path } => serve_mcp::run(path, &settings).await,
        Commands::Config => config::run(&settings, cli.json),
    };

    std::process::exit(exit_code.as_i32());
}
