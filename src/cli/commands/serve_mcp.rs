//! `serve-mcp` command - build the index, then serve MCP tools over stdio.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::transport::stdio;
use rmcp::ServiceExt;

use crate::config::Settings;
use crate::engine::RetrievalEngine;
use crate::io::ExitCode;
use crate::mcp::RetrievalServer;

pub async fn run(path: PathBuf, settings: &Settings) -> ExitCode {
    let repo_id = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "repo".to_string());

    let engine = match RetrievalEngine::build(repo_id, settings, &path) {
        Ok(engine) => engine,
        Err(error) => {
            eprintln!("failed to build index: {error}");
            return ExitCode::Error;
        }
    };

    let server = RetrievalServer::new(Arc::new(engine));
    let service = match server.serve(stdio()).await {
        Ok(service) => service,
        Err(error) => {
            eprintln!("failed to start MCP server: {error}");
            return ExitCode::Error;
        }
    };

    if let Err(error) = service.waiting().await {
        eprintln!("MCP server error: {error}");
        return ExitCode::Error;
    }

    ExitCode::Success
}
