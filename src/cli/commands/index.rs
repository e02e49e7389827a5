//! `index` command - build the retrieval index for a repository.

use std::path::PathBuf;

use owo_colors::OwoColorize;

use crate::config::Settings;
use crate::engine::RetrievalEngine;
use crate::io::{Envelope, ExitCode};

pub fn run(path: PathBuf, repo_id: Option<String>, settings: &Settings, json: bool) -> ExitCode {
    let repo_id = repo_id.unwrap_or_else(|| {
        path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "repo".to_string())
    });

    match RetrievalEngine::build(repo_id, settings, &path) {
        Ok(engine) => {
            let summary = engine.index_summary();
            if json {
                let envelope = Envelope::success(serde_json::json!({
                    "files_parsed": summary.files_parsed,
                    "chunks_built": summary.chunks_built,
                }))
                .with_count(summary.chunks_built);
                println!("{}", envelope.to_json().expect("envelope serializes"));
            } else {
                println!(
                    "{} indexed {} file(s), built {} chunk(s)",
                    "✓".green(),
                    summary.files_parsed,
                    summary.chunks_built
                );
            }
            ExitCode::Success
        }
        Err(error) => {
            let envelope = Envelope::<()>::from_retrieval_error(&error);
            if json {
                println!("{}", envelope.to_json().expect("envelope serializes"));
            } else {
                eprintln!("{} {}", "error:".red(), error);
            }
            ExitCode::Error
        }
    }
}
