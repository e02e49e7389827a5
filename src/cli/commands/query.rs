//! `query` command - run the full fusion pipeline against a previously-indexed repo.

use std::path::PathBuf;

use comfy_table::Table;
use owo_colors::OwoColorize;

use crate::cli::commands::report::build_query_report;
use crate::config::Settings;
use crate::engine::RetrievalEngine;
use crate::io::{Envelope, ExitCode};

pub async fn run(path: PathBuf, query: String, token_budget: usize, settings: &Settings, json: bool) -> ExitCode {
    let repo_id = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "repo".to_string());

    let engine = match RetrievalEngine::build(repo_id, settings, &path) {
        Ok(engine) => engine,
        Err(error) => return report_build_error(&error, json),
    };

    match engine.query(&query, token_budget).await {
        Ok(result) => {
            let report = build_query_report(&result, |id| engine.chunk(id));
            if json {
                let envelope = Envelope::success(&report)
                    .with_duration_ms(result.metadata.latency_ms)
                    .with_count(report.hits.len())
                    .with_query(query);
                println!("{}", envelope.to_json().expect("envelope serializes"));
            } else if report.hits.is_empty() {
                println!("{} no hits for {:?}", "—".yellow(), query);
            } else {
                let mut table = Table::new();
                table.set_header(vec!["score", "file", "symbol", "lines"]);
                for hit in &report.hits {
                    table.add_row(vec![
                        format!("{:.3}", hit.final_score),
                        hit.file_path.clone(),
                        hit.name.clone(),
                        format!("{}-{}", hit.start_line, hit.end_line),
                    ]);
                }
                println!("{table}");
                println!(
                    "intent: {} ({:.2})  scope: {}  {} tok / {} budget",
                    report.intent.dominant,
                    report.intent.dominant_probability,
                    report.scope.scope_type,
                    report.context.total_tokens,
                    report.context.token_budget
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

fn report_build_error(error: &crate::error::RetrievalError, json: bool) -> ExitCode {
    let envelope = Envelope::<()>::from_retrieval_error(error);
    if json {
        println!("{}", envelope.to_json().expect("envelope serializes"));
    } else {
        eprintln!("{} {}", "error:".red(), error);
    }
    ExitCode::Error
}
