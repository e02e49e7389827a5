//! `retrieve` command - direct symbol/callers/calls lookups that bypass fusion.

use std::path::PathBuf;

use comfy_table::Table;
use owo_colors::OwoColorize;
use serde::Serialize;

use crate::cli::RetrieveKind;
use crate::config::Settings;
use crate::engine::RetrievalEngine;
use crate::io::{Envelope, ExitCode};
use crate::ir::IrSnapshot;
use crate::types::NodeId;

pub fn run(path: PathBuf, kind: RetrieveKind, settings: &Settings, json: bool) -> ExitCode {
    let repo_id = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "repo".to_string());

    let engine = match RetrievalEngine::build(repo_id, settings, &path) {
        Ok(engine) => engine,
        Err(error) => {
            let envelope = Envelope::<()>::from_retrieval_error(&error);
            if json {
                println!("{}", envelope.to_json().expect("envelope serializes"));
            } else {
                eprintln!("{} {}", "error:".red(), error);
            }
            return ExitCode::Error;
        }
    };

    match kind {
        RetrieveKind::Symbol { name } => {
            let hits = engine.find_symbol(&name);
            if hits.is_empty() {
                return emit_not_found(&format!("no symbol named '{name}'"), json);
            }
            let rows: Vec<SymbolRow> = hits
                .iter()
                .filter_map(|hit| {
                    engine.chunk(hit.chunk_id).map(|chunk| SymbolRow {
                        name: chunk.name.clone(),
                        file_path: chunk.file_path.clone(),
                        line: chunk.start_line,
                        score: hit.score,
                    })
                })
                .collect();
            emit_rows(rows, json, |row| vec![row.name.clone(), row.file_path.clone(), row.line.to_string()])
        }
        RetrieveKind::Callers { name } => {
            let nodes = engine.callers_of(&name);
            emit_node_rows(engine.snapshot(), &nodes, &name, "caller", json)
        }
        RetrieveKind::Calls { name } => {
            let nodes = engine.calls_of(&name);
            emit_node_rows(engine.snapshot(), &nodes, &name, "callee", json)
        }
    }
}

#[derive(Debug, Serialize, Clone)]
struct SymbolRow {
    name: String,
    file_path: String,
    line: u32,
    score: f64,
}

#[derive(Debug, Serialize, Clone)]
struct NodeRow {
    name: String,
    fqn: String,
    file_path: String,
}

fn emit_node_rows(snapshot: &IrSnapshot, nodes: &[NodeId], subject: &str, relation: &str, json: bool) -> ExitCode {
    let rows: Vec<NodeRow> = nodes
        .iter()
        .filter_map(|id| snapshot.nodes.get(id))
        .map(|node| NodeRow { name: node.name.to_string(), fqn: node.fqn.to_string(), file_path: node.file_path.to_string() })
        .collect();
    if rows.is_empty() {
        return emit_not_found(&format!("no {relation}s found for '{subject}'"), json);
    }
    emit_rows(rows, json, |row| vec![row.name.clone(), row.fqn.clone(), row.file_path.clone()])
}

fn emit_rows<T: Serialize>(rows: Vec<T>, json: bool, to_cells: impl Fn(&T) -> Vec<String>) -> ExitCode {
    if json {
        let count = rows.len();
        let envelope = Envelope::success(rows).with_count(count);
        println!("{}", envelope.to_json().expect("envelope serializes"));
    } else {
        let mut table = Table::new();
        for row in &rows {
            table.add_row(to_cells(row));
        }
        println!("{table}");
    }
    ExitCode::Success
}

fn emit_not_found(message: &str, json: bool) -> ExitCode {
    if json {
        let envelope: Envelope<()> = Envelope::not_found(message);
        println!("{}", envelope.to_json().expect("envelope serializes"));
    } else {
        println!("{} {message}", "—".yellow());
    }
    ExitCode::NotFound
}
