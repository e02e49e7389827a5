//! End-to-end coverage of `RetrievalEngine::build`/`query` over a real on-disk fixture:
//! no mocked indexes, same code path the CLI and MCP server run.

use std::fs;

use codescope::config::Settings;
use codescope::engine::RetrievalEngine;
use codescope::error::RetrievalError;
use tempfile::TempDir;

fn write_fixture(root: &std::path::Path) {
    fs::write(
        root.join("math.py"),
        "def add(a, b):\n    return a + b\n\n\ndef compute_total(items):\n    total = 0\n    for item in items:\n        total = add(total, item)\n    return total\n",
    )
    .unwrap();
    fs::write(
        root.join("errors.py"),
        "class ValidationError(Exception):\n    pass\n\n\ndef validate(value):\n    if value < 0:\n        raise ValidationError(\"negative value\")\n    return value\n",
    )
    .unwrap();
}

fn settings_for(index_dir: &std::path::Path) -> Settings {
    let mut settings = Settings::default();
    settings.index_path = index_dir.to_path_buf();
    settings
}

#[tokio::test]
async fn query_surfaces_the_function_matching_the_query_terms() {
    let repo = TempDir::new().unwrap();
    write_fixture(repo.path());
    let index_dir = TempDir::new().unwrap();

    let engine = RetrievalEngine::build("fixture", &settings_for(index_dir.path()), repo.path()).unwrap();
    assert_eq!(engine.index_summary().files_parsed, 2);

    let result = engine.query("compute total of items", 2000).await.unwrap();
    assert!(!result.hits.is_empty(), "expected at least one hit");

    let top = &result.hits[0];
    let chunk = engine.chunk(top.chunk_id).expect("hit resolves to a chunk");
    assert_eq!(chunk.name, "compute_total");
}

#[tokio::test]
async fn query_rejects_blank_input() {
    let repo = TempDir::new().unwrap();
    write_fixture(repo.path());
    let index_dir = TempDir::new().unwrap();

    let engine = RetrievalEngine::build("fixture", &settings_for(index_dir.path()), repo.path()).unwrap();
    let result = engine.query("   ", 2000).await;

    assert!(matches!(result, Err(RetrievalError::EmptyQuery)));
}

#[tokio::test]
async fn callers_of_finds_the_function_that_invokes_it() {
    let repo = TempDir::new().unwrap();
    write_fixture(repo.path());
    let index_dir = TempDir::new().unwrap();

    let engine = RetrievalEngine::build("fixture", &settings_for(index_dir.path()), repo.path()).unwrap();
    let callers = engine.callers_of("add");

    assert!(!callers.is_empty(), "add() should have at least one caller");
}

#[test]
fn find_symbol_locates_a_class_by_name() {
    let repo = TempDir::new().unwrap();
    write_fixture(repo.path());
    let index_dir = TempDir::new().unwrap();

    let engine = RetrievalEngine::build("fixture", &settings_for(index_dir.path()), repo.path()).unwrap();
    let hits = engine.find_symbol("ValidationError");

    assert!(!hits.is_empty());
    let chunk = engine.chunk(hits[0].chunk_id).expect("hit resolves to a chunk");
    assert_eq!(chunk.name, "ValidationError");
}
