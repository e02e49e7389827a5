//! Error hierarchy for the retrieval core.
//!
//! Mirrors the recoverable/fatal split from `SPEC_FULL.md` §7: most error kinds are
//! *contained* (recorded in result metadata, never propagated) and only `RetrievalError`
//! variants marked Fatal abort a call. Each public enum follows the teacher's
//! `thiserror` + `recovery_suggestions()` convention so the CLI/MCP envelope layer can
//! surface actionable hints without matching on error internals.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal errors that abort a retrieval or build call (SPEC_FULL.md §7).
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("invalid repo id: {0}")]
    InvalidRepoId(String),

    #[error("invalid snapshot id: {0}")]
    InvalidSnapshotId(String),

    #[error("required port not configured: {0}")]
    MissingPort(&'static str),

    #[error("query string is empty")]
    EmptyQuery,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("ir build error: {0}")]
    Ir(#[from] IrError),
}

impl RetrievalError {
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            RetrievalError::InvalidRepoId(_) => vec![
                "check that the repo_id matches a previously indexed repository",
                "run `codescope index <path>` to create a snapshot first",
            ],
            RetrievalError::InvalidSnapshotId(_) => {
                vec!["omit snapshot_id to use the latest snapshot for the repo"]
            }
            RetrievalError::MissingPort(_) => {
                vec!["construct the retrieval service with all four index adapters before querying"]
            }
            RetrievalError::EmptyQuery => vec!["provide a non-empty query string"],
            RetrievalError::Storage(_) => vec!["check the index directory is writable and not corrupted"],
            RetrievalError::Ir(_) => vec!["check the file can be read and is valid UTF-8"],
        }
    }
}

pub type RetrievalResult<T> = Result<T, RetrievalError>;

/// Errors raised while constructing the IR for a single file (SPEC_FULL.md §4.A-C).
#[derive(Error, Debug)]
pub enum IrError {
    #[error("unsupported language for file {0}")]
    UnsupportedLanguage(PathBuf),

    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build IR for {path}: {reason}")]
    BuildFailed { path: PathBuf, reason: String },
}

pub type IrResult<T> = Result<T, IrError>;

/// Storage-layer errors (index persistence, tantivy, etc). Recoverable in the
/// `IndexUnavailable` sense described in SPEC_FULL.md §7 when encountered from a
/// `search` call; fatal when encountered constructing a required port.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("index query parse error: {0}")]
    QueryParse(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("embedding error: {0}")]
    Embedding(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Diagnostics collected (not propagated) by the cross-file resolver (SPEC_FULL.md §4.D).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("import '{import_path}' in {file} could not be resolved")]
    UnresolvedImport { file: String, import_path: String },

    #[error("module dependency graph has a cycle involving {0:?}")]
    CycleDetected(Vec<String>),
}

/// Extension trait adding `.context()`/`.with_path()` to any error-bearing `Result`,
/// matching the teacher's `ErrorContext` convention.
pub trait ErrorContext<T> {
    fn context(self, msg: &str) -> IrResult<T>;
    fn with_path(self, path: &std::path::Path) -> IrResult<T>;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: &str) -> IrResult<T> {
        self.map_err(|e| IrError::BuildFailed {
            path: PathBuf::new(),
            reason: format!("{msg}: {e}"),
        })
    }

    fn with_path(self, path: &std::path::Path) -> IrResult<T> {
        self.map_err(|e| IrError::BuildFailed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_has_suggestion() {
        let err = RetrievalError::EmptyQuery;
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn missing_port_message_includes_name() {
        let err = RetrievalError::MissingPort("vector");
        assert!(err.to_string().contains("vector"));
    }

    #[test]
    fn error_context_wraps_io_error() {
        let io_err: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"));
        let wrapped = io_err.context("reading config");
        assert!(wrapped.is_err());
        assert!(wrapped.unwrap_err().to_string().contains("reading config"));
    }
}
