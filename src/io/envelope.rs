//! Structured output envelope shared by the CLI's `--json` flag and the MCP server's tool
//! results, adapted from the corpus's `io/envelope.rs` `{message_type, status, data, error,
//! meta}` shape down to the four-state contract SPEC_FULL.md §6/§10.4 settles on:
//! `{status: "success"|"not_found"|"error"|"ambiguous", data, error?}`.
//!
//! `Ambiguous` replaces the corpus's `partial_success`: a retrieval call never returns part
//! of a result set and calls it done, but it can come back uncertain about which of several
//! readings of a query to answer (e.g. scope selection fell back to `FullRepo` because the
//! snapshot was stale, or the intent classifier split near-evenly between two classes). That
//! uncertainty is worth surfacing distinctly from a clean miss.

use serde::{Deserialize, Serialize};

use crate::error::RetrievalError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    NotFound,
    Error,
    Ambiguous,
}

/// Carried alongside `Status::Error`; `suggestions` feeds from
/// [`RetrievalError::recovery_suggestions`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Meta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T = serde_json::Value> {
    pub status: Status,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,
    #[serde(default)]
    pub meta: Meta,
}

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Self { status: Status::Success, message: String::new(), data: Some(data), error: None, meta: Meta::default() }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self { status: Status::NotFound, message: message.into(), data: None, error: None, meta: Meta::default() }
    }

    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self { status: Status::Ambiguous, message: message.into(), data: None, error: None, meta: Meta::default() }
    }

    pub fn error(message: impl Into<String>, suggestions: Vec<String>) -> Self {
        Self {
            status: Status::Error,
            message: String::new(),
            data: None,
            error: Some(ErrorDetails { message: message.into(), suggestions }),
            meta: Meta::default(),
        }
    }

    /// Turns a fatal [`RetrievalError`] into an envelope, carrying its
    /// `recovery_suggestions()` through to `error.suggestions`.
    pub fn from_retrieval_error(err: &RetrievalError) -> Self {
        Self::error(err.to_string(), err.recovery_suggestions().iter().map(|s| s.to_string()).collect())
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.meta.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.meta.count = Some(count);
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.meta.query = Some(query.into());
        self
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, Status::Success)
    }
}

impl<T: Serialize> Envelope<T> {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn to_json_compact(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
