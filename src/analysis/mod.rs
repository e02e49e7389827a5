//! Post-parse analyses that enrich the structural IR without needing a full type
//! inference engine (SPEC_FULL.md §4.E).

pub mod narrowing;

pub use narrowing::{NarrowedRead, NarrowingAnalyzer, TypeState};
