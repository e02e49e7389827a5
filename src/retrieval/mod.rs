//! Retrieval core: intent classification, scope selection, multi-index fan-out, fusion,
//! and context packing (SPEC_FULL.md §4.H-§4.L).

pub mod context_builder;
pub mod fusion;
pub mod intent;
pub mod orchestrator;
pub mod scope;

pub use context_builder::{ContextBuilder, ContextResult, PackedChunk, TokenCounter};
pub use fusion::{fuse, FeatureVector, FusedHit};
pub use intent::{Intent, IntentClassifier, IntentHints, IntentProbability, RuleBasedClassifier};
pub use orchestrator::{IndexKind, MultiIndexOrchestrator, MultiIndexResult};
pub use scope::{ScopeResult, ScopeSelector, ScopeType};
