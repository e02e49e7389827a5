//! Configuration for the retrieval engine.
//!
//! Layered: defaults → TOML config file → environment variables (`RETRIEVAL_` prefix,
//! double underscore for nesting), following the teacher's `figment` convention.
//!
//! # Environment variables
//!
//! - `RETRIEVAL_INDEXING__PARALLEL_THREADS=8` sets `indexing.parallel_threads`
//! - `RETRIEVAL_MCP__PORT=9999` sets `mcp.port`
//! - `RETRIEVAL_LANGUAGES__PYTHON__ENABLED=false` disables the Python front end

use std::collections::HashMap;
use std::path::PathBuf;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_index_path")]
    pub index_path: PathBuf,

    #[serde(default)]
    pub indexing: IndexingConfig,

    #[serde(default)]
    pub languages: HashMap<String, LanguageConfig>,

    #[serde(default)]
    pub mcp: McpConfig,

    #[serde(default)]
    pub fusion: FusionConfig,

    #[serde(default)]
    pub context: ContextConfig,

    #[serde(default)]
    pub scope: ScopeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    #[serde(default = "default_true")]
    pub include_tests: bool,

    #[serde(default = "default_false")]
    pub include_docs: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LanguageConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub extensions: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct McpConfig {
    #[serde(default = "default_mcp_port")]
    pub port: u16,

    #[serde(default = "default_max_context_size")]
    pub max_context_size: usize,

    #[serde(default = "default_false")]
    pub debug: bool,
}

/// RRF, consensus, weight-profile and cutoff constants from SPEC_FULL.md §4.K/§6.
/// All are overridable without recompiling, but the defaults are the spec's values.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FusionConfig {
    #[serde(default = "default_k_vector")]
    pub k_vector: f64,
    #[serde(default = "default_k_lexical")]
    pub k_lexical: f64,
    #[serde(default = "default_k_symbol")]
    pub k_symbol: f64,
    #[serde(default = "default_k_graph")]
    pub k_graph: f64,

    #[serde(default = "default_beta")]
    pub consensus_beta: f64,
    #[serde(default = "default_max_factor")]
    pub consensus_max_factor: f64,
    #[serde(default = "default_q0")]
    pub consensus_q0: f64,

    #[serde(default = "default_cutoff_symbol")]
    pub cutoff_symbol: usize,
    #[serde(default = "default_cutoff_flow")]
    pub cutoff_flow: usize,
    #[serde(default = "default_cutoff_concept")]
    pub cutoff_concept: usize,
    #[serde(default = "default_cutoff_code")]
    pub cutoff_code: usize,
    #[serde(default = "default_cutoff_balanced")]
    pub cutoff_balanced: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_token_budget")]
    pub default_token_budget: usize,
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f64,
    #[serde(default = "default_overlap_penalty")]
    pub overlap_penalty: f64,
    #[serde(default = "default_true")]
    pub drop_on_full_overlap: bool,
    #[serde(default = "default_trimmed_max_tokens")]
    pub trimmed_max_tokens: usize,
    #[serde(default = "default_stop_ratio")]
    pub stop_ratio: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ScopeConfig {
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    #[serde(default = "default_max_chunk_ids")]
    pub max_chunk_ids: usize,
    #[serde(default = "default_max_expanded_nodes")]
    pub max_expanded_nodes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_index_path() -> PathBuf {
    PathBuf::from(".codescope/index")
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_mcp_port() -> u16 {
    7878
}
fn default_max_context_size() -> usize {
    100_000
}
fn default_k_vector() -> f64 {
    70.0
}
fn default_k_lexical() -> f64 {
    70.0
}
fn default_k_symbol() -> f64 {
    50.0
}
fn default_k_graph() -> f64 {
    50.0
}
fn default_beta() -> f64 {
    0.3
}
fn default_max_factor() -> f64 {
    1.5
}
fn default_q0() -> f64 {
    10.0
}
fn default_cutoff_symbol() -> usize {
    20
}
fn default_cutoff_flow() -> usize {
    15
}
fn default_cutoff_concept() -> usize {
    60
}
fn default_cutoff_code() -> usize {
    40
}
fn default_cutoff_balanced() -> usize {
    40
}
fn default_token_budget() -> usize {
    4000
}
fn default_overlap_threshold() -> f64 {
    0.5
}
fn default_overlap_penalty() -> f64 {
    0.5
}
fn default_trimmed_max_tokens() -> usize {
    200
}
fn default_stop_ratio() -> f64 {
    0.95
}
fn default_top_k() -> usize {
    20
}
fn default_max_chunk_ids() -> usize {
    500
}
fn default_max_expanded_nodes() -> usize {
    100
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            index_path: default_index_path(),
            indexing: IndexingConfig::default(),
            languages: default_languages(),
            mcp: McpConfig::default(),
            fusion: FusionConfig::default(),
            context: ContextConfig::default(),
            scope: ScopeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            parallel_threads: default_parallel_threads(),
            ignore_patterns: vec![
                "target/**".to_string(),
                "node_modules/**".to_string(),
                ".git/**".to_string(),
                "*.generated.*".to_string(),
            ],
            include_tests: true,
            include_docs: false,
        }
    }
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            port: default_mcp_port(),
            max_context_size: default_max_context_size(),
            debug: false,
        }
    }
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            k_vector: default_k_vector(),
            k_lexical: default_k_lexical(),
            k_symbol: default_k_symbol(),
            k_graph: default_k_graph(),
            consensus_beta: default_beta(),
            consensus_max_factor: default_max_factor(),
            consensus_q0: default_q0(),
            cutoff_symbol: default_cutoff_symbol(),
            cutoff_flow: default_cutoff_flow(),
            cutoff_concept: default_cutoff_concept(),
            cutoff_code: default_cutoff_code(),
            cutoff_balanced: default_cutoff_balanced(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_token_budget: default_token_budget(),
            overlap_threshold: default_overlap_threshold(),
            overlap_penalty: default_overlap_penalty(),
            drop_on_full_overlap: true,
            trimmed_max_tokens: default_trimmed_max_tokens(),
            stop_ratio: default_stop_ratio(),
        }
    }
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            default_top_k: default_top_k(),
            max_chunk_ids: default_max_chunk_ids(),
            max_expanded_nodes: default_max_expanded_nodes(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

fn default_languages() -> HashMap<String, LanguageConfig> {
    let mut langs = HashMap::new();

    langs.insert(
        "rust".to_string(),
        LanguageConfig {
            enabled: true,
            extensions: vec!["rs".to_string()],
        },
    );
    langs.insert(
        "python".to_string(),
        LanguageConfig {
            enabled: true,
            extensions: vec!["py".to_string(), "pyi".to_string()],
        },
    );
    langs.insert(
        "typescript".to_string(),
        LanguageConfig {
            enabled: true,
            extensions: vec![
                "ts".to_string(),
                "tsx".to_string(),
                "js".to_string(),
                "jsx".to_string(),
            ],
        },
    );

    langs
}

impl Settings {
    /// Load configuration from defaults, then `.codescope/settings.toml` if present,
    /// then `RETRIEVAL_`-prefixed environment variables.
    pub fn load() -> Result<Self, figment::Error> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(".codescope/settings.toml"));

        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("RETRIEVAL_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
    }

    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;
        let mut dir = current.as_path();
        loop {
            let candidate = dir.join(".codescope").join("settings.toml");
            if candidate.exists() {
                return Some(candidate);
            }
            dir = dir.parent()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_have_three_languages() {
        let settings = Settings::default();
        assert!(settings.languages.contains_key("rust"));
        assert!(settings.languages.contains_key("python"));
        assert!(settings.languages.contains_key("typescript"));
    }

    #[test]
    fn fusion_defaults_match_spec_constants() {
        let fusion = FusionConfig::default();
        assert_eq!(fusion.k_vector, 70.0);
        assert_eq!(fusion.k_symbol, 50.0);
        assert_eq!(fusion.consensus_beta, 0.3);
        assert_eq!(fusion.consensus_max_factor, 1.5);
        assert_eq!(fusion.cutoff_symbol, 20);
        assert_eq!(fusion.cutoff_concept, 60);
    }

    #[test]
    fn context_defaults_match_spec_constants() {
        let ctx = ContextConfig::default();
        assert_eq!(ctx.overlap_threshold, 0.5);
        assert_eq!(ctx.overlap_penalty, 0.5);
        assert!(ctx.drop_on_full_overlap);
        assert_eq!(ctx.trimmed_max_tokens, 200);
    }
}
