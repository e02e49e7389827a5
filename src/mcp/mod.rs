//! MCP server exposing the retrieval pipeline's operations as tools (SPEC_FULL.md
//! §10.5), matching the corpus's `#[tool_router]`/`#[tool_handler]` registration idiom.
//! Runs over stdio; the CLI's `serve-mcp` command is the only thing that constructs one.

use std::sync::Arc;

use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo};
use rmcp::{ErrorData as McpError, ServerHandler, schemars, tool, tool_handler, tool_router};
use serde::{Deserialize, Serialize};

use crate::engine::RetrievalEngine;

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct FindSymbolRequest {
    /// Name of the symbol to find
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct SearchRequest {
    /// Query text
    pub query: String,
    /// Token budget for the packed context (default 2000)
    #[serde(default = "default_search_budget")]
    pub token_budget: usize,
}

fn default_search_budget() -> usize {
    2000
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct WhoCallsRequest {
    /// Name of the function to find callers for
    pub name: String,
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct ImpactOfRequest {
    /// Name of the symbol to analyze
    pub name: String,
    /// Maximum reverse-dependency hops to traverse (default 5)
    #[serde(default = "default_impact_depth")]
    pub depth: usize,
}

fn default_impact_depth() -> usize {
    5
}

#[derive(Debug, Deserialize, Serialize, schemars::JsonSchema)]
pub struct RetrieveRequest {
    /// Natural-language query
    pub query: String,
    /// Token budget for the packed context (default 4000)
    #[serde(default = "default_retrieve_budget")]
    pub token_budget: usize,
}

fn default_retrieve_budget() -> usize {
    4000
}

#[derive(Clone)]
pub struct RetrievalServer {
    engine: Arc<RetrievalEngine>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl RetrievalServer {
    pub fn new(engine: Arc<RetrievalEngine>) -> Self {
        Self { engine, tool_router: Self::tool_router() }
    }

    #[tool(description = "Find a symbol by name in the indexed repository")]
    pub async fn find_symbol(
        &self,
        Parameters(FindSymbolRequest { name }): Parameters<FindSymbolRequest>,
    ) -> Result<CallToolResult, McpError> {
        let hits = self.engine.find_symbol(&name);
        if hits.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(format!("no symbol named '{name}'"))]));
        }
        let json = serde_json::to_string_pretty(&hits.iter().filter_map(|h| self.engine.chunk(h.chunk_id)).collect::<Vec<_>>())
            .unwrap_or_else(|e| e.to_string());
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Search the repository with the full intent-fusion pipeline, lexical/semantic/symbol/graph blended")]
    pub async fn search(
        &self,
        Parameters(SearchRequest { query, token_budget }): Parameters<SearchRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.run_query(&query, token_budget).await
    }

    #[tool(description = "List callers of a function (transitive, reverse call graph)")]
    pub async fn who_calls(
        &self,
        Parameters(WhoCallsRequest { name }): Parameters<WhoCallsRequest>,
    ) -> Result<CallToolResult, McpError> {
        let nodes = self.engine.callers_of(&name);
        if nodes.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(format!("no callers found for '{name}'"))]));
        }
        let names: Vec<String> = nodes
            .iter()
            .filter_map(|id| self.engine.snapshot().nodes.get(id))
            .map(|node| node.fqn.to_string())
            .collect();
        Ok(CallToolResult::success(vec![Content::text(names.join("\n"))]))
    }

    #[tool(description = "Compute the impact radius of changing a symbol: every node reachable within `depth` reverse hops")]
    pub async fn impact_of(
        &self,
        Parameters(ImpactOfRequest { name, depth }): Parameters<ImpactOfRequest>,
    ) -> Result<CallToolResult, McpError> {
        let impacted = self.engine.impact_of(&name, depth);
        if impacted.is_empty() {
            return Ok(CallToolResult::success(vec![Content::text(format!("no impact found for '{name}'"))]));
        }
        let lines: Vec<String> = impacted
            .iter()
            .filter_map(|(id, hop)| self.engine.snapshot().nodes.get(id).map(|node| format!("{} (hop {hop})", node.fqn)))
            .collect();
        Ok(CallToolResult::success(vec![Content::text(lines.join("\n"))]))
    }

    #[tool(description = "Run a natural-language query through the full retrieval pipeline and return the packed context")]
    pub async fn retrieve(
        &self,
        Parameters(RetrieveRequest { query, token_budget }): Parameters<RetrieveRequest>,
    ) -> Result<CallToolResult, McpError> {
        self.run_query(&query, token_budget).await
    }
}

impl RetrievalServer {
    async fn run_query(&self, query: &str, token_budget: usize) -> Result<CallToolResult, McpError> {
        use crate::cli::commands::report::build_query_report;

        match self.engine.query(query, token_budget).await {
            Ok(result) => {
                let report = build_query_report(&result, |id| self.engine.chunk(id));
                let json = serde_json::to_string_pretty(&report).unwrap_or_else(|e| e.to_string());
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(error) => Ok(CallToolResult::error(vec![Content::text(error.to_string())])),
        }
    }
}

#[tool_handler]
impl ServerHandler for RetrievalServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "codescope".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Codescope Retrieval Engine".to_string()),
                website_url: None,
                icons: None,
                ..Default::default()
            },
            instructions: Some(
                "Use `search`/`retrieve` for natural-language queries; `find_symbol` for exact \
                 symbol lookups; `who_calls`/`impact_of` to trace the call graph before editing."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}
