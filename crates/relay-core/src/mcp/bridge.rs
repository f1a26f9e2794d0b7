//! Tool schema bridge
//!
//! Folds the tool lists of all connected servers into one LLM tool list plus
//! the routing table `tool name -> server name`. A name offered by more than
//! one server is ambiguous: every entry for it is left out and reported as a
//! collision, the rest of the tools are unaffected.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use super::protocol::McpToolDef;
use crate::ai::types::AiTool;
use crate::error::AgentError;

/// Tool name claimed by several servers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolCollision {
    pub tool: String,
    /// Claimants, in configuration order
    pub servers: Vec<String>,
}

impl From<&ToolCollision> for AgentError {
    fn from(collision: &ToolCollision) -> Self {
        AgentError::ToolNameCollision {
            tool: collision.tool.clone(),
            servers: collision.servers.clone(),
        }
    }
}

/// Aggregated view over all connected servers
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolCatalog {
    /// Sorted by name
    pub tools: Vec<AiTool>,
    pub routes: HashMap<String, String>,
    pub collisions: Vec<ToolCollision>,
}

impl ToolCatalog {
    pub fn server_for(&self, tool: &str) -> Option<&str> {
        self.routes.get(tool).map(String::as_str)
    }

    pub fn collision_errors(&self) -> Vec<AgentError> {
        self.collisions.iter().map(AgentError::from).collect()
    }
}

/// MCP descriptor to LLM tool. Field renaming only; the schema is untouched.
pub fn to_ai_tool(def: &McpToolDef) -> AiTool {
    AiTool {
        name: def.name.clone(),
        description: def.description.clone().unwrap_or_default(),
        input_schema: def.input_schema.clone(),
    }
}

/// Aggregate `(server, tools)` pairs, given in configuration order
pub fn aggregate<'a, I>(servers: I) -> ToolCatalog
where
    I: IntoIterator<Item = (&'a str, &'a [McpToolDef])>,
{
    let mut claims: BTreeMap<&'a str, Vec<(&'a str, &'a McpToolDef)>> = BTreeMap::new();
    for (server, tools) in servers {
        for def in tools {
            let owners = claims.entry(def.name.as_str()).or_default();
            if owners.iter().any(|(owner, _)| *owner == server) {
                debug!(server = %server, tool = %def.name, "Ignoring repeated tool within one server");
                continue;
            }
            owners.push((server, def));
        }
    }

    let mut catalog = ToolCatalog::default();
    for (name, owners) in claims {
        match owners.as_slice() {
            [(server, def)] => {
                catalog.tools.push(to_ai_tool(def));
                catalog.routes.insert(name.to_string(), server.to_string());
            }
            _ => {
                let servers: Vec<String> = owners.iter().map(|(s, _)| s.to_string()).collect();
                warn!(tool = %name, servers = ?servers, "Tool name collision, excluding tool");
                catalog.collisions.push(ToolCollision {
                    tool: name.to_string(),
                    servers,
                });
            }
        }
    }
    catalog
}
