//! Aggregated tool list endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use relay_core::mcp::ToolCollision;

use crate::AppState;

/// Build the tools router
pub fn router() -> Router<AppState> {
    Router::new().route("/", get(list_tools))
}

/// Tool info for API response
#[derive(Serialize)]
pub struct ToolResponse {
    pub name: String,
    pub description: String,
    pub server: String,
}

#[derive(Serialize)]
pub struct ToolsResponse {
    pub tools: Vec<ToolResponse>,
    /// Names left out because more than one server offers them
    pub collisions: Vec<ToolCollision>,
}

/// Tools the LLM is offered right now, with their owning server
async fn list_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    let catalog = state.agent.pool.aggregate();

    let tools = catalog
        .tools
        .iter()
        .map(|t| ToolResponse {
            name: t.name.clone(),
            description: t.description.clone(),
            server: catalog.server_for(&t.name).unwrap_or_default().to_string(),
        })
        .collect();

    Json(ToolsResponse {
        tools,
        collisions: catalog.collisions,
    })
}
