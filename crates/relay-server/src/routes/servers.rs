//! Tool-server endpoints

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use relay_core::mcp::{ServerDescriptor, ServerStatus};

use crate::error::AppError;
use crate::AppState;

/// Build the servers router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_servers))
        .route("/:name/connect", post(connect_server))
        .route("/:name/tools", get(list_tools))
}

/// Server info for API response
#[derive(Serialize)]
pub struct ServerResponse {
    pub name: String,
    pub transport: String,
    pub endpoint: String,
    #[serde(flatten)]
    pub status: ServerStatus,
}

/// Tool info
#[derive(Serialize)]
pub struct ServerToolResponse {
    pub name: String,
    pub description: Option<String>,
}

fn describe(descriptor: &ServerDescriptor, status: ServerStatus) -> ServerResponse {
    let endpoint = match &descriptor.command {
        Some(command) if descriptor.args.is_empty() => command.clone(),
        Some(command) => format!("{} {}", command, descriptor.args.join(" ")),
        None => descriptor
            .endpoint()
            .map(|url| url.to_string())
            .unwrap_or_else(|_| descriptor.host.clone()),
    };
    ServerResponse {
        name: descriptor.name.clone(),
        transport: descriptor.transport.to_string(),
        endpoint,
        status,
    }
}

fn find(state: &AppState, name: &str) -> Result<ServerResponse, AppError> {
    let pool = &state.agent.pool;
    let descriptor = pool
        .descriptors()
        .find(|d| d.name == name)
        .ok_or_else(|| AppError::NotFound(format!("Server '{}' not configured", name)))?;
    let status = pool.status(name).unwrap_or(ServerStatus::Disconnected);
    Ok(describe(descriptor, status))
}

/// List every configured server and its status
async fn list_servers(State(state): State<AppState>) -> Json<Vec<ServerResponse>> {
    let pool = &state.agent.pool;
    let response = pool
        .descriptors()
        .map(|d| describe(d, pool.status(&d.name).unwrap_or(ServerStatus::Disconnected)))
        .collect();
    Json(response)
}

/// Connect a server; a live connection is left as is
async fn connect_server(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ServerResponse>, AppError> {
    find(&state, &name)?;
    state.agent.pool.connect(&name).await?;
    Ok(Json(find(&state, &name)?))
}

/// Tools currently advertised by one server
async fn list_tools(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<ServerToolResponse>>, AppError> {
    find(&state, &name)?;
    let tools = state.agent.pool.list_tools(&name).await?;
    Ok(Json(
        tools
            .into_iter()
            .map(|t| ServerToolResponse {
                name: t.name,
                description: t.description,
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::{build_router, testing};

    #[tokio::test]
    async fn unknown_server_is_not_found() {
        let app = build_router(testing::state());
        let response = app
            .oneshot(
                Request::post("/api/servers/nope/connect")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn empty_pool_lists_no_servers() {
        let app = build_router(testing::state());
        let response = app
            .oneshot(Request::get("/api/servers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"[]");
    }
}
