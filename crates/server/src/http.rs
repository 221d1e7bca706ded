//! Synchronous HTTP routes.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use protocol::{FailureKind, ToolListing};
use runtime::tools::PAYLOAD_FIELD;
use runtime::{InvocationRequest, InvocationResult, ToolError};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ServerInfo {
    name: &'static str,
    status: &'static str,
    version: &'static str,
    tools_count: usize,
    started_at: DateTime<Utc>,
    connections: usize,
}

#[derive(Debug, Serialize)]
pub(crate) struct ToolsResponse {
    tools: Vec<ToolListing>,
}

pub(crate) async fn root(State(state): State<AppState>) -> Json<ServerInfo> {
    Json(ServerInfo {
        name: "capstan",
        status: "running",
        version: env!("CARGO_PKG_VERSION"),
        tools_count: state.manager.registry().len().await,
        started_at: state.started_at,
        connections: state.manager.connection_count(),
    })
}

pub(crate) async fn health() -> &'static str {
    "ok"
}

pub(crate) async fn list_tools(State(state): State<AppState>) -> Json<ToolsResponse> {
    Json(ToolsResponse {
        tools: state.manager.registry().listings().await,
    })
}

/// `POST /tools/{name}`: the body is the raw parameter object.
pub(crate) async fn invoke_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let raw = if body.is_empty() {
        Value::Object(Map::new())
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::debug!(tool = %name, "rejecting unparsable body: {e}");
                return respond(InvocationResult::failure(ToolError::InvalidParameters {
                    field: PAYLOAD_FIELD.to_string(),
                    reason: format!("body is not valid JSON: {e}"),
                }));
            }
        }
    };

    let result = state
        .manager
        .dispatcher()
        .invoke(InvocationRequest::new(name, raw))
        .await;
    respond(result)
}

fn respond(result: InvocationResult) -> Response {
    let status = match result.error() {
        Some(error) => status_for(error.kind()),
        None => StatusCode::OK,
    };
    (status, Json(result.into_outcome())).into_response()
}

pub(crate) fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::UnknownTool => StatusCode::NOT_FOUND,
        FailureKind::InvalidParameters => StatusCode::UNPROCESSABLE_ENTITY,
        FailureKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FailureKind::HandlerError => StatusCode::INTERNAL_SERVER_ERROR,
        FailureKind::Overloaded => StatusCode::SERVICE_UNAVAILABLE,
    }
}
