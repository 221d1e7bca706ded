//! Capstan HTTP and WebSocket transport.
//!
//! Exposes the runtime over axum: synchronous invocation on
//! `POST /tools/{name}` and duplex connections on `GET /ws`, both ending up
//! in the same [`runtime::Dispatcher`].

mod error;
mod http;
mod ws;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use runtime::ConnectionManager;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub use error::{Error, Result};

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ConnectionManager>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self {
            manager,
            started_at: Utc::now(),
        }
    }
}

/// Build the router with every route and a permissive CORS layer.
pub fn app_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(http::root))
        .route("/health", get(http::health))
        .route("/tools", get(http::list_tools))
        .route("/tools/{name}", post(http::invoke_tool))
        .route("/ws", get(ws::ws_handler))
        .with_state(state)
        .layer(cors)
}

/// Serve until `shutdown` resolves, then close every duplex connection and
/// wait for in-progress requests.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let manager = state.manager.clone();
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(async move {
            shutdown.await;
            manager.shutdown();
        })
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::time::Duration;

    use protocol::{ParamSpec, ParamType, ParameterSchema};
    use runtime::{
        ConnectionConfig, DispatchConfig, Dispatcher, HandlerError, ToolDescriptor, ToolRegistry,
        handler_fn,
    };
    use serde_json::json;

    use super::*;

    pub async fn state(dispatch: DispatchConfig) -> AppState {
        let registry = Arc::new(ToolRegistry::new());
        let tools = [
            ToolDescriptor::new(
                "echo",
                "Echoes a message",
                ParameterSchema::new().field("message", ParamSpec::new(ParamType::String).required()),
                handler_fn(|params| async move { Ok(json!({ "echo": params.str("message") })) }),
            ),
            ToolDescriptor::new(
                "failing",
                "Always fails",
                ParameterSchema::new(),
                handler_fn(|_| async { Err(HandlerError::new("disk on fire")) }),
            ),
            ToolDescriptor::new(
                "sleepy",
                "Sleeps for a second",
                ParameterSchema::new(),
                handler_fn(|_| async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok(json!("awake"))
                }),
            ),
        ];
        for tool in tools {
            registry.register(tool).await.unwrap();
        }
        let dispatcher = Arc::new(Dispatcher::new(registry, dispatch));
        AppState::new(Arc::new(ConnectionManager::new(
            dispatcher,
            ConnectionConfig::default(),
        )))
    }
}
