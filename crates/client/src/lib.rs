//! Capstan WebSocket client.
//!
//! Connects to a Capstan server's `/ws` endpoint, keeps the advertised tool
//! catalogue current, and matches each `result` frame to the call that is
//! waiting for it by correlation id. Calls may run concurrently and resolve
//! in any order.
//!
//! ```no_run
//! # async fn demo() -> client::Result<()> {
//! let client = client::Client::connect("ws://127.0.0.1:8089/ws").await?;
//! println!("tools: {:?}", client.tool_names());
//! let found = client
//!     .call("file_search", serde_json::json!({"directory": ".", "pattern": "*.rs"}))
//!     .await?;
//! println!("{found}");
//! client.disconnect().await;
//! # Ok(())
//! # }
//! ```

mod error;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use protocol::{ClientFrame, CorrelationId, Outcome, ServerFrame, ToolListing};
use serde_json::{Map, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use uuid::Uuid;

pub use error::{Error, Result};

/// Default wait for a call's result, and for the handshake.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Default server endpoint.
pub const DEFAULT_URL: &str = "ws://localhost:8089/ws";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub call_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }
}

/// State shared between the caller side and the listener task.
#[derive(Default)]
struct Shared {
    tools: RwLock<Vec<ToolListing>>,
    pending: Mutex<Pending>,
}

/// Calls awaiting a result. `open` flips to `false` under the same lock that
/// clears the waiters, so no call can register after the listener is gone.
#[derive(Default)]
struct Pending {
    open: bool,
    waiters: HashMap<CorrelationId, oneshot::Sender<Result<Value>>>,
}

impl Shared {
    fn pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_tools(&self, tools: Vec<ToolListing>) {
        *self.tools.write().unwrap_or_else(PoisonError::into_inner) = tools;
    }

    fn tools(&self) -> Vec<ToolListing> {
        self.tools
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn complete(&self, id: &CorrelationId, reply: Result<Value>) {
        match self.pending().waiters.remove(id) {
            Some(waiter) => {
                let _ = waiter.send(reply);
            }
            None => tracing::debug!(correlation_id = %id, "result for unknown call"),
        }
    }

    /// Mark the connection gone. Dropping the waiters wakes every caller.
    fn close(&self) -> usize {
        let mut pending = self.pending();
        pending.open = false;
        let dropped = pending.waiters.len();
        pending.waiters.clear();
        dropped
    }
}

/// A live connection to a Capstan server.
pub struct Client {
    shared: Arc<Shared>,
    outbound: mpsc::UnboundedSender<String>,
    listener: JoinHandle<()>,
    writer: JoinHandle<()>,
    config: ClientConfig,
}

impl Client {
    /// Connect with default settings and wait for the initial tool listing.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with(url, ClientConfig::default()).await
    }

    pub async fn connect_with(url: &str, config: ClientConfig) -> Result<Self> {
        tracing::info!(url, "connecting");
        let (socket, _) = connect_async(url).await?;
        let (sink, mut stream) = socket.split();

        let tools = match tokio::time::timeout(config.call_timeout, next_frame(&mut stream)).await {
            Ok(Some(ServerFrame::ToolsList { tools })) => tools,
            Ok(Some(other)) => {
                return Err(Error::Handshake(format!(
                    "expected tools_list, got {}",
                    frame_type(&other)
                )));
            }
            Ok(None) => return Err(Error::Handshake("connection closed".to_string())),
            Err(_) => {
                return Err(Error::Handshake(format!(
                    "no tool listing within {:?}",
                    config.call_timeout
                )));
            }
        };
        tracing::info!(url, tools = tools.len(), "connected");

        let shared = Arc::new(Shared::default());
        shared.set_tools(tools);
        shared.pending().open = true;

        let (outbound, queue) = mpsc::unbounded_channel();
        let writer = tokio::spawn(write_messages(sink, queue));
        let listener = tokio::spawn(listen(stream, shared.clone()));

        Ok(Self {
            shared,
            outbound,
            listener,
            writer,
            config,
        })
    }

    pub fn is_connected(&self) -> bool {
        self.shared.pending().open
    }

    /// The most recent tool listing pushed by the server.
    pub fn tools(&self) -> Vec<ToolListing> {
        self.shared.tools()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.shared
            .tools()
            .into_iter()
            .map(|tool| tool.name)
            .collect()
    }

    pub fn tool(&self, name: &str) -> Option<ToolListing> {
        self.shared.tools().into_iter().find(|tool| tool.name == name)
    }

    /// Invoke `tool` and wait for its result.
    ///
    /// `parameters` must be a JSON object or `null`. A tool missing from the
    /// cached listing fails locally without a round trip.
    pub async fn call(&self, tool: &str, parameters: Value) -> Result<Value> {
        let parameters = match parameters {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => return Err(Error::Parameters(other)),
        };
        if self.tool(tool).is_none() {
            return Err(Error::UnknownTool(tool.to_string()));
        }

        let correlation_id = CorrelationId::String(Uuid::new_v4().to_string());
        let frame = ClientFrame::Invoke {
            correlation_id: correlation_id.clone(),
            tool: tool.to_string(),
            parameters,
        };
        let text = serde_json::to_string(&frame)?;

        let (waiter, reply) = oneshot::channel();
        {
            let mut pending = self.shared.pending();
            if !pending.open {
                return Err(Error::Disconnected);
            }
            pending.waiters.insert(correlation_id.clone(), waiter);
        }

        if self.outbound.send(text).is_err() {
            self.shared.pending().waiters.remove(&correlation_id);
            return Err(Error::Disconnected);
        }
        tracing::debug!(correlation_id = %correlation_id, tool, "call sent");

        match tokio::time::timeout(self.config.call_timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Disconnected),
            Err(_) => {
                self.shared.pending().waiters.remove(&correlation_id);
                tracing::warn!(correlation_id = %correlation_id, tool, "call timed out");
                Err(Error::Timeout {
                    tool: tool.to_string(),
                    timeout: self.config.call_timeout,
                })
            }
        }
    }

    /// Close the socket and wait briefly for the server to acknowledge.
    pub async fn disconnect(self) {
        let Client {
            shared,
            outbound,
            mut listener,
            writer,
            config: _,
        } = self;
        drop(outbound);
        let closed = tokio::time::timeout(Duration::from_secs(1), async {
            let _ = writer.await;
            let _ = (&mut listener).await;
        })
        .await;
        if closed.is_err() {
            listener.abort();
            shared.close();
        }
        tracing::info!("disconnected");
    }
}

/// Connect, run one call, and disconnect.
pub async fn execute(url: &str, tool: &str, parameters: Value) -> Result<Value> {
    let client = Client::connect(url).await?;
    let result = client.call(tool, parameters).await;
    client.disconnect().await;
    result
}

async fn write_messages(
    mut sink: SplitSink<Socket, Message>,
    mut queue: mpsc::UnboundedReceiver<String>,
) {
    while let Some(text) = queue.recv().await {
        if let Err(e) = sink.send(Message::Text(text)).await {
            tracing::debug!("write failed: {e}");
            return;
        }
    }
    let _ = sink.close().await;
}

async fn listen(mut stream: SplitStream<Socket>, shared: Arc<Shared>) {
    while let Some(frame) = next_frame(&mut stream).await {
        match frame {
            ServerFrame::ToolsList { tools } => {
                tracing::debug!(tools = tools.len(), "tool listing updated");
                shared.set_tools(tools);
            }
            ServerFrame::Result {
                correlation_id,
                outcome,
            } => {
                let reply = match outcome {
                    Outcome::Success { payload } => Ok(payload),
                    Outcome::Error { error } => Err(Error::Tool(error)),
                };
                shared.complete(&correlation_id, reply);
            }
            ServerFrame::ProtocolError {
                message,
                correlation_id: Some(id),
            } => shared.complete(&id, Err(Error::Protocol(message))),
            ServerFrame::ProtocolError {
                message,
                correlation_id: None,
            } => tracing::warn!("server reported protocol error: {message}"),
        }
    }
    let dropped = shared.close();
    tracing::info!(dropped, "connection closed");
}

/// Next decodable server frame, or `None` once the socket is done.
async fn next_frame(stream: &mut SplitStream<Socket>) -> Option<ServerFrame> {
    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(bytes)) => String::from_utf8_lossy(&bytes).into_owned(),
            Ok(Message::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!("read failed: {e}");
                return None;
            }
        };
        match serde_json::from_str(&text) {
            Ok(frame) => return Some(frame),
            Err(e) => tracing::warn!("undecodable frame: {e}"),
        }
    }
    None
}

fn frame_type(frame: &ServerFrame) -> &'static str {
    match frame {
        ServerFrame::ToolsList { .. } => "tools_list",
        ServerFrame::Result { .. } => "result",
        ServerFrame::ProtocolError { .. } => "protocol_error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::extract::ws::{Message as ServerMessage, WebSocketUpgrade};
    use axum::routing::get;
    use protocol::{FailureKind, ParamSpec, ParamType, ParameterSchema};
    use runtime::{
        ConnectionConfig, ConnectionManager, DispatchConfig, Dispatcher, ToolDescriptor,
        ToolRegistry, handler_fn,
    };
    use serde_json::json;
    use server::AppState;
    use tokio::net::TcpListener;

    const WAIT: Duration = Duration::from_secs(5);

    struct TestServer {
        url: String,
        manager: Arc<ConnectionManager>,
        stop: oneshot::Sender<()>,
        task: JoinHandle<server::Result<()>>,
    }

    impl TestServer {
        async fn start() -> Self {
            let registry = Arc::new(ToolRegistry::new());
            let tools = [
                ToolDescriptor::new(
                    "echo",
                    "Echoes a message",
                    ParameterSchema::new()
                        .field("message", ParamSpec::new(ParamType::String).required()),
                    handler_fn(|params| async move { Ok(json!({ "echo": params.str("message") })) }),
                ),
                ToolDescriptor::new(
                    "sleepy",
                    "Sleeps for `ms` milliseconds",
                    ParameterSchema::new()
                        .field("ms", ParamSpec::new(ParamType::Integer).required()),
                    handler_fn(|params| async move {
                        let ms = params.i64("ms").unwrap_or(0).max(0) as u64;
                        tokio::time::sleep(Duration::from_millis(ms)).await;
                        Ok(json!({ "slept": ms }))
                    }),
                ),
            ];
            for tool in tools {
                registry.register(tool).await.unwrap();
            }
            let dispatcher = Arc::new(Dispatcher::new(registry, DispatchConfig::default()));
            let manager = Arc::new(ConnectionManager::new(
                dispatcher,
                ConnectionConfig::default(),
            ));

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let url = format!("ws://{}/ws", listener.local_addr().unwrap());
            let (stop, stopped) = oneshot::channel::<()>();
            let task = tokio::spawn(server::serve(
                listener,
                AppState::new(manager.clone()),
                async {
                    let _ = stopped.await;
                },
            ));
            Self {
                url,
                manager,
                stop,
                task,
            }
        }

        async fn stop(self) {
            self.stop.send(()).unwrap();
            tokio::time::timeout(WAIT, self.task)
                .await
                .unwrap()
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn connect_caches_tool_listing() {
        let server = TestServer::start().await;
        let client = Client::connect(&server.url).await.unwrap();

        assert!(client.is_connected());
        assert_eq!(client.tool_names(), vec!["echo", "sleepy"]);
        let echo = client.tool("echo").unwrap();
        assert!(echo.parameter_schema.get("message").unwrap().required);
        assert!(client.tool("missing").is_none());

        client.disconnect().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn call_returns_payload() {
        let server = TestServer::start().await;
        let client = Client::connect(&server.url).await.unwrap();

        let payload = client
            .call("echo", json!({"message": "over the wire"}))
            .await
            .unwrap();
        assert_eq!(payload, json!({"echo": "over the wire"}));

        client.disconnect().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn concurrent_calls_resolve_out_of_order() {
        let server = TestServer::start().await;
        let client = Arc::new(Client::connect(&server.url).await.unwrap());
        let (done, mut finished) = mpsc::unbounded_channel();

        for ms in [300, 10] {
            let client = client.clone();
            let done = done.clone();
            tokio::spawn(async move {
                let payload = client.call("sleepy", json!({"ms": ms})).await.unwrap();
                done.send(payload).unwrap();
            });
        }

        let first = tokio::time::timeout(WAIT, finished.recv()).await.unwrap().unwrap();
        let second = tokio::time::timeout(WAIT, finished.recv()).await.unwrap().unwrap();
        assert_eq!(first, json!({"slept": 10}));
        assert_eq!(second, json!({"slept": 300}));
        assert!(client.shared.pending().waiters.is_empty());

        server.stop().await;
    }

    #[tokio::test]
    async fn remote_failure_is_typed() {
        let server = TestServer::start().await;
        let client = Client::connect(&server.url).await.unwrap();

        match client.call("echo", json!({})).await {
            Err(Error::Tool(body)) => {
                assert_eq!(body.kind, FailureKind::InvalidParameters);
                assert_eq!(body.field.as_deref(), Some("message"));
            }
            other => panic!("expected tool failure, got {other:?}"),
        }

        client.disconnect().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_parameters_fail_locally() {
        let server = TestServer::start().await;
        let client = Client::connect(&server.url).await.unwrap();

        assert!(matches!(
            client.call("nonexistent", json!({})).await,
            Err(Error::UnknownTool(name)) if name == "nonexistent"
        ));
        assert!(matches!(
            client.call("echo", json!([1, 2])).await,
            Err(Error::Parameters(_))
        ));

        client.disconnect().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn slow_call_times_out_and_is_forgotten() {
        let server = TestServer::start().await;
        let config = ClientConfig {
            call_timeout: Duration::from_millis(50),
        };
        let client = Client::connect_with(&server.url, config).await.unwrap();

        match client.call("sleepy", json!({"ms": 500})).await {
            Err(Error::Timeout { tool, timeout }) => {
                assert_eq!(tool, "sleepy");
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(client.shared.pending().waiters.is_empty());

        // The late result is dropped and the connection keeps working.
        tokio::time::sleep(Duration::from_millis(600)).await;
        let payload = client.call("echo", json!({"message": "still here"})).await;
        assert_eq!(payload.unwrap(), json!({"echo": "still here"}));

        client.disconnect().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn late_registration_updates_catalogue() {
        let server = TestServer::start().await;
        let client = Client::connect(&server.url).await.unwrap();

        server
            .manager
            .register_tool(ToolDescriptor::new(
                "ping",
                "Answers pong",
                ParameterSchema::new(),
                handler_fn(|_| async { Ok(json!("pong")) }),
            ))
            .await
            .unwrap();

        tokio::time::timeout(WAIT, async {
            while client.tool("ping").is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(client.call("ping", Value::Null).await.unwrap(), json!("pong"));

        client.disconnect().await;
        server.stop().await;
    }

    #[tokio::test]
    async fn server_shutdown_fails_pending_calls() {
        let server = TestServer::start().await;
        let client = Arc::new(Client::connect(&server.url).await.unwrap());

        let pending = tokio::spawn({
            let client = client.clone();
            async move { client.call("sleepy", json!({"ms": 5_000})).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        server.stop().await;
        let result = tokio::time::timeout(WAIT, pending).await.unwrap().unwrap();
        assert!(matches!(result, Err(Error::Disconnected)));
        assert!(!client.is_connected());
        assert!(matches!(
            client.call("echo", json!({"message": "x"})).await,
            Err(Error::Disconnected)
        ));
    }

    #[tokio::test]
    async fn execute_runs_one_call() {
        let server = TestServer::start().await;

        let payload = execute(&server.url, "echo", json!({"message": "once"}))
            .await
            .unwrap();
        assert_eq!(payload, json!({"echo": "once"}));
        assert!(matches!(
            execute(&server.url, "missing", json!({})).await,
            Err(Error::UnknownTool(_))
        ));

        tokio::time::timeout(WAIT, async {
            while server.manager.connection_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        server.stop().await;
    }

    #[tokio::test]
    async fn handshake_requires_tool_listing() {
        let app = Router::new().route(
            "/ws",
            get(|ws: WebSocketUpgrade| async {
                ws.on_upgrade(|mut socket| async move {
                    let hello = json!({"type": "protocol_error", "message": "go away"});
                    let _ = socket
                        .send(ServerMessage::Text(hello.to_string().into()))
                        .await;
                })
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        tokio::spawn(async move { axum::serve(listener, app).await });

        match Client::connect(&url).await {
            Err(Error::Handshake(message)) => assert!(message.contains("protocol_error")),
            Err(other) => panic!("expected handshake error, got {other:?}"),
            Ok(_) => panic!("handshake should fail"),
        }
    }
}
