//! Duplex connection lifecycle: accept, read loop, serialized writer, close.

use std::collections::HashMap;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt, Stream, StreamExt};
use protocol::{ClientFrame, CorrelationId, ServerFrame};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::Correlator;
use crate::tools::{Dispatcher, InvocationResult, ToolDescriptor, ToolError, ToolRegistry};
use crate::{Error, Result};

/// Default cap on calls in flight per connection.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 32;

/// Default number of outbound frames buffered per connection.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Default time a closing connection gets to flush queued frames.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Per-connection limits.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub max_in_flight: usize,
    pub queue_capacity: usize,
    pub close_grace: Duration,
    pub max_frame_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            close_grace: DEFAULT_CLOSE_GRACE,
            max_frame_bytes: protocol::MAX_FRAME_BYTES,
        }
    }
}

/// Unique identifier of a duplex connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Snapshot of a tracked connection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub state: ConnectionState,
    pub opened_at: DateTime<Utc>,
}

struct Entry {
    outbound: mpsc::Sender<ServerFrame>,
    state: watch::Receiver<ConnectionState>,
    close: CancellationToken,
    opened_at: DateTime<Utc>,
}

/// Owns every duplex connection and routes their calls through the
/// [`Dispatcher`].
pub struct ConnectionManager {
    dispatcher: Arc<Dispatcher>,
    config: ConnectionConfig,
    connections: Mutex<HashMap<ConnectionId, Entry>>,
    shutdown: CancellationToken,
}

impl ConnectionManager {
    pub fn new(dispatcher: Arc<Dispatcher>, config: ConnectionConfig) -> Self {
        Self {
            dispatcher,
            config,
            connections: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        self.dispatcher.registry()
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Track a new connection. It stays `Connecting` until [`Connection::run`].
    pub fn accept(self: &Arc<Self>) -> Connection {
        let id = ConnectionId::new();
        let (outbound, queue) = mpsc::channel(self.config.queue_capacity.max(1));
        let (state, state_rx) = watch::channel(ConnectionState::Connecting);
        let close = self.shutdown.child_token();

        self.entries().insert(
            id,
            Entry {
                outbound: outbound.clone(),
                state: state_rx,
                close: close.clone(),
                opened_at: Utc::now(),
            },
        );
        tracing::debug!(connection = %id, "connection accepted");

        Connection {
            registration: Registration {
                id,
                manager: self.clone(),
            },
            outbound,
            queue,
            close,
            state,
        }
    }

    /// Accept and run a connection to completion.
    pub async fn serve<R, W>(self: &Arc<Self>, reader: R, writer: W) -> ConnectionId
    where
        R: Stream<Item = String> + Unpin + Send,
        W: Sink<String> + Unpin + Send + 'static,
        W::Error: Display + Send,
    {
        let connection = self.accept();
        let id = connection.id();
        connection.run(reader, writer).await;
        id
    }

    /// Ask a connection to close. Returns `false` if it is already gone.
    pub fn close(&self, id: ConnectionId) -> bool {
        match self.entries().get(&id) {
            Some(entry) => {
                entry.close.cancel();
                true
            }
            None => false,
        }
    }

    /// Close every connection, current and future.
    pub fn shutdown(&self) {
        tracing::info!("closing all connections");
        self.shutdown.cancel();
    }

    /// Queue `frame` on every open connection. Returns how many accepted it.
    ///
    /// Connections whose outbound queue is full miss the frame.
    pub fn broadcast(&self, frame: ServerFrame) -> usize {
        let entries = self.entries();
        let mut delivered = 0;
        for (id, entry) in entries.iter() {
            if *entry.state.borrow() != ConnectionState::Open {
                continue;
            }
            match entry.outbound.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(connection = %id, "broadcast dropped: {e}"),
            }
        }
        delivered
    }

    /// Register a tool after startup and push the new listing to every
    /// open connection.
    pub async fn register_tool(&self, descriptor: ToolDescriptor) -> Result<Arc<ToolDescriptor>> {
        let registered = self.registry().register(descriptor).await?;
        let tools = self.registry().listings().await;
        let delivered = self.broadcast(ServerFrame::ToolsList { tools });
        tracing::debug!(tool = %registered.name, delivered, "broadcast updated tool list");
        Ok(registered)
    }

    pub fn connections(&self) -> Vec<ConnectionInfo> {
        self.entries()
            .iter()
            .map(|(id, entry)| ConnectionInfo {
                id: *id,
                state: *entry.state.borrow(),
                opened_at: entry.opened_at,
            })
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.entries().len()
    }

    fn remove(&self, id: ConnectionId) {
        self.entries().remove(&id);
    }

    // Critical sections never await or panic midway, so a poisoned map is
    // still consistent.
    fn entries(&self) -> MutexGuard<'_, HashMap<ConnectionId, Entry>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Removes the connection from the manager when dropped.
struct Registration {
    id: ConnectionId,
    manager: Arc<ConnectionManager>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.manager.remove(self.id);
    }
}

/// An accepted duplex connection, ready to run.
pub struct Connection {
    registration: Registration,
    outbound: mpsc::Sender<ServerFrame>,
    queue: mpsc::Receiver<ServerFrame>,
    close: CancellationToken,
    state: watch::Sender<ConnectionState>,
}

impl Connection {
    pub fn id(&self) -> ConnectionId {
        self.registration.id
    }

    /// Watch this connection's lifecycle state.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Run the read loop until the peer disconnects, the writer fails or the
    /// connection is closed.
    ///
    /// `reader` yields inbound text frames in arrival order; `writer` receives
    /// outbound frames one at a time. Calls still pending at close are
    /// dropped without a response.
    pub async fn run<R, W>(self, mut reader: R, writer: W)
    where
        R: Stream<Item = String> + Unpin + Send,
        W: Sink<String> + Unpin + Send + 'static,
        W::Error: Display + Send,
    {
        let Connection {
            registration,
            outbound,
            queue,
            close,
            state,
        } = self;
        let id = registration.id;
        let manager = registration.manager.clone();

        state.send_replace(ConnectionState::Open);
        tracing::info!(connection = %id, "connection open");

        let mut writer_task = tokio::spawn(write_frames(id, queue, writer));
        let outbound = Outbound { sender: outbound, close };
        let mut correlator = Correlator::new(manager.config.max_in_flight);
        let mut in_flight = InFlight::default();

        let welcome = ServerFrame::ToolsList {
            tools: manager.registry().listings().await,
        };

        let reason = if !outbound.send(welcome).await {
            outbound.stop_reason()
        } else {
            loop {
                tokio::select! {
                    _ = outbound.close.cancelled() => break "closed by server",
                    _ = outbound.sender.closed() => break "writer closed",
                    message = reader.next() => {
                        let Some(text) = message else {
                            break "peer disconnected";
                        };
                        let written = handle_text(
                            &manager,
                            id,
                            &text,
                            &mut correlator,
                            &mut in_flight,
                            &outbound,
                        )
                        .await;
                        if !written {
                            break outbound.stop_reason();
                        }
                    }
                    Some((correlation_id, result)) = in_flight.next(), if !in_flight.is_empty() => {
                        if let Some(frame) = correlator.resolve(correlation_id, result) {
                            if !outbound.send(frame).await {
                                break outbound.stop_reason();
                            }
                        }
                    }
                }
            }
        };

        state.send_replace(ConnectionState::Closing);
        in_flight.shutdown().await;
        let discarded = correlator.discard_all();

        // Drop every sender so the writer sees the end of the queue.
        drop(registration);
        drop(outbound);

        let grace = manager.config.close_grace;
        if tokio::time::timeout(grace, &mut writer_task).await.is_err() {
            writer_task.abort();
            tracing::warn!(connection = %id, "outbound queue not drained within {grace:?}");
        }

        state.send_replace(ConnectionState::Closed);
        tracing::info!(connection = %id, reason, discarded, "connection closed");
    }
}

/// Sending half of a connection's outbound queue, tied to its close token.
struct Outbound {
    sender: mpsc::Sender<ServerFrame>,
    close: CancellationToken,
}

impl Outbound {
    /// Queue `frame` for the writer. Returns `false` once the writer is gone
    /// or the connection is closing, even while the queue is full.
    async fn send(&self, frame: ServerFrame) -> bool {
        tokio::select! {
            sent = self.sender.send(frame) => sent.is_ok(),
            _ = self.close.cancelled() => false,
        }
    }

    fn stop_reason(&self) -> &'static str {
        if self.close.is_cancelled() {
            "closed by server"
        } else {
            "writer closed"
        }
    }
}

/// Dispatch tasks of one connection, each tagged with its correlation id.
#[derive(Default)]
struct InFlight {
    tasks: JoinSet<InvocationResult>,
    ids: HashMap<task::Id, CorrelationId>,
}

impl InFlight {
    fn spawn<F>(&mut self, correlation_id: CorrelationId, call: F)
    where
        F: Future<Output = InvocationResult> + Send + 'static,
    {
        let handle = self.tasks.spawn(call);
        self.ids.insert(handle.id(), correlation_id);
    }

    fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Next finished call. A task that died without a result still answers
    /// its caller, so the correlation slot is always released.
    async fn next(&mut self) -> Option<(CorrelationId, InvocationResult)> {
        loop {
            let (task, result) = match self.tasks.join_next_with_id().await? {
                Ok(done) => done,
                Err(e) => {
                    tracing::error!("dispatch task failed: {e}");
                    let failure = InvocationResult::failure(ToolError::HandlerError(
                        "dispatch task failed".to_string(),
                    ));
                    (e.id(), failure)
                }
            };
            if let Some(correlation_id) = self.ids.remove(&task) {
                return Some((correlation_id, result));
            }
        }
    }

    /// Abort every call and wait until each task has been dropped.
    async fn shutdown(&mut self) {
        self.tasks.shutdown().await;
        self.ids.clear();
    }
}

/// Handle one inbound text frame. Returns `false` once the writer is gone
/// or the connection is closing.
async fn handle_text(
    manager: &ConnectionManager,
    id: ConnectionId,
    text: &str,
    correlator: &mut Correlator,
    in_flight: &mut InFlight,
    outbound: &Outbound,
) -> bool {
    let frame = match ClientFrame::parse(text, manager.config.max_frame_bytes) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!(connection = %id, "protocol error: {e}");
            return outbound
                .send(ServerFrame::protocol_error(e.to_string()))
                .await;
        }
    };

    let reply = match frame {
        ClientFrame::ListTools => ServerFrame::ToolsList {
            tools: manager.registry().listings().await,
        },
        ClientFrame::Invoke {
            correlation_id,
            tool,
            parameters,
        } => match correlator.register(correlation_id.clone(), &tool) {
            Ok(()) => {
                tracing::debug!(connection = %id, correlation_id = %correlation_id, tool = %tool, "invoke");
                let dispatcher = manager.dispatcher.clone();
                in_flight.spawn(correlation_id, async move {
                    dispatcher.dispatch(&tool, Value::Object(parameters)).await
                });
                return true;
            }
            Err(Error::InFlightLimit { limit }) => {
                tracing::warn!(connection = %id, correlation_id = %correlation_id, limit, "rejecting call: overloaded");
                InvocationResult::failure(ToolError::Overloaded(limit)).into_frame(correlation_id)
            }
            Err(e) => {
                tracing::warn!(connection = %id, "protocol error: {e}");
                ServerFrame::ProtocolError {
                    message: e.to_string(),
                    correlation_id: Some(correlation_id),
                }
            }
        },
    };

    outbound.send(reply).await
}

async fn write_frames<W>(id: ConnectionId, mut queue: mpsc::Receiver<ServerFrame>, mut writer: W)
where
    W: Sink<String> + Unpin,
    W::Error: Display,
{
    while let Some(frame) = queue.recv().await {
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(connection = %id, "failed to encode frame: {e}");
                continue;
            }
        };
        if let Err(e) = writer.send(text).await {
            tracing::debug!(connection = %id, "write failed: {e}");
            return;
        }
    }
    let _ = writer.close().await;
}
