//! WebSocket upgrade: adapts a socket into the text stream/sink pair the
//! connection manager runs on.

use std::future;
use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use runtime::ConnectionManager;

use crate::AppState;

pub(crate) async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(state.manager, socket))
}

async fn handle_socket(manager: Arc<ConnectionManager>, socket: WebSocket) {
    let (sink, stream) = socket.split();

    let reader = stream
        .take_while(|message| future::ready(is_open(message)))
        .filter_map(|message| future::ready(message.ok().and_then(into_text)));
    let writer = sink.with(|text: String| future::ready(Ok::<_, axum::Error>(Message::Text(text.into()))));

    let id = manager.serve(reader, writer).await;
    tracing::debug!(connection = %id, "socket released");
}

/// The inbound side ends on a close frame or a transport error.
fn is_open(message: &Result<Message, axum::Error>) -> bool {
    match message {
        Ok(Message::Close(_)) => false,
        Ok(_) => true,
        Err(e) => {
            tracing::debug!("socket read failed: {e}");
            false
        }
    }
}

/// Text and binary frames carry protocol text; ping/pong are handled by the
/// transport.
fn into_text(message: Message) -> Option<String> {
    match message {
        Message::Text(text) => Some(text.as_str().to_owned()),
        Message::Binary(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}
