use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use roomcast_hub::{Connection, ConnectionError, Frame, TransportReader, TransportWriter};
use roomcast_protocol::{encode_batch, Message};
use tracing::info;

use crate::app::AppState;

/// Axum handler — upgrades HTTP to WebSocket at GET /ws.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Hand the upgraded socket to the core: join the hub, then serve until the
/// connection's own loop decides it is done.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (sink, stream) = socket.split();
    let (conn, handle) = Connection::new(Arc::clone(&state.hub), state.config.connection.clone());
    let conn_id = conn.id();
    info!(%conn_id, "new WS connection");

    state.hub.join(handle);
    conn.serve(WsReader { stream }, WsWriter { sink }).await;

    info!(%conn_id, "WS connection closed");
}

struct WsReader {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl TransportReader for WsReader {
    async fn read_frame(&mut self) -> Result<Frame, ConnectionError> {
        loop {
            return match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    let msg: Message = serde_json::from_str(&text)?;
                    Ok(Frame::Message(msg))
                }
                Some(Ok(WsMessage::Pong(_))) => Ok(Frame::Pong),
                Some(Ok(WsMessage::Close(_))) | None => Ok(Frame::Closed),
                // binary frames and client pings (answered by the stack)
                Some(Ok(_)) => continue,
                Some(Err(e)) => Err(ConnectionError::Transport(e.to_string())),
            };
        }
    }
}

struct WsWriter {
    sink: SplitSink<WebSocket, WsMessage>,
}

#[async_trait]
impl TransportWriter for WsWriter {
    async fn write_batch(&mut self, batch: &[Arc<Message>]) -> Result<(), ConnectionError> {
        let payload = encode_batch(batch)?;
        self.sink
            .send(WsMessage::Text(payload.into()))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn write_ping(&mut self) -> Result<(), ConnectionError> {
        self.sink
            .send(WsMessage::Ping(Default::default()))
            .await
            .map_err(|e| ConnectionError::Transport(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}
