//! WebSocket surface for the central replica: each connection is handed a
//! freshly minted client id and a `welcome` handshake carrying the
//! replica's full history (spec.md §6), then tied to the replica's
//! subscription bus so it receives every subsequent op as a `downstream`
//! message (spec.md §4.3's `tieToSocket`).

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

use protocol::{DownstreamMessage, WelcomeMessage};
use rga::{deliver_inbound, tie_outbound, Op, OpSink, Sink};

use crate::state::ServerState;

pub fn router(state: ServerState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(websocket_handler))
        .route("/health", get(health))
        .layer(cors)
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn websocket_handler(State(state): State<ServerState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Forwards the central replica's broadcasts to this connection as
/// `downstream` JSON text frames.
struct WsOutbound {
    tx: mpsc::UnboundedSender<Message>,
}

impl Sink for WsOutbound {
    fn deliver(&self, op: Op) {
        let msg: DownstreamMessage = op.into();
        match serde_json::to_string(&msg) {
            Ok(text) => {
                let _ = self.tx.send(Message::Text(text.into()));
            }
            Err(err) => tracing::error!(?err, "failed to serialize downstream op"),
        }
    }
}

async fn handle_socket(socket: WebSocket, state: ServerState) {
    let client_id = match state.next_client_id() {
        Some(id) => id,
        None => {
            tracing::error!("client id space exhausted, refusing connection");
            return;
        }
    };
    tracing::info!(client_id, "client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let welcome = WelcomeMessage {
        id: client_id,
        history: state.replica.history(),
    };
    let welcome_text = match serde_json::to_string(&welcome) {
        Ok(text) => text,
        Err(err) => {
            tracing::error!(?err, client_id, "failed to serialize welcome message");
            return;
        }
    };
    if tx.send(Message::Text(welcome_text.into())).is_err() {
        return;
    }

    let sink_id = tie_outbound(&state.replica, Arc::new(WsOutbound { tx: tx.clone() }));

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_tx.send(msg).await.is_err() {
                break;
            }
        }
    });

    let op_sink: Arc<dyn OpSink> = state.replica.clone();
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<DownstreamMessage>(&text) {
                Ok(wire) => {
                    if let Err(err) = deliver_inbound(&op_sink, wire.into(), sink_id) {
                        tracing::warn!(?err, client_id, "rejected downstream op, closing");
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(?err, client_id, "malformed downstream message");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.replica.off(sink_id);
    send_task.abort();
    tracing::info!(client_id, "client disconnected");
}
