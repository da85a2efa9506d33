use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{api, AppState};
use crate::sync::message::Frame;

/// `/` doubles as the WebSocket endpoint; plain browsers get the status page.
pub async fn root(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    state: State<AppState>,
) -> Response {
    match ws {
        Ok(ws) => upgrade(state, ws).await.into_response(),
        Err(_) => api::status_page(state).await.into_response(),
    }
}

pub async fn upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(state, socket))
}

async fn handle_ws(state: AppState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();

    // Register before the writer starts so the first status update is queued
    // for this connection too.
    let (outbound, mut frames) = mpsc::unbounded_channel::<Frame>();
    let id = state.registry.register(outbound);

    let send_task = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if sender.send(Message::Text((&*frame).into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => state.protocol.process(id, text.as_str()),
            Ok(Message::Binary(bin)) => match std::str::from_utf8(&bin) {
                Ok(text) => state.protocol.process(id, text),
                Err(err) => warn!(connection = %id, error = %err, "ignoring non-utf8 binary frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                debug!(connection = %id, error = %err, "websocket read failed");
                break;
            }
        }
    }

    // Dropping the registry's handle closes the writer's channel.
    state.registry.deregister(id);
    let _ = send_task.await;
}
