//! WebSocket realtime stream
//!
//! Each dashboard connection gets the device list and the latest scan, then
//! every event published on the bus as one `{"event", "data"}` text frame.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use robridge_common::RealtimeEvent;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;

/// GET /ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();

    // Subscribe before building the seed so nothing falls in between
    let mut rx = state.broadcaster.subscribe();
    let seed = state.broadcaster.seed(state.registry.list());

    let (mut sender, mut receiver) = socket.split();
    info!(client_id = %client_id, "Dashboard connected");

    for event in &seed {
        if send_event(&mut sender, event).await.is_err() {
            debug!(client_id = %client_id, "Dashboard left during seed");
            return;
        }
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if send_event(&mut sender, &event).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(client_id = %client_id, skipped, "Dashboard lagging, events skipped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Dashboards do not send anything meaningful; drain until close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            if let Message::Close(_) = message {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!(client_id = %client_id, "Dashboard disconnected");
}

async fn send_event(
    sender: &mut SplitSink<WebSocket, Message>,
    event: &RealtimeEvent,
) -> Result<(), axum::Error> {
    match event.to_frame() {
        Ok(frame) => sender.send(Message::Text(frame)).await,
        Err(e) => {
            warn!(event = event.event_type(), error = %e, "Failed to serialize event");
            Ok(())
        }
    }
}
