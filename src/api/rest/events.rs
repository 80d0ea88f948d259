use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::state::AppState;

/// GET /ws/events
///
/// Read-only feed of ride assignments for dashboards. Subscribers that fall
/// behind the broadcast buffer miss events rather than stall the dispatch
/// path.
pub async fn events_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut events = BroadcastStream::new(state.assignment_events_tx.subscribe());

    info!("assignment feed client connected");

    let send_task = tokio::spawn(async move {
        while let Some(event) = events.next().await {
            let assignment = match event {
                Ok(assignment) => assignment,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!(skipped, "assignment feed subscriber lagged");
                    continue;
                }
            };

            let json = match serde_json::to_string(&assignment) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize assignment for feed");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    info!("assignment feed client disconnected");
}
