use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::verify_driver_token;
use crate::error::AuthError;
use crate::models::driver::ApprovalStatus;
use crate::protocol::DriverEvent;
use crate::state::AppState;

/// Close code for a handshake that failed on our side, not the driver's.
const CLOSE_INTERNAL: u16 = 1011;

#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// GET /ws/driver?token=JWT
///
/// The handshake always upgrades; a failed authentication is answered with
/// an immediate close frame so the client sees the specific close code
/// instead of a bare HTTP error.
pub async fn driver_ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match authenticate(&state, params.token.as_deref()).await {
        Ok(driver_id) => {
            info!(driver_id = %driver_id, "driver websocket authenticated");
            ws.on_upgrade(move |socket| run_connection(socket, state, driver_id))
        }
        Err(rejection) => {
            let (code, reason) = rejection.close_reason();
            warn!(close_code = code, reason = reason, "driver websocket rejected");

            ws.on_upgrade(move |mut socket| async move {
                let frame = CloseFrame {
                    code,
                    reason: reason.into(),
                };
                let _ = socket.send(Message::Close(Some(frame))).await;
            })
        }
    }
}

enum Rejection {
    Auth(AuthError),
    StoreDown,
}

impl Rejection {
    fn close_reason(&self) -> (u16, &'static str) {
        match self {
            Rejection::Auth(err) => {
                let reason = match err {
                    AuthError::MissingToken => "token required",
                    AuthError::InvalidToken => "token invalid",
                    AuthError::DriverNotFound => "unknown driver",
                    AuthError::DriverNotApproved => "driver not approved",
                };
                (err.close_code(), reason)
            }
            Rejection::StoreDown => (CLOSE_INTERNAL, "temporary failure"),
        }
    }
}

/// Token first, then the driver record. Only an approved driver with a valid
/// token gets a live connection.
async fn authenticate(state: &AppState, token: Option<&str>) -> Result<Uuid, Rejection> {
    let token = token.ok_or(Rejection::Auth(AuthError::MissingToken))?;
    let driver_id =
        verify_driver_token(state.jwt_secret.as_bytes(), token).map_err(Rejection::Auth)?;

    let profile = state
        .drivers
        .find_by_id(driver_id)
        .await
        .map_err(|err| {
            warn!(driver_id = %driver_id, error = %err, "driver lookup failed during handshake");
            Rejection::StoreDown
        })?
        .ok_or(Rejection::Auth(AuthError::DriverNotFound))?;

    if profile.approval_status != ApprovalStatus::Approved {
        return Err(Rejection::Auth(AuthError::DriverNotApproved));
    }

    Ok(driver_id)
}

/// One task per driver connection. The sink is owned by a writer task fed
/// from an mpsc channel, so the presence registry can push frames without
/// touching the socket; the reader loop below applies the driver's commands
/// in arrival order.
async fn run_connection(socket: WebSocket, state: Arc<AppState>, driver_id: Uuid) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let conn_id = state.presence.register(driver_id, tx.clone()).await;
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    info!(driver_id = %driver_id, conn_id, "driver connected");

    loop {
        match ws_receiver.next().await {
            Some(Ok(Message::Text(text))) => {
                dispatch_frame(&state, driver_id, conn_id, &text).await;
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = tx.send(Message::Pong(data));
            }
            Some(Ok(Message::Close(_))) => {
                info!(driver_id = %driver_id, "driver initiated close");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                warn!(driver_id = %driver_id, error = %err, "websocket receive error");
                break;
            }
            None => break,
        }
    }

    writer_handle.abort();
    state.engine.disconnected(driver_id, conn_id).await;

    info!(driver_id = %driver_id, conn_id, "driver connection closed");
}

async fn writer_task(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            break;
        }
    }
}

/// A frame that does not parse as a known command is logged and dropped;
/// it never tears down the connection.
async fn dispatch_frame(state: &AppState, driver_id: Uuid, conn_id: u64, text: &str) {
    let event = match serde_json::from_str::<DriverEvent>(text) {
        Ok(event) => event,
        Err(err) => {
            warn!(driver_id = %driver_id, error = %err, "ignoring malformed frame");
            return;
        }
    };

    match event {
        DriverEvent::GoOnline { location } => {
            state.engine.driver_online(driver_id, conn_id, location).await;
        }
        DriverEvent::GoOffline => {
            state.engine.driver_offline(driver_id, conn_id).await;
        }
        DriverEvent::AcceptRide { ride_id } => {
            state.engine.accept_ride(driver_id, conn_id, ride_id).await;
        }
    }
}
