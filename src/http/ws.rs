//! `GET /ws`: authenticated WebSocket that relays hub frames to the client.
//!
//! The bearer token comes from the `Authorization` header or the `token`
//! query parameter and is checked before the upgrade. The socket then joins
//! `user:<id>` and `role:<role>`. The stream is one-way; client messages
//! other than close are ignored.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::AppState;
use super::extract::{ApiQuery, bearer_token};
use crate::error::AppError;
use crate::notify::realtime::{Frame, role_channel, user_channel};
use crate::store::User;

#[derive(Deserialize)]
pub struct WsAuth {
    token: Option<String>,
}

/// Resolves the socket's user from header or query before upgrading.
pub struct WsUser(User);

impl FromRequestParts<AppState> for WsUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = match bearer_token(parts) {
            Some(t) => t.to_string(),
            None => {
                let ApiQuery(WsAuth { token }) = ApiQuery::<WsAuth>::from_request_parts(parts, state).await?;
                token.filter(|t| !t.is_empty()).ok_or_else(|| {
                    AppError::Authentication("Authentication error: no token provided.".into())
                })?
            }
        };
        state.auth.authenticate(&token).map(WsUser)
    }
}

pub async fn upgrade(State(state): State<AppState>, WsUser(user): WsUser, ws: WebSocketUpgrade) -> Response {
    let user_rx = state.hub.join(&user_channel(&user.id));
    let role_rx = state.hub.join(&role_channel(user.role));
    let shutdown = state.shutdown.clone();
    debug!(user_id = %user.id, role = %user.role, "websocket connected");
    ws.on_upgrade(move |socket| relay(socket, user.id, user_rx, role_rx, shutdown))
}

async fn relay(
    socket: WebSocket,
    user_id: String,
    mut user_rx: Receiver<Frame>,
    mut role_rx: Receiver<Frame>,
    shutdown: CancellationToken,
) {
    let (mut sink, mut stream) = socket.split();
    loop {
        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            f = user_rx.recv() => f,
            f = role_rx.recv() => f,
            msg = stream.next() => match msg {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            },
        };
        match frame {
            Ok(frame) => {
                if sink.send(Message::Text(frame.to_string().into())).await.is_err() {
                    break;
                }
            }
            Err(RecvError::Lagged(n)) => warn!(%user_id, skipped = n, "websocket client lagging"),
            Err(RecvError::Closed) => break,
        }
    }
    let _ = sink.close().await;
    debug!(%user_id, "websocket disconnected");
}
