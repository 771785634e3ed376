use futures_util::sink::SinkExt;
use futures_util::stream::StreamExt;
use log::{debug, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;
use warp::ws::{Message, WebSocket, Ws};
use warp::{Rejection, Reply};

use crate::constants::MAX_FRAME_BYTES;
use crate::core::message_types::CLOSE_GOING_AWAY;
use crate::core::room::{normalize_room_id, RoomRegistry};
use crate::core::server::AppState;
use crate::error::GhostboxError;
use crate::handlers::api_error;

// Validate the room address before agreeing to upgrade
pub async fn handle_room_upgrade(
    raw_id: String,
    ws: Ws,
    state: AppState,
) -> Result<warp::reply::Response, Rejection> {
    let room_id = normalize_room_id(&raw_id).ok_or_else(|| api_error(GhostboxError::InvalidRoom))?;

    let room = state.rooms.get_or_create(&room_id).await.map_err(api_error)?;
    if !room.is_accepting() {
        return Err(api_error(GhostboxError::RoomExpired));
    }

    let rooms = Arc::clone(&state.rooms);
    Ok(ws
        .max_message_size(MAX_FRAME_BYTES)
        .on_upgrade(move |socket| handle_room_client(socket, room_id, rooms))
        .into_response())
}

// Pump one client socket into its room actor
pub async fn handle_room_client(ws: WebSocket, room_id: String, rooms: Arc<RoomRegistry>) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    // Forward outbound frames; a close frame is the last thing we write
    tokio::task::spawn(async move {
        let mut rx = rx;
        while let Some(message) = rx.recv().await {
            let closing = message.is_close();
            if let Err(e) = ws_tx.send(message).await {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }
            if closing {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    let conn_id = Uuid::new_v4().to_string();

    let room = match rooms.join(&room_id, conn_id.clone(), tx.clone()).await {
        Ok(room) => room,
        // The room already told the client and closed the socket
        Err(GhostboxError::RoomExpired) => return,
        Err(e) => {
            warn!("Failed to attach connection to room: {}", e);
            let _ = tx.send(Message::close_with(CLOSE_GOING_AWAY, "Unavailable"));
            return;
        }
    };

    loop {
        tokio::select! {
            frame = ws_rx.next() => match frame {
                Some(Ok(msg)) => {
                    if msg.is_close() {
                        break;
                    }
                    if msg.is_ping() || msg.is_pong() {
                        continue;
                    }
                    // Anything that is not text reaches the room as a malformed frame
                    let body = msg.to_str().ok().map(str::to_string);
                    if room.send_message(&conn_id, body).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    debug!("WebSocket error on {}: {}", conn_id, e);
                    break;
                }
                None => break,
            },
            // Writer is gone: the room closed this connection
            _ = tx.closed() => break,
        }
    }

    room.leave(&conn_id).await;
    debug!("Connection {} detached from room {}", conn_id, room.room_id());
}
