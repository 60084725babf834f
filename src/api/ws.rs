//! WebSocket fan-out for session stream events
//!
//! Grounded on the teacher's `api/sse.rs`: a broadcast receiver wrapped in a
//! `BroadcastStream`. `tokio::sync::broadcast` never blocks a slow reader — it
//! overwrites the ring buffer and the reader sees `Lagged` on its next `recv()` —
//! which is how the channel itself avoids blocking the publisher. Unlike the
//! teacher, a lagged subscriber here is dropped outright (spec §4.2/§5: a
//! subscriber that falls behind must be disconnected, not silently resynced, so a
//! client can never observe e.g. an `agent.end` for a message whose `agent.start`
//! it missed).

use crate::runtime::StreamEvent;
use axum::extract::ws::{Message, WebSocket};
use std::time::Duration;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Drive a single WebSocket connection from a session's broadcast receiver until the
/// client disconnects, the session's broadcast channel is dropped, or this subscriber
/// falls behind the broadcast (in which case the connection is closed rather than
/// resumed mid-stream).
pub async fn run_session_socket(mut socket: WebSocket, broadcast_rx: tokio::sync::broadcast::Receiver<StreamEvent>) {
    let mut events = BroadcastStream::new(broadcast_rx);

    let mut keepalive = tokio::time::interval(KEEPALIVE_INTERVAL);
    keepalive.tick().await; // first tick fires immediately

    loop {
        tokio::select! {
            event = events.next() => {
                match event {
                    Some(Ok(event)) => {
                        let Ok(payload) = serde_json::to_string(&event) else { continue };
                        if socket.send(Message::Text(payload)).await.is_err() {
                            break;
                        }
                    }
                    Some(Err(_lagged)) => break, // subscriber fell behind: drop the connection
                    None => break,
                }
            }
            _ = keepalive.tick() => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}
