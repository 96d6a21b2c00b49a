use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{MissedTickBehavior, interval, timeout},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    error::ErrorKind,
    services::game_service,
    state::{SharedState, hub::Frame},
};

/// Handle the full lifecycle of a socket watching `game_id`.
///
/// Events queued by the hub are forwarded by a dedicated writer task. Inbound frames are
/// read only to notice the peer going away; their content is ignored.
pub async fn handle_socket(
    state: SharedState,
    socket: WebSocket,
    game_id: Uuid,
    player_id: Option<String>,
) {
    let (sender, mut receiver) = socket.split();
    let registration = state.hub.register(game_id).await;
    let connection_id = registration.id;
    let writer_task = spawn_writer(&state, sender, registration.outbound);
    info!(%game_id, connection_id, player_id = ?player_id, "websocket connected");

    if let Some(player_id) = player_id.as_deref() {
        report_presence(&state, game_id, player_id, true).await;
    }

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                debug!(%game_id, connection_id, error = %err, "websocket receive error");
                break;
            }
        }
    }

    finalize(&state, connection_id, writer_task).await;
    if let Some(player_id) = player_id.as_deref() {
        report_presence(&state, game_id, player_id, false).await;
    }
    info!(%game_id, connection_id, "websocket disconnected");
}

/// Forward hub frames to the socket and keep it alive with periodic pings.
///
/// Stops when the hub closes the queue, a write fails, or a write exceeds its deadline.
fn spawn_writer(
    state: &SharedState,
    mut sender: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Frame>,
) -> JoinHandle<()> {
    let ping_interval = state.config.hub.ping_interval;
    let write_timeout = state.config.hub.write_timeout;

    tokio::spawn(async move {
        let mut ping = interval(ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ping.tick().await;

        loop {
            let message = tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(frame) => Message::Text(frame.as_ref().into()),
                    None => {
                        let _ = timeout(write_timeout, sender.send(Message::Close(None))).await;
                        break;
                    }
                },
                _ = ping.tick() => Message::Ping(Vec::new().into()),
            };

            match timeout(write_timeout, sender.send(message)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    debug!(error = %err, "websocket write failed");
                    break;
                }
                Err(_) => {
                    warn!("websocket write timed out");
                    break;
                }
            }
        }
    })
}

async fn finalize(state: &SharedState, connection_id: u64, writer_task: JoinHandle<()>) {
    state.hub.unregister(connection_id).await;
    let _ = writer_task.await;
}

async fn report_presence(state: &SharedState, game_id: Uuid, player_id: &str, connected: bool) {
    let result = if connected {
        game_service::handle_player_reconnection(state, game_id, player_id).await
    } else {
        game_service::handle_player_disconnection(state, game_id, player_id).await
    };

    if let Err(err) = result {
        match err.kind() {
            ErrorKind::Infrastructure => {
                warn!(%game_id, player_id, connected, error = %err, "failed to record presence");
            }
            _ => debug!(%game_id, player_id, connected, error = %err, "presence not recorded"),
        }
    }
}
