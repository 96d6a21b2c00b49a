use uuid::Uuid;

use crate::{
    dto::events::PlayerDisconnected,
    state::{
        SharedState,
        game::{Game, Player},
    },
};

pub const EVENT_GAME_CREATED: &str = "game_created";
pub const EVENT_PLAYER_JOINED: &str = "player_joined";
pub const EVENT_GAME_UPDATED: &str = "game_updated";
pub const EVENT_GAME_STARTED: &str = "game_started";
pub const EVENT_ROUND_ENDED: &str = "round_ended";
pub const EVENT_GAME_ENDED: &str = "game_ended";
pub const EVENT_PLAYER_RECONNECTED: &str = "player_reconnected";
pub const EVENT_PLAYER_DISCONNECTED: &str = "player_disconnected";

/// Broadcast a freshly created lobby.
pub async fn broadcast_game_created(state: &SharedState, game: &Game) {
    send_game_event(state, EVENT_GAME_CREATED, game).await;
}

/// Broadcast the player who just joined.
pub async fn broadcast_player_joined(state: &SharedState, game_id: Uuid, player: &Player) {
    state
        .hub
        .broadcast_to_game(game_id, EVENT_PLAYER_JOINED, player)
        .await;
}

/// Broadcast the full game after any persisted mutation.
pub async fn broadcast_game_updated(state: &SharedState, game: &Game) {
    send_game_event(state, EVENT_GAME_UPDATED, game).await;
}

pub async fn broadcast_game_started(state: &SharedState, game: &Game) {
    send_game_event(state, EVENT_GAME_STARTED, game).await;
}

/// Broadcast the game carrying the scores of the round that just closed.
pub async fn broadcast_round_ended(state: &SharedState, game: &Game) {
    send_game_event(state, EVENT_ROUND_ENDED, game).await;
}

pub async fn broadcast_game_ended(state: &SharedState, game: &Game) {
    send_game_event(state, EVENT_GAME_ENDED, game).await;
}

pub async fn broadcast_player_reconnected(state: &SharedState, game_id: Uuid, player: &Player) {
    state
        .hub
        .broadcast_to_game(game_id, EVENT_PLAYER_RECONNECTED, player)
        .await;
}

pub async fn broadcast_player_disconnected(state: &SharedState, game_id: Uuid, player_id: &str) {
    let payload = PlayerDisconnected::new(player_id);
    state
        .hub
        .broadcast_to_game(game_id, EVENT_PLAYER_DISCONNECTED, &payload)
        .await;
}

async fn send_game_event(state: &SharedState, event_type: &str, game: &Game) {
    state.hub.broadcast_to_game(game.id, event_type, game).await;
}
