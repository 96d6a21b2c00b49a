use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::ws::WsQuery, error::AppError, services::websocket_service, state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws",
    params(WsQuery),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 400, description = "Malformed query string"),
        (status = 404, description = "Unknown game"),
        (status = 503, description = "Storage unavailable")
    )
)]
/// Upgrade the HTTP connection into a socket receiving the events of one game.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<WsQuery>>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let game = state.games.get(query.game_id).await?;
    let max_message_size = state.config.hub.max_message_size;
    let shared_state = state.clone();
    Ok(ws
        .max_message_size(max_message_size)
        .on_upgrade(move |socket| {
            websocket_service::handle_socket(shared_state, socket, game.id, query.player_id)
        }))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
