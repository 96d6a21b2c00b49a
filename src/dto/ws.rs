use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, IntoParams)]
/// Query string of the WebSocket upgrade.
pub struct WsQuery {
    /// Game whose events the socket receives.
    pub game_id: Uuid,
    /// Player behind the socket, when it belongs to one. Drives presence tracking.
    #[validate(length(min = 1, max = 128))]
    pub player_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_id_is_optional_but_not_empty() {
        let id = Uuid::new_v4();
        let watcher = WsQuery {
            game_id: id,
            player_id: None,
        };
        assert!(watcher.validate().is_ok());

        let empty = WsQuery {
            game_id: id,
            player_id: Some(String::new()),
        };
        assert!(empty.validate().is_err());
    }
}
