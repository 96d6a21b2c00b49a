use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Dahaa Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::events::PlayerDisconnected,
            crate::dto::events::TimerEvent,
            crate::dto::events::TimerEventType,
            crate::state::game::Game,
            crate::state::game::GameStatus,
            crate::state::game::GameSettings,
            crate::state::game::TimeLimits,
            crate::state::game::Player,
            crate::state::game::Round,
            crate::state::game::RoundStatus,
            crate::state::game::Turn,
            crate::state::game::TurnStatus,
            crate::state::game::AnswerPool,
            crate::state::game::Answer,
            crate::state::game::Timer,
            crate::state::game::TimerKind,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "games", description = "WebSocket stream of game events"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_routes_and_event_schemas() {
        let doc = ApiDoc::openapi();
        assert!(doc.paths.paths.contains_key("/ws"));
        assert!(doc.paths.paths.contains_key("/healthcheck"));

        let schemas = doc.components.expect("components").schemas;
        for name in ["Game", "TimerEvent", "PlayerDisconnected", "HealthResponse"] {
            assert!(schemas.contains_key(name), "missing schema {name}");
        }
    }
}
