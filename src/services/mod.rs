/// Inactivity sweep loop.
pub mod cleanup_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Wire event names and broadcast helpers.
pub mod events;
/// Pluggable decoy answer generation.
pub mod filler;
/// The session engine: lobby, turns, answers, votes and scoring.
pub mod game_service;
/// Health check service.
pub mod health_service;
/// Join code generation and validation.
pub mod join_code;
/// Free-text answer normalization and near-duplicate detection.
pub mod similarity;
/// Storage backend connection supervision.
pub mod storage_supervisor;
/// Per-connection WebSocket reader and writer tasks.
pub mod websocket_service;
