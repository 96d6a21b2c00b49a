/// Durable game storage and its backends.
pub mod game_store;
/// Question bank collaborator.
pub mod question_bank;
/// Expiring cache of serialized games.
pub mod session_cache;
/// Storage error types shared by every backend.
pub mod storage;
