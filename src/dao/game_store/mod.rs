#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::storage::StorageResult;
use crate::state::game::Game;
use futures::future::BoxFuture;
use uuid::Uuid;

pub use memory::MemoryGameStore;

/// Durable system of record for games.
///
/// Games are stored whole; the engine never patches parts of a record.
pub trait GameStore: Send + Sync {
    /// Insert a brand new game.
    fn create(&self, game: Game) -> BoxFuture<'static, StorageResult<()>>;
    /// Replace the stored copy of a game, inserting it when missing.
    fn update(&self, game: Game) -> BoxFuture<'static, StorageResult<()>>;
    fn find_by_id(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<Game>>>;
    /// Most recently created game using `code`, whatever its status.
    fn find_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Game>>>;
    /// Physically remove every game using `code`. Returns whether anything was deleted.
    fn delete(&self, code: String) -> BoxFuture<'static, StorageResult<bool>>;
    /// Every game whose status is not `ended`.
    fn list_unfinished(&self) -> BoxFuture<'static, StorageResult<Vec<Game>>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
