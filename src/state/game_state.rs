//! Read-through game state store: the session cache in front of the durable backend.

use std::{sync::Arc, time::Duration};

use tokio::sync::{RwLock, watch};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{game_store::GameStore, session_cache::SessionCache},
    error::GameError,
    state::game::{Game, GameStatus},
};

/// Cache plus durable store, with a degraded flag raised while the backend is unusable.
pub struct GameStateStore {
    backend: RwLock<Option<Arc<dyn GameStore>>>,
    cache: SessionCache,
    degraded: watch::Sender<bool>,
}

impl GameStateStore {
    /// Empty store; it stays degraded until a backend is installed.
    pub fn new(cache_ttl: Duration) -> Self {
        let (degraded, _rx) = watch::channel(true);
        Self {
            backend: RwLock::new(None),
            cache: SessionCache::new(cache_ttl),
            degraded,
        }
    }

    /// Install a backend and leave degraded mode.
    pub async fn install_backend(&self, store: Arc<dyn GameStore>) {
        *self.backend.write().await = Some(store);
        self.update_degraded(false);
    }

    /// Currently installed backend, degraded or not.
    pub async fn backend(&self) -> Option<Arc<dyn GameStore>> {
        self.backend.read().await.as_ref().cloned()
    }

    /// Backend usable for operations, or [`GameError::Degraded`].
    pub async fn require_backend(&self) -> Result<Arc<dyn GameStore>, GameError> {
        if self.is_degraded() {
            return Err(GameError::Degraded);
        }
        self.backend().await.ok_or(GameError::Degraded)
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update the degraded flag, notifying watchers only on change.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != value;
            *current = value;
            changed
        });
    }

    /// The session cache.
    pub fn cache(&self) -> &SessionCache {
        &self.cache
    }

    /// Cached game, or the durable copy which is then cached again.
    ///
    /// Ended games read from the durable store are returned but not cached.
    pub async fn get(&self, id: Uuid) -> Result<Game, GameError> {
        match self.cache.get(id) {
            Ok(Some(game)) => return Ok(game),
            Ok(None) => {}
            Err(err) => {
                warn!(game_id = %id, error = %err, "evicting undecodable cached game");
                self.cache.remove(id);
            }
        }

        let backend = self.require_backend().await?;
        let game = backend
            .find_by_id(id)
            .await?
            .ok_or(GameError::GameNotFound)?;
        if game.status != GameStatus::Ended {
            self.cache.put(&game)?;
            debug!(game_id = %id, "cache refilled from durable store");
        }
        Ok(game)
    }

    /// Resolve a join code: the cache index for live games, else the durable store.
    pub async fn get_by_code(&self, code: &str) -> Result<Game, GameError> {
        if let Some(id) = self.cache.lookup_code(code) {
            match self.get(id).await {
                Ok(game) if game.code == code => return Ok(game),
                Ok(_) | Err(GameError::GameNotFound) => {}
                Err(err) => return Err(err),
            }
        }

        let backend = self.require_backend().await?;
        let game = backend
            .find_by_code(code.to_string())
            .await?
            .ok_or(GameError::GameNotFound)?;
        if game.status != GameStatus::Ended {
            self.cache.put(&game)?;
        }
        Ok(game)
    }

    /// Whether a non-ended game already uses `code`.
    pub async fn code_in_use(&self, code: &str) -> Result<bool, GameError> {
        if self.cache.lookup_code(code).is_some() {
            return Ok(true);
        }
        let backend = self.require_backend().await?;
        Ok(backend
            .find_by_code(code.to_string())
            .await?
            .is_some_and(|game| game.status != GameStatus::Ended))
    }

    /// Durable insert of a new game, then cache it.
    pub async fn create(&self, game: &Game) -> Result<(), GameError> {
        let backend = self.require_backend().await?;
        backend.create(game.clone()).await?;
        self.cache.put(game)?;
        Ok(())
    }

    /// Durable write first; the cache is only refreshed once it succeeded.
    ///
    /// Ended games leave the cache instead of being refreshed.
    pub async fn put(&self, game: &Game) -> Result<(), GameError> {
        let backend = self.require_backend().await?;
        backend.update(game.clone()).await?;
        if game.status == GameStatus::Ended {
            self.cache.remove(game.id);
        } else {
            self.cache.put(game)?;
        }
        Ok(())
    }

    /// Evict a game from the cache. The durable record is kept.
    pub fn delete(&self, id: Uuid) {
        self.cache.remove(id);
    }

    /// Every unfinished game known to the durable store.
    pub async fn durable_unfinished(&self) -> Result<Vec<Game>, GameError> {
        let backend = self.require_backend().await?;
        Ok(backend.list_unfinished().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dao::game_store::MemoryGameStore,
        state::game::{GameSettings, Player},
    };

    const TTL: Duration = Duration::from_secs(60);

    async fn store_with_backend() -> (GameStateStore, MemoryGameStore) {
        let backend = MemoryGameStore::new();
        let store = GameStateStore::new(TTL);
        store.install_backend(Arc::new(backend.clone())).await;
        (store, backend)
    }

    fn game() -> Game {
        Game::new("ABC123".into(), Player::new("host", "Host"), GameSettings::default())
    }

    #[tokio::test]
    async fn starts_degraded_until_a_backend_is_installed() {
        let store = GameStateStore::new(TTL);
        assert!(store.is_degraded());
        assert!(matches!(store.put(&game()).await, Err(GameError::Degraded)));

        store.install_backend(Arc::new(MemoryGameStore::new())).await;
        assert!(!store.is_degraded());
    }

    #[tokio::test]
    async fn failed_durable_write_leaves_cache_untouched() {
        let (store, backend) = store_with_backend().await;
        let mut game = game();
        store.create(&game).await.unwrap();

        backend.set_offline(true);
        game.players.push(Player::new("p2", "Second"));
        let result = store.put(&game).await;

        assert!(matches!(result, Err(GameError::Storage(_))));
        let cached = store.cache().get(game.id).unwrap().unwrap();
        assert_eq!(cached.players.len(), 1);
    }

    #[tokio::test]
    async fn cache_miss_reads_through_and_refills() {
        let (store, backend) = store_with_backend().await;
        let game = game();
        store.create(&game).await.unwrap();

        store.delete(game.id);
        assert!(store.cache().get(game.id).unwrap().is_none());
        assert!(backend.stored(game.id).await.is_some());

        assert_eq!(store.get(game.id).await.unwrap(), game);
        assert!(store.cache().get(game.id).unwrap().is_some());
    }

    #[tokio::test]
    async fn missing_everywhere_is_not_found() {
        let (store, _backend) = store_with_backend().await;
        assert!(matches!(
            store.get(Uuid::new_v4()).await,
            Err(GameError::GameNotFound)
        ));
        assert!(matches!(
            store.get_by_code("NOPE12").await,
            Err(GameError::GameNotFound)
        ));
    }

    #[tokio::test]
    async fn codes_resolve_through_cache_then_durable_store() {
        let (store, _backend) = store_with_backend().await;
        let mut game = game();
        store.create(&game).await.unwrap();
        assert!(store.code_in_use("ABC123").await.unwrap());
        assert_eq!(store.get_by_code("ABC123").await.unwrap().id, game.id);

        store.delete(game.id);
        assert_eq!(store.get_by_code("ABC123").await.unwrap().id, game.id);

        game.status = GameStatus::Ended;
        store.put(&game).await.unwrap();
        assert!(store.cache().get(game.id).unwrap().is_none());
        assert!(!store.code_in_use("ABC123").await.unwrap());
        assert_eq!(
            store.get_by_code("ABC123").await.unwrap().status,
            GameStatus::Ended
        );
    }
}
