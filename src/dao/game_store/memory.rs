//! Process-local [`GameStore`], used when no database is configured and by tests.

use std::{
    collections::HashMap,
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    dao::{
        game_store::GameStore,
        storage::{StorageError, StorageResult},
    },
    state::game::{Game, GameStatus},
};

#[derive(Clone, Default)]
pub struct MemoryGameStore {
    games: Arc<RwLock<HashMap<Uuid, Game>>>,
    offline: Arc<AtomicBool>,
}

impl MemoryGameStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail as if the backend went away.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Stored copy of a game, bypassing the offline switch.
    pub async fn stored(&self, id: Uuid) -> Option<Game> {
        self.games.read().await.get(&id).cloned()
    }

    fn check_online(&self, operation: &str) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::unavailable(
                format!("in-memory store offline during {operation}"),
                io::Error::new(io::ErrorKind::NotConnected, "store offline"),
            ))
        } else {
            Ok(())
        }
    }
}

impl GameStore for MemoryGameStore {
    fn create(&self, game: Game) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("create")?;
            store.games.write().await.insert(game.id, game);
            Ok(())
        })
    }

    fn update(&self, game: Game) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("update")?;
            store.games.write().await.insert(game.id, game);
            Ok(())
        })
    }

    fn find_by_id(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<Game>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("find_by_id")?;
            Ok(store.games.read().await.get(&id).cloned())
        })
    }

    fn find_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Game>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("find_by_code")?;
            let games = store.games.read().await;
            Ok(games
                .values()
                .filter(|game| game.code == code)
                .max_by_key(|game| game.created_at)
                .cloned())
        })
    }

    fn delete(&self, code: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("delete")?;
            let mut games = store.games.write().await;
            let before = games.len();
            games.retain(|_, game| game.code != code);
            Ok(games.len() < before)
        })
    }

    fn list_unfinished(&self) -> BoxFuture<'static, StorageResult<Vec<Game>>> {
        let store = self.clone();
        Box::pin(async move {
            store.check_online("list_unfinished")?;
            let games = store.games.read().await;
            Ok(games
                .values()
                .filter(|game| game.status != GameStatus::Ended)
                .cloned()
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_online("health_check") })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.check_online("reconnect") })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::game::{GameSettings, Player};

    fn game(code: &str) -> Game {
        Game::new(code.into(), Player::new("host", "Host"), GameSettings::default())
    }

    #[tokio::test]
    async fn find_by_code_returns_the_latest_game() {
        let store = MemoryGameStore::new();
        let mut older = game("ABC123");
        older.status = GameStatus::Ended;
        older.created_at -= time::Duration::hours(2);
        let newer = game("ABC123");
        store.create(older.clone()).await.unwrap();
        store.create(newer.clone()).await.unwrap();

        let found = store.find_by_code("ABC123".into()).await.unwrap();
        assert_eq!(found.map(|g| g.id), Some(newer.id));

        let unfinished = store.list_unfinished().await.unwrap();
        assert_eq!(unfinished.len(), 1);
        assert_eq!(unfinished[0].id, newer.id);
    }

    #[tokio::test]
    async fn delete_removes_every_game_with_the_code() {
        let store = MemoryGameStore::new();
        store.create(game("ABC123")).await.unwrap();
        store.create(game("XYZ789")).await.unwrap();

        assert!(store.delete("ABC123".into()).await.unwrap());
        assert!(!store.delete("ABC123".into()).await.unwrap());
        assert!(store.find_by_code("ABC123".into()).await.unwrap().is_none());
        assert!(store.find_by_code("XYZ789".into()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn offline_store_rejects_calls() {
        let store = MemoryGameStore::new();
        store.set_offline(true);
        assert!(store.update(game("ABC123")).await.is_err());
        assert!(store.health_check().await.is_err());

        store.set_offline(false);
        assert!(store.health_check().await.is_ok());
    }
}
