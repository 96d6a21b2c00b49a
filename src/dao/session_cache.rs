//! Expiring in-process cache of serialized games, keyed `game:<id>`.

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::warn;
use uuid::Uuid;

use crate::state::game::{Game, GameStatus};

const KEY_PREFIX: &str = "game:";

struct CacheEntry {
    payload: String,
    expires_at: Instant,
}

/// Session cache: serialized games with a TTL, plus a join-code index for live games.
pub struct SessionCache {
    entries: DashMap<String, CacheEntry>,
    codes: DashMap<String, Uuid>,
    ttl: Duration,
}

impl SessionCache {
    /// Empty cache whose entries live `ttl` after their last write.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            codes: DashMap::new(),
            ttl,
        }
    }

    /// Cache key of a game.
    pub fn key(id: Uuid) -> String {
        format!("{KEY_PREFIX}{id}")
    }

    /// Cached game if present and not expired. Expired entries are dropped on the way.
    pub fn get(&self, id: Uuid) -> Result<Option<Game>, serde_json::Error> {
        let key = Self::key(id);
        let payload = match self.entries.get(&key) {
            Some(entry) if entry.expires_at > Instant::now() => entry.payload.clone(),
            Some(entry) => {
                drop(entry);
                self.remove(id);
                return Ok(None);
            }
            None => return Ok(None),
        };
        serde_json::from_str(&payload).map(Some)
    }

    /// Store a game, restarting its TTL.
    pub fn put(&self, game: &Game) -> Result<(), serde_json::Error> {
        let payload = serde_json::to_string(game)?;
        self.entries.insert(
            Self::key(game.id),
            CacheEntry {
                payload,
                expires_at: Instant::now() + self.ttl,
            },
        );

        if game.status == GameStatus::Ended {
            self.codes.remove_if(&game.code, |_, id| *id == game.id);
        } else {
            self.codes.insert(game.code.clone(), game.id);
        }
        Ok(())
    }

    /// Evict a game and its code index entry. No-op when absent.
    pub fn remove(&self, id: Uuid) {
        self.entries.remove(&Self::key(id));
        self.codes.retain(|_, cached| *cached != id);
    }

    /// Id of the live cached game using `code`, if any.
    pub fn lookup_code(&self, code: &str) -> Option<Uuid> {
        let id = *self.codes.get(code)?;
        let alive = self
            .entries
            .get(&Self::key(id))
            .is_some_and(|entry| entry.expires_at > Instant::now());
        if alive {
            Some(id)
        } else {
            self.remove(id);
            None
        }
    }

    /// Every unexpired cached game. Entries that fail to decode are evicted.
    pub fn games(&self) -> Vec<Game> {
        let now = Instant::now();
        let snapshot: Vec<(String, String)> = self
            .entries
            .iter()
            .filter(|entry| entry.expires_at > now)
            .map(|entry| (entry.key().clone(), entry.payload.clone()))
            .collect();

        let mut games = Vec::with_capacity(snapshot.len());
        for (key, payload) in snapshot {
            match serde_json::from_str::<Game>(&payload) {
                Ok(game) => games.push(game),
                Err(err) => {
                    warn!(key = %key, error = %err, "evicting undecodable cache entry");
                    self.entries.remove(&key);
                }
            }
        }
        games
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let live = &self.entries;
        self.codes
            .retain(|_, id| live.contains_key(&Self::key(*id)));
        before.saturating_sub(self.entries.len())
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entry at all.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
