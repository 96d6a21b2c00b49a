use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};
use uuid::Uuid;

/// Per-game mutual exclusion around read, mutate, persist and broadcast.
///
/// Different games never contend; operations on one game run one at a time.
#[derive(Default)]
pub struct GameGates {
    gates: DashMap<Uuid, Arc<Mutex<()>>>,
    codes: Mutex<()>,
}

impl GameGates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `game_id`.
    pub async fn lock(&self, game_id: Uuid) -> OwnedMutexGuard<()> {
        let gate = self.gates.entry(game_id).or_default().clone();
        gate.lock_owned().await
    }

    /// Serialize join-code allocation so two new games never pick the same free code.
    pub async fn lock_codes(&self) -> MutexGuard<'_, ()> {
        self.codes.lock().await
    }

    /// Drop the gate of a finished game unless someone still holds or waits on it.
    pub fn forget(&self, game_id: Uuid) {
        self.gates
            .remove_if(&game_id, |_, gate| Arc::strong_count(gate) == 1);
    }

    /// Number of gates currently allocated.
    pub fn len(&self) -> usize {
        self.gates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gates.is_empty()
    }
}
