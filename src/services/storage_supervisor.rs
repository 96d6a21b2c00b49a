use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{game_store::GameStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the storage backend and keep the game store in degraded mode while it is unavailable.
///
/// Runs forever: once connected it polls the backend health, tries a bounded number of
/// in-place reconnects on failure, and falls back to a fresh `connect` when those run out.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn GameStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.games.install_backend(store.clone()).await;
                info!("storage connection established; leaving degraded mode");
                delay = INITIAL_DELAY;

                supervise(&state, store.as_ref()).await;

                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Poll `store` until it fails and cannot be reconnected in place.
async fn supervise(state: &SharedState, store: &dyn GameStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.games.is_degraded() {
                    info!("storage healthy again; leaving degraded mode");
                    state.games.update_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(err) => {
                warn!(error = %err, "storage health check failed");
                if reconnect(state, store).await {
                    state.games.update_degraded(false);
                    sleep(HEALTH_POLL_INTERVAL).await;
                } else {
                    warn!("exhausted storage reconnect attempts; staying in degraded mode");
                    return;
                }
            }
        }
    }
}

async fn reconnect(state: &SharedState, store: &dyn GameStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(attempt, "storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt, error = %err,
                        "storage reconnect first attempt failed; entering degraded mode"
                    );
                    state.games.update_degraded(true);
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::{
        io,
        sync::atomic::{AtomicU32, Ordering},
    };

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{game_store::MemoryGameStore, question_bank::StaticQuestionBank},
        state::AppState,
    };

    #[tokio::test(start_paused = true)]
    async fn retries_until_connected_then_tracks_backend_health() {
        let state = AppState::new(AppConfig::default(), Arc::new(StaticQuestionBank::default()));
        let backend = MemoryGameStore::new();
        let calls = Arc::new(AtomicU32::new(0));

        let supervisor = {
            let backend = backend.clone();
            let calls = calls.clone();
            tokio::spawn(run(state.clone(), move || {
                let backend = backend.clone();
                let attempt = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt == 0 {
                        Err(StorageError::unavailable(
                            "first attempt refused".into(),
                            io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
                        ))
                    } else {
                        Ok(Arc::new(backend) as Arc<dyn GameStore>)
                    }
                }
            }))
        };

        let mut degraded = state.games.degraded_watcher();
        degraded.wait_for(|value| !*value).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        backend.set_offline(true);
        degraded.wait_for(|value| *value).await.unwrap();

        backend.set_offline(false);
        degraded.wait_for(|value| !*value).await.unwrap();

        supervisor.abort();
    }
}
