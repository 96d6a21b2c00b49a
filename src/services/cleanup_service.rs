use tokio::time::{MissedTickBehavior, interval};
use tracing::info;

use crate::{services::game_service, state::SharedState};

/// Periodically end idle games and purge expired cache entries. Never returns.
pub async fn run(state: SharedState) {
    let period = state.config.sweep_interval;
    info!(
        interval_secs = period.as_secs(),
        threshold_secs = state.config.inactivity_threshold.as_secs(),
        "inactivity sweep started"
    );

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        ticker.tick().await;
        game_service::cleanup_inactive_games(&state).await;
    }
}
