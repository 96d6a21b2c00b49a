//! Application-level configuration loading: game defaults, cache lifetimes and hub sizing.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::{DurationSeconds, serde_as};
use tracing::{info, warn};

use crate::state::game::{GameSettings, TimeLimits};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "DAHAA_BACK_CONFIG_PATH";

const DAY: Duration = Duration::from_secs(24 * 60 * 60);
/// Periodic tasks never tick faster than this.
const MIN_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Settings applied when a game is created without explicit ones.
    pub default_settings: GameSettings,
    /// Lifetime of a cached game, counted from its last write.
    pub cache_ttl: Duration,
    /// Idle period after which the sweep force-ends a game.
    pub inactivity_threshold: Duration,
    /// Period of the inactivity sweep.
    pub sweep_interval: Duration,
    /// How many random join codes are tried before giving up.
    pub code_attempts: u32,
    /// Upper bound on template synthesis attempts while filling a pool.
    pub filler_attempts: u32,
    /// Connection hub sizing.
    pub hub: HubConfig,
}

#[derive(Debug, Clone, Copy)]
/// Buffer sizes and socket cadence for the connection hub.
pub struct HubConfig {
    /// Capacity of the command queue feeding the dispatch loop.
    pub command_capacity: usize,
    /// Capacity of each connection's outbound queue; a full queue drops the connection.
    pub outbound_capacity: usize,
    /// Interval between pings sent by connection writers.
    pub ping_interval: Duration,
    /// Deadline for a single frame write.
    pub write_timeout: Duration,
    /// Largest inbound frame accepted from a client.
    pub max_message_size: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            command_capacity: 1024,
            outbound_capacity: 256,
            ping_interval: Duration::from_secs(54),
            write_timeout: Duration::from_secs(10),
            max_message_size: 512,
        }
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        rounds = app_config.default_settings.rounds,
                        max_players = app_config.default_settings.max_players,
                        "loaded application config"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_settings: GameSettings::default(),
            cache_ttl: DAY,
            inactivity_threshold: DAY,
            sweep_interval: Duration::from_secs(60 * 60),
            code_attempts: 3,
            filler_attempts: 20,
            hub: HubConfig::default(),
        }
    }
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
///
/// Every field is optional; missing ones keep their built-in value.
struct RawConfig {
    #[serde(default)]
    rounds: Option<u32>,
    #[serde(default)]
    max_players: Option<usize>,
    #[serde(default)]
    categories: Option<Vec<String>>,
    #[serde(default)]
    time_limits: Option<RawTimeLimits>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    cache_ttl_secs: Option<Duration>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    inactivity_threshold_secs: Option<Duration>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    sweep_interval_secs: Option<Duration>,
    #[serde(default)]
    code_attempts: Option<u32>,
    #[serde(default)]
    filler_attempts: Option<u32>,
    #[serde(default)]
    hub: Option<RawHubConfig>,
}

#[derive(Debug, Deserialize)]
/// Per-phase durations, in seconds.
struct RawTimeLimits {
    category_selection: u32,
    answer_writing: u32,
    voting: u32,
}

#[serde_as]
#[derive(Debug, Deserialize)]
struct RawHubConfig {
    #[serde(default)]
    command_capacity: Option<usize>,
    #[serde(default)]
    outbound_capacity: Option<usize>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    ping_interval_secs: Option<Duration>,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    #[serde(default)]
    write_timeout_secs: Option<Duration>,
    #[serde(default)]
    max_message_size: Option<usize>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();

        let mut settings = defaults.default_settings;
        if let Some(rounds) = value.rounds {
            settings.rounds = rounds.max(1);
        }
        if let Some(max_players) = value.max_players {
            settings.max_players = max_players.max(2);
        }
        if let Some(categories) = value.categories {
            settings.selected_categories = categories;
        }
        if let Some(limits) = value.time_limits {
            settings.time_limits = limits.into();
        }

        Self {
            default_settings: settings,
            cache_ttl: value.cache_ttl_secs.unwrap_or(defaults.cache_ttl),
            inactivity_threshold: value
                .inactivity_threshold_secs
                .unwrap_or(defaults.inactivity_threshold),
            sweep_interval: value
                .sweep_interval_secs
                .unwrap_or(defaults.sweep_interval)
                .max(MIN_PERIOD),
            code_attempts: value.code_attempts.unwrap_or(defaults.code_attempts).max(1),
            filler_attempts: value.filler_attempts.unwrap_or(defaults.filler_attempts),
            hub: value.hub.map(Into::into).unwrap_or(defaults.hub),
        }
    }
}

impl From<RawTimeLimits> for TimeLimits {
    fn from(value: RawTimeLimits) -> Self {
        Self {
            category_selection: value.category_selection.max(1),
            answer_writing: value.answer_writing.max(1),
            voting: value.voting.max(1),
        }
    }
}

impl From<RawHubConfig> for HubConfig {
    fn from(value: RawHubConfig) -> Self {
        let defaults = HubConfig::default();
        Self {
            command_capacity: value
                .command_capacity
                .unwrap_or(defaults.command_capacity)
                .max(1),
            outbound_capacity: value
                .outbound_capacity
                .unwrap_or(defaults.outbound_capacity)
                .max(1),
            ping_interval: value
                .ping_interval_secs
                .unwrap_or(defaults.ping_interval)
                .max(MIN_PERIOD),
            write_timeout: value.write_timeout_secs.unwrap_or(defaults.write_timeout),
            max_message_size: value.max_message_size.unwrap_or(defaults.max_message_size),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_keeps_defaults() {
        let raw: RawConfig = serde_json::from_str("{}").unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.default_settings, GameSettings::default());
        assert_eq!(config.cache_ttl, DAY);
        assert_eq!(config.code_attempts, 3);
        assert_eq!(config.hub.outbound_capacity, 256);
        assert_eq!(config.hub.max_message_size, 512);
    }

    #[test]
    fn overrides_are_applied_and_clamped() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "rounds": 0,
                "max_players": 1,
                "categories": ["movies", "music"],
                "time_limits": {"category_selection": 20, "answer_writing": 45, "voting": 0},
                "cache_ttl_secs": 60,
                "sweep_interval_secs": 5,
                "hub": {"outbound_capacity": 8, "ping_interval_secs": 30}
            }"#,
        )
        .unwrap();
        let config: AppConfig = raw.into();

        assert_eq!(config.default_settings.rounds, 1);
        assert_eq!(config.default_settings.max_players, 2);
        assert_eq!(
            config.default_settings.selected_categories,
            vec!["movies".to_string(), "music".to_string()]
        );
        assert_eq!(config.default_settings.time_limits.answer_writing, 45);
        assert_eq!(config.default_settings.time_limits.voting, 1);
        assert_eq!(config.cache_ttl, Duration::from_secs(60));
        assert_eq!(config.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.inactivity_threshold, DAY);
        assert_eq!(config.hub.outbound_capacity, 8);
        assert_eq!(config.hub.ping_interval, Duration::from_secs(30));
        assert_eq!(config.hub.command_capacity, 1024);
    }
}
