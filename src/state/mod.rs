pub mod game;
pub mod game_state;
pub mod gates;
pub mod hub;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    dao::question_bank::QuestionBank,
    services::{
        filler::{FillerStrategy, TemplateFillers},
        join_code::{CodeGenerator, RandomCodes},
    },
};

pub use self::game_state::GameStateStore;
pub use self::gates::GameGates;
pub use self::hub::ConnectionHub;

pub type SharedState = Arc<AppState>;

/// Central application state: the hub, the game store and the collaborators the engine calls.
pub struct AppState {
    /// Runtime configuration.
    pub config: Arc<AppConfig>,
    /// Connection registry and event fan-out.
    pub hub: ConnectionHub,
    /// Read-through cache over the storage backend.
    pub games: GameStateStore,
    /// Per-game serialization of mutations.
    pub gates: GameGates,
    /// Source of questions.
    pub questions: Arc<dyn QuestionBank>,
    /// Decoy generation for short answer pools.
    pub fillers: Arc<dyn FillerStrategy>,
    /// Join code candidates.
    pub codes: Arc<dyn CodeGenerator>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// Spawns the hub dispatch loop, so this must run inside a Tokio runtime. The game
    /// store starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, questions: Arc<dyn QuestionBank>) -> SharedState {
        Self::with_fillers(config, questions, Arc::new(TemplateFillers))
    }

    /// Same as [`AppState::new`] with a custom filler strategy.
    pub fn with_fillers(
        config: AppConfig,
        questions: Arc<dyn QuestionBank>,
        fillers: Arc<dyn FillerStrategy>,
    ) -> SharedState {
        Self::with_collaborators(config, questions, fillers, Arc::new(RandomCodes))
    }

    /// Same as [`AppState::new`] with custom filler and join code generators.
    pub fn with_collaborators(
        config: AppConfig,
        questions: Arc<dyn QuestionBank>,
        fillers: Arc<dyn FillerStrategy>,
        codes: Arc<dyn CodeGenerator>,
    ) -> SharedState {
        Arc::new(Self {
            hub: ConnectionHub::spawn(config.hub),
            games: GameStateStore::new(config.cache_ttl),
            gates: GameGates::new(),
            config: Arc::new(config),
            questions,
            fillers,
            codes,
        })
    }
}
