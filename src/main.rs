//! Dahaa Back binary entrypoint wiring the WebSocket hub, the session engine and the durable store.

use std::{env, net::SocketAddr, path::PathBuf, str::FromStr, sync::Arc};

use anyhow::{Context, bail};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "couch-store")]
use dahaa_back::dao::game_store::couchdb::{CouchConfig, CouchGameStore};
#[cfg(feature = "mongo-store")]
use dahaa_back::dao::game_store::mongodb::{MongoConfig, MongoGameStore};
use dahaa_back::{
    config::AppConfig,
    dao::{
        game_store::{GameStore, MemoryGameStore},
        question_bank::StaticQuestionBank,
        storage::StorageError,
    },
    routes,
    services::{cleanup_service, storage_supervisor},
    state::{AppState, SharedState},
};

const DEFAULT_QUESTIONS_PATH: &str = "config/questions.json";

/// Durable store selected through `STORE_BACKEND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreBackend {
    Mongo,
    Couch,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "mongo" | "mongodb" => Ok(Self::Mongo),
            "couch" | "couchdb" => Ok(Self::Couch),
            "memory" => Ok(Self::Memory),
            other => bail!("unknown STORE_BACKEND `{other}` (expected mongo, couch or memory)"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let questions = load_questions()?;
    let backend = match env::var("STORE_BACKEND") {
        Ok(value) => value.parse()?,
        Err(_) => StoreBackend::Mongo,
    };

    let app_state = AppState::new(config, Arc::new(questions));

    spawn_storage_supervisor(app_state.clone(), backend)?;
    tokio::spawn(cleanup_service::run(app_state.clone()));
    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, ?backend, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Load the question bank, starting empty when the file does not exist.
fn load_questions() -> anyhow::Result<StaticQuestionBank> {
    let path = env::var("QUESTIONS_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_QUESTIONS_PATH));

    match StaticQuestionBank::load(&path) {
        Ok(bank) => Ok(bank),
        Err(err) if err.is_missing() => {
            warn!(path = %path.display(), "question file not found; starting with an empty bank");
            Ok(StaticQuestionBank::default())
        }
        Err(err) => Err(err).context("loading question bank"),
    }
}

/// Run the storage supervisor for the selected backend in the background.
fn spawn_storage_supervisor(state: SharedState, backend: StoreBackend) -> anyhow::Result<()> {
    match backend {
        StoreBackend::Memory => {
            let store = MemoryGameStore::new();
            tokio::spawn(storage_supervisor::run(state, move || {
                let store = store.clone();
                async move { Ok::<_, StorageError>(Arc::new(store) as Arc<dyn GameStore>) }
            }));
        }
        #[cfg(feature = "mongo-store")]
        StoreBackend::Mongo => {
            tokio::spawn(storage_supervisor::run(state, || async {
                let config = MongoConfig::from_env().await?;
                let store = MongoGameStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn GameStore>)
            }));
        }
        #[cfg(feature = "couch-store")]
        StoreBackend::Couch => {
            tokio::spawn(storage_supervisor::run(state, || async {
                let config = CouchConfig::from_env()?;
                let store = CouchGameStore::connect(config).await?;
                Ok::<_, StorageError>(Arc::new(store) as Arc<dyn GameStore>)
            }));
        }
        #[allow(unreachable_patterns)]
        other => bail!("store backend {other:?} is not compiled into this binary"),
    }
    Ok(())
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
