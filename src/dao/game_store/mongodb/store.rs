use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Client, Collection, Database, IndexModel, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::{RetryPolicy, establish_connection},
    error::{MongoDaoError, MongoResult},
    models::{MongoGameDocument, doc_id},
};
use crate::{
    dao::{game_store::GameStore, storage::StorageResult},
    state::game::Game,
};

const GAME_COLLECTION_NAME: &str = "games";

#[derive(Clone)]
pub struct MongoGameStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    // Keeps the client alive alongside the database handle it produced.
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.state.read().await.database.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(
            &self.config.options,
            &self.config.database_name,
            RetryPolicy::default(),
        )
        .await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoGameStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = establish_connection(
            &config.options,
            &config.database_name,
            RetryPolicy::default(),
        )
        .await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;
        let indexes = [
            (doc! {"code": 1, "created_at": -1}, "game_code_idx", "code"),
            (doc! {"status": 1, "last_activity": 1}, "game_activity_idx", "status,last_activity"),
        ];

        for (keys, name, label) in indexes {
            let index = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(Some(name.to_owned())).build())
                .build();
            collection
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: GAME_COLLECTION_NAME,
                    index: label,
                    source,
                })?;
        }

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoGameDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoGameDocument>(GAME_COLLECTION_NAME)
    }

    async fn create(&self, game: Game) -> MongoResult<()> {
        let document = MongoGameDocument::from_game(&game)?;
        self.collection()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::InsertGame {
                id: game.id,
                source,
            })?;
        Ok(())
    }

    async fn update(&self, game: Game) -> MongoResult<()> {
        let document = MongoGameDocument::from_game(&game)?;
        self.collection()
            .await
            .replace_one(doc_id(game.id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveGame {
                id: game.id,
                source,
            })?;
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> MongoResult<Option<Game>> {
        let document = self
            .collection()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadGame { id, source })?;

        document.map(MongoGameDocument::into_game).transpose()
    }

    async fn find_by_code(&self, code: String) -> MongoResult<Option<Game>> {
        let document = self
            .collection()
            .await
            .find_one(doc! {"code": &code})
            .sort(doc! {"created_at": -1})
            .await
            .map_err(|source| MongoDaoError::LoadByCode { code, source })?;

        document.map(MongoGameDocument::into_game).transpose()
    }

    async fn delete(&self, code: String) -> MongoResult<bool> {
        let result = self
            .collection()
            .await
            .delete_many(doc! {"code": &code})
            .await
            .map_err(|source| MongoDaoError::DeleteByCode { code, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn list_unfinished(&self) -> MongoResult<Vec<Game>> {
        let documents: Vec<MongoGameDocument> = self
            .collection()
            .await
            .find(doc! {"status": {"$ne": "ended"}})
            .await
            .map_err(|source| MongoDaoError::ListGames { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListGames { source })?;

        let mut games = Vec::with_capacity(documents.len());
        for document in documents {
            match document.into_game() {
                Ok(game) => games.push(game),
                Err(err) => warn!(error = %err, "skipping unreadable game document"),
            }
        }
        Ok(games)
    }
}

impl GameStore for MongoGameStore {
    fn create(&self, game: Game) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.create(game).await.map_err(Into::into) })
    }

    fn update(&self, game: Game) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.update(game).await.map_err(Into::into) })
    }

    fn find_by_id(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<Game>>> {
        let store = self.clone();
        Box::pin(async move { store.find_by_id(id).await.map_err(Into::into) })
    }

    fn find_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Game>>> {
        let store = self.clone();
        Box::pin(async move { store.find_by_code(code).await.map_err(Into::into) })
    }

    fn delete(&self, code: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete(code).await.map_err(Into::into) })
    }

    fn list_unfinished(&self) -> BoxFuture<'static, StorageResult<Vec<Game>>> {
        let store = self.clone();
        Box::pin(async move { store.list_unfinished().await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
