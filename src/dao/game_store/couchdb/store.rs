use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::{game_store::GameStore, storage::StorageResult},
    state::game::{Game, GameStatus},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchGameDocument, END_SUFFIX, FindResponse, GAME_PREFIX, code_index,
        code_query, game_doc_id,
    },
};

const ALL_DOCS: &str = "_all_docs";
const FIND: &str = "_find";
const INDEX: &str = "_index";

#[derive(Clone)]
pub struct CouchGameStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchGameStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let store = Self {
            client,
            base_url: Arc::from(config.base_url.trim_end_matches('/')),
            database: Arc::from(config.database),
            auth: config
                .credentials
                .map(|(user, pass)| (Arc::<str>::from(user), Arc::<str>::from(pass))),
        };

        store.ensure_database().await?;
        store.ensure_code_index().await?;
        Ok(store)
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.auth {
            Some((user, pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.database_url(), path);
        self.authorize(self.client.request(method, url))
    }

    async fn database_status(&self) -> CouchResult<StatusCode> {
        let response = self
            .authorize(self.client.get(self.database_url()))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: self.database.to_string(),
                source,
            })?;
        Ok(response.status())
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        match self.database_status().await? {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(self.database_url()))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseQuery {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means another process created it in the meantime.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    /// Create the `game.code` index; CouchDB answers `exists` when it is already there.
    async fn ensure_code_index(&self) -> CouchResult<()> {
        let response = self
            .request(Method::POST, INDEX)
            .json(&code_index())
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: INDEX.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: INDEX.to_string(),
                status: response.status(),
            })
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::RevisionConflict {
                path: doc_id.to_string(),
            }),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn delete_document(&self, doc_id: &str, rev: &str) -> CouchResult<()> {
        let response = self
            .request(Method::DELETE, doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// Every game document. Rows that do not decode are skipped with a warning.
    async fn list_games(&self) -> CouchResult<Vec<CouchGameDocument>> {
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", format!("\"{}\"", GAME_PREFIX)),
            ("endkey", format!("\"{}{}\"", GAME_PREFIX, END_SUFFIX)),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        Ok(decode_games(
            payload
                .rows
                .into_iter()
                .filter_map(|row| row.doc.map(|doc| (row.id, doc))),
        ))
    }

    /// Game documents using `code`, looked up through the code index.
    async fn find_code_documents(&self, code: &str) -> CouchResult<Vec<CouchGameDocument>> {
        let response = self
            .request(Method::POST, FIND)
            .json(&code_query(code))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: FIND.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: FIND.to_string(),
                status: response.status(),
            });
        }

        let payload = response
            .json::<FindResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: FIND.to_string(),
                source,
            })?;

        Ok(decode_games(payload.docs.into_iter().map(|doc| {
            let id = doc
                .get("_id")
                .and_then(|id| id.as_str())
                .unwrap_or(FIND)
                .to_string();
            (id, doc)
        })))
    }

    /// Write `game` over whatever revision is current, re-reading it once on conflict.
    async fn save(&self, game: Game) -> CouchResult<()> {
        let doc_id = game_doc_id(game.id);
        let mut retried = false;
        loop {
            let rev = self
                .get_document::<CouchGameDocument>(&doc_id)
                .await?
                .and_then(|existing| existing.rev);
            match self
                .put_document(&doc_id, &CouchGameDocument::new(game.clone(), rev))
                .await
            {
                Err(CouchDaoError::RevisionConflict { .. }) if !retried => {
                    warn!(%doc_id, "revision conflict while saving game; retrying");
                    retried = true;
                }
                result => return result,
            }
        }
    }
}

/// Rows that do not decode are skipped with a warning.
fn decode_games(
    rows: impl Iterator<Item = (String, serde_json::Value)>,
) -> Vec<CouchGameDocument> {
    let mut documents = Vec::new();
    for (path, doc) in rows {
        match from_value::<CouchGameDocument>(doc) {
            Ok(parsed) => documents.push(parsed),
            Err(source) => {
                let err = CouchDaoError::DeserializeValue { path, source };
                warn!(error = %err, "skipping unreadable game document");
            }
        }
    }
    documents
}

impl GameStore for CouchGameStore {
    fn create(&self, game: Game) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = game_doc_id(game.id);
            store
                .put_document(&doc_id, &CouchGameDocument::new(game, None))
                .await
                .map_err(Into::into)
        })
    }

    fn update(&self, game: Game) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save(game).await.map_err(Into::into) })
    }

    fn find_by_id(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<Game>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = store
                .get_document::<CouchGameDocument>(&game_doc_id(id))
                .await?;
            Ok(doc.map(|doc| doc.game))
        })
    }

    fn find_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Game>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store.find_code_documents(&code).await?;
            Ok(docs
                .into_iter()
                .map(|doc| doc.game)
                .filter(|game| game.code == code)
                .max_by_key(|game| game.created_at))
        })
    }

    fn delete(&self, code: String) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let mut deleted = false;
            for doc in store.find_code_documents(&code).await? {
                if doc.game.code != code {
                    continue;
                }
                if let Some(rev) = doc.rev.as_deref() {
                    store.delete_document(&doc.id, rev).await?;
                    deleted = true;
                }
            }
            Ok(deleted)
        })
    }

    fn list_unfinished(&self) -> BoxFuture<'static, StorageResult<Vec<Game>>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store.list_games().await?;
            Ok(docs
                .into_iter()
                .map(|doc| doc.game)
                .filter(|game| game.status != GameStatus::Ended)
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            match store.database_status().await? {
                status if status.is_success() => Ok(()),
                status => Err(CouchDaoError::DatabaseStatus {
                    database: store.database.to_string(),
                    status,
                }
                .into()),
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
