use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing MongoDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to insert game `{id}`")]
    InsertGame {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save game `{id}`")]
    SaveGame {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load game `{id}`")]
    LoadGame {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to look up game by code `{code}`")]
    LoadByCode {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete games with code `{code}`")]
    DeleteByCode {
        code: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to list unfinished games")]
    ListGames {
        #[source]
        source: MongoError,
    },
    #[error("failed to encode game `{id}` for MongoDB")]
    Encode {
        id: Uuid,
        #[source]
        source: serde_json::Error,
    },
    #[error("stored game document `{id}` is malformed")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },
}
