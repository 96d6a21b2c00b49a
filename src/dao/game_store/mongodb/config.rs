use mongodb::options::ClientOptions;

use super::error::{MongoDaoError, MongoResult};

const DEFAULT_DATABASE: &str = "dahaa";

const APP_NAME: &str = "dahaa-back";

/// Parsed client options plus the database holding the `games` collection.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed driver options.
    pub options: ClientOptions,
    /// Database holding the `games` collection.
    pub database_name: String,
}

impl MongoConfig {
    /// Parse `uri`, tagging the connection with the service name unless the URI sets one.
    pub async fn from_uri(uri: &str, database: Option<&str>) -> MongoResult<Self> {
        let mut options = ClientOptions::parse(uri)
            .await
            .map_err(|source| MongoDaoError::InvalidUri {
                uri: uri.to_owned(),
                source,
            })?;
        if options.app_name.is_none() {
            options.app_name = Some(APP_NAME.to_owned());
        }

        Ok(Self {
            options,
            database_name: database
                .filter(|name| !name.trim().is_empty())
                .unwrap_or(DEFAULT_DATABASE)
                .to_owned(),
        })
    }

    /// Read `MONGO_URI` (required) and `MONGO_DB` (optional, defaults to `dahaa`).
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoDaoError::MissingEnvVar { var: "MONGO_URI" })?;
        let db = std::env::var("MONGO_DB").ok();
        Self::from_uri(&uri, db.as_deref()).await
    }
}
