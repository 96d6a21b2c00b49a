use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::state::game::Game;

pub const GAME_PREFIX: &str = "game::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    /// One row per document in the requested key range.
    pub rows: Vec<AllDocsRow>,
}

/// Body of a `_find` response; only the matching documents are kept.
#[derive(Debug, Deserialize)]
pub struct FindResponse {
    /// Documents matching the selector.
    pub docs: Vec<Value>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    /// Document id.
    pub id: String,
    /// Full document, present when `include_docs` is set.
    #[serde(default)]
    pub doc: Option<Value>,
}

/// A game document; `_rev` is carried so updates do not conflict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchGameDocument {
    /// Document id, prefixed with the game namespace.
    #[serde(rename = "_id")]
    pub id: String,
    /// Current revision, absent before the first write.
    #[serde(rename = "_rev", default, skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    /// The stored game.
    pub game: Game,
}

impl CouchGameDocument {
    pub fn new(game: Game, rev: Option<String>) -> Self {
        Self {
            id: game_doc_id(game.id),
            rev,
            game,
        }
    }
}

pub fn game_doc_id(id: Uuid) -> String {
    format!("{GAME_PREFIX}{id}")
}

/// Name of the Mango index backing [`code_query`].
pub const CODE_INDEX: &str = "game-code-idx";

/// Mango index definition over `game.code`.
pub fn code_index() -> Value {
    json!({
        "index": {"fields": ["game.code"]},
        "name": CODE_INDEX,
        "type": "json",
    })
}

/// `_find` body selecting the game documents that use `code`.
pub fn code_query(code: &str) -> Value {
    json!({
        "selector": {
            "_id": {"$gt": GAME_PREFIX, "$lt": format!("{GAME_PREFIX}{END_SUFFIX}")},
            "game.code": code,
        },
        "use_index": CODE_INDEX,
        "limit": CODE_QUERY_LIMIT,
    })
}

/// Ended games keep their code, so several documents may share one.
const CODE_QUERY_LIMIT: u32 = 100;
