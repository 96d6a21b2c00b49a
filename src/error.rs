use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::dao::storage::StorageError;

/// Broad classification of engine failures, used to pick the outward response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The addressed game, player or question does not exist.
    NotFound,
    /// The request clashes with the current state of the game.
    Conflict,
    /// The request is malformed; the caller can fix it.
    Validation,
    /// A bounded retry loop gave up.
    Exhausted,
    /// A store failed; nothing was mutated.
    Infrastructure,
}

/// Outcomes of the session engine other than success.
#[derive(Debug, Error)]
pub enum GameError {
    #[error("game not found")]
    GameNotFound,
    #[error("player `{0}` is not part of this game")]
    PlayerNotFound(String),
    #[error("no question available for category `{0}`")]
    QuestionNotFound(String),
    #[error("game has no rounds yet")]
    NoRoundsYet,

    #[error("code `{0}` is already taken")]
    CodeTaken(String),
    #[error("game is full")]
    GameFull,
    #[error("game already started")]
    GameAlreadyStarted,
    #[error("game already ended")]
    GameAlreadyEnded,
    #[error("game has not started")]
    GameNotStarted,
    #[error("player `{0}` already joined this game")]
    PlayerAlreadyInGame(String),
    #[error("at least two players are needed to start")]
    NotEnoughPlayers,
    #[error("every round of this game has been played")]
    RoundLimitReached,
    #[error("current round is not waiting for a turn")]
    RoundNotWaiting,
    #[error("no turn is active")]
    NoActiveTurn,
    #[error("no category has been selected for this round")]
    CategoryNotSelected,
    #[error("a category was already selected for this round")]
    CategoryAlreadySelected,
    #[error("round is not accepting answers")]
    RoundNotAcceptingAnswers,
    #[error("player already submitted an answer this round")]
    AnswerAlreadySubmitted,
    #[error("round is not in voting")]
    RoundNotVoting,
    #[error("player already voted this round")]
    VoteAlreadySubmitted,
    #[error("round already completed")]
    RoundAlreadyCompleted,

    #[error("invalid category `{0}`")]
    InvalidCategory(String),
    #[error("invalid settings: {0}")]
    InvalidSettings(String),
    #[error("invalid join code `{0}`: expected 4 to 6 letters or digits")]
    InvalidCode(String),
    #[error("player id `{0}` is reserved")]
    ReservedPlayerId(String),
    #[error("answer is too similar to an existing answer")]
    AnswerTooSimilar,
    #[error("answer `{0}` is not part of this round")]
    InvalidVote(Uuid),

    #[error("could not generate a free join code after {attempts} attempt(s)")]
    CodeGenerationExhausted { attempts: u32 },

    #[error("storage unavailable")]
    Storage(#[from] StorageError),
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    #[error("failed to encode game state")]
    Codec(#[from] serde_json::Error),
}

impl GameError {
    /// Classify the failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            GameError::GameNotFound
            | GameError::PlayerNotFound(_)
            | GameError::QuestionNotFound(_)
            | GameError::NoRoundsYet => ErrorKind::NotFound,
            GameError::CodeTaken(_)
            | GameError::GameFull
            | GameError::GameAlreadyStarted
            | GameError::GameAlreadyEnded
            | GameError::GameNotStarted
            | GameError::PlayerAlreadyInGame(_)
            | GameError::NotEnoughPlayers
            | GameError::RoundLimitReached
            | GameError::RoundNotWaiting
            | GameError::NoActiveTurn
            | GameError::CategoryNotSelected
            | GameError::CategoryAlreadySelected
            | GameError::RoundNotAcceptingAnswers
            | GameError::AnswerAlreadySubmitted
            | GameError::RoundNotVoting
            | GameError::VoteAlreadySubmitted
            | GameError::RoundAlreadyCompleted => ErrorKind::Conflict,
            GameError::InvalidCategory(_)
            | GameError::InvalidSettings(_)
            | GameError::InvalidCode(_)
            | GameError::ReservedPlayerId(_)
            | GameError::AnswerTooSimilar
            | GameError::InvalidVote(_) => ErrorKind::Validation,
            GameError::CodeGenerationExhausted { .. } => ErrorKind::Exhausted,
            GameError::Storage(_) | GameError::Degraded | GameError::Codec(_) => {
                ErrorKind::Infrastructure
            }
        }
    }
}

impl From<ValidationErrors> for GameError {
    fn from(err: ValidationErrors) -> Self {
        GameError::InvalidSettings(err.to_string())
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<GameError> for AppError {
    fn from(err: GameError) -> Self {
        let message = match &err {
            GameError::Storage(source) => source.to_string(),
            other => other.to_string(),
        };
        match err.kind() {
            ErrorKind::NotFound => AppError::NotFound(message),
            ErrorKind::Conflict => AppError::Conflict(message),
            ErrorKind::Validation => AppError::BadRequest(message),
            ErrorKind::Exhausted | ErrorKind::Infrastructure => {
                AppError::ServiceUnavailable(message)
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_http_statuses() {
        let cases = [
            (GameError::GameNotFound, StatusCode::NOT_FOUND),
            (GameError::GameFull, StatusCode::CONFLICT),
            (GameError::AnswerTooSimilar, StatusCode::BAD_REQUEST),
            (
                GameError::CodeGenerationExhausted { attempts: 3 },
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (GameError::Degraded, StatusCode::SERVICE_UNAVAILABLE),
        ];

        for (err, expected) in cases {
            let response = AppError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }

    #[test]
    fn storage_failures_are_infrastructure() {
        let io = std::io::Error::other("connection reset");
        let err: GameError = StorageError::unavailable("save failed".into(), io).into();
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }
}
