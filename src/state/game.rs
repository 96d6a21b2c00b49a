use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Author id used for answers generated by the server rather than a player.
pub const SYSTEM_AUTHOR: &str = "system";

/// Lifecycle of a game. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Lobby is open, players can still join.
    Waiting,
    /// Rounds are being played.
    Playing,
    /// Game is over; only kept for history.
    Ended,
}

/// Lifecycle of a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Collecting the category, question and player answers.
    Waiting,
    /// The answer pool is complete and players are voting.
    Voting,
    /// Votes are tallied (or the round was ended by force).
    Completed,
}

/// Lifecycle of the turn of the player picking the category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    /// Turn was created but not started yet.
    Waiting,
    /// The acting player is choosing a category.
    Active,
    /// The answer pool is closed; nothing left to do for this turn.
    Ended,
}

/// Phase a countdown belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Acting player picks a category.
    CategorySelection,
    /// Players write their decoy answers.
    AnswerWriting,
    /// Players vote for the answer they believe is real.
    Voting,
}

/// Per-phase countdowns, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct TimeLimits {
    /// Seconds granted to pick a category.
    #[validate(range(min = 1))]
    pub category_selection: u32,
    /// Seconds granted to write answers.
    #[validate(range(min = 1))]
    pub answer_writing: u32,
    /// Seconds granted to vote.
    #[validate(range(min = 1))]
    pub voting: u32,
}

/// Rules a game is played with, fixed at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate, ToSchema)]
pub struct GameSettings {
    /// Number of rounds to play.
    #[validate(range(min = 1))]
    pub rounds: u32,
    /// Countdown durations for each phase.
    #[validate(nested)]
    pub time_limits: TimeLimits,
    /// Categories the acting player may pick from.
    #[validate(length(min = 1))]
    pub selected_categories: Vec<String>,
    /// Maximum number of players in the lobby.
    #[validate(range(min = 2))]
    pub max_players: usize,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            rounds: 10,
            time_limits: TimeLimits {
                category_selection: 30,
                answer_writing: 30,
                voting: 15,
            },
            selected_categories: Vec::new(),
            max_players: 8,
        }
    }
}

/// A participant, identified by the id handed over by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Player {
    /// Client-chosen identifier, unique within the game.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Points accumulated over completed rounds.
    pub score: u32,
    /// Whether a live connection currently represents the player.
    pub is_connected: bool,
    /// Last time the player connected, disconnected or acted.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub last_seen: OffsetDateTime,
}

impl Player {
    /// Build a connected player with a zero score.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            score: 0,
            is_connected: true,
            last_seen: OffsetDateTime::now_utc(),
        }
    }
}

/// Countdown snapshot attached to a turn or round. Purely informative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Timer {
    /// Phase the countdown belongs to.
    #[serde(rename = "type")]
    pub kind: TimerKind,
    /// When the countdown started.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub start_time: OffsetDateTime,
    /// Duration in seconds.
    pub duration: u32,
    /// When the countdown runs out.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub end_time: OffsetDateTime,
}

impl Timer {
    /// Timer starting now; `end_time = start_time + duration`.
    pub fn starting_now(kind: TimerKind, duration: u32) -> Self {
        let start_time = OffsetDateTime::now_utc();
        Self {
            kind,
            start_time,
            duration,
            end_time: start_time + time::Duration::seconds(i64::from(duration)),
        }
    }
}

/// One entry of the answer pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Answer {
    /// Choice id players vote with.
    pub id: Uuid,
    /// Player id of the author, or [`SYSTEM_AUTHOR`] for fillers.
    pub player_id: String,
    /// Answer text as submitted.
    pub text: String,
    /// Ids of the players who voted for this answer.
    pub votes: Vec<String>,
    /// Submission time.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
}

impl Answer {
    /// New answer without votes.
    pub fn new(player_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            player_id: player_id.into(),
            text: text.into(),
            votes: Vec::new(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Whether the server wrote this answer.
    pub fn is_filler(&self) -> bool {
        self.player_id == SYSTEM_AUTHOR
    }
}

/// Everything voters choose from during a round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct AnswerPool {
    /// The real answer to the round's question.
    pub correct_answer: String,
    /// Player-submitted decoys.
    pub fake_answers: Vec<Answer>,
    /// Server-generated decoys padding the pool.
    pub filler_answers: Vec<Answer>,
}

impl AnswerPool {
    /// Every votable choice, decoys first.
    pub fn choices(&self) -> impl Iterator<Item = &Answer> {
        self.fake_answers.iter().chain(self.filler_answers.iter())
    }

    /// Number of displayed choices (fake + filler).
    pub fn choice_count(&self) -> usize {
        self.fake_answers.len() + self.filler_answers.len()
    }

    /// Texts the next candidate must not resemble: the correct answer and every choice.
    pub fn taken_texts(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.correct_answer.as_str()).chain(self.choices().map(|a| a.text.as_str()))
    }

    /// Total number of votes cast this round.
    pub fn total_votes(&self) -> usize {
        self.choices().map(|answer| answer.votes.len()).sum()
    }

    /// Whether `player_id` already voted for any choice of this round.
    pub fn has_voted(&self, player_id: &str) -> bool {
        self.choices()
            .any(|answer| answer.votes.iter().any(|voter| voter == player_id))
    }

    /// Whether `player_id` already wrote a decoy this round.
    pub fn has_answered(&self, player_id: &str) -> bool {
        self.fake_answers
            .iter()
            .any(|answer| answer.player_id == player_id)
    }

    /// Mutable access to a votable choice by id.
    pub fn choice_mut(&mut self, answer_id: Uuid) -> Option<&mut Answer> {
        self.fake_answers
            .iter_mut()
            .chain(self.filler_answers.iter_mut())
            .find(|answer| answer.id == answer_id)
    }
}

/// The turn of the player who picks the category for a round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Turn {
    /// Player acting this turn.
    pub player_id: String,
    /// When the turn started.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub start_time: OffsetDateTime,
    /// Set once the answer pool closes.
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub end_time: Option<OffsetDateTime>,
    /// Progress of the turn.
    pub status: TurnStatus,
    /// Category picked by the acting player.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Category selection countdown.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<Timer>,
}

/// A single question cycle: category pick, answers, votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Round {
    /// 1-based sequence number.
    pub number: u32,
    /// Category the question was drawn from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Question bank id of the drawn question.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_id: Option<String>,
    /// Question text shown to players.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    /// Phase of the round.
    pub status: RoundStatus,
    /// When the round was opened.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub start_time: OffsetDateTime,
    /// Set once the round completes.
    #[serde(default, with = "time::serde::rfc3339::option")]
    #[schema(value_type = Option<String>, format = DateTime)]
    pub end_time: Option<OffsetDateTime>,
    /// Turn of the acting player, once started.
    #[serde(default)]
    pub current_turn: Option<Turn>,
    /// Correct answer with every decoy collected so far.
    pub answer_pool: AnswerPool,
    /// Countdown of the phase in progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timer: Option<Timer>,
}

impl Round {
    /// Fresh round waiting for its turn.
    pub fn new(number: u32) -> Self {
        Self {
            number,
            category: None,
            question_id: None,
            question: None,
            status: RoundStatus::Waiting,
            start_time: OffsetDateTime::now_utc(),
            end_time: None,
            current_turn: None,
            answer_pool: AnswerPool::default(),
            timer: None,
        }
    }

    /// Whether a question has been drawn for this round.
    pub fn has_question(&self) -> bool {
        self.question_id.is_some()
    }

    /// Close the round. Idempotent on the end timestamp.
    pub fn complete(&mut self) {
        self.status = RoundStatus::Completed;
        self.timer = None;
        if self.end_time.is_none() {
            self.end_time = Some(OffsetDateTime::now_utc());
        }
    }
}

/// The aggregate mutated by the session engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Game {
    /// Stable identifier, also used as the storage key.
    pub id: Uuid,
    /// Short code players type to join.
    pub code: String,
    /// Lifecycle phase of the game.
    pub status: GameStatus,
    /// Player who created the game.
    pub host_id: String,
    /// Players in join order.
    pub players: Vec<Player>,
    /// Append-only; only the last round is ever mutated.
    pub rounds: Vec<Round>,
    /// Settings fixed at creation.
    pub settings: GameSettings,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub created_at: OffsetDateTime,
    /// Time of the last persisted change.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub updated_at: OffsetDateTime,
    /// Time of the last player action; drives the inactivity sweep.
    #[serde(with = "time::serde::rfc3339")]
    #[schema(value_type = String, format = DateTime)]
    pub last_activity: OffsetDateTime,
}

impl Game {
    /// New lobby holding only its host.
    pub fn new(code: String, host: Player, settings: GameSettings) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id: Uuid::new_v4(),
            code,
            status: GameStatus::Waiting,
            host_id: host.id.clone(),
            players: vec![host],
            rounds: Vec::new(),
            settings,
            created_at: now,
            updated_at: now,
            last_activity: now,
        }
    }

    /// Index of the active round, which is always the last one.
    pub fn current_round_index(&self) -> Option<usize> {
        self.rounds.len().checked_sub(1)
    }

    /// The active round, if any round was created yet.
    pub fn current_round(&self) -> Option<&Round> {
        self.rounds.last()
    }

    /// Single mutation path into the round list.
    pub fn current_round_mut(&mut self) -> Option<&mut Round> {
        let index = self.current_round_index()?;
        self.rounds.get_mut(index)
    }

    /// Append the next round; callers check the previous one is completed.
    pub fn push_round(&mut self) -> &mut Round {
        let number = u32::try_from(self.rounds.len()).unwrap_or(u32::MAX).saturating_add(1);
        self.rounds.push(Round::new(number));
        let index = self.rounds.len() - 1;
        &mut self.rounds[index]
    }

    /// Look a player up by id.
    pub fn player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.id == player_id)
    }

    /// Mutable lookup of a player by id.
    pub fn player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|player| player.id == player_id)
    }

    /// Whether the id belongs to a player of this game.
    pub fn has_player(&self, player_id: &str) -> bool {
        self.player(player_id).is_some()
    }

    /// Bump the update and activity timestamps.
    pub fn touch(&mut self) {
        let now = OffsetDateTime::now_utc();
        self.updated_at = now;
        self.last_activity = now;
    }

    /// Whether the game saw no activity for longer than `idle` at `now`.
    pub fn is_idle(&self, now: OffsetDateTime, idle: std::time::Duration) -> bool {
        let idle = time::Duration::try_from(idle).unwrap_or(time::Duration::MAX);
        now - self.last_activity > idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn game_with_players(count: usize) -> Game {
        let mut game = Game::new("ABCD12".into(), Player::new("p0", "Host"), GameSettings::default());
        for index in 1..count {
            game.players.push(Player::new(format!("p{index}"), format!("Player {index}")));
        }
        game
    }

    #[test]
    fn new_game_holds_only_the_host() {
        let game = game_with_players(1);
        assert_eq!(game.status, GameStatus::Waiting);
        assert_eq!(game.host_id, "p0");
        assert_eq!(game.players.len(), 1);
        assert!(game.current_round().is_none());
    }

    #[test]
    fn current_round_is_the_last_appended() {
        let mut game = game_with_players(2);
        game.push_round().complete();
        game.push_round();

        assert_eq!(game.rounds.len(), 2);
        assert_eq!(game.current_round_index(), Some(1));
        let current = game.current_round_mut().unwrap();
        assert_eq!(current.number, 2);
        current.category = Some("movies".into());
        assert_eq!(game.rounds[1].category.as_deref(), Some("movies"));
        assert_eq!(game.rounds[0].status, RoundStatus::Completed);
    }

    #[test]
    fn timer_end_is_start_plus_duration() {
        let timer = Timer::starting_now(TimerKind::Voting, 15);
        assert_eq!(timer.end_time - timer.start_time, time::Duration::seconds(15));
    }

    #[test]
    fn pool_tracks_votes_across_all_choices() {
        let mut pool = AnswerPool {
            correct_answer: "Christopher Nolan".into(),
            fake_answers: vec![Answer::new("p1", "Denis Villeneuve")],
            filler_answers: vec![Answer::new(SYSTEM_AUTHOR, "A film starring inception")],
        };
        let filler_id = pool.filler_answers[0].id;
        pool.choice_mut(filler_id).unwrap().votes.push("p2".into());

        assert!(pool.has_voted("p2"));
        assert!(!pool.has_voted("p1"));
        assert_eq!(pool.total_votes(), 1);
        assert_eq!(pool.choice_count(), 2);
        assert!(pool.has_answered("p1"));
        assert!(pool.filler_answers[0].is_filler());
    }

    #[test]
    fn idle_detection_uses_last_activity() {
        let mut game = game_with_players(2);
        let day = std::time::Duration::from_secs(24 * 60 * 60);
        assert!(!game.is_idle(OffsetDateTime::now_utc(), day));

        game.last_activity -= time::Duration::hours(25);
        assert!(game.is_idle(OffsetDateTime::now_utc(), day));
    }

    #[test]
    fn game_serializes_with_snake_case_statuses() {
        let game = game_with_players(2);
        let value = serde_json::to_value(&game).unwrap();
        assert_eq!(value["status"], "waiting");
        assert_eq!(value["settings"]["max_players"], 8);

        let back: Game = serde_json::from_value(value).unwrap();
        assert_eq!(back, game);
    }
}
