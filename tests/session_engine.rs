use std::{sync::Arc, time::Duration};

use dahaa_back::{
    config::AppConfig,
    dao::{
        game_store::MemoryGameStore,
        question_bank::{Question, StaticQuestionBank},
    },
    error::{ErrorKind, GameError},
    services::{filler::TemplateFillers, game_service, join_code::CodeGenerator},
    state::{
        AppState, SharedState,
        game::{GameSettings, GameStatus, Player, RoundStatus, TurnStatus},
    },
};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::{sync::mpsc, time::timeout};
use uuid::Uuid;

fn question_bank() -> StaticQuestionBank {
    StaticQuestionBank::new(vec![
        Question {
            id: "inception".into(),
            category: "movies".into(),
            text: "Who directed Inception?".into(),
            answer: "Christopher Nolan".into(),
            filler_answers: vec![
                "Ridley Scott".into(),
                "James Cameron".into(),
                "David Fincher".into(),
            ],
        },
        Question {
            id: "thriller".into(),
            category: "music".into(),
            text: "Who released the album Thriller?".into(),
            answer: "Michael Jackson".into(),
            filler_answers: Vec::new(),
        },
    ])
}

async fn setup_with(config: AppConfig) -> (SharedState, MemoryGameStore) {
    let state = AppState::new(config, Arc::new(question_bank()));
    let backend = MemoryGameStore::new();
    state
        .games
        .install_backend(Arc::new(backend.clone()))
        .await;
    (state, backend)
}

async fn setup() -> (SharedState, MemoryGameStore) {
    setup_with(AppConfig::default()).await
}

fn movie_settings() -> GameSettings {
    GameSettings {
        selected_categories: vec!["movies".into()],
        ..GameSettings::default()
    }
}

fn player(id: &str) -> Player {
    Player::new(id, id.to_uppercase())
}

/// Create a lobby hosted by `ids[0]` with everyone else joined.
async fn lobby(state: &SharedState, ids: &[&str]) -> String {
    let game = game_service::create_game(state, None, player(ids[0]), Some(movie_settings()))
        .await
        .unwrap();
    for id in &ids[1..] {
        game_service::join_game(state, &game.code, player(id))
            .await
            .unwrap();
    }
    game.code
}

/// Started game whose first round already has its question.
async fn round_with_question(state: &SharedState, ids: &[&str]) -> Uuid {
    let code = lobby(state, ids).await;
    let game = game_service::start_game(state, &code).await.unwrap();
    game_service::start_turn(state, game.id, ids[0])
        .await
        .unwrap();
    game_service::select_category(state, game.id, "movies")
        .await
        .unwrap();
    game.id
}

/// Frames queued for a connection, once the hub has drained its command queue.
async fn drain(state: &SharedState, game_id: Uuid, outbound: &mut mpsc::Receiver<Arc<str>>) -> Vec<Value> {
    state.hub.connected_count(game_id).await;
    let mut frames = Vec::new();
    while let Ok(frame) = outbound.try_recv() {
        frames.push(serde_json::from_str(&frame).unwrap());
    }
    frames
}

#[tokio::test]
async fn start_requires_two_players_and_opens_round_one() {
    let (state, _backend) = setup().await;
    let code = lobby(&state, &["a"]).await;

    let err = game_service::start_game(&state, &code).await.unwrap_err();
    assert!(matches!(err, GameError::NotEnoughPlayers));

    game_service::join_game(&state, &code, player("b")).await.unwrap();
    game_service::join_game(&state, &code, player("c")).await.unwrap();
    let game = game_service::start_game(&state, &code).await.unwrap();

    assert_eq!(game.status, GameStatus::Playing);
    assert_eq!(game.rounds.len(), 1);
    assert_eq!(game.rounds[0].number, 1);
    assert_eq!(game.rounds[0].status, RoundStatus::Waiting);

    let err = game_service::join_game(&state, &code, player("d")).await.unwrap_err();
    assert!(matches!(err, GameError::GameAlreadyStarted));
    let err = game_service::start_game(&state, &code).await.unwrap_err();
    assert!(matches!(err, GameError::GameAlreadyStarted));
}

#[tokio::test]
async fn lobby_rejects_duplicates_and_overflow() {
    let (state, _backend) = setup().await;
    let settings = GameSettings {
        max_players: 2,
        ..movie_settings()
    };
    let game = game_service::create_game(&state, Some("room1".into()), player("a"), Some(settings))
        .await
        .unwrap();
    assert_eq!(game.code, "ROOM1");
    assert_eq!(game.host_id, "a");

    let err = game_service::join_game(&state, "room1", player("a")).await.unwrap_err();
    assert!(matches!(err, GameError::PlayerAlreadyInGame(_)));

    game_service::join_game(&state, "ROOM1", player("b")).await.unwrap();
    let err = game_service::join_game(&state, "ROOM1", player("c")).await.unwrap_err();
    assert!(matches!(err, GameError::GameFull));

    let err = game_service::join_game(&state, "ROOM1", player("system")).await.unwrap_err();
    assert!(matches!(err, GameError::ReservedPlayerId(_)));
}

#[tokio::test]
async fn creation_validates_codes_and_categories() {
    let (state, _backend) = setup().await;
    game_service::create_game(&state, Some("ABCD".into()), player("a"), None)
        .await
        .unwrap();

    let err = game_service::create_game(&state, Some("abcd".into()), player("b"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::CodeTaken(_)));
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = game_service::create_game(&state, Some("AB".into()), player("b"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::InvalidCode(_)));

    let unknown = GameSettings {
        selected_categories: vec!["movies".into(), "sports".into()],
        ..GameSettings::default()
    };
    let err = game_service::create_game(&state, None, player("b"), Some(unknown))
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::InvalidCategory(ref category) if category == "sports"));

    let empty = GameSettings::default();
    let err = game_service::create_game(&state, None, player("b"), Some(empty))
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::InvalidCategory(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);

    let defaults = game_service::create_game(&state, None, player("b"), None)
        .await
        .unwrap();
    assert_eq!(defaults.settings.selected_categories, vec!["movies", "music"]);
    assert_eq!(defaults.code.len(), 6);
}

#[tokio::test]
async fn near_duplicates_of_the_correct_answer_are_rejected() {
    let (state, _backend) = setup().await;
    let game_id = round_with_question(&state, &["a", "b", "c"]).await;

    let err = game_service::submit_answer(&state, game_id, "b", "christopher nolan")
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::AnswerTooSimilar));

    let game = game_service::submit_answer(&state, game_id, "b", "Denis Villeneuve")
        .await
        .unwrap();
    let round = game.current_round().unwrap();
    assert_eq!(round.status, RoundStatus::Waiting);
    assert_eq!(round.answer_pool.fake_answers.len(), 1);
    assert_eq!(round.answer_pool.choice_count(), 3);

    let err = game_service::submit_answer(&state, game_id, "c", "denis  villeneuve.")
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::AnswerTooSimilar));
    let err = game_service::submit_answer(&state, game_id, "b", "Ridley Scott")
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::AnswerAlreadySubmitted));
}

#[tokio::test]
async fn answers_need_a_drawn_question() {
    let (state, _backend) = setup().await;
    let code = lobby(&state, &["a", "b"]).await;
    let game = game_service::start_game(&state, &code).await.unwrap();

    let err = game_service::submit_answer(&state, game.id, "b", "Anything")
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::CategoryNotSelected));

    let err = game_service::select_category(&state, game.id, "movies")
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::NoActiveTurn));

    game_service::start_turn(&state, game.id, "a").await.unwrap();
    let err = game_service::select_category(&state, game.id, "music")
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::InvalidCategory(_)));

    let game = game_service::select_category(&state, game.id, "movies")
        .await
        .unwrap();
    let round = game.current_round().unwrap();
    assert_eq!(round.question.as_deref(), Some("Who directed Inception?"));
    assert_eq!(round.answer_pool.correct_answer, "Christopher Nolan");
    assert_eq!(
        round.current_turn.as_ref().and_then(|turn| turn.category.as_deref()),
        Some("movies")
    );
}

#[tokio::test]
async fn voting_opens_after_every_non_author_answered_and_scores_the_round() {
    let (state, _backend) = setup().await;
    let game_id = round_with_question(&state, &["a", "b", "c", "d"]).await;

    for (author, text) in [("b", "Steven Spielberg"), ("c", "Denis Villeneuve")] {
        let game = game_service::submit_answer(&state, game_id, author, text)
            .await
            .unwrap();
        let round = game.current_round().unwrap();
        assert_eq!(round.status, RoundStatus::Waiting);
        assert_eq!(round.answer_pool.choice_count(), 4);
    }

    let early = game_service::submit_vote(&state, game_id, "a", Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(early, GameError::RoundNotVoting));

    let game = game_service::submit_answer(&state, game_id, "d", "Ridley Scott")
        .await
        .unwrap();
    let round = game.current_round().unwrap();
    assert_eq!(round.status, RoundStatus::Voting);
    assert_eq!(round.answer_pool.fake_answers.len(), 3);
    assert_eq!(round.answer_pool.choice_count(), 4);
    assert_eq!(
        round.current_turn.as_ref().map(|turn| turn.status),
        Some(TurnStatus::Ended)
    );

    let answer_of = |author: &str| {
        round
            .answer_pool
            .fake_answers
            .iter()
            .find(|answer| answer.player_id == author)
            .map(|answer| answer.id)
            .unwrap()
    };
    let spielberg = answer_of("b");
    let villeneuve = answer_of("c");
    let filler = round.answer_pool.filler_answers[0].id;

    let err = game_service::submit_vote(&state, game_id, "a", Uuid::new_v4())
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::InvalidVote(_)));

    game_service::submit_vote(&state, game_id, "a", spielberg).await.unwrap();
    let err = game_service::submit_vote(&state, game_id, "a", villeneuve)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::VoteAlreadySubmitted));

    game_service::submit_vote(&state, game_id, "c", spielberg).await.unwrap();
    let game = game_service::submit_vote(&state, game_id, "d", villeneuve)
        .await
        .unwrap();
    assert_eq!(game.current_round().unwrap().status, RoundStatus::Voting);

    let game = game_service::submit_vote(&state, game_id, "b", filler).await.unwrap();
    let round = game.current_round().unwrap();
    assert_eq!(round.status, RoundStatus::Completed);
    assert!(round.end_time.is_some());
    assert_eq!(round.answer_pool.total_votes(), 4);

    let score = |id: &str| game.player(id).unwrap().score;
    assert_eq!(score("a"), 0);
    assert_eq!(score("b"), 2);
    assert_eq!(score("c"), 1);
    assert_eq!(score("d"), 0);

    let err = game_service::submit_vote(&state, game_id, "a", spielberg)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::RoundNotVoting));
}

#[tokio::test]
async fn completed_round_makes_way_for_the_next_turn_up_to_the_round_count() {
    let (state, _backend) = setup().await;
    let settings = GameSettings {
        rounds: 2,
        ..movie_settings()
    };
    let game = game_service::create_game(&state, None, player("a"), Some(settings))
        .await
        .unwrap();
    game_service::join_game(&state, &game.code, player("b")).await.unwrap();
    game_service::start_game(&state, &game.code).await.unwrap();

    game_service::end_round(&state, game.id).await.unwrap();
    let err = game_service::end_round(&state, game.id).await.unwrap_err();
    assert!(matches!(err, GameError::RoundAlreadyCompleted));

    let next = game_service::start_turn(&state, game.id, "b").await.unwrap();
    assert_eq!(next.rounds.len(), 2);
    assert_eq!(next.rounds[0].status, RoundStatus::Completed);
    assert_eq!(next.rounds[1].status, RoundStatus::Waiting);
    assert_eq!(
        next.rounds[1].current_turn.as_ref().map(|turn| turn.player_id.as_str()),
        Some("b")
    );

    game_service::end_round(&state, game.id).await.unwrap();
    let err = game_service::start_turn(&state, game.id, "a").await.unwrap_err();
    assert!(matches!(err, GameError::RoundLimitReached));
}

#[tokio::test]
async fn engine_refuses_round_operations_before_start() {
    let (state, _backend) = setup().await;
    let code = lobby(&state, &["a", "b"]).await;
    let game = state.games.get_by_code(&code).await.unwrap();

    let err = game_service::start_turn(&state, game.id, "a").await.unwrap_err();
    assert!(matches!(err, GameError::GameNotStarted));
    let err = game_service::end_round(&state, game.id).await.unwrap_err();
    assert!(matches!(err, GameError::NoRoundsYet));
}

#[tokio::test]
async fn ending_a_game_evicts_it_from_the_cache_only() {
    let (state, backend) = setup().await;
    let code = lobby(&state, &["a", "b"]).await;
    game_service::start_game(&state, &code).await.unwrap();

    let ended = game_service::end_game(&state, &code).await.unwrap();
    assert_eq!(ended.status, GameStatus::Ended);
    assert!(state.games.cache().get(ended.id).unwrap().is_none());
    assert_eq!(
        backend.stored(ended.id).await.map(|game| game.status),
        Some(GameStatus::Ended)
    );

    let err = game_service::end_game(&state, &code).await.unwrap_err();
    assert!(matches!(err, GameError::GameAlreadyEnded));
    assert!(state.games.cache().get(ended.id).unwrap().is_none());

    let reused = game_service::create_game(&state, Some(code.clone()), player("c"), None)
        .await
        .unwrap();
    assert_ne!(reused.id, ended.id);
}

#[tokio::test]
async fn sweep_ends_idle_games_and_leaves_active_ones() {
    let (state, backend) = setup().await;
    let idle_code = lobby(&state, &["a", "b"]).await;
    let active_code = lobby(&state, &["c", "d"]).await;

    let mut idle = state.games.get_by_code(&idle_code).await.unwrap();
    idle.last_activity = OffsetDateTime::now_utc() - time::Duration::hours(25);
    state.games.put(&idle).await.unwrap();

    assert_eq!(game_service::cleanup_inactive_games(&state).await, 1);

    assert!(state.games.cache().get(idle.id).unwrap().is_none());
    assert_eq!(
        backend.stored(idle.id).await.map(|game| game.status),
        Some(GameStatus::Ended)
    );
    let active = state.games.get_by_code(&active_code).await.unwrap();
    assert_eq!(active.status, GameStatus::Waiting);

    assert_eq!(game_service::cleanup_inactive_games(&state).await, 0);
}

#[tokio::test]
async fn sweep_also_finds_idle_games_missing_from_the_cache() {
    let (state, backend) = setup().await;
    let code = lobby(&state, &["a", "b"]).await;

    let mut game = state.games.get_by_code(&code).await.unwrap();
    game.last_activity = OffsetDateTime::now_utc() - time::Duration::days(2);
    state.games.put(&game).await.unwrap();
    state.games.delete(game.id);

    assert_eq!(game_service::cleanup_inactive_games(&state).await, 1);
    assert_eq!(
        backend.stored(game.id).await.map(|game| game.status),
        Some(GameStatus::Ended)
    );
}

#[tokio::test]
async fn storage_failure_aborts_without_touching_the_cache() {
    let (state, backend) = setup().await;
    let code = lobby(&state, &["a"]).await;

    backend.set_offline(true);
    let err = game_service::join_game(&state, &code, player("b")).await.unwrap_err();
    assert!(matches!(err, GameError::Storage(_)));
    assert_eq!(err.kind(), ErrorKind::Infrastructure);

    let cached = state.games.get_by_code(&code).await.unwrap();
    assert_eq!(cached.players.len(), 1);

    backend.set_offline(false);
    let game = game_service::join_game(&state, &code, player("b")).await.unwrap();
    assert_eq!(game.players.len(), 2);
}

#[tokio::test]
async fn degraded_store_rejects_new_games() {
    let state = AppState::new(AppConfig::default(), Arc::new(question_bank()));
    let err = game_service::create_game(&state, None, player("a"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::Degraded));
}

#[tokio::test]
async fn concurrent_joins_are_never_lost() {
    let (state, _backend) = setup().await;
    let code = lobby(&state, &["host"]).await;

    let joins: Vec<_> = (0..7)
        .map(|index| {
            let state = state.clone();
            let code = code.clone();
            tokio::spawn(async move {
                game_service::join_game(&state, &code, player(&format!("p{index}"))).await
            })
        })
        .collect();

    let mut accepted = 0;
    let mut full = 0;
    for join in joins {
        match join.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(GameError::GameFull) => full += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(accepted, 7);
    assert_eq!(full, 0);
    let game = state.games.get_by_code(&code).await.unwrap();
    assert_eq!(game.players.len(), 8);
}

#[tokio::test]
async fn watchers_receive_events_in_issue_order() {
    let (state, _backend) = setup().await;
    let code = lobby(&state, &["a"]).await;
    let game = state.games.get_by_code(&code).await.unwrap();
    let mut watcher = state.hub.register(game.id).await;
    let mut other_game = state.hub.register(Uuid::new_v4()).await;

    game_service::join_game(&state, &code, player("b")).await.unwrap();
    let frames = drain(&state, game.id, &mut watcher.outbound).await;
    let types: Vec<&str> = frames.iter().filter_map(|f| f["type"].as_str()).collect();
    assert_eq!(types, ["player_joined", "game_updated"]);
    assert_eq!(frames[0]["payload"]["id"], "b");
    assert_eq!(frames[1]["payload"]["players"].as_array().map(Vec::len), Some(2));
    assert!(other_game.outbound.try_recv().is_err());

    game_service::start_game(&state, &code).await.unwrap();
    game_service::start_turn(&state, game.id, "a").await.unwrap();

    let mut types = Vec::new();
    while types.len() < 4 {
        let frame = timeout(Duration::from_secs(2), watcher.outbound.recv())
            .await
            .unwrap()
            .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        types.push(value["type"].as_str().unwrap_or_default().to_string());
        if value["type"] == "timer_started" {
            assert_eq!(value["timer_type"], "category_selection");
            assert_eq!(value["duration"], 30);
        }
    }
    assert_eq!(types, ["game_started", "game_updated", "game_updated", "timer_started"]);
}

#[tokio::test]
async fn presence_changes_are_persisted_and_broadcast() {
    let (state, _backend) = setup().await;
    let code = lobby(&state, &["a", "b"]).await;
    let game = state.games.get_by_code(&code).await.unwrap();
    let mut watcher = state.hub.register(game.id).await;

    let updated = game_service::handle_player_disconnection(&state, game.id, "b")
        .await
        .unwrap();
    assert!(!updated.player("b").unwrap().is_connected);

    let frames = drain(&state, game.id, &mut watcher.outbound).await;
    assert_eq!(frames[0]["type"], "player_disconnected");
    assert_eq!(
        frames[0]["payload"],
        serde_json::json!({"player_id": "b", "status": "disconnected"})
    );

    let updated = game_service::handle_player_reconnection(&state, game.id, "b")
        .await
        .unwrap();
    assert!(updated.player("b").unwrap().is_connected);
    let frames = drain(&state, game.id, &mut watcher.outbound).await;
    assert_eq!(frames[0]["type"], "player_reconnected");
    assert_eq!(frames[0]["payload"]["is_connected"], true);

    let err = game_service::handle_player_disconnection(&state, game.id, "ghost")
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::PlayerNotFound(_)));
}

/// Always proposes the same code, so every attempt after the first collides.
struct FixedCode(&'static str);

impl CodeGenerator for FixedCode {
    fn generate(&self) -> String {
        self.0.to_string()
    }
}

#[tokio::test]
async fn code_allocation_gives_up_after_the_configured_attempts() {
    let config = AppConfig {
        code_attempts: 3,
        ..AppConfig::default()
    };
    let state = AppState::with_collaborators(
        config,
        Arc::new(question_bank()),
        Arc::new(TemplateFillers),
        Arc::new(FixedCode("ABCD")),
    );
    state
        .games
        .install_backend(Arc::new(MemoryGameStore::new()))
        .await;

    let first = game_service::create_game(&state, None, player("a"), None)
        .await
        .unwrap();
    assert_eq!(first.code, "ABCD");

    let err = game_service::create_game(&state, None, player("b"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::CodeGenerationExhausted { attempts: 3 }));
    assert_eq!(err.kind(), ErrorKind::Exhausted);

    let explicit = game_service::create_game(&state, Some("wxyz".into()), player("b"), None)
        .await
        .unwrap();
    assert_eq!(explicit.code, "WXYZ");
}

#[tokio::test]
async fn turns_only_start_on_a_waiting_round_without_a_question() {
    let (state, _backend) = setup().await;
    let game_id = round_with_question(&state, &["a", "b"]).await;

    let err = game_service::start_turn(&state, game_id, "b").await.unwrap_err();
    assert!(matches!(err, GameError::RoundNotWaiting));

    let game = game_service::submit_answer(&state, game_id, "b", "Steven Spielberg")
        .await
        .unwrap();
    assert_eq!(game.current_round().unwrap().status, RoundStatus::Voting);

    let err = game_service::start_turn(&state, game_id, "b").await.unwrap_err();
    assert!(matches!(err, GameError::RoundNotWaiting));
    let err = game_service::submit_answer(&state, game_id, "a", "Denis Villeneuve")
        .await
        .unwrap_err();
    assert!(matches!(err, GameError::RoundNotAcceptingAnswers));

    let game = state.games.get(game_id).await.unwrap();
    let round = game.current_round().unwrap();
    assert_eq!(round.answer_pool.fake_answers.len(), 1);
    assert_eq!(round.status, RoundStatus::Voting);
}

#[tokio::test]
async fn unknown_games_leave_no_gate_behind() {
    let (state, _backend) = setup().await;
    lobby(&state, &["a", "b"]).await;
    let gates = state.gates.len();

    for _ in 0..100 {
        let err = game_service::submit_vote(&state, Uuid::new_v4(), "a", Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::GameNotFound));
        let err = game_service::start_turn(&state, Uuid::new_v4(), "a")
            .await
            .unwrap_err();
        assert!(matches!(err, GameError::GameNotFound));
    }
    assert_eq!(state.gates.len(), gates);
}

#[tokio::test]
async fn concurrent_answers_and_votes_are_all_counted() {
    let (state, _backend) = setup().await;
    let players = ["a", "b", "c", "d"];
    let game_id = round_with_question(&state, &players).await;

    let answers: Vec<_> = [
        ("b", "Steven Spielberg"),
        ("c", "Denis Villeneuve"),
        ("d", "Quentin Tarantino"),
    ]
    .into_iter()
    .map(|(author, text)| {
        let state = state.clone();
        tokio::spawn(async move { game_service::submit_answer(&state, game_id, author, text).await })
    })
    .collect();
    for answer in answers {
        answer.await.unwrap().unwrap();
    }

    let game = state.games.get(game_id).await.unwrap();
    let round = game.current_round().unwrap();
    assert_eq!(round.status, RoundStatus::Voting);
    let mut authors: Vec<&str> = round
        .answer_pool
        .fake_answers
        .iter()
        .map(|answer| answer.player_id.as_str())
        .collect();
    authors.sort_unstable();
    assert_eq!(authors, ["b", "c", "d"]);

    let ballots: Vec<(&str, Uuid)> = players
        .iter()
        .map(|&voter| {
            let choice = round
                .answer_pool
                .fake_answers
                .iter()
                .find(|answer| answer.player_id != voter)
                .map(|answer| answer.id)
                .unwrap();
            (voter, choice)
        })
        .collect();
    let votes: Vec<_> = ballots
        .into_iter()
        .map(|(voter, choice)| {
            let state = state.clone();
            tokio::spawn(async move { game_service::submit_vote(&state, game_id, voter, choice).await })
        })
        .collect();
    for vote in votes {
        vote.await.unwrap().unwrap();
    }

    let game = state.games.get(game_id).await.unwrap();
    let round = game.current_round().unwrap();
    assert_eq!(round.status, RoundStatus::Completed);
    assert_eq!(round.answer_pool.total_votes(), players.len());
}

#[tokio::test]
async fn ending_a_game_closes_its_watchers() {
    let (state, _backend) = setup().await;
    let code = lobby(&state, &["a", "b"]).await;
    let game = state.games.get_by_code(&code).await.unwrap();
    let mut watcher = state.hub.register(game.id).await;

    game_service::end_game(&state, &code).await.unwrap();

    let mut types = Vec::new();
    while let Some(frame) = timeout(Duration::from_secs(2), watcher.outbound.recv())
        .await
        .unwrap()
    {
        let value: Value = serde_json::from_str(&frame).unwrap();
        types.push(value["type"].as_str().unwrap_or_default().to_string());
    }
    assert_eq!(types, ["game_ended", "game_updated"]);
    assert_eq!(state.hub.connected_count(game.id).await, 0);
}
