//! The session engine: lobby lifecycle, turns, answers, votes and scoring.
//!
//! Every operation runs under the per-game gate and follows the same sequence: read the
//! game, mutate it in memory, persist it, then broadcast. A failure before the durable write
//! leaves both stores untouched.

use std::collections::HashSet;

use indexmap::IndexMap;
use rand::seq::SliceRandom;
use time::OffsetDateTime;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::GameError,
    services::{
        events,
        join_code::{is_valid_code, normalize_code},
        similarity::is_similar,
    },
    state::{
        SharedState,
        game::{
            Answer, AnswerPool, Game, GameSettings, GameStatus, Player, Round, RoundStatus,
            SYSTEM_AUTHOR, Timer, TimerKind, Turn, TurnStatus,
        },
    },
};

/// Open a new lobby hosted by `host`.
///
/// Without an explicit code, random codes are tried until a free one turns up. Without
/// explicit settings the configured defaults apply; when those name no category, every
/// category of the question bank is selected.
pub async fn create_game(
    state: &SharedState,
    code: Option<String>,
    host: Player,
    settings: Option<GameSettings>,
) -> Result<Game, GameError> {
    ensure_not_reserved(&host.id)?;
    let settings = resolve_settings(state, settings).await?;

    let _codes = state.gates.lock_codes().await;
    let code = match code {
        Some(code) => {
            let code = normalize_code(&code);
            if !is_valid_code(&code) {
                return Err(GameError::InvalidCode(code));
            }
            if state.games.code_in_use(&code).await? {
                return Err(GameError::CodeTaken(code));
            }
            code
        }
        None => allocate_code(state).await?,
    };

    let game = Game::new(code, host, settings);
    state.games.create(&game).await.inspect_err(|err| {
        warn!(game_id = %game.id, error = %err, "failed to create game");
    })?;
    info!(game_id = %game.id, code = %game.code, host = %game.host_id, "game created");

    events::broadcast_game_created(state, &game).await;
    events::broadcast_game_updated(state, &game).await;
    Ok(game)
}

/// Add `player` to the lobby identified by `code`.
pub async fn join_game(state: &SharedState, code: &str, player: Player) -> Result<Game, GameError> {
    ensure_not_reserved(&player.id)?;
    let game_id = resolve_code(state, code).await?;
    let (_gate, mut game) = load_locked(state, game_id).await?;

    if game.status != GameStatus::Waiting {
        return Err(GameError::GameAlreadyStarted);
    }
    if game.players.len() >= game.settings.max_players {
        return Err(GameError::GameFull);
    }
    if game.has_player(&player.id) {
        return Err(GameError::PlayerAlreadyInGame(player.id));
    }

    game.players.push(player.clone());
    persist(state, &mut game).await?;
    debug!(game_id = %game.id, player_id = %player.id, "player joined");

    events::broadcast_player_joined(state, game.id, &player).await;
    events::broadcast_game_updated(state, &game).await;
    Ok(game)
}

/// Leave the lobby and open round one.
pub async fn start_game(state: &SharedState, code: &str) -> Result<Game, GameError> {
    let game_id = resolve_code(state, code).await?;
    let (_gate, mut game) = load_locked(state, game_id).await?;

    if game.status != GameStatus::Waiting {
        return Err(GameError::GameAlreadyStarted);
    }
    if game.players.len() < 2 {
        return Err(GameError::NotEnoughPlayers);
    }

    game.status = GameStatus::Playing;
    game.push_round();
    persist(state, &mut game).await?;
    info!(game_id = %game.id, players = game.players.len(), "game started");

    events::broadcast_game_started(state, &game).await;
    events::broadcast_game_updated(state, &game).await;
    Ok(game)
}

/// Hand the category pick of the current round to `player_id`.
///
/// Once the last round is completed this opens the next one, up to the configured round
/// count.
pub async fn start_turn(
    state: &SharedState,
    game_id: Uuid,
    player_id: &str,
) -> Result<Game, GameError> {
    let (_gate, mut game) = load_locked(state, game_id).await?;
    ensure_playing(&game)?;
    ensure_player(&game, player_id)?;

    let next_number = game.rounds.len();
    let round_limit = game.settings.rounds;
    let needs_round = match game.current_round() {
        None => true,
        Some(round) if round.status == RoundStatus::Completed => true,
        Some(round) if round.status != RoundStatus::Waiting || round.has_question() => {
            return Err(GameError::RoundNotWaiting);
        }
        Some(_) => false,
    };
    if needs_round {
        if u32::try_from(next_number).map_or(true, |played| played >= round_limit) {
            return Err(GameError::RoundLimitReached);
        }
        game.push_round();
    }

    let timer = Timer::starting_now(
        TimerKind::CategorySelection,
        game.settings.time_limits.category_selection,
    );
    let round = active_round(&mut game)?;
    round.current_turn = Some(Turn {
        player_id: player_id.to_string(),
        start_time: timer.start_time,
        end_time: None,
        status: TurnStatus::Active,
        category: None,
        timer: Some(timer.clone()),
    });

    persist(state, &mut game).await?;
    debug!(game_id = %game.id, player_id, "turn started");

    events::broadcast_game_updated(state, &game).await;
    state.hub.start_timer(game.id, timer);
    Ok(game)
}

/// Pick the category of the current round and draw its question.
pub async fn select_category(
    state: &SharedState,
    game_id: Uuid,
    category: &str,
) -> Result<Game, GameError> {
    let (_gate, mut game) = load_locked(state, game_id).await?;
    ensure_playing(&game)?;

    {
        let round = game.current_round().ok_or(GameError::NoRoundsYet)?;
        let turn = round
            .current_turn
            .as_ref()
            .filter(|turn| turn.status == TurnStatus::Active)
            .ok_or(GameError::NoActiveTurn)?;
        if turn.category.is_some() || round.has_question() {
            return Err(GameError::CategoryAlreadySelected);
        }
    }
    if !game
        .settings
        .selected_categories
        .iter()
        .any(|selected| selected == category)
    {
        return Err(GameError::InvalidCategory(category.to_string()));
    }

    let question = state
        .questions
        .random_question(category.to_string())
        .await?
        .ok_or_else(|| GameError::QuestionNotFound(category.to_string()))?;

    let timer = Timer::starting_now(
        TimerKind::AnswerWriting,
        game.settings.time_limits.answer_writing,
    );
    let round = active_round(&mut game)?;
    round.category = Some(category.to_string());
    round.question_id = Some(question.id.clone());
    round.question = Some(question.text);
    round.answer_pool.correct_answer = question.answer;
    round.timer = Some(timer.clone());
    if let Some(turn) = round.current_turn.as_mut() {
        turn.category = Some(category.to_string());
        turn.timer = None;
    }

    persist(state, &mut game).await?;
    debug!(game_id = %game.id, category, question_id = %question.id, "category selected");

    events::broadcast_game_updated(state, &game).await;
    state.hub.start_timer(game.id, timer);
    Ok(game)
}

/// Add a decoy written by `player_id`, pad the pool, and open voting once every
/// non-author has written one.
pub async fn submit_answer(
    state: &SharedState,
    game_id: Uuid,
    player_id: &str,
    text: &str,
) -> Result<Game, GameError> {
    let (_gate, mut game) = load_locked(state, game_id).await?;
    ensure_playing(&game)?;
    ensure_player(&game, player_id)?;

    let text = text.trim();
    let player_count = game.players.len();
    let voting_duration = game.settings.time_limits.voting;
    let filler_attempts = state.config.filler_attempts;

    let round = active_round(&mut game)?;
    if round.status != RoundStatus::Waiting {
        return Err(GameError::RoundNotAcceptingAnswers);
    }
    if !round.has_question() {
        return Err(GameError::CategoryNotSelected);
    }
    let pool = &mut round.answer_pool;
    if pool.has_answered(player_id) {
        return Err(GameError::AnswerAlreadySubmitted);
    }
    if text.is_empty()
        || is_similar(&pool.correct_answer, text)
        || pool
            .fake_answers
            .iter()
            .any(|answer| is_similar(&answer.text, text))
    {
        return Err(GameError::AnswerTooSimilar);
    }

    pool.fake_answers.push(Answer::new(player_id, text));
    // A player answer takes precedence over any server decoy it resembles.
    pool.filler_answers
        .retain(|filler| !is_similar(&filler.text, text));

    let fillers = match round.question_id.clone() {
        Some(id) if round.answer_pool.choice_count() < player_count => state
            .questions
            .find_question(id)
            .await?
            .map(|question| question.filler_answers)
            .unwrap_or_default(),
        _ => Vec::new(),
    };
    fill_pool(state, round, player_count, fillers, filler_attempts);

    let voting_timer = (round.answer_pool.fake_answers.len() + 1 == player_count).then(|| {
        let timer = Timer::starting_now(TimerKind::Voting, voting_duration);
        round.status = RoundStatus::Voting;
        round.timer = Some(timer.clone());
        if let Some(turn) = round.current_turn.as_mut() {
            turn.status = TurnStatus::Ended;
            turn.end_time = Some(timer.start_time);
            turn.timer = None;
        }
        timer
    });
    let voting_started = voting_timer.is_some();

    persist(state, &mut game).await?;
    debug!(game_id = %game.id, player_id, voting_started, "answer accepted");

    events::broadcast_game_updated(state, &game).await;
    if let Some(timer) = voting_timer {
        state.hub.start_timer(game.id, timer);
    }
    Ok(game)
}

/// Record the vote of `player_id` and score the round once everyone voted.
pub async fn submit_vote(
    state: &SharedState,
    game_id: Uuid,
    player_id: &str,
    answer_id: Uuid,
) -> Result<Game, GameError> {
    let (_gate, mut game) = load_locked(state, game_id).await?;
    ensure_playing(&game)?;
    ensure_player(&game, player_id)?;

    let player_count = game.players.len();
    let round = active_round(&mut game)?;
    if round.status != RoundStatus::Voting {
        return Err(GameError::RoundNotVoting);
    }
    if round.answer_pool.has_voted(player_id) {
        return Err(GameError::VoteAlreadySubmitted);
    }
    let answer = round
        .answer_pool
        .choice_mut(answer_id)
        .ok_or(GameError::InvalidVote(answer_id))?;
    answer.votes.push(player_id.to_string());

    let completed = round.answer_pool.total_votes() >= player_count;
    if completed {
        let awards = score_round(&round.answer_pool);
        round.complete();
        for (author, points) in awards {
            if let Some(player) = game.player_mut(&author) {
                player.score = player.score.saturating_add(points);
            }
        }
    }

    persist(state, &mut game).await?;
    debug!(game_id = %game.id, player_id, %answer_id, completed, "vote recorded");

    if completed {
        events::broadcast_round_ended(state, &game).await;
    }
    events::broadcast_game_updated(state, &game).await;
    Ok(game)
}

/// Close the current round without scoring it.
pub async fn end_round(state: &SharedState, game_id: Uuid) -> Result<Game, GameError> {
    let (_gate, mut game) = load_locked(state, game_id).await?;
    if game.status == GameStatus::Ended {
        return Err(GameError::GameAlreadyEnded);
    }

    let round = game.current_round_mut().ok_or(GameError::NoRoundsYet)?;
    if round.status == RoundStatus::Completed {
        return Err(GameError::RoundAlreadyCompleted);
    }
    let now = OffsetDateTime::now_utc();
    round.complete();
    if let Some(turn) = round
        .current_turn
        .as_mut()
        .filter(|turn| turn.status != TurnStatus::Ended)
    {
        turn.status = TurnStatus::Ended;
        turn.end_time = Some(now);
        turn.timer = None;
    }

    persist(state, &mut game).await?;
    info!(game_id = %game.id, round = game.rounds.len(), "round ended early");

    events::broadcast_round_ended(state, &game).await;
    events::broadcast_game_updated(state, &game).await;
    Ok(game)
}

/// Finish the game identified by `code` and drop it from the cache.
pub async fn end_game(state: &SharedState, code: &str) -> Result<Game, GameError> {
    let game_id = resolve_code(state, code).await?;
    end_game_by_id(state, game_id).await
}

async fn end_game_by_id(state: &SharedState, game_id: Uuid) -> Result<Game, GameError> {
    let (gate, mut game) = load_locked(state, game_id).await?;
    if game.status == GameStatus::Ended {
        return Err(GameError::GameAlreadyEnded);
    }

    game.status = GameStatus::Ended;
    persist(state, &mut game).await?;
    info!(game_id = %game.id, code = %game.code, "game ended");

    events::broadcast_game_ended(state, &game).await;
    events::broadcast_game_updated(state, &game).await;
    state.hub.close_game(game.id).await;
    state.games.delete(game.id);

    drop(gate);
    state.gates.forget(game.id);
    Ok(game)
}

/// Mark `player_id` connected again.
pub async fn handle_player_reconnection(
    state: &SharedState,
    game_id: Uuid,
    player_id: &str,
) -> Result<Game, GameError> {
    let (_gate, mut game) = load_locked(state, game_id).await?;
    let player = set_connected(&mut game, player_id, true)?;

    persist(state, &mut game).await?;
    debug!(game_id = %game.id, player_id, "player reconnected");

    events::broadcast_player_reconnected(state, game.id, &player).await;
    events::broadcast_game_updated(state, &game).await;
    Ok(game)
}

/// Mark `player_id` disconnected.
pub async fn handle_player_disconnection(
    state: &SharedState,
    game_id: Uuid,
    player_id: &str,
) -> Result<Game, GameError> {
    let (_gate, mut game) = load_locked(state, game_id).await?;
    set_connected(&mut game, player_id, false)?;

    persist(state, &mut game).await?;
    debug!(game_id = %game.id, player_id, "player disconnected");

    events::broadcast_player_disconnected(state, game.id, player_id).await;
    events::broadcast_game_updated(state, &game).await;
    Ok(game)
}

/// End every game idle for longer than the configured threshold.
///
/// Cached games are always inspected. Unfinished games of the durable store are inspected
/// too while it is reachable. Returns how many games were ended; a failure on one game is
/// logged and does not stop the sweep.
pub async fn cleanup_inactive_games(state: &SharedState) -> usize {
    let purged = state.games.cache().purge_expired();
    if purged > 0 {
        debug!(purged, "purged expired cache entries");
    }

    let mut candidates = state.games.cache().games();
    match state.games.durable_unfinished().await {
        Ok(durable) => candidates.extend(durable),
        Err(GameError::Degraded) => debug!("skipping durable games during sweep: degraded"),
        Err(err) => warn!(error = %err, "failed to list durable games during sweep"),
    }

    let threshold = state.config.inactivity_threshold;
    let now = OffsetDateTime::now_utc();
    let mut seen = HashSet::new();
    let mut ended = 0;
    for game in candidates {
        if !seen.insert(game.id) {
            continue;
        }
        if game.status == GameStatus::Ended {
            state.games.delete(game.id);
            continue;
        }
        if !game.is_idle(now, threshold) {
            continue;
        }

        match end_idle_game(state, game.id).await {
            Ok(true) => ended += 1,
            Ok(false) => {}
            Err(err) => warn!(game_id = %game.id, error = %err, "failed to end idle game"),
        }
    }

    if ended > 0 {
        info!(ended, "ended inactive games");
    }
    ended
}

/// Re-check idleness under the gate, since activity may have landed since the scan.
async fn end_idle_game(state: &SharedState, game_id: Uuid) -> Result<bool, GameError> {
    {
        let (_gate, game) = load_locked(state, game_id).await?;
        let still_idle = game.status != GameStatus::Ended
            && game.is_idle(OffsetDateTime::now_utc(), state.config.inactivity_threshold);
        if !still_idle {
            return Ok(false);
        }
    }
    match end_game_by_id(state, game_id).await {
        Ok(_) => Ok(true),
        Err(GameError::GameAlreadyEnded) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Points earned by each author of the pool's player answers.
///
/// Answers sharing the exact same text form one group, and every author in a group earns
/// the votes of the whole group. Server decoys earn nobody anything.
pub fn score_round(pool: &AnswerPool) -> IndexMap<String, u32> {
    let mut groups: IndexMap<&str, (u32, Vec<&str>)> = IndexMap::new();
    for answer in &pool.fake_answers {
        let (votes, authors) = groups.entry(answer.text.as_str()).or_default();
        *votes = votes.saturating_add(u32::try_from(answer.votes.len()).unwrap_or(u32::MAX));
        authors.push(answer.player_id.as_str());
    }

    let mut awards = IndexMap::new();
    for (votes, authors) in groups.into_values() {
        for author in authors {
            let points: &mut u32 = awards.entry(author.to_string()).or_default();
            *points = points.saturating_add(votes);
        }
    }
    awards
}

/// Top the pool up to one choice per player: question decoys first, then synthesized ones.
fn fill_pool(
    state: &SharedState,
    round: &mut Round,
    player_count: usize,
    mut question_fillers: Vec<String>,
    max_attempts: u32,
) {
    let pool = &mut round.answer_pool;
    while pool.choice_count() > player_count && pool.filler_answers.pop().is_some() {}
    if pool.choice_count() >= player_count {
        return;
    }

    question_fillers.shuffle(&mut rand::rng());
    for text in question_fillers {
        if pool.choice_count() >= player_count {
            return;
        }
        push_filler(pool, text);
    }

    let category = round.category.as_deref().unwrap_or_default();
    let question = round.question.as_deref().unwrap_or_default();
    let mut attempts = 0;
    while pool.choice_count() < player_count && attempts < max_attempts {
        attempts += 1;
        let text = state.fillers.synthesize(category, question);
        push_filler(pool, text);
    }

    if pool.choice_count() < player_count {
        warn!(
            attempts,
            choices = pool.choice_count(),
            players = player_count,
            "could not synthesize enough distinct filler answers"
        );
    }
}

fn push_filler(pool: &mut AnswerPool, text: String) -> bool {
    let text = text.trim();
    if text.is_empty() || pool.taken_texts().any(|taken| is_similar(taken, text)) {
        return false;
    }
    pool.filler_answers.push(Answer::new(SYSTEM_AUTHOR, text));
    true
}

async fn resolve_settings(
    state: &SharedState,
    settings: Option<GameSettings>,
) -> Result<GameSettings, GameError> {
    let available = state.questions.categories().await?;
    let settings = match settings {
        Some(settings) => settings,
        None => {
            let mut defaults = state.config.default_settings.clone();
            if defaults.selected_categories.is_empty() {
                defaults.selected_categories = available.clone();
            }
            defaults
        }
    };

    if settings.selected_categories.is_empty() {
        return Err(GameError::InvalidCategory(
            "at least one category must be selected".into(),
        ));
    }
    if let Some(unknown) = settings
        .selected_categories
        .iter()
        .find(|category| !available.contains(category))
    {
        return Err(GameError::InvalidCategory(unknown.clone()));
    }
    settings.validate()?;
    Ok(settings)
}

async fn allocate_code(state: &SharedState) -> Result<String, GameError> {
    let attempts = state.config.code_attempts.max(1);
    for attempt in 1..=attempts {
        let code = state.codes.generate();
        if !state.games.code_in_use(&code).await? {
            return Ok(code);
        }
        debug!(attempt, code = %code, "generated join code already in use");
    }
    warn!(attempts, "join code generation exhausted");
    Err(GameError::CodeGenerationExhausted { attempts })
}

async fn resolve_code(state: &SharedState, code: &str) -> Result<Uuid, GameError> {
    Ok(state.games.get_by_code(&normalize_code(code)).await?.id)
}

async fn load_locked(
    state: &SharedState,
    game_id: Uuid,
) -> Result<(OwnedMutexGuard<()>, Game), GameError> {
    let gate = state.gates.lock(game_id).await;
    match state.games.get(game_id).await {
        Ok(game) => Ok((gate, game)),
        Err(err) => {
            drop(gate);
            state.gates.forget(game_id);
            Err(err)
        }
    }
}

async fn persist(state: &SharedState, game: &mut Game) -> Result<(), GameError> {
    game.touch();
    state.games.put(game).await.inspect_err(|err| {
        warn!(game_id = %game.id, error = %err, "failed to persist game");
    })
}

fn active_round(game: &mut Game) -> Result<&mut Round, GameError> {
    game.current_round_mut().ok_or(GameError::NoRoundsYet)
}

fn ensure_playing(game: &Game) -> Result<(), GameError> {
    match game.status {
        GameStatus::Playing => Ok(()),
        GameStatus::Waiting => Err(GameError::GameNotStarted),
        GameStatus::Ended => Err(GameError::GameAlreadyEnded),
    }
}

fn ensure_player(game: &Game, player_id: &str) -> Result<(), GameError> {
    if game.has_player(player_id) {
        Ok(())
    } else {
        Err(GameError::PlayerNotFound(player_id.to_string()))
    }
}

fn ensure_not_reserved(player_id: &str) -> Result<(), GameError> {
    if player_id == SYSTEM_AUTHOR {
        Err(GameError::ReservedPlayerId(player_id.to_string()))
    } else {
        Ok(())
    }
}

fn set_connected(game: &mut Game, player_id: &str, connected: bool) -> Result<Player, GameError> {
    if game.status == GameStatus::Ended {
        return Err(GameError::GameAlreadyEnded);
    }
    let player = game
        .player_mut(player_id)
        .ok_or_else(|| GameError::PlayerNotFound(player_id.to_string()))?;
    player.is_connected = connected;
    player.last_seen = OffsetDateTime::now_utc();
    Ok(player.clone())
}
