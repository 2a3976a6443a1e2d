//! The quiz operations: next question, submit answer, metrics and
//! leaderboard reads.

use std::sync::Arc;
use std::time::Duration;

use quiz_cache::{CacheStore, RateLimiter};
use quiz_db::queries::{answers, leaderboard as rows, state};
use quiz_db::DbError;
use quiz_engine::adaptive::{self, Progress};
use quiz_engine::picker;
use quiz_engine::scoring::{self, ScoreInput};
use quiz_engine::QuestionBank;
use quiz_types::{
    AnswerResult, LeaderboardDimension, LeaderboardEvent, LeaderboardPage, NextQuestion,
    QuizMetrics, QuizQuestion, UserState,
};
use rusqlite::Connection;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{PickerMode, ServiceConfig};
use crate::feed::LeaderboardFeed;
use crate::leaderboard::{HydrateSnapshot, LeaderboardSync, UPDATES_CHANNEL};
use crate::store::UserStateStore;
use crate::{Result, ServiceError, MIN_TOKEN_LEN};

/// Who is calling. Identity is verified upstream; `client_key` is an
/// optional second rate-limit scope such as a peer address.
#[derive(Debug, Clone, Copy)]
pub struct Caller<'a> {
    pub user_id: &'a str,
    pub client_key: Option<&'a str>,
}

impl<'a> Caller<'a> {
    pub fn user(user_id: &'a str) -> Self {
        Self {
            user_id,
            client_key: None,
        }
    }

    fn authorized(&self) -> Result<&'a str> {
        if self.user_id.trim().is_empty() {
            return Err(ServiceError::Unauthorized);
        }
        Ok(self.user_id)
    }
}

/// An answer submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitAnswer {
    pub session_id: String,
    pub question_id: String,
    pub answer_index: usize,
    pub state_version: u64,
    pub idempotency_key: String,
}

impl SubmitAnswer {
    fn validate(&self) -> Result<()> {
        if self.session_id.len() < MIN_TOKEN_LEN {
            return Err(ServiceError::InvalidPayload(format!(
                "session_id must be at least {MIN_TOKEN_LEN} characters"
            )));
        }
        if self.idempotency_key.len() < MIN_TOKEN_LEN {
            return Err(ServiceError::InvalidPayload(format!(
                "idempotency_key must be at least {MIN_TOKEN_LEN} characters"
            )));
        }
        if self.question_id.is_empty() {
            return Err(ServiceError::InvalidPayload(
                "question_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// The serialized [`AnswerResult`] exactly as first returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedAnswer {
    pub payload: String,
    /// Served from the answer log rather than computed now.
    pub replayed: bool,
}

impl SubmittedAnswer {
    pub fn result(&self) -> serde_json::Result<AnswerResult> {
        serde_json::from_str(&self.payload)
    }
}

/// Outcome of the locked part of a submission.
enum Applied {
    Scored {
        payload: String,
        event: LeaderboardEvent,
    },
    Replay(String),
}

/// Errors raised inside the answer transaction. A duplicate key forces a
/// rollback and then replays the stored payload.
enum TxnError {
    Service(ServiceError),
    Duplicate(String),
}

impl From<DbError> for TxnError {
    fn from(e: DbError) -> Self {
        TxnError::Service(e.into())
    }
}

impl From<ServiceError> for TxnError {
    fn from(e: ServiceError) -> Self {
        TxnError::Service(e)
    }
}

pub struct QuizService {
    bank: Arc<QuestionBank>,
    store: UserStateStore,
    leaderboard: LeaderboardSync,
    limiter: RateLimiter,
    config: ServiceConfig,
}

impl QuizService {
    pub fn new(
        bank: Arc<QuestionBank>,
        store: UserStateStore,
        cache: Arc<dyn CacheStore>,
        limiter: RateLimiter,
        config: ServiceConfig,
    ) -> Self {
        let leaderboard = LeaderboardSync::new(cache, config.hydrate_limit);
        Self {
            bank,
            store,
            leaderboard,
            limiter,
            config,
        }
    }

    pub fn store(&self) -> &UserStateStore {
        &self.store
    }

    pub fn leaderboard(&self) -> &LeaderboardSync {
        &self.leaderboard
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    async fn enforce_limit(
        &self,
        caller: &Caller<'_>,
        scope: &str,
        per_user: u64,
        per_client: u64,
    ) -> Result<()> {
        let user = self
            .limiter
            .check(scope, &format!("user:{}", caller.user_id), per_user)
            .await;
        if !user.is_allowed() {
            return Err(ServiceError::RateLimitExceeded);
        }
        if let Some(client) = caller.client_key {
            let client = self
                .limiter
                .check(scope, &format!("client:{client}"), per_client)
                .await;
            if !client.is_allowed() {
                return Err(ServiceError::RateLimitExceeded);
            }
        }
        Ok(())
    }

    /// Serve the next question and advance the user's queue.
    ///
    /// A `requested_session` that differs from the stored one replaces it.
    pub async fn next_question(
        &self,
        caller: Caller<'_>,
        requested_session: Option<&str>,
    ) -> Result<NextQuestion> {
        let user_id = caller.authorized()?;
        self.enforce_limit(
            &caller,
            "quiz-next",
            self.config.next_max_per_user,
            self.config.next_max_per_client,
        )
        .await?;

        let requested_session = requested_session.filter(|s| !s.is_empty());

        self.store
            .with_user_state(user_id, |conn, user_state| -> Result<NextQuestion> {
                let now = crate::unix_now();
                adaptive::apply_inactivity_decay(user_state, now, self.config.decay_minutes);

                if let Some(session) = requested_session {
                    if session != user_state.session_id {
                        info!(user_id, "session replaced");
                        user_state.session_id = session.to_string();
                    }
                }

                let difficulty = user_state.current_difficulty;
                let question: QuizQuestion = match self.config.picker {
                    PickerMode::Circular => {
                        let seed = picker::cycle_seed(difficulty, crate::unix_millis());
                        picker::pick_circular(&self.bank, user_state, difficulty, seed)?.clone()
                    }
                    PickerMode::Random => picker::pick_random(
                        &self.bank,
                        difficulty,
                        user_state.last_question_id.as_deref(),
                        &user_state.recent_question_ids,
                        &mut rand::thread_rng(),
                    )?
                    .clone(),
                };

                user_state.last_question_id = Some(question.id.clone());
                user_state.remember_question(&question.id);
                state::persist(conn, user_state, now)?;

                debug!(
                    user_id,
                    question_id = %question.id,
                    %difficulty,
                    "served question"
                );
                Ok(NextQuestion {
                    question_id: question.id,
                    difficulty,
                    prompt: question.prompt,
                    choices: question.choices,
                    session_id: user_state.session_id.clone(),
                    state_version: user_state.state_version,
                    current_score: user_state.total_score,
                    current_streak: user_state.streak,
                })
            })
            .await
    }

    /// Score one answer exactly once per idempotency key.
    ///
    /// A key seen before returns the stored payload unchanged, without
    /// counting against the rate limit.
    pub async fn submit_answer(
        &self,
        caller: Caller<'_>,
        request: &SubmitAnswer,
    ) -> Result<SubmittedAnswer> {
        let user_id = caller.authorized()?;
        request.validate()?;

        if let Some(payload) = self
            .store
            .fetch_idempotent_response(user_id, &request.idempotency_key)
            .await?
        {
            debug!(user_id, "replaying idempotent answer");
            return Ok(SubmittedAnswer {
                payload,
                replayed: true,
            });
        }

        self.enforce_limit(
            &caller,
            "quiz-answer",
            self.config.answer_max_per_user,
            self.config.answer_max_per_client,
        )
        .await?;

        let question = self
            .bank
            .get(&request.question_id)
            .ok_or_else(|| ServiceError::QuestionNotFound(request.question_id.clone()))?;
        let answer_text = question
            .choices
            .get(request.answer_index)
            .ok_or_else(|| {
                ServiceError::InvalidPayload(format!(
                    "answer_index {} out of range for {} choices",
                    request.answer_index,
                    question.choices.len()
                ))
            })?
            .clone();
        let correct = question.is_correct(request.answer_index);

        let applied = self
            .store
            .with_user_state(user_id, |conn, user_state| {
                self.apply_answer(conn, user_state, request, question, &answer_text, correct)
            })
            .await;

        match applied {
            Ok(Applied::Scored { payload, event }) => {
                self.leaderboard.update_cache(&event).await;
                Ok(SubmittedAnswer {
                    payload,
                    replayed: false,
                })
            }
            Ok(Applied::Replay(payload)) | Err(TxnError::Duplicate(payload)) => {
                debug!(user_id, "concurrent duplicate answer replayed");
                Ok(SubmittedAnswer {
                    payload,
                    replayed: true,
                })
            }
            Err(TxnError::Service(e)) => Err(e),
        }
    }

    fn apply_answer(
        &self,
        conn: &Connection,
        user_state: &mut UserState,
        request: &SubmitAnswer,
        question: &QuizQuestion,
        answer_text: &str,
        correct: bool,
    ) -> std::result::Result<Applied, TxnError> {
        let user_id = user_state.user_id.clone();

        // A duplicate that lost the race for the row lock.
        if let Some(payload) = answers::fetch_response(conn, &user_id, &request.idempotency_key)? {
            return Ok(Applied::Replay(payload));
        }

        let now = crate::unix_now();
        adaptive::apply_inactivity_decay(user_state, now, self.config.decay_minutes);

        if request.session_id != user_state.session_id {
            return Err(ServiceError::SessionMismatch.into());
        }
        if request.state_version != user_state.state_version {
            return Err(ServiceError::StateVersionConflict {
                expected: request.state_version,
                actual: Some(user_state.state_version),
            }
            .into());
        }

        let before = Progress::of(user_state);
        let after = adaptive::next_state(before, correct);

        user_state.record_performance(correct);
        let answers_count = user_state.answers_count + 1;
        let accuracy = (user_state.accuracy * user_state.answers_count as f64
            + f64::from(u8::from(correct)))
            / answers_count as f64;

        let score_delta = scoring::score_delta(&ScoreInput {
            difficulty: before.difficulty,
            streak: after.streak,
            accuracy,
            recent_performance: &user_state.recent_performance,
            correct,
        });

        user_state.current_difficulty = after.difficulty;
        user_state.streak = after.streak;
        user_state.wrong_streak = after.wrong_streak;
        user_state.max_streak = user_state.max_streak.max(after.streak);
        user_state.total_score += score_delta;
        user_state.accuracy = accuracy;
        user_state.answers_count = answers_count;
        user_state.last_answer_at = Some(now);

        if after.difficulty != before.difficulty {
            info!(
                user_id = %user_id,
                from = %before.difficulty,
                to = %after.difficulty,
                streak = after.streak,
                "difficulty changed"
            );
        }

        state::persist(conn, user_state, now)?;

        let event = LeaderboardEvent {
            user_id: user_id.clone(),
            total_score: user_state.total_score,
            max_streak: user_state.max_streak,
        };
        self.leaderboard.update_rows(conn, &event, now)?;
        let (rank_score, rank_streak) =
            self.leaderboard
                .db_ranks(conn, user_state.total_score, user_state.max_streak)?;

        let result = AnswerResult {
            correct,
            new_difficulty: user_state.current_difficulty,
            new_streak: user_state.streak,
            score_delta,
            total_score: user_state.total_score,
            state_version: user_state.state_version,
            leaderboard_rank_score: rank_score,
            leaderboard_rank_streak: rank_streak,
        };
        let payload = serde_json::to_string(&result).map_err(ServiceError::from)?;

        let log_id = crate::random_id();
        let recorded = answers::record(
            conn,
            &answers::NewAnswer {
                id: &log_id,
                user_id: &user_id,
                question_id: &question.id,
                difficulty: question.difficulty,
                answer: answer_text,
                correct,
                score_delta,
                streak_at_answer: after.streak,
                idempotency_key: &request.idempotency_key,
                response_payload: &payload,
                created_at: now,
            },
        )?;
        if let answers::Recorded::AlreadyRecorded(existing) = recorded {
            return Err(TxnError::Duplicate(existing));
        }

        debug!(
            user_id = %user_id,
            correct,
            score_delta,
            streak = after.streak,
            difficulty = %after.difficulty,
            "answer scored"
        );
        Ok(Applied::Scored { payload, event })
    }

    /// Per-user metrics, including the per-difficulty answer histogram.
    pub async fn metrics(&self, caller: Caller<'_>) -> Result<QuizMetrics> {
        let user_id = caller.authorized()?;
        let found = self
            .store
            .read(|conn| {
                let Some(user_state) = state::find(conn, user_id)? else {
                    return Ok(None);
                };
                let histogram = answers::difficulty_histogram(conn, user_id)?;
                Ok(Some((user_state, histogram)))
            })
            .await?;

        let (user_state, difficulty_histogram) =
            found.ok_or_else(|| ServiceError::UserNotFound(user_id.to_string()))?;
        Ok(QuizMetrics {
            current_difficulty: user_state.current_difficulty,
            streak: user_state.streak,
            max_streak: user_state.max_streak,
            total_score: user_state.total_score,
            accuracy: user_state.accuracy,
            difficulty_histogram,
            recent_performance: user_state.recent_performance,
        })
    }

    /// Rebuild the leaderboard cache from the ranked tables.
    pub async fn hydrate_leaderboard(&self) -> Result<HydrateSnapshot> {
        self.leaderboard.rebuild(&self.store).await
    }

    /// Hydrate first when the dimension's cached set is empty.
    async fn warm(&self, dimension: LeaderboardDimension) -> Result<()> {
        if self.leaderboard.is_cold(dimension).await? {
            self.hydrate_leaderboard().await?;
        }
        Ok(())
    }

    /// A leaderboard page plus the caller's cached rank (0 when unranked).
    /// Falls back to the ranked tables when the cache is unreachable.
    pub async fn leaderboard_page(
        &self,
        caller: Caller<'_>,
        dimension: LeaderboardDimension,
        limit: Option<usize>,
    ) -> Result<LeaderboardPage> {
        let user_id = caller.authorized()?;
        let limit = self.config.page_size(limit);

        let cached = match self.warm(dimension).await {
            Ok(()) => self
                .leaderboard
                .get_leaderboard(dimension, limit)
                .await
                .map_err(ServiceError::from),
            Err(e) => Err(e),
        };

        match cached {
            Ok(entries) => {
                let user_rank = self
                    .leaderboard
                    .get_user_rank(user_id, dimension)
                    .await
                    .unwrap_or_else(|e| {
                        warn!(user_id, "cached rank unavailable: {e}");
                        None
                    })
                    .unwrap_or(0);
                Ok(LeaderboardPage { entries, user_rank })
            }
            Err(e) => {
                warn!(%dimension, "leaderboard cache unavailable, reading tables: {e}");
                self.leaderboard_from_tables(user_id, dimension, limit).await
            }
        }
    }

    async fn leaderboard_from_tables(
        &self,
        user_id: &str,
        dimension: LeaderboardDimension,
        limit: usize,
    ) -> Result<LeaderboardPage> {
        let (members, user_rank) = self
            .store
            .read(|conn| {
                let members = rows::top(conn, dimension, limit)?;
                let user_rank = match rows::value_of(conn, dimension, user_id)? {
                    Some(value) => rows::rank_of(conn, dimension, value)?,
                    None => 0,
                };
                Ok((members, user_rank))
            })
            .await?;
        Ok(LeaderboardPage {
            entries: crate::leaderboard::ranked(members),
            user_rank,
        })
    }

    /// The caller's 1-based cached rank, hydrating a cold cache first.
    /// `None` when the user has no ranked row.
    pub async fn user_rank(
        &self,
        caller: Caller<'_>,
        dimension: LeaderboardDimension,
    ) -> Result<Option<u64>> {
        let user_id = caller.authorized()?;
        self.warm(dimension).await?;
        Ok(self.leaderboard.get_user_rank(user_id, dimension).await?)
    }

    /// Open a live stream of leaderboard updates.
    pub async fn subscribe_leaderboard(&self) -> Result<LeaderboardFeed> {
        let updates = self.leaderboard.cache().subscribe(UPDATES_CHANNEL).await?;
        Ok(LeaderboardFeed::new(
            updates,
            Duration::from_secs(self.config.ping_interval_secs),
        ))
    }
}
