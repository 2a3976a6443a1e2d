//! Shared setup for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quiz_cache::{CacheError, CacheStore, MemoryCache, RateLimiter};
use quiz_engine::QuestionBank;
use quiz_service::{Caller, QuizService, ServiceConfig, SubmitAnswer, UserStateStore};
use quiz_types::{AnswerResult, NextQuestion};
use tokio::sync::{broadcast, Mutex};

/// A service over an in-memory database, the built-in questions and the
/// given cache.
pub fn service_with_cache(cache: Arc<dyn CacheStore>, config: ServiceConfig) -> QuizService {
    let conn = quiz_db::open_memory().expect("open test db");
    let store = UserStateStore::new(Arc::new(Mutex::new(conn)));
    let limiter = RateLimiter::new(cache.clone(), Duration::from_secs(60));
    let bank = Arc::new(QuestionBank::builtin().expect("builtin bank"));
    QuizService::new(bank, store, cache, limiter, config)
}

pub fn service() -> QuizService {
    service_with_cache(Arc::new(MemoryCache::new()), ServiceConfig::default())
}

/// Build a submission for `next` that is right or wrong on purpose.
pub fn answer(next: &NextQuestion, correct: bool, key: &str) -> SubmitAnswer {
    let bank = QuestionBank::builtin().expect("builtin bank");
    let question = bank.get(&next.question_id).expect("served question");
    let answer_index = if correct {
        question.correct_index
    } else {
        (question.correct_index + 1) % question.choices.len()
    };
    SubmitAnswer {
        session_id: next.session_id.clone(),
        question_id: next.question_id.clone(),
        answer_index,
        state_version: next.state_version,
        idempotency_key: key.to_string(),
    }
}

/// Fetch a question and answer it.
pub async fn play(service: &QuizService, user: &str, correct: bool, key: &str) -> AnswerResult {
    let next = service
        .next_question(Caller::user(user), None)
        .await
        .expect("next question");
    service
        .submit_answer(Caller::user(user), &answer(&next, correct, key))
        .await
        .expect("submit answer")
        .result()
        .expect("decode answer")
}

/// A cache backend that is always down.
pub struct DownCache;

fn down<T>() -> quiz_cache::Result<T> {
    Err(CacheError::Unavailable("connection refused".to_string()))
}

#[async_trait]
impl CacheStore for DownCache {
    async fn zadd(&self, _: &str, _: &str, _: i64) -> quiz_cache::Result<()> {
        down()
    }
    async fn zadd_many(&self, _: &str, _: &[(String, i64)]) -> quiz_cache::Result<()> {
        down()
    }
    async fn zrevrange(&self, _: &str, _: usize, _: usize) -> quiz_cache::Result<Vec<(String, i64)>> {
        down()
    }
    async fn zrevrank(&self, _: &str, _: &str) -> quiz_cache::Result<Option<u64>> {
        down()
    }
    async fn zscore(&self, _: &str, _: &str) -> quiz_cache::Result<Option<i64>> {
        down()
    }
    async fn zcard(&self, _: &str) -> quiz_cache::Result<u64> {
        down()
    }
    async fn del(&self, _: &[&str]) -> quiz_cache::Result<u64> {
        down()
    }
    async fn rename_all(&self, _: &[(&str, &str)]) -> quiz_cache::Result<()> {
        down()
    }
    async fn incr_with_expiry(&self, _: &str, _: Duration) -> quiz_cache::Result<u64> {
        down()
    }
    async fn publish(&self, _: &str, _: String) -> quiz_cache::Result<usize> {
        down()
    }
    async fn subscribe(&self, _: &str) -> quiz_cache::Result<broadcast::Receiver<String>> {
        down()
    }
}
