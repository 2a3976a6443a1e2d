//! Integration test: durable leaderboard, cache hydrate and fail-open.
//!
//! 1. Many users answer; ranked tables hold everyone
//! 2. Hydrate followed by a top-10 read is ordered with ranks 1..10
//! 3. The cache rank agrees with the authoritative table rank
//! 4. With the cache backend down, answers still succeed and pages fall
//!    back to the tables

mod common;

use std::sync::Arc;

use quiz_db::queries::leaderboard as rows;
use quiz_service::{Caller, FeedMessage, ServiceConfig};
use quiz_types::LeaderboardDimension;

use common::{play, service, service_with_cache, DownCache};

#[tokio::test]
async fn test_hydrate_then_top_ten_is_ordered() {
    let service = service();
    for user in 0..14 {
        let name = format!("user-{user:02}");
        for round in 0..(user % 4 + 1) {
            play(&service, &name, user % 3 != 0, &format!("key-{round:05}")).await;
        }
    }

    let snapshot = service.hydrate_leaderboard().await.expect("hydrate");
    assert_eq!(snapshot.score.len(), 14);

    let page = service
        .leaderboard_page(Caller::user("user-05"), LeaderboardDimension::Score, Some(10))
        .await
        .expect("page");
    assert_eq!(page.entries.len(), 10);
    let ranks: Vec<u64> = page.entries.iter().map(|e| e.rank).collect();
    assert_eq!(ranks, (1..=10).collect::<Vec<u64>>());
    assert!(page.entries.windows(2).all(|w| w[0].score >= w[1].score));
    assert!(page.user_rank >= 1);
}

#[tokio::test]
async fn test_answer_rank_matches_tables() {
    let service = service();
    play(&service, "alice", true, "key-00001").await;
    play(&service, "alice", true, "key-00002").await;
    let bob = play(&service, "bob", true, "key-00001").await;

    assert_eq!(bob.leaderboard_rank_score, 2);
    assert_eq!(bob.leaderboard_rank_streak, 2);

    let table_rank = service
        .store()
        .read(|conn| rows::rank_of(conn, LeaderboardDimension::Score, bob.total_score))
        .await
        .expect("rank");
    let cached = service
        .user_rank(Caller::user("bob"), LeaderboardDimension::Score)
        .await
        .expect("cached rank");
    assert_eq!(cached, Some(table_rank));
}

#[tokio::test]
async fn test_cache_outage_is_not_fatal() {
    let service = service_with_cache(Arc::new(DownCache), ServiceConfig::default());

    // Limiter fails open and the cache write is skipped.
    let first = play(&service, "alice", true, "key-00001").await;
    assert!(first.correct);
    play(&service, "bob", false, "key-00001").await;

    let page = service
        .leaderboard_page(Caller::user("bob"), LeaderboardDimension::Score, None)
        .await
        .expect("page from tables");
    let users: Vec<&str> = page.entries.iter().map(|e| e.user_id.as_str()).collect();
    assert_eq!(users, vec!["alice", "bob"]);
    assert_eq!(page.user_rank, 2);

    assert!(service.hydrate_leaderboard().await.is_err());
}

#[tokio::test]
async fn test_feed_sees_every_accepted_answer() {
    let service = service();
    let mut feed = service.subscribe_leaderboard().await.expect("subscribe");
    assert_eq!(
        feed.next().await,
        Some(FeedMessage::Connected { ok: true })
    );

    play(&service, "alice", true, "key-00001").await;
    play(&service, "bob", true, "key-00001").await;

    for expected in ["alice", "bob"] {
        match feed.next().await {
            Some(FeedMessage::Leaderboard(event)) => assert_eq!(event.user_id, expected),
            other => unreachable!("unexpected feed message {other:?}"),
        }
    }
}
