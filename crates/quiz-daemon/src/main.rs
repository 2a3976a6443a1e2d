//! quiz-daemon: serves the adaptive quiz.
//!
//! Single OS process running a Tokio async runtime. Clients talk to the
//! daemon via newline-framed JSON-RPC over a Unix socket.

mod commands;
mod config;
mod rpc;

use std::sync::Arc;
use std::time::Duration;

use quiz_cache::{CacheStore, MemoryCache, RateLimiter, RedisCache};
use quiz_engine::QuestionBank;
use quiz_service::{QuizService, UserStateStore};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::DaemonConfig;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    pub service: QuizService,
    pub config: DaemonConfig,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let config = DaemonConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("quiz={}", config.advanced.log_level).parse()?),
        )
        .init();

    info!("Quiz daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 2. Question content
    let bank = if config.storage.question_file.is_empty() {
        QuestionBank::builtin()?
    } else {
        QuestionBank::load(std::path::Path::new(&config.storage.question_file))?
    };
    info!(questions = bank.len(), "question bank loaded");

    // 3. Open database
    let db_path = data_dir.join("quiz.db");
    let conn = quiz_db::open(&db_path)?;
    let store = UserStateStore::new(Arc::new(tokio::sync::Mutex::new(conn)));

    // 4. Cache and rate limiter
    let cache: Arc<dyn CacheStore> = match config.cache_url() {
        Some(url) => {
            let redis = RedisCache::connect(url).await?;
            info!("using redis cache");
            Arc::new(redis)
        }
        None => {
            info!("using in-process cache");
            Arc::new(MemoryCache::new())
        }
    };
    let mut limiter = RateLimiter::new(
        cache.clone(),
        Duration::from_secs(config.limits.window_seconds),
    );
    if !config.limits_active() {
        warn!(
            environment = %config.advanced.environment,
            "rate limiting bypassed"
        );
        limiter = limiter.bypassed();
    }

    let service = QuizService::new(
        Arc::new(bank),
        store,
        cache,
        limiter,
        config.service_config(),
    );

    let (shutdown_tx, _shutdown_rx) = broadcast::channel(1);
    let state = Arc::new(DaemonState {
        service,
        config,
        shutdown_tx: shutdown_tx.clone(),
    });

    // 5. Leaderboard hydrate: once now, then periodically
    spawn_hydrate_task(state.clone());

    // 6. Start IPC server
    let socket_path = data_dir.join("quiz.sock");
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());

    info!("Starting JSON-RPC server on {:?}", socket_path);

    let mut shutdown_rx = shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    info!("Daemon shutting down gracefully");
    let _ = state.shutdown_tx.send(());
    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}

/// Rebuild the leaderboard cache at startup and every
/// `hydrate_interval_secs` after that (0 = startup only).
fn spawn_hydrate_task(state: Arc<DaemonState>) {
    let every = state.config.leaderboard.hydrate_interval_secs;
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    tokio::spawn(async move {
        if let Err(e) = state.service.hydrate_leaderboard().await {
            warn!("initial leaderboard hydrate failed: {e}");
        }
        if every == 0 {
            return;
        }

        let period = Duration::from_secs(every);
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = state.service.hydrate_leaderboard().await {
                        warn!("periodic leaderboard hydrate failed: {e}");
                    }
                }
                _ = shutdown_rx.recv() => break,
            }
        }
    });
}
