use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router, middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use tangle_api::middleware::require_auth;
use tangle_api::{AppState, AppStateInner, auth, feed, follows, likes, replies, threads, users};
use tangle_cache::PageCache;
use tangle_media::MediaStore;
use tangle_queue::{ThreadQueue, consumer::run_consumer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tangle=debug,tower_http=debug".into()),
        )
        .init();

    // Config is read once at startup, never lazily per request.
    let jwt_secret =
        std::env::var("TANGLE_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());
    let db_path = std::env::var("TANGLE_DB_PATH").unwrap_or_else(|_| "tangle.db".into());
    let host = std::env::var("TANGLE_HOST").unwrap_or_else(|_| "0.0.0.0".into());
    let port: u16 = std::env::var("TANGLE_PORT")
        .unwrap_or_else(|_| "3000".into())
        .parse()?;
    let media_dir: PathBuf = std::env::var("TANGLE_MEDIA_DIR")
        .unwrap_or_else(|_| "./media-storage".into())
        .into();
    let media_base_url =
        std::env::var("TANGLE_MEDIA_BASE_URL").unwrap_or_else(|_| "/uploads".into());
    let queue_wait_secs: u64 = std::env::var("TANGLE_QUEUE_WAIT_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);

    // Explicit init phase: database, cache, media store, queue. A failure
    // here is fatal by design.
    let db = Arc::new(tangle_db::Database::open(&PathBuf::from(&db_path))?);

    let cache = Arc::new(PageCache::new());
    if let Err(e) = tangle_cache::verify_startup(&cache).await {
        anyhow::bail!("cache bring-up failed: {e}");
    }
    tokio::spawn(tangle_cache::run_sweep_loop(cache.clone(), 3600));

    let media = Arc::new(MediaStore::new(media_dir.clone(), media_base_url).await?);

    // One queue, one consumer, for the life of the process.
    let (queue, receiver) = ThreadQueue::new();
    tokio::spawn(run_consumer(receiver, queue.clone(), db.clone()));

    let state: AppState = Arc::new(AppStateInner {
        db,
        cache,
        media,
        queue,
        jwt_secret,
        queue_wait: Duration::from_secs(queue_wait_secs),
    });

    // Routes
    let public_routes = Router::new()
        .route("/api/tangle/auth/register", post(auth::register))
        .route("/api/tangle/auth/login", post(auth::login))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/api/tangle/auth/check", get(auth::check))
        .route("/api/tangle/users", get(users::list_users))
        .route("/api/tangle/users/suggested", get(users::suggested_users))
        .route(
            "/api/tangle/users/{user_id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/api/tangle/users/{user_id}/follow", post(follows::follow))
        .route("/api/tangle/threads", post(threads::add_thread))
        .route("/api/tangle/threads/queue", post(threads::add_thread_queued))
        .route("/api/tangle/threads/page/{page}", get(feed::list_threads))
        .route(
            "/api/tangle/threads/cached/{page}",
            get(feed::list_threads_cached),
        )
        .route(
            "/api/tangle/threads/{thread_id}",
            get(threads::get_thread)
                .put(threads::update_thread)
                .delete(threads::delete_thread),
        )
        .route("/api/tangle/threads/{thread_id}/like", post(likes::like))
        .route(
            "/api/tangle/threads/{thread_id}/replies",
            post(replies::add_reply),
        )
        .route(
            "/api/tangle/threads/{thread_id}/replies/{reply_id}",
            axum::routing::put(replies::update_reply),
        )
        .route(
            "/api/tangle/replies/{reply_id}",
            axum::routing::delete(replies::delete_reply),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .nest_service("/uploads", ServeDir::new(&media_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Tangle server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
