mod auth;
mod candidates;
mod config;
mod db;
mod errors;
mod matching_client;
mod models;
mod profiles;
mod projects;
mod routes;
mod search;
mod sequences;
mod shortlist;
mod state;
mod templates;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::matching_client::MatchingClient;
use crate::routes::build_router;
use crate::sequences::dispatch::spawn_dispatch_loop;
use crate::sequences::outbound::OutboundQueue;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Scoutline API v{}", env!("CARGO_PKG_VERSION"));

    // PostgreSQL
    let db = create_pool(&config.database_url).await?;
    run_migrations(&db).await?;

    // Redis outbound queue
    let outbound = OutboundQueue::new(&config.redis_url, config.outbound_queue.clone())?;
    info!("Outbound queue initialized (key: {})", outbound.key());

    // Matching API
    let matcher = MatchingClient::new(
        config.matching_api_url.clone(),
        config.matching_api_key.clone(),
        Duration::from_secs(config.matching_timeout_secs),
    )
    .map_err(anyhow::Error::from)?;
    info!("Matching client initialized ({})", matcher.endpoint());

    let state = AppState {
        db,
        outbound,
        matcher: Arc::new(matcher),
        config: config.clone(),
    };

    if config.dispatch_interval_secs > 0 {
        spawn_dispatch_loop(
            state.clone(),
            Duration::from_secs(config.dispatch_interval_secs),
        );
        info!(
            "Sequence dispatcher running every {}s",
            config.dispatch_interval_secs
        );
    } else {
        info!("Sequence dispatcher disabled; use POST /api/v1/sequences/dispatch");
    }

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web app's domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
