use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::matching_client::CandidateMatcher;
use crate::sequences::outbound::OutboundQueue;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Redis-backed queue the external mailer drains.
    pub outbound: OutboundQueue,
    /// Candidate matching backend. Default: `MatchingClient` over HTTP.
    pub matcher: Arc<dyn CandidateMatcher>,
    pub config: Config,
}
