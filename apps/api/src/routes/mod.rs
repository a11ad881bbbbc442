pub mod health;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};

use crate::state::AppState;
use crate::{candidates, profiles, projects, search, sequences, shortlist, templates};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Projects
        .route(
            "/api/v1/projects",
            get(projects::handlers::handle_list_projects)
                .post(projects::handlers::handle_create_project),
        )
        .route(
            "/api/v1/projects/:id",
            get(projects::handlers::handle_get_project)
                .patch(projects::handlers::handle_update_project)
                .delete(projects::handlers::handle_delete_project),
        )
        // Shortlist
        .route(
            "/api/v1/projects/:id/shortlist",
            get(shortlist::handlers::handle_list).post(shortlist::handlers::handle_add),
        )
        .route(
            "/api/v1/projects/:id/shortlist/recount",
            post(shortlist::handlers::handle_recount),
        )
        .route(
            "/api/v1/projects/:id/shortlist/:candidate_id",
            delete(shortlist::handlers::handle_remove),
        )
        // Search
        .route(
            "/api/v1/projects/:id/searches",
            get(search::handlers::handle_list_searches),
        )
        .route(
            "/api/v1/search/chat",
            post(search::handlers::handle_chat_search),
        )
        .route(
            "/api/v1/searches/:id/results",
            get(search::handlers::handle_search_results),
        )
        // Candidates
        .route(
            "/api/v1/candidates/:id",
            get(candidates::handlers::handle_get_candidate),
        )
        .route(
            "/api/v1/candidates/:id/details",
            put(candidates::handlers::handle_upsert_details),
        )
        // Global templates
        .route(
            "/api/v1/global-templates",
            get(templates::handlers::handle_list_templates)
                .post(templates::handlers::handle_create_template),
        )
        .route(
            "/api/v1/global-templates/:id",
            get(templates::handlers::handle_get_template)
                .patch(templates::handlers::handle_update_template)
                .delete(templates::handlers::handle_delete_template),
        )
        // Sequences
        .route(
            "/api/v1/sequences",
            get(sequences::handlers::handle_list_sequences)
                .post(sequences::handlers::handle_create_sequence),
        )
        .route(
            "/api/v1/sequences/from-template",
            post(sequences::handlers::handle_create_from_template),
        )
        .route(
            "/api/v1/sequences/dispatch",
            post(sequences::handlers::handle_dispatch),
        )
        .route(
            "/api/v1/sequences/:id",
            get(sequences::handlers::handle_get_sequence)
                .delete(sequences::handlers::handle_delete_sequence),
        )
        .route(
            "/api/v1/sequences/:id/status",
            patch(sequences::handlers::handle_update_status),
        )
        .route(
            "/api/v1/sequences/:id/recipients",
            get(sequences::handlers::handle_list_recipients)
                .post(sequences::handlers::handle_enroll),
        )
        .route(
            "/api/v1/sequences/:id/recipients/:rid",
            delete(sequences::handlers::handle_remove_recipient),
        )
        .route(
            "/api/v1/sequences/:id/logs",
            get(sequences::handlers::handle_list_logs),
        )
        .route(
            "/api/v1/recipients/:rid/events",
            post(sequences::handlers::handle_record_event),
        )
        // Profile
        .route(
            "/api/v1/profile",
            get(profiles::handlers::handle_get_profile)
                .patch(profiles::handlers::handle_update_profile),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{header::AUTHORIZATION, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use sqlx::postgres::PgPoolOptions;
    use tower::ServiceExt;

    use super::*;
    use crate::config::Config;
    use crate::matching_client::{CandidateMatcher, MatchRequest, MatchingError};
    use crate::sequences::outbound::OutboundQueue;

    struct NoMatches;

    #[async_trait]
    impl CandidateMatcher for NoMatches {
        async fn find_candidates(&self, _req: &MatchRequest) -> Result<Value, MatchingError> {
            Ok(json!({"candidates": []}))
        }
    }

    fn test_state() -> AppState {
        let config = Config {
            database_url: "postgres://localhost/scoutline_test".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            jwt_secret: "test-secret".to_string(),
            matching_api_url: "http://127.0.0.1:9/match".to_string(),
            matching_api_key: None,
            matching_timeout_secs: 1,
            dispatch_interval_secs: 0,
            dispatch_batch_size: 10,
            outbound_queue: "outbound_emails".to_string(),
            port: 0,
            rust_log: "info".to_string(),
        };
        AppState {
            db: PgPoolOptions::new()
                .connect_lazy(&config.database_url)
                .unwrap(),
            outbound: OutboundQueue::new(&config.redis_url, "outbound_emails").unwrap(),
            matcher: Arc::new(NoMatches),
            config,
        }
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let response = build_router(test_state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_api_requires_bearer_token() {
        let response = build_router(test_state())
            .oneshot(
                Request::builder()
                    .uri("/api/v1/projects")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_invalid_token_is_rejected() {
        let response = build_router(test_state())
            .oneshot(
                Request::builder()
                    .uri("/api/v1/sequences")
                    .header(AUTHORIZATION, "Bearer not-a-jwt")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
