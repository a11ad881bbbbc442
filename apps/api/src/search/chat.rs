//! The `get-candidates-by-chat` flow.
//!
//! Flow: verify project → resolve session (reuse or create the search row) →
//!       call the matching API → archive the raw response → return it.
//!
//! An unreachable or failing matching API never fails the request: the caller
//! gets `{"candidates": []}` and the empty result is archived like any other.

use serde::Deserialize;
use serde_json::Value;
use sqlx::PgPool;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::matching_client::{candidate_count, CandidateMatcher, MatchRequest};
use crate::projects::store::get_project;
use crate::search::session::{empty_result, resolve_session, with_session_id, SessionResolution};
use crate::search::store;

const DEFAULT_COUNT: u32 = 10;
const MAX_COUNT: u32 = 100;

/// Request body, in the wire shape the web client sends.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatSearchRequest {
    pub message: String,
    pub count: Option<u32>,
    #[serde(rename = "similarRoles", default)]
    pub similar_roles: bool,
    pub project_id: Uuid,
    pub session_id: Option<String>,
    pub user_name: String,
    pub user_id: String,
}

impl ChatSearchRequest {
    /// Checks the body against the authenticated caller.
    pub fn validate(&self, user: &AuthUser) -> Result<(), AppError> {
        if self.message.trim().is_empty() {
            return Err(AppError::Validation("message cannot be empty".to_string()));
        }
        let claimed = Uuid::parse_str(self.user_id.trim())
            .map_err(|_| AppError::Validation("user_id must be a uuid".to_string()))?;
        if claimed != user.id {
            return Err(AppError::Forbidden);
        }
        Ok(())
    }

    pub fn effective_count(&self) -> u32 {
        self.count.unwrap_or(DEFAULT_COUNT).clamp(1, MAX_COUNT)
    }

    fn match_request(&self, session_id: &str) -> MatchRequest {
        MatchRequest {
            message: self.message.trim().to_string(),
            count: self.effective_count(),
            similar_roles: self.similar_roles,
            session_id: session_id.to_string(),
            user_name: self.user_name.clone(),
            user_id: self.user_id.trim().to_string(),
        }
    }
}

/// Calls the matcher, substituting an empty result on any failure.
pub async fn query_matcher(matcher: &dyn CandidateMatcher, request: &MatchRequest) -> Value {
    match matcher.find_candidates(request).await {
        Ok(payload) => payload,
        Err(e) => {
            warn!(
                "Matching API failed for session {}: {e}; returning empty result",
                request.session_id
            );
            empty_result()
        }
    }
}

pub async fn run_chat_search(
    pool: &PgPool,
    matcher: &dyn CandidateMatcher,
    user: &AuthUser,
    req: &ChatSearchRequest,
) -> Result<Value, AppError> {
    req.validate(user)?;
    get_project(pool, user.id, req.project_id).await?;

    let requested = req.session_id.as_deref().map(str::trim).filter(|s| !s.is_empty());
    let existing = match requested {
        Some(session_id) => store::find_by_session(pool, user.id, session_id).await?,
        None => None,
    };

    let resolution = resolve_session(requested, existing, req.project_id)?;
    debug!("Chat search on session {}", resolution.session_id());
    let (search, created) = match resolution {
        SessionResolution::Existing(search) => {
            store::touch_search(pool, search.id).await?;
            (search, false)
        }
        SessionResolution::New { session_id } => {
            let search = store::create_search(
                pool,
                req.project_id,
                user.id,
                &session_id,
                req.message.trim(),
            )
            .await?;
            info!(
                "Started search session {session_id} on project {}",
                req.project_id
            );
            (search, true)
        }
    };

    let payload = query_matcher(matcher, &req.match_request(&search.session_id)).await;
    let found = candidate_count(&payload);
    store::insert_result(pool, search.id, req.message.trim(), &payload, found).await?;
    info!(
        "Search {} returned {found} candidates",
        search.id
    );

    Ok(if created {
        with_session_id(payload, &search.session_id)
    } else {
        payload
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use crate::matching_client::{MatchingClient, MatchingError};

    struct FailingMatcher;

    #[async_trait]
    impl CandidateMatcher for FailingMatcher {
        async fn find_candidates(&self, _request: &MatchRequest) -> Result<Value, MatchingError> {
            Err(MatchingError::Api {
                status: 503,
                message: "down for maintenance".to_string(),
            })
        }
    }

    struct FixedMatcher(Value);

    #[async_trait]
    impl CandidateMatcher for FixedMatcher {
        async fn find_candidates(&self, _request: &MatchRequest) -> Result<Value, MatchingError> {
            Ok(self.0.clone())
        }
    }

    fn user() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: None,
        }
    }

    fn request_for(user: &AuthUser) -> ChatSearchRequest {
        serde_json::from_value(json!({
            "message": "  backend engineers who know tokio  ",
            "project_id": Uuid::new_v4(),
            "user_name": "Sam",
            "user_id": user.id.to_string(),
            "similarRoles": true
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_failing_matcher_yields_empty_candidates() {
        let u = user();
        let req = request_for(&u).match_request("s-1");
        let payload = query_matcher(&FailingMatcher, &req).await;
        assert_eq!(payload, json!({"candidates": []}));
    }

    #[tokio::test]
    async fn test_unreachable_matcher_yields_empty_candidates() {
        let client = MatchingClient::new(
            "http://127.0.0.1:9/v1/match".to_string(),
            None,
            std::time::Duration::from_secs(2),
        )
        .unwrap();
        let u = user();
        let payload = query_matcher(&client, &request_for(&u).match_request("s-2")).await;
        assert_eq!(payload["candidates"], json!([]));
    }

    #[tokio::test]
    async fn test_matcher_payload_passes_through_verbatim() {
        let upstream = json!({"candidates": [{"id": "a"}], "follow_up": "Any location preference?"});
        let u = user();
        let payload =
            query_matcher(&FixedMatcher(upstream.clone()), &request_for(&u).match_request("s")).await;
        assert_eq!(payload, upstream);
    }

    #[test]
    fn test_validate_rejects_other_user() {
        let u = user();
        let mut req = request_for(&u);
        req.user_id = Uuid::new_v4().to_string();
        assert!(matches!(req.validate(&u), Err(AppError::Forbidden)));
    }

    #[test]
    fn test_validate_rejects_blank_message() {
        let u = user();
        let mut req = request_for(&u);
        req.message = "   ".to_string();
        assert!(matches!(req.validate(&u), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_count_defaults_and_clamps() {
        let u = user();
        let mut req = request_for(&u);
        assert_eq!(req.effective_count(), 10);
        req.count = Some(0);
        assert_eq!(req.effective_count(), 1);
        req.count = Some(5000);
        assert_eq!(req.effective_count(), 100);
    }

    #[test]
    fn test_match_request_trims_message() {
        let u = user();
        let req = request_for(&u);
        let forwarded = req.match_request("s-7");
        assert_eq!(forwarded.message, "backend engineers who know tokio");
        assert_eq!(forwarded.session_id, "s-7");
        assert!(forwarded.similar_roles);
        assert!(req.validate(&u).is_ok());
    }
}
