//! Matching client: the single point of entry for calls to the external
//! candidate matching API.
//!
//! No other module talks to the matching service directly; the search flow
//! depends on the [`CandidateMatcher`] trait so it can run against a stub.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum MatchingError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Matching API returned a non-object payload")]
    UnexpectedPayload,
}

/// Body forwarded to the matching API. Field names follow its wire format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchRequest {
    pub message: String,
    pub count: u32,
    #[serde(rename = "similarRoles")]
    pub similar_roles: bool,
    pub session_id: String,
    pub user_name: String,
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(alias = "detail", alias = "error")]
    message: String,
}

#[async_trait]
pub trait CandidateMatcher: Send + Sync {
    /// Returns the matching API's JSON payload verbatim.
    async fn find_candidates(&self, request: &MatchRequest) -> Result<Value, MatchingError>;
}

/// HTTP implementation backed by `reqwest`.
#[derive(Clone)]
pub struct MatchingClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl MatchingClient {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, MatchingError> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            endpoint,
            api_key,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CandidateMatcher for MatchingClient {
    async fn find_candidates(&self, request: &MatchRequest) -> Result<Value, MatchingError> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .map(|e| e.message)
                .unwrap_or(body);
            return Err(MatchingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let payload: Value = response.json().await?;
        if !payload.is_object() {
            return Err(MatchingError::UnexpectedPayload);
        }

        debug!(
            "Matching API call succeeded: session={}, candidates={}",
            request.session_id,
            candidate_count(&payload)
        );

        Ok(payload)
    }
}

/// Number of entries in the payload's `candidates` array (0 when absent).
pub fn candidate_count(payload: &Value) -> usize {
    payload
        .get("candidates")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_uses_wire_field_names() {
        let request = MatchRequest {
            message: "senior rust engineer in berlin".to_string(),
            count: 10,
            similar_roles: true,
            session_id: "s-1".to_string(),
            user_name: "Dana".to_string(),
            user_id: "u-1".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["similarRoles"], json!(true));
        assert!(value.get("similar_roles").is_none());
        assert_eq!(value["count"], json!(10));
    }

    #[test]
    fn test_candidate_count() {
        assert_eq!(candidate_count(&json!({"candidates": [{}, {}]})), 2);
        assert_eq!(candidate_count(&json!({"candidates": []})), 0);
        assert_eq!(candidate_count(&json!({"other": 1})), 0);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_http_error() {
        let client = MatchingClient::new(
            "http://127.0.0.1:9/match".to_string(),
            None,
            Duration::from_secs(2),
        )
        .unwrap();
        let request = MatchRequest {
            message: "anyone".to_string(),
            count: 1,
            similar_roles: false,
            session_id: "s".to_string(),
            user_name: "n".to_string(),
            user_id: "u".to_string(),
        };
        assert!(matches!(
            client.find_candidates(&request).await,
            Err(MatchingError::Http(_))
        ));
    }
}
