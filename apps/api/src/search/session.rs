use serde_json::{json, Value};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::search::SearchRow;

/// Conflict message for a `session_id` already used by another user's search.
pub const SESSION_UNAVAILABLE: &str = "session_id is unavailable; start a new session";

/// Outcome of looking up the caller's `session_id`.
#[derive(Debug)]
pub enum SessionResolution {
    /// A search row for this session already exists; reuse it.
    Existing(SearchRow),
    /// No row yet; one must be created under this session id.
    New { session_id: String },
}

impl SessionResolution {
    pub fn session_id(&self) -> &str {
        match self {
            SessionResolution::Existing(row) => &row.session_id,
            SessionResolution::New { session_id } => session_id,
        }
    }
}

/// Decides whether a chat call continues an existing search or starts one.
///
/// `existing` is the row stored under `requested`, if any. A session bound to
/// another project is a conflict rather than a silent reuse.
pub fn resolve_session(
    requested: Option<&str>,
    existing: Option<SearchRow>,
    project_id: Uuid,
) -> Result<SessionResolution, AppError> {
    match (requested.map(str::trim).filter(|s| !s.is_empty()), existing) {
        (_, Some(row)) if row.project_id == project_id => Ok(SessionResolution::Existing(row)),
        (_, Some(row)) => Err(AppError::Conflict(format!(
            "session {} belongs to another project",
            row.session_id
        ))),
        (Some(session_id), None) => Ok(SessionResolution::New {
            session_id: session_id.to_string(),
        }),
        (None, None) => Ok(SessionResolution::New {
            session_id: Uuid::new_v4().to_string(),
        }),
    }
}

/// Adds `session_id` to an object payload. Non-object payloads are wrapped.
pub fn with_session_id(payload: Value, session_id: &str) -> Value {
    match payload {
        Value::Object(mut map) => {
            map.insert("session_id".to_string(), Value::String(session_id.to_string()));
            Value::Object(map)
        }
        other => json!({ "result": other, "session_id": session_id }),
    }
}

/// Payload returned when the matching API cannot be reached.
pub fn empty_result() -> Value {
    json!({ "candidates": [] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn row(project_id: Uuid, session_id: &str) -> SearchRow {
        SearchRow {
            id: Uuid::new_v4(),
            project_id,
            user_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            query: "rust engineers".to_string(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_existing_session_is_reused() {
        let project = Uuid::new_v4();
        let existing = row(project, "sess-1");
        let existing_id = existing.id;
        match resolve_session(Some("sess-1"), Some(existing), project).unwrap() {
            SessionResolution::Existing(r) => assert_eq!(r.id, existing_id),
            other => panic!("expected reuse, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_session_id_is_kept() {
        let resolution = resolve_session(Some(" sess-2 "), None, Uuid::new_v4()).unwrap();
        assert!(matches!(resolution, SessionResolution::New { .. }));
        assert_eq!(resolution.session_id(), "sess-2");
    }

    #[test]
    fn test_missing_session_id_generates_one() {
        let a = resolve_session(None, None, Uuid::new_v4()).unwrap();
        let b = resolve_session(Some(""), None, Uuid::new_v4()).unwrap();
        assert!(Uuid::parse_str(a.session_id()).is_ok());
        assert_ne!(a.session_id(), b.session_id());
    }

    #[test]
    fn test_session_of_other_project_conflicts() {
        let existing = row(Uuid::new_v4(), "sess-3");
        let err = resolve_session(Some("sess-3"), Some(existing), Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn test_with_session_id_injects_into_object() {
        let payload = with_session_id(json!({"candidates": [{"id": 1}]}), "s-9");
        assert_eq!(payload["session_id"], json!("s-9"));
        assert_eq!(payload["candidates"][0]["id"], json!(1));
    }

    #[test]
    fn test_with_session_id_wraps_non_object() {
        let payload = with_session_id(json!([1, 2]), "s-9");
        assert_eq!(payload["result"], json!([1, 2]));
        assert_eq!(payload["session_id"], json!("s-9"));
    }

    #[test]
    fn test_empty_result_has_empty_candidates() {
        assert_eq!(empty_result()["candidates"], json!([]));
    }

    #[test]
    fn test_foreign_session_resolves_as_new_without_leaking() {
        // Another user's row is filtered out by the lookup, so it arrives as `None`.
        let resolution = resolve_session(Some("their-session"), None, Uuid::new_v4()).unwrap();
        assert!(matches!(resolution, SessionResolution::New { .. }));
        assert_eq!(resolution.session_id(), "their-session");

        let err = AppError::Conflict(SESSION_UNAVAILABLE.to_string());
        assert!(!err.to_string().contains("their-session"));
    }
}
