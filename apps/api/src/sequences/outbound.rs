//! Redis list consumed by the external mailer.
//!
//! Messages are JSON `OutboundEmail`s appended with RPUSH, so the mailer pops
//! them in dispatch order.

use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundEmail {
    pub log_id: Uuid,
    pub sequence_id: Uuid,
    pub recipient_id: Uuid,
    pub candidate_id: Uuid,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub order_index: i32,
    pub queued_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OutboundQueue {
    client: redis::Client,
    key: String,
}

impl OutboundQueue {
    pub fn new(redis_url: &str, key: impl Into<String>) -> Result<Self, redis::RedisError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            key: key.into(),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn connect(&self) -> Result<MultiplexedConnection, AppError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    pub async fn push(
        &self,
        conn: &mut MultiplexedConnection,
        email: &OutboundEmail,
    ) -> Result<(), AppError> {
        let payload = serde_json::to_string(email).map_err(anyhow::Error::from)?;
        conn.rpush::<_, _, ()>(&self.key, payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_open_accepts_redis_url_without_connecting() {
        let queue = OutboundQueue::new("redis://127.0.0.1:6379", "outbound_emails").unwrap();
        assert_eq!(queue.key(), "outbound_emails");
    }

    #[test]
    fn test_open_rejects_garbage_url() {
        assert!(OutboundQueue::new("not a url", "q").is_err());
    }

    #[test]
    fn test_outbound_email_wire_shape() {
        let email = OutboundEmail {
            log_id: Uuid::nil(),
            sequence_id: Uuid::nil(),
            recipient_id: Uuid::nil(),
            candidate_id: Uuid::nil(),
            to: "ada@example.com".to_string(),
            subject: "Hello".to_string(),
            body: "Body".to_string(),
            order_index: 2,
            queued_at: Utc::now(),
        };
        let value = serde_json::to_value(&email).unwrap();
        assert_eq!(value["to"], json!("ada@example.com"));
        assert_eq!(value["order_index"], json!(2));
        assert!(value["queued_at"].is_string());
    }
}
