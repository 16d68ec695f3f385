//! HTTP chat gateway client: send messages and long-poll inbound events.

use crate::chat::client::{ChatClient, ChatError};
use crate::models::{ChatEvent, MediaRef};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

const LONG_POLL_TIMEOUT_SECS: u64 = 30;

#[derive(serde::Deserialize)]
struct SendResponse {
    message_id: String,
}

#[derive(serde::Deserialize)]
struct EventsResponse {
    #[serde(default)]
    events: Vec<EventEnvelope>,
}

#[derive(serde::Deserialize)]
struct EventEnvelope {
    cursor: i64,
    event: ChatEvent,
}

/// Gateway session over plain HTTP. Token from the environment; never logged.
pub struct GatewayClient {
    base_url: String,
    token: String,
    client: Arc<Client>,
    /// Next long-poll cursor (last seen + 1).
    next_cursor: AtomicI64,
}

impl GatewayClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
            client: Arc::new(Client::new()),
            next_cursor: AtomicI64::new(0),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-success gateway status to the error taxonomy. A 409 on any
    /// session-scoped call means the identity is held by another client.
    async fn error_from(res: reqwest::Response) -> ChatError {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        match status {
            StatusCode::CONFLICT => ChatError::SessionConflict,
            StatusCode::NOT_FOUND => ChatError::MessageNotFound(body),
            _ => ChatError::Api {
                status: status.as_u16(),
                body,
            },
        }
    }
}

#[async_trait]
impl ChatClient for GatewayClient {
    async fn connect(&self) -> Result<(), ChatError> {
        let res = self
            .client
            .post(self.url("/session"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(Self::error_from(res).await);
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), ChatError> {
        let res = self
            .client
            .delete(self.url("/session"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(Self::error_from(res).await);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), ChatError> {
        let res = self
            .client
            .get(self.url("/session/ping"))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(Self::error_from(res).await);
        }
        Ok(())
    }

    async fn send_text(&self, text: &str) -> Result<String, ChatError> {
        let body = serde_json::json!({ "text": text });
        let res = self
            .client
            .post(self.url("/messages"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(Self::error_from(res).await);
        }
        let sent: SendResponse = res.json().await?;
        Ok(sent.message_id)
    }

    async fn send_reply(&self, reply_to_message_id: &str, text: &str) -> Result<String, ChatError> {
        let body = serde_json::json!({
            "text": text,
            "reply_to": reply_to_message_id,
        });
        let res = self
            .client
            .post(self.url("/messages"))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(Self::error_from(res).await);
        }
        let sent: SendResponse = res.json().await?;
        Ok(sent.message_id)
    }

    async fn next_event(&self) -> Result<Option<ChatEvent>, ChatError> {
        let cursor = self.next_cursor.load(Ordering::Relaxed);
        let res = self
            .client
            .get(self.url("/events"))
            .bearer_auth(&self.token)
            .query(&[
                ("cursor", cursor.to_string()),
                ("timeout", LONG_POLL_TIMEOUT_SECS.to_string()),
            ])
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(Self::error_from(res).await);
        }
        let body: EventsResponse = res.json().await?;
        // One event per poll; the cursor advances past it so the remainder
        // is re-fetched on the next call.
        match body.events.into_iter().next() {
            Some(envelope) => {
                self.next_cursor
                    .store(envelope.cursor.max(cursor) + 1, Ordering::Relaxed);
                Ok(Some(envelope.event))
            }
            None => Ok(None),
        }
    }

    async fn fetch_message(&self, message_id: &str) -> Result<ChatEvent, ChatError> {
        let res = self
            .client
            .get(self.url(&format!("/messages/{}", message_id)))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if res.status() == StatusCode::NOT_FOUND {
            return Err(ChatError::MessageNotFound(message_id.to_string()));
        }
        if !res.status().is_success() {
            return Err(Self::error_from(res).await);
        }
        let event: ChatEvent = res.json().await?;
        Ok(event)
    }

    async fn download_chunk(
        &self,
        media: &MediaRef,
        offset: u64,
        len: u64,
    ) -> Result<Bytes, ChatError> {
        let end = offset + len - 1;
        let res = self
            .client
            .get(self.url(&format!("/media/{}", media.media_id)))
            .bearer_auth(&self.token)
            .header("Range", format!("bytes={}-{}", offset, end))
            .send()
            .await?;
        if !res.status().is_success() {
            return Err(Self::error_from(res).await);
        }
        Ok(res.bytes().await?)
    }
}
