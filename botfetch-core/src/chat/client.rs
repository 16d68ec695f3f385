//! Chat gateway client abstraction

use crate::models::{ChatEvent, MediaRef};
use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Errors from the chat gateway
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway error {status}: {body}")]
    Api { status: u16, body: String },

    /// Another process is using the same gateway identity. Irrecoverable:
    /// reconnecting would keep stealing the session back and forth.
    #[error("session conflict: identity already in use by another client")]
    SessionConflict,

    #[error("message {0} not found")]
    MessageNotFound(String),

    #[error("not connected to the gateway")]
    NotConnected,
}

impl ChatError {
    /// True for error classes that must halt reconnection entirely.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChatError::SessionConflict)
    }
}

/// Client session against the chat network. One live session per process.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Open the gateway session.
    async fn connect(&self) -> Result<(), ChatError>;

    /// Close the gateway session.
    async fn disconnect(&self) -> Result<(), ChatError>;

    /// Liveness check against the open session.
    async fn ping(&self) -> Result<(), ChatError>;

    /// Send a text message to the bot. Returns the gateway message id.
    async fn send_text(&self, text: &str) -> Result<String, ChatError>;

    /// Send a reply referencing an earlier message (used to select a quality
    /// option on a previously received menu).
    async fn send_reply(&self, reply_to_message_id: &str, text: &str) -> Result<String, ChatError>;

    /// Poll for the next inbound event. Returns None when no event is
    /// available within the gateway's long-poll window.
    async fn next_event(&self) -> Result<Option<ChatEvent>, ChatError>;

    /// Fetch a full message by id. Needed for edits that arrive carrying
    /// only a reference.
    async fn fetch_message(&self, message_id: &str) -> Result<ChatEvent, ChatError>;

    /// Download one chunk of a media attachment.
    async fn download_chunk(
        &self,
        media: &MediaRef,
        offset: u64,
        len: u64,
    ) -> Result<Bytes, ChatError>;
}
