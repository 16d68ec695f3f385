//! Chat event data structures

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Media attachment descriptor as declared by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaRef {
    /// Gateway media identifier used for chunked download
    pub media_id: String,
    /// Declared MIME type, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Original file name, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// Total size in bytes
    pub size_bytes: u64,
}

/// Payload of an inbound chat event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    #[serde(rename = "text")]
    Text { body: String },
    #[serde(rename = "media")]
    Media { media: MediaRef },
    /// An in-place edit carrying only a reference to the edited message.
    /// The full content must be re-fetched by id.
    #[serde(rename = "edited")]
    Edited { message_id: String },
}

/// Inbound event from the chat gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Gateway message identifier
    pub message_id: String,
    /// Sender handle, possibly prefixed with '@'
    pub sender: String,
    /// Gateway timestamp
    pub timestamp: DateTime<Utc>,
    /// Event content
    pub payload: EventPayload,
}

impl ChatEvent {
    /// Create a text event
    pub fn text(message_id: String, sender: String, body: String) -> Self {
        Self {
            message_id,
            sender,
            timestamp: Utc::now(),
            payload: EventPayload::Text { body },
        }
    }

    /// Create a media event
    pub fn media(message_id: String, sender: String, media: MediaRef) -> Self {
        Self {
            message_id,
            sender,
            timestamp: Utc::now(),
            payload: EventPayload::Media { media },
        }
    }
}

/// Media payload bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MediaKind {
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "audio")]
    Audio,
    #[serde(rename = "image")]
    Image,
}

impl MediaKind {
    /// Short name used in persisted file names
    pub fn slug(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Image => "image",
        }
    }

    /// Fallback extension when the MIME table has no exact entry
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Video => "mp4",
            MediaKind::Audio => "mp3",
            MediaKind::Image => "jpg",
        }
    }
}

/// One quality option parsed from a bot format menu
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatOption {
    /// Quality label, e.g. "720p" or "MP3"
    pub quality: String,
    /// Human-readable size, e.g. "50MB"
    pub size: String,
}

/// A parsed format menu, kept as the reference for follow-up selection
#[derive(Debug, Clone)]
pub struct FormatMenu {
    /// Gateway id of the menu message (needed to select a quality later)
    pub message_id: String,
    pub formats: Vec<FormatOption>,
}

/// A payload persisted to local storage, ready to be served
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDescriptor {
    /// Bare file name under the download directory
    pub file_name: String,
    /// Absolute path on disk
    pub path: PathBuf,
    pub size_bytes: u64,
    /// MIME type used when serving
    pub mime: String,
    pub kind: MediaKind,
}
