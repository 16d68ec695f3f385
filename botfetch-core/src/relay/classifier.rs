//! Inbound event classification: menu, progress, payload, or noise.
//!
//! Text sniffing here is coupled to the bot's exact wording. That coupling is
//! inherent to the integration, so all of it lives behind `classify` where it
//! can be unit-tested in isolation.

use crate::models::{ChatEvent, EventPayload, FormatMenu, FormatOption, MediaKind, MediaRef};
use regex::Regex;

/// Quality labels the bot is known to offer.
const QUALITY_LABELS: &[&str] = &["144p", "240p", "360p", "480p", "720p", "1080p", "MP3"];

/// A menu message carries one of these media markers next to its quality list.
const MENU_MARKERS: &[&str] = &["🎬", "🎵", "Video", "Audio"];

/// A progress edit carries one of these markers plus a trailing percentage.
const PROGRESS_MARKERS: &[&str] = &["⏳", "Downloading", "Download in progress"];

/// Category of an inbound event, decided before any correlation logic runs
#[derive(Debug, Clone)]
pub enum Classification {
    /// Quality menu listing, parsed
    Menu(FormatMenu),
    /// Download progress, percent complete
    Progress(u8),
    /// Terminal media payload
    Payload { media: MediaRef, kind: MediaKind },
    /// Discarded with no side effect
    Irrelevant,
}

/// Classifies every inbound gateway event
pub struct EventClassifier {
    allowed_bots: Vec<String>,
    /// One independent pattern per quality label; unmatched labels are
    /// simply absent from the parsed menu.
    label_patterns: Vec<(&'static str, Regex)>,
    percent_pattern: Regex,
}

impl EventClassifier {
    pub fn new(allowed_bots: Vec<String>) -> Self {
        let label_patterns = QUALITY_LABELS
            .iter()
            .map(|label| {
                let pattern = format!(
                    r"{}\s*:\s*([0-9]+(?:\.[0-9]+)?\s*[KMG]?B)",
                    regex::escape(label)
                );
                (*label, Regex::new(&pattern).expect("static label pattern"))
            })
            .collect();
        let percent_pattern = Regex::new(r"([0-9]{1,3})%\s*$").expect("static percent pattern");
        Self {
            allowed_bots,
            label_patterns,
            percent_pattern,
        }
    }

    /// Decide the category of one inbound event.
    pub fn classify(&self, event: &ChatEvent) -> Classification {
        if !self.sender_allowed(&event.sender) {
            return Classification::Irrelevant;
        }

        match &event.payload {
            EventPayload::Text { body } => self.classify_text(&event.message_id, body),
            EventPayload::Media { media } => match classify_media(media) {
                Some(kind) => Classification::Payload {
                    media: media.clone(),
                    kind,
                },
                None => Classification::Irrelevant,
            },
            // Edits carry only a reference; the caller re-fetches the full
            // message before classification.
            EventPayload::Edited { .. } => Classification::Irrelevant,
        }
    }

    /// Exact handle match, case-sensitive, leading '@' stripped.
    fn sender_allowed(&self, sender: &str) -> bool {
        let handle = sender.strip_prefix('@').unwrap_or(sender);
        self.allowed_bots.iter().any(|b| b == handle)
    }

    fn classify_text(&self, message_id: &str, body: &str) -> Classification {
        if let Some(formats) = self.parse_menu(body) {
            return Classification::Menu(FormatMenu {
                message_id: message_id.to_string(),
                formats,
            });
        }
        if let Some(percent) = self.parse_progress(body) {
            return Classification::Progress(percent);
        }
        Classification::Irrelevant
    }

    /// A menu needs a media marker and at least one quality token.
    fn parse_menu(&self, body: &str) -> Option<Vec<FormatOption>> {
        if !MENU_MARKERS.iter().any(|m| body.contains(m)) {
            return None;
        }
        let formats: Vec<FormatOption> = self
            .label_patterns
            .iter()
            .filter_map(|(label, pattern)| {
                pattern.captures(body).map(|caps| FormatOption {
                    quality: label.to_string(),
                    size: caps[1].trim().to_string(),
                })
            })
            .collect();
        if formats.is_empty() {
            None
        } else {
            Some(formats)
        }
    }

    /// A progress update needs an in-progress marker and a trailing `NN%`.
    fn parse_progress(&self, body: &str) -> Option<u8> {
        if !PROGRESS_MARKERS.iter().any(|m| body.contains(m)) {
            return None;
        }
        let caps = self.percent_pattern.captures(body)?;
        let percent: u16 = caps[1].parse().ok()?;
        if percent > 100 {
            return None;
        }
        Some(percent as u8)
    }
}

/// Bucket a media payload by declared MIME type, video winning over audio on
/// ambiguity (source platforms emit a muted video plus a separate audio track
/// for one clip; callers want the video). Unknown types fall back to
/// substring heuristics before rejection.
pub fn classify_media(media: &MediaRef) -> Option<MediaKind> {
    if let Some(mime) = media.mime_type.as_deref() {
        if mime.starts_with("video/") {
            return Some(MediaKind::Video);
        }
        if mime.starts_with("image/") {
            return Some(MediaKind::Image);
        }
        if mime.starts_with("audio/") {
            return Some(MediaKind::Audio);
        }
        if let Some(kind) = infer_kind_heuristically(mime) {
            return Some(kind);
        }
    }
    media
        .file_name
        .as_deref()
        .and_then(infer_kind_heuristically)
}

/// Substring sniffing for undeclared or vendor MIME strings. Video checked
/// first to keep the priority rule.
fn infer_kind_heuristically(hint: &str) -> Option<MediaKind> {
    let hint = hint.to_ascii_lowercase();
    const VIDEO_HINTS: &[&str] = &["mp4", "webm", "mkv", "mov", "avi"];
    const IMAGE_HINTS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
    const AUDIO_HINTS: &[&str] = &["mp3", "m4a", "ogg", "opus", "wav", "aac"];

    if VIDEO_HINTS.iter().any(|h| hint.contains(h)) {
        return Some(MediaKind::Video);
    }
    if IMAGE_HINTS.iter().any(|h| hint.contains(h)) {
        return Some(MediaKind::Image);
    }
    if AUDIO_HINTS.iter().any(|h| hint.contains(h)) {
        return Some(MediaKind::Audio);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatEvent;

    fn classifier() -> EventClassifier {
        EventClassifier::new(vec!["fetchbot".to_string()])
    }

    fn text_event(sender: &str, body: &str) -> ChatEvent {
        ChatEvent::text("m1".into(), sender.into(), body.into())
    }

    #[test]
    fn test_menu_parses_exact_tokens() {
        let event = text_event("@fetchbot", "🎬 Video ready\n720p: 50MB\nMP3: 8MB");
        match classifier().classify(&event) {
            Classification::Menu(menu) => {
                assert_eq!(menu.formats.len(), 2);
                assert_eq!(menu.formats[0].quality, "720p");
                assert_eq!(menu.formats[0].size, "50MB");
                assert_eq!(menu.formats[1].quality, "MP3");
                assert_eq!(menu.formats[1].size, "8MB");
            }
            other => panic!("expected menu, got {:?}", other),
        }
    }

    #[test]
    fn test_menu_missing_label_is_absent() {
        let event = text_event("fetchbot", "🎬 Available:\n1080p: 120MB");
        match classifier().classify(&event) {
            Classification::Menu(menu) => {
                assert_eq!(menu.formats.len(), 1);
                assert_eq!(menu.formats[0].quality, "1080p");
                assert!(menu.formats.iter().all(|f| f.quality != "720p"));
            }
            other => panic!("expected menu, got {:?}", other),
        }
    }

    #[test]
    fn test_marker_without_quality_tokens_is_noise() {
        let event = text_event("fetchbot", "🎬 Processing your link...");
        assert!(matches!(
            classifier().classify(&event),
            Classification::Irrelevant
        ));
    }

    #[test]
    fn test_progress_extraction() {
        let event = text_event("fetchbot", "⏳ Downloading... 45%");
        match classifier().classify(&event) {
            Classification::Progress(p) => assert_eq!(p, 45),
            other => panic!("expected progress, got {:?}", other),
        }
    }

    #[test]
    fn test_progress_requires_marker() {
        let event = text_event("fetchbot", "your battery is at 45%");
        assert!(matches!(
            classifier().classify(&event),
            Classification::Irrelevant
        ));
    }

    #[test]
    fn test_unknown_sender_rejected() {
        let event = text_event("@stranger", "🎬 720p: 50MB");
        assert!(matches!(
            classifier().classify(&event),
            Classification::Irrelevant
        ));
        // Case-sensitive match
        let event = text_event("@Fetchbot", "🎬 720p: 50MB");
        assert!(matches!(
            classifier().classify(&event),
            Classification::Irrelevant
        ));
    }

    #[test]
    fn test_media_mime_buckets() {
        let media = |mime: Option<&str>, name: Option<&str>| MediaRef {
            media_id: "f1".into(),
            mime_type: mime.map(String::from),
            file_name: name.map(String::from),
            size_bytes: 1,
        };

        assert_eq!(
            classify_media(&media(Some("video/mp4"), None)),
            Some(MediaKind::Video)
        );
        assert_eq!(
            classify_media(&media(Some("audio/mpeg"), None)),
            Some(MediaKind::Audio)
        );
        assert_eq!(
            classify_media(&media(Some("image/png"), None)),
            Some(MediaKind::Image)
        );
        // Vendor MIME falls through to substring sniffing
        assert_eq!(
            classify_media(&media(Some("application/x-mp4-stream"), None)),
            Some(MediaKind::Video)
        );
        // File name as the last resort
        assert_eq!(
            classify_media(&media(None, Some("clip.webm"))),
            Some(MediaKind::Video)
        );
        assert_eq!(classify_media(&media(Some("application/pdf"), None)), None);
    }
}
