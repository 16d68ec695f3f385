//! Pending request registry: match classified bot events to waiting callers.
//!
//! The bot protocol carries no conversation token, so correlation relies on a
//! single-outstanding-interaction assumption: every unresolved request is a
//! candidate for the next matching event, first registered first resolved.
//! Two concurrent callers with different URLs can therefore have their
//! results swapped; fixing that would require one gateway session per caller.

use crate::models::{FileDescriptor, FormatMenu, FormatOption, MediaKind};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{oneshot, RwLock};
use tokio::time::Duration;
use uuid::Uuid;

/// Default deadline for format-menu requests.
pub const DEFAULT_MENU_TIMEOUT_SECS: u64 = 30;
/// Default deadline for payload requests.
pub const DEFAULT_PAYLOAD_TIMEOUT_SECS: u64 = 120;

/// How long a satisfied-kind record is kept for the late-audio discard rule.
const SATISFIED_TTL_SECS: u64 = 120;

/// What a waiting request expects from the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestClass {
    Menu,
    Payload,
}

/// Terminal outcome delivered to a waiting caller
#[derive(Debug)]
pub enum RelayOutcome {
    Formats(Vec<FormatOption>),
    File(FileDescriptor),
    Failed(String),
}

/// Error from waiting on a registered request
#[derive(Debug)]
pub enum WaitError {
    Timeout,
    Closed,
}

#[derive(Debug)]
struct PendingEntry {
    request_id: Uuid,
    class: RequestClass,
    registered_at: Instant,
    deadline: Duration,
    tx: oneshot::Sender<RelayOutcome>,
}

/// In-memory registry of pending requests. Resolution removes the entry
/// before sending, so a racing timeout or duplicate event is a no-op.
#[derive(Clone)]
pub struct RequestCorrelator {
    pending: Arc<RwLock<VecDeque<PendingEntry>>>,
    /// Which kind satisfied a recently resolved request, for the
    /// late-audio discard rule.
    satisfied: Arc<RwLock<HashMap<Uuid, (MediaKind, Instant)>>>,
    /// Most recent format menu; single slot, overwritten by each new menu.
    last_menu: Arc<RwLock<Option<FormatMenu>>>,
    menu_timeout: Duration,
    payload_timeout: Duration,
}

impl RequestCorrelator {
    pub fn new(menu_timeout: Duration, payload_timeout: Duration) -> Self {
        Self {
            pending: Arc::new(RwLock::new(VecDeque::new())),
            satisfied: Arc::new(RwLock::new(HashMap::new())),
            last_menu: Arc::new(RwLock::new(None)),
            menu_timeout,
            payload_timeout,
        }
    }

    /// Register a pending request. Returns its id, the receiver to await,
    /// and the deadline for the class.
    pub async fn register(
        &self,
        class: RequestClass,
    ) -> (Uuid, oneshot::Receiver<RelayOutcome>, Duration) {
        let request_id = Uuid::new_v4();
        let deadline = match class {
            RequestClass::Menu => self.menu_timeout,
            RequestClass::Payload => self.payload_timeout,
        };
        let (tx, rx) = oneshot::channel();
        let entry = PendingEntry {
            request_id,
            class,
            registered_at: Instant::now(),
            deadline,
            tx,
        };
        self.pending.write().await.push_back(entry);
        (request_id, rx, deadline)
    }

    /// Await the outcome, racing the class deadline. Whichever side fires
    /// first wins; the loser's resolution attempt is a guaranteed no-op
    /// because the entry is removed from the map before any send.
    pub async fn wait(
        &self,
        request_id: Uuid,
        rx: oneshot::Receiver<RelayOutcome>,
        deadline: Duration,
    ) -> Result<RelayOutcome, WaitError> {
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(outcome)) => Ok(outcome),
            Ok(Err(_)) => {
                self.remove(request_id).await;
                Err(WaitError::Closed)
            }
            Err(_) => {
                self.remove(request_id).await;
                Err(WaitError::Timeout)
            }
        }
    }

    /// Remove an entry without resolving it. Idempotent.
    pub async fn remove(&self, request_id: Uuid) {
        let mut guard = self.pending.write().await;
        if let Some(pos) = guard.iter().position(|e| e.request_id == request_id) {
            guard.remove(pos);
        }
    }

    /// Whether any request of the class is still waiting.
    pub async fn has_pending(&self, class: RequestClass) -> bool {
        self.pending.read().await.iter().any(|e| e.class == class)
    }

    /// Number of unresolved requests, all classes.
    pub async fn pending_len(&self) -> usize {
        self.pending.read().await.len()
    }

    /// Store the menu as the new last-menu reference and resolve the first
    /// waiting menu request with its format list.
    pub async fn resolve_menu(&self, menu: FormatMenu) -> bool {
        let formats = menu.formats.clone();
        *self.last_menu.write().await = Some(menu);

        let mut guard = self.pending.write().await;
        if let Some(pos) = guard.iter().position(|e| e.class == RequestClass::Menu) {
            let entry = guard.remove(pos).expect("position exists");
            let _ = entry.tx.send(RelayOutcome::Formats(formats));
            return true;
        }
        false
    }

    /// The most recent format menu, if any. Treated as stale by callers when
    /// the underlying message can no longer be fetched.
    pub async fn last_menu(&self) -> Option<FormatMenu> {
        self.last_menu.read().await.clone()
    }

    /// Priority policy: once a video or image satisfied an interaction, a
    /// later audio payload is discarded rather than matched to the next
    /// waiting request. Checked before the payload is even downloaded.
    pub async fn should_accept_payload(&self, kind: MediaKind) -> bool {
        if kind != MediaKind::Audio {
            return true;
        }
        let now = Instant::now();
        let satisfied = self.satisfied.read().await;
        !satisfied.values().any(|(k, at)| {
            matches!(k, MediaKind::Video | MediaKind::Image)
                && now.duration_since(*at).as_secs() < SATISFIED_TTL_SECS
        })
    }

    /// Resolve the first waiting payload request with a persisted file.
    /// Records the satisfying kind for the discard rule.
    pub async fn resolve_payload(&self, kind: MediaKind, file: FileDescriptor) -> bool {
        let mut guard = self.pending.write().await;
        if let Some(pos) = guard.iter().position(|e| e.class == RequestClass::Payload) {
            let entry = guard.remove(pos).expect("position exists");
            drop(guard);
            self.satisfied
                .write()
                .await
                .insert(entry.request_id, (kind, Instant::now()));
            let _ = entry.tx.send(RelayOutcome::File(file));
            return true;
        }
        false
    }

    /// Resolve the first waiting request of the class with a failure.
    pub async fn fail_next(&self, class: RequestClass, error: String) -> bool {
        let mut guard = self.pending.write().await;
        if let Some(pos) = guard.iter().position(|e| e.class == class) {
            let entry = guard.remove(pos).expect("position exists");
            let _ = entry.tx.send(RelayOutcome::Failed(error));
            return true;
        }
        false
    }

    /// Housekeeping: reap entries whose deadline passed without a waiter
    /// (the caller disconnected and its timeout never ran), and expire old
    /// satisfied-kind records.
    pub async fn purge_expired(&self) {
        let now = Instant::now();
        let expired: Vec<PendingEntry> = {
            let mut guard = self.pending.write().await;
            let mut kept = VecDeque::with_capacity(guard.len());
            let mut expired = Vec::new();
            while let Some(entry) = guard.pop_front() {
                if now.duration_since(entry.registered_at) > entry.deadline {
                    expired.push(entry);
                } else {
                    kept.push_back(entry);
                }
            }
            *guard = kept;
            expired
        };
        for entry in expired {
            tracing::debug!(request_id = %entry.request_id, "purging expired pending request");
            let _ = entry.tx.send(RelayOutcome::Failed("timed out".to_string()));
        }

        self.satisfied
            .write()
            .await
            .retain(|_, (_, at)| now.duration_since(*at).as_secs() < SATISFIED_TTL_SECS);
    }
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(DEFAULT_MENU_TIMEOUT_SECS),
            Duration::from_secs(DEFAULT_PAYLOAD_TIMEOUT_SECS),
        )
    }
}
