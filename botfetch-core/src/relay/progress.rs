//! Progress records for background download requests

use crate::models::FileDescriptor;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use tokio::time::Duration;
use uuid::Uuid;

/// Pollable state of one background download
#[derive(Debug, Clone, Serialize)]
pub struct ProgressRecord {
    pub percent: u8,
    pub status: String,
    pub complete: bool,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileDescriptor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressRecord {
    fn new() -> Self {
        Self {
            percent: 0,
            status: "queued".to_string(),
            complete: false,
            success: false,
            file: None,
            error: None,
        }
    }
}

/// Tracks progress records, purging each one shortly after completion so a
/// final poll can still observe the terminal state.
#[derive(Clone)]
pub struct ProgressTracker {
    records: Arc<DashMap<Uuid, ProgressRecord>>,
    linger: Duration,
}

impl ProgressTracker {
    pub fn new(linger: Duration) -> Self {
        Self {
            records: Arc::new(DashMap::new()),
            linger,
        }
    }

    /// Create a record for a new background request.
    pub fn create(&self, request_id: Uuid) {
        self.records.insert(request_id, ProgressRecord::new());
    }

    pub fn get(&self, request_id: &Uuid) -> Option<ProgressRecord> {
        self.records.get(request_id).map(|r| r.clone())
    }

    /// Apply a progress percentage to every still-incomplete record.
    /// Broadcast, not targeted: progress edits from the bot carry no request
    /// identity and only one logical download is in flight per deployment.
    pub fn apply_percent(&self, percent: u8) {
        for mut entry in self.records.iter_mut() {
            if !entry.complete {
                entry.percent = percent;
                entry.status = format!("downloading {}%", percent);
            }
        }
    }

    /// Mark a record successfully complete and schedule its purge.
    pub fn complete_success(&self, request_id: Uuid, file: FileDescriptor) {
        if let Some(mut entry) = self.records.get_mut(&request_id) {
            entry.percent = 100;
            entry.status = "done".to_string();
            entry.complete = true;
            entry.success = true;
            entry.file = Some(file);
        }
        self.schedule_purge(request_id);
    }

    /// Mark a record failed and schedule its purge.
    pub fn complete_failure(&self, request_id: Uuid, error: String) {
        if let Some(mut entry) = self.records.get_mut(&request_id) {
            entry.status = "failed".to_string();
            entry.complete = true;
            entry.success = false;
            entry.error = Some(error);
        }
        self.schedule_purge(request_id);
    }

    fn schedule_purge(&self, request_id: Uuid) {
        let records = Arc::clone(&self.records);
        let linger = self.linger;
        tokio::spawn(async move {
            tokio::time::sleep(linger).await;
            records.remove(&request_id);
            tracing::debug!(request_id = %request_id, "progress record purged");
        });
    }
}
