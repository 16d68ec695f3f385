//! Relay engine: event classification, request correlation, progress, transfer

pub mod classifier;
pub mod correlator;
pub mod progress;
pub mod transfer;

pub use classifier::{classify_media, Classification, EventClassifier};
pub use correlator::{
    RelayOutcome, RequestClass, RequestCorrelator, WaitError, DEFAULT_MENU_TIMEOUT_SECS,
    DEFAULT_PAYLOAD_TIMEOUT_SECS,
};
pub use progress::{ProgressRecord, ProgressTracker};
pub use transfer::{sweep_once, TransferError, TransferRelay};
