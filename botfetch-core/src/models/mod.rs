//! Data models for botfetch

pub mod configuration;
pub mod event;

pub use configuration::{Configuration, LogLevel};
pub use event::{
    ChatEvent, EventPayload, FileDescriptor, FormatMenu, FormatOption, MediaKind, MediaRef,
};
