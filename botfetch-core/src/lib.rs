//! # Botfetch Core Library
//!
//! Shared core functionality for botfetch: data models, the chat gateway
//! client, the relay engine, and the HTTP server.

pub mod chat;
pub mod models;
pub mod relay;
pub mod server;
pub mod services;
