//! Chat gateway integration: client trait, HTTP implementation, connection lifecycle

mod client;
mod connection;
mod gateway;

pub use client::{ChatClient, ChatError};
pub use connection::{ConnectionManager, ConnectionState};
pub use gateway::GatewayClient;
