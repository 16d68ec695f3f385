//! HTTP server and relay wiring

pub mod api;
pub mod core;

pub use api::{create_api_routes, RelayContext};
pub use core::RelayServer;
