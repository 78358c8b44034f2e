//! HTTP and WebSocket request handlers
//!
//! - `api` - Health check endpoint
//! - `realtime` - Relay WebSocket and ephemeral session tokens

pub mod api;
pub mod realtime;

pub use realtime::{realtime_handler, session_token_handler};
