//! Realtime relay handlers
//!
//! - `handler`: WebSocket relay (`GET /realtime`)
//! - `session`: ephemeral session tokens (`POST /session`)

pub mod handler;
pub mod session;

pub use handler::realtime_handler;
pub use session::session_token_handler;
