//! Realtime speech API protocol: wire messages and coach session settings.

pub mod config;
pub mod messages;

pub use config::{
    COACH_INSTRUCTIONS, CoachSessionSettings, CoachVoice, DEFAULT_GREETING,
    DEFAULT_REALTIME_MODEL, DEFAULT_TRANSCRIPTION_MODEL, OPENAI_REALTIME_SESSIONS_URL,
    OPENAI_REALTIME_URL, VadSettings,
};
pub use messages::{
    ApiError, ClientEvent, ErrorPayload, ServerEvent, SessionConfig, TurnDetection, event_type,
};
