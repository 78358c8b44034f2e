//! Realtime session configuration for the wellness coach.
//!
//! [`CoachSessionSettings`] is the single source of the session shape: the
//! relay turns it into the one-time `session.update`, the token issuer turns
//! it into the body of the session-creation request.

use serde::{Deserialize, Serialize};

use super::messages::{
    ClientEvent, InputAudioTranscription, ResponseConfig, SessionConfig, TurnDetection,
};

/// Realtime API WebSocket endpoint.
pub const OPENAI_REALTIME_URL: &str = "wss://api.openai.com/v1/realtime";

/// Realtime API session-creation endpoint (ephemeral tokens).
pub const OPENAI_REALTIME_SESSIONS_URL: &str = "https://api.openai.com/v1/realtime/sessions";

pub const DEFAULT_REALTIME_MODEL: &str = "gpt-4o-realtime-preview-2024-10-01";

pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

pub const DEFAULT_TEMPERATURE: f32 = 0.8;

/// Wire audio format for both directions.
pub const AUDIO_FORMAT_PCM16: &str = "pcm16";

/// System prompt of the AuraQ wellness coach.
pub const COACH_INSTRUCTIONS: &str = "\
You are AuraQ's AI Wellness Coach: compassionate, and knowledgeable about both fitness and mental health.

YOUR ROLE:
- Help people who are new to fitness or struggling with motivation
- Give guidance on physical fitness and on mental wellness
- Listen with empathy to concerns about lethargy, low mood, depression or anxiety
- Suggest fitness goals that suit the person's situation
- Encourage them to sign up so they can track their progress

APPROACH:
1. Greet warmly and ask how you can help
2. Listen to the concern, whether physical or mental
3. Ask clarifying questions
4. Give practical, actionable advice
5. Suggest one specific goal they could start with
6. Encourage signing up to AuraQ

PHYSICAL FITNESS TOPICS:
- Beginner workouts
- Goal setting for running, strength or weight loss
- Exercise recommendations
- Building habits that last

MENTAL WELLNESS TOPICS:
- Low motivation and energy
- Feeling lethargic or tired
- Depression and anxiety around working out
- Managing stress through exercise
- Building confidence and getting past mental barriers

GUIDELINES:
- Be warm, empathetic and non-judgmental
- Keep each spoken response under 30 seconds
- For serious mental health concerns, acknowledge them and suggest professional help
- Be specific (for example: \"start with a 2 km walk three times a week\")
- Always close with encouragement

Remember: guide them toward their first fitness goal and invite them to join AuraQ.";

/// Opening line the coach speaks when a greeting is enabled.
pub const DEFAULT_GREETING: &str = "Hey there! I'm your AuraQ wellness coach. Whether you want to start a fitness journey or need support with motivation and mental wellness, I'm here to help. What's on your mind today?";

// =============================================================================
// Voices
// =============================================================================

/// Voices available to the realtime API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoachVoice {
    #[default]
    Alloy,
    Ash,
    Ballad,
    Coral,
    Echo,
    Sage,
    Shimmer,
    Verse,
}

impl CoachVoice {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Ash => "ash",
            Self::Ballad => "ballad",
            Self::Coral => "coral",
            Self::Echo => "echo",
            Self::Sage => "sage",
            Self::Shimmer => "shimmer",
            Self::Verse => "verse",
        }
    }

    /// Strict parse; unknown voices are a configuration error.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "alloy" => Some(Self::Alloy),
            "ash" => Some(Self::Ash),
            "ballad" => Some(Self::Ballad),
            "coral" => Some(Self::Coral),
            "echo" => Some(Self::Echo),
            "sage" => Some(Self::Sage),
            "shimmer" => Some(Self::Shimmer),
            "verse" => Some(Self::Verse),
            _ => None,
        }
    }
}

impl std::fmt::Display for CoachVoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Turn Detection
// =============================================================================

/// Server-side voice activity detection parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadSettings {
    /// Activation threshold in [0, 1]
    pub threshold: f32,
    /// Audio kept before detected speech, in ms
    pub prefix_padding_ms: u32,
    /// Silence that ends a user turn, in ms
    pub silence_duration_ms: u32,
}

impl Default for VadSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 1000,
        }
    }
}

impl From<VadSettings> for TurnDetection {
    fn from(vad: VadSettings) -> Self {
        TurnDetection::ServerVad {
            threshold: Some(vad.threshold),
            prefix_padding_ms: Some(vad.prefix_padding_ms),
            silence_duration_ms: Some(vad.silence_duration_ms),
        }
    }
}

// =============================================================================
// Coach Session
// =============================================================================

/// Everything that shapes a coach session on the upstream side.
#[derive(Debug, Clone, PartialEq)]
pub struct CoachSessionSettings {
    pub model: String,
    pub instructions: String,
    pub voice: CoachVoice,
    pub transcription_model: String,
    pub vad: VadSettings,
    pub temperature: f32,
    /// Spoken once right after the session is configured, if set
    pub greeting: Option<String>,
}

impl Default for CoachSessionSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_REALTIME_MODEL.to_string(),
            instructions: COACH_INSTRUCTIONS.to_string(),
            voice: CoachVoice::default(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            vad: VadSettings::default(),
            temperature: DEFAULT_TEMPERATURE,
            greeting: None,
        }
    }
}

impl CoachSessionSettings {
    /// Session fields shared by `session.update` and token requests.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            model: None,
            modalities: Some(vec!["text".to_string(), "audio".to_string()]),
            instructions: Some(self.instructions.clone()),
            voice: Some(self.voice.as_str().to_string()),
            input_audio_format: Some(AUDIO_FORMAT_PCM16.to_string()),
            output_audio_format: Some(AUDIO_FORMAT_PCM16.to_string()),
            input_audio_transcription: Some(InputAudioTranscription {
                model: self.transcription_model.clone(),
            }),
            turn_detection: Some(self.vad.into()),
            temperature: Some(self.temperature),
        }
    }

    /// The one-time configuration sent after `session.created`.
    pub fn session_update(&self) -> ClientEvent {
        ClientEvent::SessionUpdate {
            session: self.session_config(),
        }
    }

    /// `response.create` asking the coach to open with the greeting.
    pub fn greeting_request(&self) -> Option<ClientEvent> {
        let greeting = self.greeting.as_deref()?.trim();
        if greeting.is_empty() {
            return None;
        }

        Some(ClientEvent::ResponseCreate {
            response: Some(ResponseConfig {
                modalities: Some(vec!["text".to_string(), "audio".to_string()]),
                instructions: Some(format!(
                    "Greet the user by saying exactly: \"{greeting}\""
                )),
            }),
        })
    }

    /// Body of a session-creation (ephemeral token) request.
    pub fn token_request(&self) -> SessionConfig {
        SessionConfig {
            model: Some(self.model.clone()),
            ..self.session_config()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_voice_parse() {
        assert_eq!(CoachVoice::parse("ALLOY"), Some(CoachVoice::Alloy));
        assert_eq!(CoachVoice::parse(" verse "), Some(CoachVoice::Verse));
        assert_eq!(CoachVoice::parse("robot"), None);
    }

    #[test]
    fn test_default_session_update_shape() {
        let settings = CoachSessionSettings::default();
        let value = serde_json::to_value(settings.session_update()).unwrap();

        assert_eq!(value["type"], "session.update");
        let session = &value["session"];
        assert_eq!(session["modalities"], json!(["text", "audio"]));
        assert_eq!(session["voice"], "alloy");
        assert_eq!(session["input_audio_format"], "pcm16");
        assert_eq!(session["output_audio_format"], "pcm16");
        assert_eq!(session["input_audio_transcription"]["model"], "whisper-1");
        assert_eq!(session["turn_detection"]["type"], "server_vad");
        assert_eq!(session["turn_detection"]["threshold"], 0.5);
        assert_eq!(session["turn_detection"]["prefix_padding_ms"], 300);
        assert_eq!(session["turn_detection"]["silence_duration_ms"], 1000);
        assert!((session["temperature"].as_f64().unwrap() - 0.8).abs() < 1e-6);
        assert!(session["instructions"].as_str().unwrap().contains("AuraQ"));
        assert!(session.get("model").is_none());
    }

    #[test]
    fn test_token_request_includes_model() {
        let settings = CoachSessionSettings::default();
        let value = serde_json::to_value(settings.token_request()).unwrap();
        assert_eq!(value["model"], DEFAULT_REALTIME_MODEL);
        assert_eq!(value["voice"], "alloy");
    }

    #[test]
    fn test_greeting_request() {
        let mut settings = CoachSessionSettings::default();
        assert!(settings.greeting_request().is_none());

        settings.greeting = Some("   ".to_string());
        assert!(settings.greeting_request().is_none());

        settings.greeting = Some(DEFAULT_GREETING.to_string());
        let value = serde_json::to_value(settings.greeting_request().unwrap()).unwrap();
        assert_eq!(value["type"], "response.create");
        assert!(
            value["response"]["instructions"]
                .as_str()
                .unwrap()
                .contains("wellness coach")
        );
    }
}
