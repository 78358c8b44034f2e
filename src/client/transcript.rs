use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptMessage {
    pub role: TranscriptRole,
    pub text: String,
    pub timestamp: OffsetDateTime,
}

impl TranscriptMessage {
    fn new(role: TranscriptRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}

/// Conversation so far, in arrival order.
///
/// Assistant deltas concatenate onto the open assistant message. A user
/// message or the end of the assistant's turn closes it, so the next delta
/// starts a new message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    messages: Vec<TranscriptMessage>,
    assistant_open: bool,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.assistant_open = false;
        self.messages.push(TranscriptMessage::new(TranscriptRole::User, text));
    }

    pub fn push_assistant_delta(&mut self, delta: &str) {
        if self.assistant_open {
            if let Some(last) = self.messages.last_mut() {
                last.text.push_str(delta);
                return;
            }
        }
        self.messages
            .push(TranscriptMessage::new(TranscriptRole::Assistant, delta));
        self.assistant_open = true;
    }

    pub fn end_assistant_turn(&mut self) {
        self.assistant_open = false;
    }

    pub fn messages(&self) -> &[TranscriptMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(transcript: &Transcript) -> Vec<(TranscriptRole, &str)> {
        transcript
            .messages()
            .iter()
            .map(|m| (m.role, m.text.as_str()))
            .collect()
    }

    #[test]
    fn test_assistant_deltas_merge() {
        let mut transcript = Transcript::new();
        transcript.push_assistant_delta("Let's ");
        transcript.push_assistant_delta("set a goal.");

        assert_eq!(
            texts(&transcript),
            vec![(TranscriptRole::Assistant, "Let's set a goal.")]
        );
    }

    #[test]
    fn test_user_message_interrupts_assistant_run() {
        let mut transcript = Transcript::new();
        transcript.push_assistant_delta("How did ");
        transcript.push_user("I walked 5k");
        transcript.push_assistant_delta("Great");
        transcript.push_assistant_delta(" job!");

        assert_eq!(
            texts(&transcript),
            vec![
                (TranscriptRole::Assistant, "How did "),
                (TranscriptRole::User, "I walked 5k"),
                (TranscriptRole::Assistant, "Great job!"),
            ]
        );
    }

    #[test]
    fn test_end_of_turn_starts_new_message() {
        let mut transcript = Transcript::new();
        transcript.push_assistant_delta("First.");
        transcript.end_assistant_turn();
        transcript.push_assistant_delta("Second.");

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.messages()[1].text, "Second.");
    }
}
