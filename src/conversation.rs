use chrono::{DateTime, Local, Utc};
use uuid::Uuid;

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    /// Prefix used when echoing or rendering a transcript
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Assistant => "Companion",
        }
    }
}

/// One utterance in an exchange
#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub id: Uuid,
    pub speaker: Speaker,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            speaker,
            text: text.into(),
            at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Speaker::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Speaker::Assistant, text)
    }
}

/// Ordered history the remote model sees as its memory
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    turns: Vec<ConversationTurn>,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
            turns: Vec::new(),
        }
    }

    pub fn push(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Forget all turns and start a fresh session id
    pub fn clear(&mut self) {
        self.turns.clear();
        self.session_id = Uuid::new_v4();
        self.started_at = Utc::now();
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Render as `You: ...` / `Companion: ...` lines
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|t| format!("{}: {}", t.speaker.display_name(), t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Transcript with a local `[HH:MM:SS]` stamp per turn, headed by the
    /// session id and start time
    pub fn timestamped_transcript(&self) -> String {
        let mut out = format!(
            "Session {} (started {})",
            self.session_id,
            self.started_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        );
        for turn in &self.turns {
            out.push_str(&format!(
                "\n[{}] {}: {}",
                turn.at.with_timezone(&Local).format("%H:%M:%S"),
                turn.speaker.display_name(),
                turn.text
            ));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_transcript_lines() {
        let mut session = ChatSession::new();
        session.push(ConversationTurn::user("I had a rough day."));
        session.push(ConversationTurn::assistant("I'm sorry to hear that."));

        assert_eq!(
            session.transcript(),
            "You: I had a rough day.\nCompanion: I'm sorry to hear that."
        );
    }

    #[test]
    fn test_clear_starts_new_session() {
        let mut session = ChatSession::new();
        let first_id = session.session_id;
        session.push(ConversationTurn::user("hello"));

        session.clear();

        assert!(session.is_empty());
        assert_ne!(session.session_id, first_id);
    }

    #[test]
    fn test_default_matches_new() {
        let session = ChatSession::default();
        assert!(!session.session_id.is_nil());
        assert!(session.started_at <= Utc::now());
        assert!(session.is_empty());
    }

    #[test]
    fn test_timestamped_transcript() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let mut session = ChatSession::new();
        session.started_at = at;
        let mut turn = ConversationTurn::user("I miss home.");
        turn.at = at;
        session.push(turn);

        let stamp = at.with_timezone(&Local).format("%H:%M:%S").to_string();
        let text = session.timestamped_transcript();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(&format!("Session {}", session.session_id)));
        assert_eq!(lines[1], format!("[{}] You: I miss home.", stamp));
    }
}
