use crate::playback::AudioPayload;

/// Text recorded for the subject's side of a turn. The agent only ever sees audio.
pub const SUBJECT_AUDIO_PLACEHOLDER: &str = "(audio input)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Ready to record.
    #[default]
    Idle,
    /// A recording is in progress.
    Listening,
    /// The utterance was sent and a reply is awaited.
    Processing,
    /// The reply audio is playing.
    Speaking,
    /// The agent closed the interview and its last reply finished playing.
    Finished,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Finished)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Processing => "processing",
            SessionState::Speaking => "speaking",
            SessionState::Finished => "finished",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Subject,
    Agent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    /// Synthesized audio for agent turns.
    pub audio: Option<AudioPayload>,
}

impl Turn {
    pub fn subject() -> Self {
        Self {
            role: Role::Subject,
            text: SUBJECT_AUDIO_PLACEHOLDER.to_string(),
            audio: None,
        }
    }

    pub fn agent(text: String, audio: AudioPayload) -> Self {
        Self {
            role: Role::Agent,
            text,
            audio: Some(audio),
        }
    }
}

/// Chronological record of the conversation. Entries can only be appended.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn push(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }
}

/// Client-side view of one interview session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub id: String,
    pub state: SessionState,
    pub transcript: Transcript,
    /// Set once the agent has signalled that the current reply is its last.
    pub finishing: bool,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_terminal()
    }
}
