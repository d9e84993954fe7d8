use crate::audio::Base64EncodedAudioBytes;

/// Turn status as the agent reports it: "active" while the interview goes on,
/// "completed" on the closing reply.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnStatusWire {
    Active,
    Completed,
    #[serde(other)]
    Unknown,
}

/// Body returned by `POST /interview/chat`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatResponse {
    /// Text of the agent's reply.
    message: String,
    /// Synthesized audio of the reply.
    audio_base64: Base64EncodedAudioBytes,
    status: TurnStatusWire,
}

impl ChatResponse {
    pub fn new(message: &str, audio_base64: &str, status: TurnStatusWire) -> Self {
        Self {
            message: message.to_string(),
            audio_base64: audio_base64.to_string(),
            status,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn audio_base64(&self) -> &str {
        &self.audio_base64
    }

    pub fn status(&self) -> &TurnStatusWire {
        &self.status
    }

    pub fn is_completed(&self) -> bool {
        self.status == TurnStatusWire::Completed
    }
}
