use crate::error::ExchangeError;
use crate::playback::AudioPayload;
use crate::recorder::RecordedUtterance;
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

/// Whether the agent expects another turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Continue,
    Complete,
}

/// The agent's answer to one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    pub reply_text: String,
    pub reply_audio: AudioPayload,
    pub status: TurnStatus,
}

/// One request/response round-trip with the remote agent.
///
/// `utterance` is `None` only when the caller deliberately sends an empty turn;
/// the orchestrator always sends the recording it just finalized.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TurnExchange: Send + Sync {
    async fn submit(
        &self,
        session_id: &str,
        utterance: Option<RecordedUtterance>,
    ) -> Result<TurnReply, ExchangeError>;
}
