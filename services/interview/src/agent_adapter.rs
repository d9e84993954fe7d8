use async_trait::async_trait;
use interview_client::types::{ChatResponse, Report};
use interview_client::{AgentApi, ClientError, Upload};
use interview_core::{
    AudioPayload, ExchangeError, RecordedUtterance, ReportSource, TurnExchange, TurnReply,
    TurnStatus,
};
use std::sync::Arc;

/// Connects the core's exchange and report seams to the agent service.
/// Generic over [`AgentApi`] so tests can stand in for the HTTP client.
pub struct AgentExchange<C: AgentApi> {
    client: Arc<C>,
}

impl<C: AgentApi> AgentExchange<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }
}

impl<C: AgentApi> Clone for AgentExchange<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
        }
    }
}

pub fn to_exchange_error(e: ClientError) -> ExchangeError {
    let status = e.status();
    match e {
        ClientError::Network(message) => ExchangeError::Network(message),
        ClientError::Server { body, .. } => ExchangeError::Server {
            status,
            message: body,
        },
        ClientError::Decode(message) => ExchangeError::Server { status, message },
    }
}

pub fn to_turn_reply(reply: ChatResponse) -> TurnReply {
    let status = if reply.is_completed() {
        TurnStatus::Complete
    } else {
        TurnStatus::Continue
    };
    TurnReply {
        reply_text: reply.message().to_string(),
        reply_audio: AudioPayload::new(reply.audio_base64()),
        status,
    }
}

#[async_trait]
impl<C: AgentApi + 'static> TurnExchange for AgentExchange<C> {
    async fn submit(
        &self,
        session_id: &str,
        utterance: Option<RecordedUtterance>,
    ) -> Result<TurnReply, ExchangeError> {
        let reply = match utterance {
            Some(utterance) => {
                let upload = Upload::new(
                    utterance.file_name(),
                    utterance.encoding.mime(),
                    utterance.bytes,
                );
                self.client.submit_audio(session_id, upload).await
            }
            None => self.client.submit_empty(session_id).await,
        };
        reply.map(to_turn_reply).map_err(to_exchange_error)
    }
}

#[async_trait]
impl<C: AgentApi + 'static> ReportSource for AgentExchange<C> {
    async fn fetch(&self, session_id: &str) -> Result<Report, ExchangeError> {
        self.client
            .fetch_report(session_id)
            .await
            .map_err(to_exchange_error)
    }
}
