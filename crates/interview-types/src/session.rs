use crate::audio::Base64EncodedAudioBytes;

/// Body returned by `POST /interview/start` and `POST /interview/init`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct StartSessionResponse {
    /// Opaque session token issued by the agent.
    session_id: String,
    /// Text of the opening line. `/interview/init` may leave it out.
    #[serde(default)]
    message: Option<String>,
    /// Synthesized audio of the opening line.
    audio_base64: Base64EncodedAudioBytes,
}

impl StartSessionResponse {
    pub fn new(session_id: &str, audio_base64: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            message: None,
            audio_base64: audio_base64.to_string(),
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = Some(message.to_string());
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn audio_base64(&self) -> &str {
        &self.audio_base64
    }
}

/// Body returned by the `GET /` health probe.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HealthStatus {
    status: String,
    #[serde(default)]
    service: Option<String>,
}

impl HealthStatus {
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}
