use crate::error::ClientError;
use async_trait::async_trait;
use interview_types::{ChatResponse, FitEvaluation, HealthStatus, Report, StartSessionResponse};
use reqwest::multipart::{Form, Part};
use reqwest::{RequestBuilder, Response};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex};

mod config;
mod consts;
mod stats;

pub use config::{Config, ConfigBuilder};
pub use stats::Stats;

/// A file sent as one multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(file_name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime: mime.into(),
            bytes,
        }
    }

    pub fn pdf(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self::new(file_name, "application/pdf", bytes)
    }

    fn into_part(self) -> Result<Part, ClientError> {
        Ok(Part::bytes(self.bytes)
            .file_name(self.file_name)
            .mime_str(&self.mime)?)
    }
}

/// Everything the client needs from the remote interview agent.
#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn health(&self) -> Result<HealthStatus, ClientError>;

    async fn start_session(
        &self,
        resume: Option<Upload>,
    ) -> Result<StartSessionResponse, ClientError>;

    async fn init_session(
        &self,
        admission_token: &str,
    ) -> Result<StartSessionResponse, ClientError>;

    async fn submit_audio(
        &self,
        session_id: &str,
        audio: Upload,
    ) -> Result<ChatResponse, ClientError>;

    async fn submit_text(&self, session_id: &str, text: &str)
    -> Result<ChatResponse, ClientError>;

    async fn submit_empty(&self, session_id: &str) -> Result<ChatResponse, ClientError>;

    async fn fetch_report(&self, session_id: &str) -> Result<Report, ClientError>;

    async fn evaluate_fit(
        &self,
        resume: Upload,
        job_description: &str,
    ) -> Result<FitEvaluation, ClientError>;
}

/// HTTP client for the interview agent service.
#[derive(Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    config: Arc<Config>,
    stats: Arc<Mutex<Stats>>,
}

impl AgentClient {
    pub fn new(config: Config) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            http,
            config: Arc::new(config),
            stats: Arc::new(Mutex::new(Stats::new())),
        })
    }

    /// Client configured from `INTERVIEW_API_URL` / `INTERVIEW_API_KEY`.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::new(Config::new())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn stats(&self) -> Stats {
        match self.stats.lock() {
            Ok(stats) => stats.clone(),
            Err(_) => {
                tracing::error!("failed to read stats");
                Stats::default()
            }
        }
    }

    pub async fn health(&self) -> Result<HealthStatus, ClientError> {
        let req = self.authorized(self.http.get(self.url(consts::HEALTH_PATH)));
        self.send(req).await
    }

    /// Opens a session, optionally grounded in the candidate's resume.
    pub async fn start_session(
        &self,
        resume: Option<Upload>,
    ) -> Result<StartSessionResponse, ClientError> {
        let mut form = Form::new();
        if let Some(resume) = resume {
            form = form.part(consts::RESUME_FIELD, resume.into_part()?);
        }
        let req = self.authorized(
            self.http
                .post(self.url(consts::START_SESSION_PATH))
                .multipart(form),
        );
        let started: StartSessionResponse = self.send(req).await?;
        self.record_audio_received(started.audio_base64());
        tracing::info!("started session {}", started.session_id());
        Ok(started)
    }

    /// Opens a session using the admission token granted by a fit evaluation.
    pub async fn init_session(
        &self,
        admission_token: &str,
    ) -> Result<StartSessionResponse, ClientError> {
        let req = self
            .http
            .post(self.url(consts::INIT_SESSION_PATH))
            .bearer_auth(admission_token)
            .json(&serde_json::json!({}));
        let started: StartSessionResponse = self.send(self.authorized(req)).await?;
        self.record_audio_received(started.audio_base64());
        tracing::info!("initialized session {} from admission token", started.session_id());
        Ok(started)
    }

    pub async fn submit_audio(
        &self,
        session_id: &str,
        audio: Upload,
    ) -> Result<ChatResponse, ClientError> {
        let sent = audio.bytes.len();
        let form = Form::new()
            .text(consts::SESSION_ID_FIELD, session_id.to_string())
            .part(consts::AUDIO_FILE_FIELD, audio.into_part()?);
        tracing::debug!("submitting {} bytes of audio for session {}", sent, session_id);
        let reply = self.chat(form).await?;
        if let Ok(mut stats) = self.stats.lock() {
            stats.record_audio_sent(sent);
        }
        Ok(reply)
    }

    pub async fn submit_text(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<ChatResponse, ClientError> {
        let form = Form::new()
            .text(consts::SESSION_ID_FIELD, session_id.to_string())
            .text(consts::TEXT_INPUT_FIELD, text.to_string());
        self.chat(form).await
    }

    /// Lets the agent take its next turn without any new input.
    pub async fn submit_empty(&self, session_id: &str) -> Result<ChatResponse, ClientError> {
        let form = Form::new().text(consts::SESSION_ID_FIELD, session_id.to_string());
        self.chat(form).await
    }

    pub async fn fetch_report(&self, session_id: &str) -> Result<Report, ClientError> {
        let req = self.authorized(self.http.get(self.report_url(session_id)));
        self.send(req).await
    }

    /// Scores a resume against a job description.
    pub async fn evaluate_fit(
        &self,
        resume: Upload,
        job_description: &str,
    ) -> Result<FitEvaluation, ClientError> {
        let form = Form::new()
            .part(consts::RESUME_FIELD, resume.into_part()?)
            .text(consts::JOB_DESCRIPTION_FIELD, job_description.to_string());
        let req = self.authorized(
            self.http
                .post(self.url(consts::EVALUATE_FIT_PATH))
                .multipart(form),
        );
        let evaluation: FitEvaluation = self.send(req).await?;
        tracing::info!(
            "fit evaluation: {}% ({})",
            evaluation.match_percentage(),
            evaluation.status()
        );
        Ok(evaluation)
    }

    async fn chat(&self, form: Form) -> Result<ChatResponse, ClientError> {
        let req = self.authorized(self.http.post(self.url(consts::CHAT_PATH)).multipart(form));
        let reply: ChatResponse = self.send(req).await?;
        self.record_audio_received(reply.audio_base64());
        Ok(reply)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    /// The session id is opaque, so it goes in as one escaped path segment.
    fn report_url(&self, session_id: &str) -> String {
        let base = self.url(consts::REPORT_PATH);
        match reqwest::Url::parse(&base) {
            Ok(mut url) => {
                if let Ok(mut segments) = url.path_segments_mut() {
                    segments.push(session_id);
                }
                url.to_string()
            }
            // reqwest reports the malformed base URL when the request is built.
            Err(_) => base,
        }
    }

    /// Attaches the service key, when one is configured. `Authorization` is
    /// left free for admission tokens.
    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        if self.config.has_api_key() {
            req.header(consts::API_KEY_HEADER, self.config.api_key().expose_secret())
        } else {
            req
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
        let result = match req.send().await {
            Ok(res) => Self::decode(res).await,
            Err(e) => Err(ClientError::from(e)),
        };
        if let Ok(mut stats) = self.stats.lock() {
            stats.record_request(result.is_ok());
        }
        if let Err(e) = &result {
            tracing::warn!("request failed: {}", e);
        }
        result
    }

    async fn decode<T: DeserializeOwned>(res: Response) -> Result<T, ClientError> {
        let status = res.status();
        let body = res.text().await?;
        if !status.is_success() {
            return Err(ClientError::Server {
                status: status.as_u16(),
                body: error_detail(&body),
            });
        }
        serde_json::from_str(&body).map_err(|e| ClientError::Decode(format!("{e}: {body}")))
    }

    fn record_audio_received(&self, encoded: &str) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.record_audio_received(encoded);
        }
    }
}

/// Error bodies usually look like `{"detail": "..."}`; fall back to the raw text.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").map(|d| match d.as_str() {
            Some(s) => s.to_string(),
            None => d.to_string(),
        }))
        .unwrap_or_else(|| body.to_string())
}

#[async_trait]
impl AgentApi for AgentClient {
    async fn health(&self) -> Result<HealthStatus, ClientError> {
        AgentClient::health(self).await
    }

    async fn start_session(
        &self,
        resume: Option<Upload>,
    ) -> Result<StartSessionResponse, ClientError> {
        AgentClient::start_session(self, resume).await
    }

    async fn init_session(
        &self,
        admission_token: &str,
    ) -> Result<StartSessionResponse, ClientError> {
        AgentClient::init_session(self, admission_token).await
    }

    async fn submit_audio(
        &self,
        session_id: &str,
        audio: Upload,
    ) -> Result<ChatResponse, ClientError> {
        AgentClient::submit_audio(self, session_id, audio).await
    }

    async fn submit_text(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<ChatResponse, ClientError> {
        AgentClient::submit_text(self, session_id, text).await
    }

    async fn submit_empty(&self, session_id: &str) -> Result<ChatResponse, ClientError> {
        AgentClient::submit_empty(self, session_id).await
    }

    async fn fetch_report(&self, session_id: &str) -> Result<Report, ClientError> {
        AgentClient::fetch_report(self, session_id).await
    }

    async fn evaluate_fit(
        &self,
        resume: Upload,
        job_description: &str,
    ) -> Result<FitEvaluation, ClientError> {
        AgentClient::evaluate_fit(self, resume, job_description).await
    }
}
