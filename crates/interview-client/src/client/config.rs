use super::consts;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    base_url: String,
    api_key: SecretString,
    request_timeout: Duration,
}

pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.config.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.config.api_key = SecretString::from(api_key.to_string());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// Defaults, overridden by `INTERVIEW_API_URL` and `INTERVIEW_API_KEY` when set.
    pub fn new() -> Self {
        let base_url = std::env::var(consts::INTERVIEW_API_URL)
            .ok()
            .filter(|url| !url.trim().is_empty())
            .unwrap_or_else(|| consts::BASE_URL.to_string());
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: std::env::var(consts::INTERVIEW_API_KEY)
                .unwrap_or_default()
                .into(),
            request_timeout: Duration::from_secs(consts::DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }

    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_key(&self) -> &SecretString {
        &self.api_key
    }

    pub fn has_api_key(&self) -> bool {
        !self.api_key.expose_secret().is_empty()
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
