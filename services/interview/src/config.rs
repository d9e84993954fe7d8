//! Application configuration.
//!
//! Settings come from the process environment, with a `.env` file in the
//! working directory loaded first when present.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

// --- Application Constants ---

/// The size of each audio chunk delivered by the microphone input stream.
pub const INPUT_CHUNK_SIZE: usize = 1024;
/// The size of each audio chunk for the audio output stream.
pub const OUTPUT_CHUNK_SIZE: usize = 1024;
/// Longest reply, in seconds, the playback buffer can hold.
pub const MAX_REPLY_SECS: usize = 180;

pub const DEFAULT_API_URL: &str = "http://localhost:8000";
pub const DEFAULT_EXCHANGE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_REPORT_POLL_INTERVAL_MS: u64 = 2000;

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub api_key: Option<String>,
    pub exchange_timeout: Duration,
    pub report_poll_interval: Duration,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub log_level: Level,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value}")]
    InvalidValue { var: String, value: String },
    #[error("Failed to read env file: {0}")]
    EnvFile(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `INTERVIEW_API_URL`: (Optional) Base URL of the interview agent. Defaults to http://localhost:8000.
    // *   `INTERVIEW_API_KEY`: (Optional) Service key sent with every request.
    // *   `EXCHANGE_TIMEOUT_SECS`: (Optional) How long to wait for the agent's reply to a turn. Defaults to 60.
    // *   `REPORT_POLL_INTERVAL_MS`: (Optional) Delay between report fetches. Defaults to 2000.
    // *   `INPUT_DEVICE` / `OUTPUT_DEVICE`: (Optional) Audio device names. Defaults to the host defaults.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Useful for local development, ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Loads configuration from an env file only, ignoring the process environment.
    pub fn from_env_file(path: &Path) -> Result<Self, ConfigError> {
        let mut vars = HashMap::new();
        for item in dotenvy::from_path_iter(path).map_err(|e| ConfigError::EnvFile(e.to_string()))? {
            let (key, value) = item.map_err(|e| ConfigError::EnvFile(e.to_string()))?;
            vars.insert(key, value);
        }
        Self::from_lookup(|var| vars.get(var).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_url = var("INTERVIEW_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        if !(api_url.starts_with("http://") || api_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue {
                var: "INTERVIEW_API_URL".to_string(),
                value: api_url,
            });
        }

        let exchange_timeout = Duration::from_secs(parse_number(
            "EXCHANGE_TIMEOUT_SECS",
            var("EXCHANGE_TIMEOUT_SECS"),
            DEFAULT_EXCHANGE_TIMEOUT_SECS,
        )?);
        let report_poll_interval = Duration::from_millis(parse_number(
            "REPORT_POLL_INTERVAL_MS",
            var("REPORT_POLL_INTERVAL_MS"),
            DEFAULT_REPORT_POLL_INTERVAL_MS,
        )?);

        let log_level_str = var("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidValue {
                var: "RUST_LOG".to_string(),
                value: log_level_str,
            })?;

        Ok(Self {
            api_url,
            api_key: var("INTERVIEW_API_KEY"),
            exchange_timeout,
            report_poll_interval,
            input_device: var("INPUT_DEVICE"),
            output_device: var("OUTPUT_DEVICE"),
            log_level,
        })
    }

    pub fn client_config(&self) -> interview_client::Config {
        interview_client::Config::builder()
            .with_base_url(&self.api_url)
            .with_api_key(self.api_key.as_deref().unwrap_or_default())
            // Leave the orchestrator's own timeout room to fire first.
            .with_request_timeout(self.exchange_timeout + Duration::from_secs(5))
            .build()
    }
}

fn parse_number(var: &str, value: Option<String>, default: u64) -> Result<u64, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<u64>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::InvalidValue {
                var: var.to_string(),
                value: raw,
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.api_key, None);
        assert_eq!(config.exchange_timeout, Duration::from_secs(60));
        assert_eq!(config.report_poll_interval, Duration::from_millis(2000));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn invalid_numbers_are_rejected() {
        let err = Config::from_lookup(lookup(&[("EXCHANGE_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "EXCHANGE_TIMEOUT_SECS"));

        let err = Config::from_lookup(lookup(&[("REPORT_POLL_INTERVAL_MS", "0")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn invalid_log_level_is_rejected() {
        let err = Config::from_lookup(lookup(&[("RUST_LOG", "chatty")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "RUST_LOG"));
    }

    #[test]
    fn env_file_values_are_used() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "INTERVIEW_API_URL=https://agent.example.com").unwrap();
        writeln!(file, "INTERVIEW_API_KEY=secret").unwrap();
        writeln!(file, "OUTPUT_DEVICE=Headphones").unwrap();
        writeln!(file, "RUST_LOG=debug").unwrap();

        let config = Config::from_env_file(file.path()).unwrap();
        assert_eq!(config.api_url, "https://agent.example.com");
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.output_device.as_deref(), Some("Headphones"));
        assert_eq!(config.input_device, None);
        assert_eq!(config.log_level, Level::DEBUG);
        assert!(config.client_config().has_api_key());
    }

    #[test]
    fn non_http_url_is_rejected() {
        let err = Config::from_lookup(lookup(&[("INTERVIEW_API_URL", "ftp://x")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
