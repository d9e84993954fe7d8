/// Running totals for one client instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Stats {
    requests: u64,
    failures: u64,
    audio_bytes_sent: u64,
    audio_base64_received: u64,
}

impl Stats {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_request(&mut self, ok: bool) {
        self.requests += 1;
        if !ok {
            self.failures += 1;
        }
    }

    pub(crate) fn record_audio_sent(&mut self, bytes: usize) {
        self.audio_bytes_sent += bytes as u64;
    }

    pub(crate) fn record_audio_received(&mut self, encoded: &str) {
        self.audio_base64_received += encoded.len() as u64;
    }

    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn audio_bytes_sent(&self) -> u64 {
        self.audio_bytes_sent
    }

    /// Length of all reply audio received, in base64 characters.
    pub fn audio_base64_received(&self) -> u64 {
        self.audio_base64_received
    }
}
