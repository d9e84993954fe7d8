use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The request never produced an HTTP response (connect failure, timeout, reset).
    #[error("network error: {0}")]
    Network(String),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn is_network(&self) -> bool {
        matches!(self, ClientError::Network(_))
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            ClientError::Server {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            ClientError::Network(e.to_string())
        }
    }
}
