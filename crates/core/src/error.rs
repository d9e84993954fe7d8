use crate::session::SessionState;
use thiserror::Error;

/// Failures while acquiring the camera/microphone stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MediaError {
    #[error("permission to use the capture devices was denied: {0}")]
    PermissionDenied(String),

    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("a media handle is already held by this session")]
    AlreadyAcquired,
}

/// Failures of the audio capture pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecorderError {
    #[error("audio capture pipeline unavailable: {0}")]
    RecorderUnavailable(String),

    #[error("recorder stopped without a prior start")]
    NotStarted,

    #[error("recorder is already capturing")]
    AlreadyRecording,
}

/// Failures of one request/response round-trip with the remote agent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExchangeError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server error{}: {message}", .status.map(|s| format!(" (status {s})")).unwrap_or_default())]
    Server {
        status: Option<u16>,
        message: String,
    },
}

/// Failures while decoding or playing synthesized audio.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("audio payload could not be decoded: {0}")]
    Decode(String),

    #[error("playback {0} is still active")]
    Busy(u64),

    #[error("audio output failed: {0}")]
    Output(String),
}

/// What the orchestrator reports to its caller. Every variant leaves the
/// session in a well-defined, recoverable state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error("cannot {action} while {state}")]
    InvalidTransition { action: Action, state: SessionState },

    #[error("session is no longer running")]
    NoSession,
}

impl SessionError {
    /// Whether the subject can simply try the turn again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SessionError::Exchange(_) | SessionError::Recorder(_) | SessionError::Media(_)
        )
    }
}

/// Caller-initiated actions, used when reporting a rejected transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    BeginTurn,
    EndTurn,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::BeginTurn => f.write_str("begin a turn"),
            Action::EndTurn => f.write_str("end a turn"),
        }
    }
}
