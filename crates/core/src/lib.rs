//! Turn-taking core of the voice interview client.
//!
//! [`SessionOrchestrator`] drives a session through record, exchange and
//! playback using the platform seams defined here ([`MediaDevices`],
//! [`Recorder`], [`TurnExchange`], [`AudioOutput`]). [`ReportPoller`] resolves
//! the assessment once the session is over.

pub mod error;
pub mod exchange;
pub mod media;
pub mod orchestrator;
pub mod playback;
pub mod recorder;
pub mod report;
pub mod session;

pub use error::{Action, ExchangeError, MediaError, PlaybackError, RecorderError, SessionError};
pub use exchange::{TurnExchange, TurnReply, TurnStatus};
pub use media::{
    CaptureFormat, ChunkSink, DeviceStream, MediaDevices, MediaHandle, MediaResourceManager,
    TrackKind,
};
pub use orchestrator::{
    OrchestratorConfig, OrchestratorHandle, SessionEvent, SessionOrchestrator, SessionParts,
};
pub use playback::{AudioOutput, AudioPayload, PlaybackController, PlaybackHandle};
pub use recorder::{
    AudioEncoding, ChunkAccumulator, RecordedUtterance, Recorder, StreamRecorder, UtteranceEncoder,
};
pub use report::{PollerHandle, PollerState, ReportPoller, ReportSource};
pub use session::{Role, Session, SessionState, Transcript, Turn};
