//! Wire types exchanged with the interview agent service.
pub mod audio;
pub mod fit;
pub mod report;
pub mod session;
pub mod turn;

pub use audio::Base64EncodedAudioBytes;
pub use fit::FitEvaluation;
pub use report::{Report, Score, Scores};
pub use session::{HealthStatus, StartSessionResponse};
pub use turn::{ChatResponse, TurnStatusWire};
