use crate::error::PlaybackError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Base64-encoded synthesized speech as delivered by the agent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioPayload(String);

impl AudioPayload {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn decode(&self) -> Result<Vec<u8>, PlaybackError> {
        if self.is_empty() {
            return Err(PlaybackError::Decode("empty audio payload".to_string()));
        }
        STANDARD
            .decode(self.0.trim())
            .map_err(|e| PlaybackError::Decode(e.to_string()))
    }
}

impl From<String> for AudioPayload {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Sound output the controller drives.
///
/// `start` begins playing `audio` (an encoded container such as mp3 or wav)
/// and must send on `done` once the last sample has been rendered.
/// `stop` cuts any playing audio short; `done` is then dropped without a send.
#[cfg_attr(test, automock)]
pub trait AudioOutput: Send + Sync {
    fn start(&self, audio: Vec<u8>, done: oneshot::Sender<()>) -> Result<(), PlaybackError>;

    fn stop(&self);
}

/// Identifies one playback started by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackHandle(u64);

impl PlaybackHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Plays at most one clip at a time.
pub struct PlaybackController {
    output: Arc<dyn AudioOutput>,
    active: Option<PlaybackHandle>,
    next_id: u64,
}

impl PlaybackController {
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            active: None,
            next_id: 0,
        }
    }

    /// Decodes and starts `payload`. The returned receiver resolves when it
    /// finishes on its own; it errors if playback is stopped first.
    pub fn play(
        &mut self,
        payload: &AudioPayload,
    ) -> Result<(PlaybackHandle, oneshot::Receiver<()>), PlaybackError> {
        if let Some(active) = self.active {
            return Err(PlaybackError::Busy(active.0));
        }
        let audio = payload.decode()?;
        let (tx, rx) = oneshot::channel();
        self.output.start(audio, tx)?;

        self.next_id += 1;
        let handle = PlaybackHandle(self.next_id);
        self.active = Some(handle);
        tracing::debug!("playback {} started", handle.0);
        Ok((handle, rx))
    }

    /// Marks `handle` as having played to the end. Stale handles are ignored.
    pub fn finished(&mut self, handle: PlaybackHandle) {
        if self.active == Some(handle) {
            self.active = None;
            tracing::debug!("playback {} finished", handle.0);
        }
    }

    /// Stops `handle` if it is still the active playback.
    pub fn stop(&mut self, handle: PlaybackHandle) {
        if self.active == Some(handle) {
            self.halt();
        }
    }

    /// Stops whatever is playing. Safe to call when nothing is.
    pub fn halt(&mut self) {
        if let Some(handle) = self.active.take() {
            self.output.stop();
            tracing::debug!("playback {} halted", handle.0);
        }
    }

    pub fn active(&self) -> Option<PlaybackHandle> {
        self.active
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.halt();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(bytes: &[u8]) -> AudioPayload {
        AudioPayload::new(STANDARD.encode(bytes))
    }

    #[test]
    fn decode_rejects_malformed_and_empty_payloads() {
        assert!(matches!(
            AudioPayload::new("not base64!!").decode(),
            Err(PlaybackError::Decode(_))
        ));
        assert!(matches!(
            AudioPayload::default().decode(),
            Err(PlaybackError::Decode(_))
        ));
        assert_eq!(payload(&[1, 2, 3]).decode().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn second_play_while_active_is_refused() {
        // --- Arrange ---
        let mut output = MockAudioOutput::new();
        output.expect_start().times(1).returning(|_, _| Ok(()));
        output.expect_stop().times(1).return_const(());
        let mut controller = PlaybackController::new(Arc::new(output));

        // --- Act ---
        let (first, _done) = controller.play(&payload(b"clip")).unwrap();
        let second = controller.play(&payload(b"clip"));

        // --- Assert ---
        assert_eq!(second.unwrap_err(), PlaybackError::Busy(first.id()));
        assert_eq!(controller.active(), Some(first));
    }

    #[test]
    fn stop_and_halt_are_idempotent() {
        let mut output = MockAudioOutput::new();
        output.expect_start().returning(|_, _| Ok(()));
        output.expect_stop().times(1).return_const(());
        let mut controller = PlaybackController::new(Arc::new(output));

        let (handle, _done) = controller.play(&payload(b"clip")).unwrap();
        controller.stop(handle);
        controller.stop(handle);
        controller.halt();
        assert!(controller.active().is_none());
    }

    #[test]
    fn finished_frees_the_controller_without_stopping_output() {
        let mut output = MockAudioOutput::new();
        output.expect_start().times(2).returning(|_, done| {
            let _ = done.send(());
            Ok(())
        });
        output.expect_stop().never();
        let mut controller = PlaybackController::new(Arc::new(output));

        let (first, mut done) = controller.play(&payload(b"one")).unwrap();
        assert!(done.try_recv().is_ok());
        controller.finished(first);

        let (second, _) = controller.play(&payload(b"two")).unwrap();
        assert_ne!(first, second);
        // A stale completion does not clear the newer playback.
        controller.finished(first);
        assert_eq!(controller.active(), Some(second));
        controller.finished(second);
    }

    #[test]
    fn decode_failure_leaves_controller_idle() {
        let mut output = MockAudioOutput::new();
        output.expect_start().never();
        let mut controller = PlaybackController::new(Arc::new(output));

        let err = controller.play(&AudioPayload::new("%%%")).unwrap_err();
        assert!(matches!(err, PlaybackError::Decode(_)));
        assert!(controller.active().is_none());
    }
}
