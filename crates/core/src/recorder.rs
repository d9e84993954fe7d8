use crate::error::RecorderError;
use crate::media::{CaptureFormat, MediaHandle};
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Container the recorded audio is packaged in before upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    Wav,
    Webm,
    Mp3,
}

impl AudioEncoding {
    pub fn mime(&self) -> &'static str {
        match self {
            AudioEncoding::Wav => "audio/wav",
            AudioEncoding::Webm => "audio/webm",
            AudioEncoding::Mp3 => "audio/mpeg",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioEncoding::Wav => "wav",
            AudioEncoding::Webm => "webm",
            AudioEncoding::Mp3 => "mp3",
        }
    }
}

/// One finished recording, ready to hand to the turn exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUtterance {
    pub bytes: Vec<u8>,
    pub encoding: AudioEncoding,
}

impl RecordedUtterance {
    /// File name the upload is labelled with, e.g. `input.wav`.
    pub fn file_name(&self) -> String {
        format!("input.{}", self.encoding.extension())
    }
}

/// Captures one utterance at a time from a media handle.
#[cfg_attr(test, automock)]
pub trait Recorder: Send {
    fn start(&mut self, handle: &MediaHandle) -> Result<(), RecorderError>;

    /// Finalizes the capture started by `start`.
    fn stop(&mut self) -> Result<RecordedUtterance, RecorderError>;

    /// Abandons an in-progress capture, discarding what was recorded.
    fn cancel(&mut self);

    fn is_recording(&self) -> bool;
}

/// Packages concatenated PCM into the upload container.
#[cfg_attr(test, automock)]
pub trait UtteranceEncoder: Send + Sync {
    fn encode(
        &self,
        pcm: Vec<u8>,
        format: CaptureFormat,
    ) -> Result<RecordedUtterance, RecorderError>;
}

/// Collects chunks in the order they arrived.
#[derive(Debug, Default)]
pub struct ChunkAccumulator {
    chunks: Vec<Vec<u8>>,
}

impl ChunkAccumulator {
    pub fn push(&mut self, chunk: Vec<u8>) {
        if !chunk.is_empty() {
            self.chunks.push(chunk);
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn concat(self) -> Vec<u8> {
        self.chunks.concat()
    }
}

struct ActiveCapture {
    stream: Arc<dyn crate::media::DeviceStream>,
    format: CaptureFormat,
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Recorder that taps the audio track of a device stream.
pub struct StreamRecorder {
    encoder: Arc<dyn UtteranceEncoder>,
    active: Option<ActiveCapture>,
}

impl StreamRecorder {
    pub fn new(encoder: Arc<dyn UtteranceEncoder>) -> Self {
        Self {
            encoder,
            active: None,
        }
    }
}

impl Recorder for StreamRecorder {
    fn start(&mut self, handle: &MediaHandle) -> Result<(), RecorderError> {
        if self.active.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }
        if !handle.is_live() {
            return Err(RecorderError::RecorderUnavailable(
                "media handle already released".to_string(),
            ));
        }
        let stream = Arc::clone(handle.stream());
        let (tx, rx) = mpsc::unbounded_channel();
        stream.attach_audio(tx)?;
        tracing::debug!("recording started on media handle {}", handle.id());
        self.active = Some(ActiveCapture {
            format: stream.capture_format(),
            stream,
            chunks: rx,
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<RecordedUtterance, RecorderError> {
        let mut capture = self.active.take().ok_or(RecorderError::NotStarted)?;
        capture.stream.detach_audio();

        // Everything sent before the detach is already queued.
        let mut acc = ChunkAccumulator::default();
        while let Ok(chunk) = capture.chunks.try_recv() {
            acc.push(chunk);
        }
        tracing::debug!("recording stopped after {} chunks", acc.chunk_count());
        self.encoder.encode(acc.concat(), capture.format)
    }

    fn cancel(&mut self) {
        if let Some(capture) = self.active.take() {
            capture.stream.detach_audio();
            tracing::debug!("recording cancelled");
        }
    }

    fn is_recording(&self) -> bool {
        self.active.is_some()
    }
}
