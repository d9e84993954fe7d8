use interview_core::{AudioEncoding, CaptureFormat, RecordedUtterance, RecorderError, UtteranceEncoder};
use interview_native_utils::audio::{self, ToBinary, UPLOAD_SAMPLE_RATE};
use interview_native_utils::wav;

/// Packages captured microphone PCM as a 16 kHz mono WAV upload.
#[derive(Debug, Default, Clone, Copy)]
pub struct WavUtteranceEncoder;

impl UtteranceEncoder for WavUtteranceEncoder {
    fn encode(
        &self,
        pcm: Vec<u8>,
        format: CaptureFormat,
    ) -> Result<RecordedUtterance, RecorderError> {
        let samples = audio::downmix(&audio::pcm16_to_f32(&pcm), format.channels as usize);
        let resampled = audio::resample(&samples, format.sample_rate, UPLOAD_SAMPLE_RATE)
            .map_err(|e| RecorderError::RecorderUnavailable(format!("resampling failed: {e}")))?;
        let bytes = wav::encode_wav(&resampled.as_slice().to_binary(), UPLOAD_SAMPLE_RATE, 1)
            .map_err(|e| RecorderError::RecorderUnavailable(format!("wav encoding failed: {e}")))?;
        tracing::debug!(
            "encoded {} captured samples into {} wav bytes",
            samples.len(),
            bytes.len()
        );
        Ok(RecordedUtterance {
            bytes,
            encoding: AudioEncoding::Wav,
        })
    }
}
