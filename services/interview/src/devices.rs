use crate::config::INPUT_CHUNK_SIZE;
use async_trait::async_trait;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use interview_core::{
    CaptureFormat, ChunkSink, DeviceStream, MediaDevices, MediaError, RecorderError, TrackKind,
};
use interview_native_utils::audio::{self, ToBinary};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Opens the microphone through cpal. There is no camera on this host, so the
/// stream carries a single audio track.
pub struct CpalMediaDevices {
    input_device: Option<String>,
}

impl CpalMediaDevices {
    pub fn new(input_device: Option<String>) -> Self {
        Self { input_device }
    }
}

#[async_trait]
impl MediaDevices for CpalMediaDevices {
    async fn open(&self) -> Result<Arc<dyn DeviceStream>, MediaError> {
        let name = self.input_device.clone();
        let stream = tokio::task::spawn_blocking(move || CpalInputStream::open(name.as_deref()))
            .await
            .map_err(|e| MediaError::DeviceUnavailable(e.to_string()))??;
        Ok(Arc::new(stream))
    }
}

/// Sorts host errors into the two acquisition failures callers distinguish.
pub fn classify_device_error(message: String) -> MediaError {
    let lower = message.to_lowercase();
    if lower.contains("permission") || lower.contains("denied") || lower.contains("not authorized")
    {
        MediaError::PermissionDenied(message)
    } else {
        MediaError::DeviceUnavailable(message)
    }
}

/// A running cpal input stream.
///
/// cpal streams cannot move between threads on every platform, so the stream
/// lives on its own thread until `stop` signals it.
pub struct CpalInputStream {
    format: CaptureFormat,
    sink: Arc<Mutex<Option<ChunkSink>>>,
    shutdown: Mutex<Option<std_mpsc::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CpalInputStream {
    pub fn open(device_name: Option<&str>) -> Result<Self, MediaError> {
        let device = interview_native_utils::device::get_or_default_input(device_name)
            .map_err(|e| classify_device_error(format!("{e:#}")))?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        tracing::info!("Using input device: {:?}", name);

        let input_config = device
            .default_input_config()
            .map_err(|e| classify_device_error(e.to_string()))?;
        let input_config = StreamConfig {
            channels: input_config.channels(),
            sample_rate: input_config.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(FrameCount::from(INPUT_CHUNK_SIZE as u32)),
        };
        tracing::info!("Input stream config: {:?}", &input_config);

        let format = CaptureFormat {
            sample_rate: input_config.sample_rate.0,
            channels: 1,
        };
        let sink: Arc<Mutex<Option<ChunkSink>>> = Arc::new(Mutex::new(None));
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), MediaError>>();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();

        let callback_sink = Arc::clone(&sink);
        let thread = std::thread::Builder::new()
            .name("audio-input".to_string())
            .spawn(move || {
                let channel_count = input_config.channels as usize;
                // Mono PCM16 chunks go to whoever is attached; nothing is buffered otherwise.
                let input_data_fn = move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let Ok(guard) = callback_sink.lock() else {
                        return;
                    };
                    if let Some(sink) = guard.as_ref() {
                        let mono = audio::downmix(data, channel_count);
                        if sink.send(mono.as_slice().to_binary()).is_err() {
                            tracing::debug!("input chunk dropped, recorder went away");
                        }
                    }
                };
                let stream = match device.build_input_stream(
                    &input_config,
                    input_data_fn,
                    move |err| tracing::error!("An error occurred on input stream: {}", err),
                    None,
                ) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(classify_device_error(e.to_string())));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(classify_device_error(e.to_string())));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // Runs until stop() sends or the handle is dropped.
                let _ = shutdown_rx.recv();
                drop(stream);
                tracing::debug!("input stream closed");
            })
            .map_err(|e| MediaError::DeviceUnavailable(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(MediaError::DeviceUnavailable(
                    "input thread exited before the stream started".to_string(),
                ));
            }
        }

        Ok(Self {
            format,
            sink,
            shutdown: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    fn is_running(&self) -> bool {
        self.shutdown.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}

impl DeviceStream for CpalInputStream {
    fn tracks(&self) -> Vec<TrackKind> {
        vec![TrackKind::Audio]
    }

    fn capture_format(&self) -> CaptureFormat {
        self.format
    }

    fn attach_audio(&self, sink: ChunkSink) -> Result<(), RecorderError> {
        if !self.is_running() {
            return Err(RecorderError::RecorderUnavailable(
                "input stream is stopped".to_string(),
            ));
        }
        let mut guard = self
            .sink
            .lock()
            .map_err(|_| RecorderError::RecorderUnavailable("input stream poisoned".to_string()))?;
        *guard = Some(sink);
        Ok(())
    }

    fn detach_audio(&self) {
        if let Ok(mut guard) = self.sink.lock() {
            guard.take();
        }
    }

    fn stop(&self) {
        let shutdown = self.shutdown.lock().ok().and_then(|mut s| s.take());
        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
            if let Some(thread) = self.thread.lock().ok().and_then(|mut t| t.take()) {
                if thread.join().is_err() {
                    tracing::warn!("input thread panicked");
                }
            }
        }
    }
}

impl Drop for CpalInputStream {
    fn drop(&mut self) {
        self.stop();
    }
}
