use crate::config::{MAX_REPLY_SECS, OUTPUT_CHUNK_SIZE};
use anyhow::{Context, anyhow};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FrameCount, StreamConfig};
use interview_core::{AudioOutput, PlaybackError};
use interview_native_utils::audio;
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::oneshot;

type DoneSlot = Arc<Mutex<Option<oneshot::Sender<()>>>>;

/// Plays agent replies on a cpal output device.
///
/// Decoded samples go into a ring buffer that the output callback drains.
/// When the buffer runs dry with a playback pending, the callback signals
/// its completion.
pub struct CpalSpeaker {
    sample_rate: u32,
    producer: Mutex<HeapProd<f32>>,
    consumer: Arc<Mutex<HeapCons<f32>>>,
    done: DoneSlot,
    shutdown: Mutex<Option<std_mpsc::Sender<()>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl CpalSpeaker {
    pub fn open(device_name: Option<&str>) -> anyhow::Result<Self> {
        let output = interview_native_utils::device::get_or_default_output(device_name)
            .context("Failed to get audio output device")?;
        tracing::info!("Using output device: {:?}", &output.name()?);
        for config in output.supported_output_configs()? {
            tracing::debug!("Supported output config: {:?}", config);
        }

        let output_config = output
            .default_output_config()
            .context("Failed to get default output config")?;
        let output_config = StreamConfig {
            channels: output_config.channels(),
            sample_rate: output_config.sample_rate(),
            buffer_size: cpal::BufferSize::Fixed(FrameCount::from(OUTPUT_CHUNK_SIZE as u32)),
        };
        let sample_rate = output_config.sample_rate.0;
        tracing::info!("Output stream config: {:?}", &output_config);

        let (producer, consumer) =
            audio::shared_buffer(sample_rate as usize * MAX_REPLY_SECS).split();
        let consumer = Arc::new(Mutex::new(consumer));
        let done: DoneSlot = Arc::new(Mutex::new(None));

        let (ready_tx, ready_rx) = std_mpsc::channel::<anyhow::Result<()>>();
        let (shutdown_tx, shutdown_rx) = std_mpsc::channel::<()>();
        let callback_consumer = Arc::clone(&consumer);
        let callback_done = Arc::clone(&done);

        let thread = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let channel_count = output_config.channels as usize;
                let output_data_fn = move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    fill_frames(data, channel_count, &callback_consumer, &callback_done);
                };
                let stream = match output.build_output_stream(
                    &output_config,
                    output_data_fn,
                    move |err| tracing::error!("An error occurred on output stream: {}", err),
                    None,
                ) {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e.into()));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(e.into()));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                let _ = shutdown_rx.recv();
                drop(stream);
                tracing::debug!("output stream closed");
            })?;

        ready_rx
            .recv()
            .map_err(|_| anyhow!("output thread exited before the stream started"))??;

        Ok(Self {
            sample_rate,
            producer: Mutex::new(producer),
            consumer,
            done,
            shutdown: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    fn enqueue(&self, samples: &[f32]) -> Result<(), PlaybackError> {
        let mut producer = self
            .producer
            .lock()
            .map_err(|_| PlaybackError::Output("output buffer poisoned".to_string()))?;
        let pushed = producer.push_slice(samples);
        if pushed < samples.len() {
            tracing::warn!(
                "reply longer than the output buffer, {} samples dropped",
                samples.len() - pushed
            );
        }
        Ok(())
    }
}

/// Copies buffered mono samples into every channel of `data` and fires the
/// pending completion once the buffer is empty.
fn fill_frames(
    data: &mut [f32],
    channel_count: usize,
    consumer: &Mutex<HeapCons<f32>>,
    done: &Mutex<Option<oneshot::Sender<()>>>,
) {
    // A flush in progress holds the lock; output silence for this period.
    let Ok(mut consumer) = consumer.try_lock() else {
        data.fill(0.0);
        return;
    };
    for frame in data.chunks_mut(channel_count.max(1)) {
        let sample = consumer.try_pop().unwrap_or(0.0);
        frame.fill(sample);
    }
    if consumer.is_empty() {
        if let Ok(mut slot) = done.try_lock() {
            if let Some(done) = slot.take() {
                let _ = done.send(());
            }
        }
    }
}

impl AudioOutput for CpalSpeaker {
    fn start(&self, audio: Vec<u8>, done: oneshot::Sender<()>) -> Result<(), PlaybackError> {
        let decoded =
            audio::decode_compressed(audio).map_err(|e| PlaybackError::Decode(e.to_string()))?;
        let samples = audio::resample(&decoded.samples, decoded.sample_rate, self.sample_rate)
            .map_err(|e| PlaybackError::Output(e.to_string()))?;
        self.enqueue(&samples)?;

        // Samples go in before the sender so the callback cannot fire early.
        let mut slot = self
            .done
            .lock()
            .map_err(|_| PlaybackError::Output("playback state poisoned".to_string()))?;
        *slot = Some(done);
        Ok(())
    }

    fn stop(&self) {
        if let Ok(mut slot) = self.done.lock() {
            slot.take();
        }
        if let Ok(mut consumer) = self.consumer.lock() {
            let flushed = consumer.clear();
            tracing::debug!("playback stopped, {} samples flushed", flushed);
        }
    }
}

impl Drop for CpalSpeaker {
    fn drop(&mut self) {
        let shutdown = self.shutdown.lock().ok().and_then(|mut s| s.take());
        if let Some(shutdown) = shutdown {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.lock().ok().and_then(|mut t| t.take()) {
            if thread.join().is_err() {
                tracing::warn!("output thread panicked");
            }
        }
    }
}
