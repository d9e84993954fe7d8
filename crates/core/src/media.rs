use crate::error::{MediaError, RecorderError};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

/// Receives raw little-endian PCM16 chunks from an audio track, in capture order.
pub type ChunkSink = mpsc::UnboundedSender<Vec<u8>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Shape of the PCM an audio track delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

/// A live device stream opened by the host platform.
///
/// Implementations own native resources (capture threads, device handles).
/// `stop` must tolerate being called more than once.
#[cfg_attr(test, automock)]
pub trait DeviceStream: Send + Sync {
    fn tracks(&self) -> Vec<TrackKind>;

    fn capture_format(&self) -> CaptureFormat;

    /// Starts routing captured audio to `sink` until `detach_audio` is called.
    fn attach_audio(&self, sink: ChunkSink) -> Result<(), RecorderError>;

    fn detach_audio(&self);

    /// Stops every underlying track and clears any display binding.
    fn stop(&self);
}

/// Host access to camera and microphone.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn open(&self) -> Result<Arc<dyn DeviceStream>, MediaError>;
}

/// Exclusive ownership of one opened device stream.
///
/// Released exactly once: either explicitly or when dropped, whichever comes first.
pub struct MediaHandle {
    id: u64,
    stream: Arc<dyn DeviceStream>,
    released: AtomicBool,
}

impl MediaHandle {
    fn new(id: u64, stream: Arc<dyn DeviceStream>) -> Self {
        Self {
            id,
            stream,
            released: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn stream(&self) -> &Arc<dyn DeviceStream> {
        &self.stream
    }

    pub fn is_live(&self) -> bool {
        !self.released.load(Ordering::Acquire)
    }

    /// Stops the underlying tracks. Returns `false` if the handle was already released.
    pub fn release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.stream.detach_audio();
        self.stream.stop();
        tracing::debug!("media handle {} released", self.id);
        true
    }
}

impl Drop for MediaHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for MediaHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaHandle")
            .field("id", &self.id)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Acquires and releases the single device stream a session may hold.
pub struct MediaResourceManager {
    devices: Arc<dyn MediaDevices>,
    current: Option<MediaHandle>,
    next_id: u64,
}

impl MediaResourceManager {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            current: None,
            next_id: 0,
        }
    }

    /// Opens camera and microphone. A second acquire while a handle is live is refused.
    pub async fn acquire(&mut self) -> Result<&MediaHandle, MediaError> {
        if self.handle().is_some() {
            return Err(MediaError::AlreadyAcquired);
        }
        let stream = self.devices.open().await?;
        self.next_id += 1;
        tracing::info!(
            "media handle {} acquired with tracks {:?}",
            self.next_id,
            stream.tracks()
        );
        Ok(self.current.insert(MediaHandle::new(self.next_id, stream)))
    }

    /// Releases the held handle, if any. Safe to call repeatedly.
    pub fn release(&mut self) {
        if let Some(handle) = self.current.take() {
            handle.release();
        }
    }

    pub fn handle(&self) -> Option<&MediaHandle> {
        self.current.as_ref().filter(|h| h.is_live())
    }

    pub fn is_held(&self) -> bool {
        self.handle().is_some()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    /// Device stream double that records how often it was stopped and lets
    /// tests push captured chunks.
    #[derive(Default)]
    pub(crate) struct FakeStream {
        pub stops: AtomicUsize,
        pub sink: Mutex<Option<ChunkSink>>,
        pub fail_attach: bool,
    }

    impl FakeStream {
        pub fn emit(&self, chunk: &[u8]) {
            if let Some(sink) = self.sink.lock().unwrap().as_ref() {
                let _ = sink.send(chunk.to_vec());
            }
        }

        pub fn stop_count(&self) -> usize {
            self.stops.load(Ordering::SeqCst)
        }
    }

    impl DeviceStream for FakeStream {
        fn tracks(&self) -> Vec<TrackKind> {
            vec![TrackKind::Audio, TrackKind::Video]
        }

        fn capture_format(&self) -> CaptureFormat {
            CaptureFormat {
                sample_rate: 16_000,
                channels: 1,
            }
        }

        fn attach_audio(&self, sink: ChunkSink) -> Result<(), RecorderError> {
            if self.fail_attach {
                return Err(RecorderError::RecorderUnavailable("no encoder".into()));
            }
            *self.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        fn detach_audio(&self) {
            self.sink.lock().unwrap().take();
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub(crate) fn devices_for(stream: Arc<FakeStream>) -> MockMediaDevices {
        let mut devices = MockMediaDevices::new();
        devices.expect_open().returning(move || {
            let stream: Arc<dyn DeviceStream> = stream.clone();
            Ok(stream)
        });
        devices
    }

    #[tokio::test]
    async fn second_acquire_is_refused_while_live() {
        let stream = Arc::new(FakeStream::default());
        let mut manager = MediaResourceManager::new(Arc::new(devices_for(stream.clone())));

        let id = manager.acquire().await.unwrap().id();
        assert_eq!(id, 1);
        assert_eq!(
            manager.acquire().await.unwrap_err(),
            MediaError::AlreadyAcquired
        );
        assert_eq!(stream.stop_count(), 0);
    }

    #[tokio::test]
    async fn release_is_idempotent() {
        let stream = Arc::new(FakeStream::default());
        let mut manager = MediaResourceManager::new(Arc::new(devices_for(stream.clone())));
        manager.acquire().await.unwrap();

        manager.release();
        manager.release();
        assert!(!manager.is_held());
        assert_eq!(stream.stop_count(), 1);

        // A released handle can be replaced by a fresh one.
        assert_eq!(manager.acquire().await.unwrap().id(), 2);
    }

    #[tokio::test]
    async fn dropping_the_manager_releases_the_stream() {
        let stream = Arc::new(FakeStream::default());
        {
            let mut manager =
                MediaResourceManager::new(Arc::new(devices_for(stream.clone())));
            manager.acquire().await.unwrap();
        }
        assert_eq!(stream.stop_count(), 1);
    }

    #[tokio::test]
    async fn permission_denied_surfaces_unchanged() {
        let mut devices = MockMediaDevices::new();
        devices
            .expect_open()
            .times(1)
            .returning(|| Err(MediaError::PermissionDenied("camera".into())));
        let mut manager = MediaResourceManager::new(Arc::new(devices));

        let err = manager.acquire().await.unwrap_err();
        assert!(matches!(err, MediaError::PermissionDenied(_)));
        assert!(!manager.is_held());
    }
}
