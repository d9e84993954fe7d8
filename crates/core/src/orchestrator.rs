use crate::error::{Action, ExchangeError, SessionError};
use crate::exchange::{TurnExchange, TurnReply, TurnStatus};
use crate::media::{MediaDevices, MediaResourceManager};
use crate::playback::{AudioOutput, AudioPayload, PlaybackController, PlaybackHandle};
use crate::recorder::Recorder;
use crate::session::{Session, SessionState, Turn};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

pub const DEFAULT_EXCHANGE_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// How long a turn exchange may stay unanswered before it counts as a network error.
    pub exchange_timeout: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            exchange_timeout: DEFAULT_EXCHANGE_TIMEOUT,
        }
    }
}

impl OrchestratorConfig {
    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }
}

/// Platform pieces a session is assembled from.
pub struct SessionParts {
    pub devices: Arc<dyn MediaDevices>,
    pub recorder: Box<dyn Recorder>,
    pub exchange: Arc<dyn TurnExchange>,
    pub output: Arc<dyn AudioOutput>,
}

/// What the orchestrator tells its caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    StateChanged(SessionState),
    TurnAppended(Turn),
    Error(SessionError),
    /// The agent closed the interview. Sent exactly once.
    Completed { session_id: String },
    /// The session was abandoned before completion.
    TornDown,
}

#[derive(Debug)]
enum Input {
    BeginTurn,
    EndTurn,
    HangUp,
    ExchangeSettled {
        generation: u64,
        result: Result<TurnReply, ExchangeError>,
    },
    PlaybackEnded {
        generation: u64,
    },
}

/// Caller-side control of a running orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    tx: mpsc::UnboundedSender<Input>,
}

impl OrchestratorHandle {
    /// Starts recording. Only honoured while idle.
    pub fn begin_turn(&self) -> Result<(), SessionError> {
        self.send(Input::BeginTurn)
    }

    /// Stops recording and sends the utterance. Only honoured while listening.
    pub fn end_turn(&self) -> Result<(), SessionError> {
        self.send(Input::EndTurn)
    }

    /// Abandons the session from whatever state it is in.
    pub fn hang_up(&self) -> Result<(), SessionError> {
        self.send(Input::HangUp)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, input: Input) -> Result<(), SessionError> {
        self.tx.send(input).map_err(|_| SessionError::NoSession)
    }
}

/// Drives one interview session: record, exchange, play back, repeat.
///
/// Runs as a single task. Caller actions arrive through an
/// [`OrchestratorHandle`]; exchange replies and playback completions come back
/// on an internal channel tagged with the generation that started them, and
/// anything from an older generation is dropped.
pub struct SessionOrchestrator {
    session: Session,
    media: MediaResourceManager,
    recorder: Box<dyn Recorder>,
    exchange: Arc<dyn TurnExchange>,
    playback: PlaybackController,
    current_playback: Option<PlaybackHandle>,
    config: OrchestratorConfig,

    opening_audio: Option<AudioPayload>,
    mounted: bool,
    live: bool,
    generation: u64,
    tasks: Vec<JoinHandle<()>>,

    control_rx: mpsc::UnboundedReceiver<Input>,
    completion_tx: mpsc::UnboundedSender<Input>,
    completion_rx: mpsc::UnboundedReceiver<Input>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionOrchestrator {
    pub fn new(
        session_id: impl Into<String>,
        parts: SessionParts,
        config: OrchestratorConfig,
    ) -> (
        Self,
        OrchestratorHandle,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let orchestrator = Self {
            session: Session::new(session_id),
            media: MediaResourceManager::new(parts.devices),
            recorder: parts.recorder,
            exchange: parts.exchange,
            playback: PlaybackController::new(parts.output),
            current_playback: None,
            config,
            opening_audio: None,
            mounted: false,
            live: true,
            generation: 0,
            tasks: Vec::new(),
            control_rx,
            completion_tx,
            completion_rx,
            events: events_tx,
        };
        (
            orchestrator,
            OrchestratorHandle { tx: control_tx },
            events_rx,
        )
    }

    /// Greeting the agent sent when the session was created. Played on mount.
    pub fn with_opening_audio(mut self, audio: AudioPayload) -> Self {
        self.opening_audio = Some(audio).filter(|a| !a.is_empty());
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    /// Acquires the capture devices and plays the opening audio.
    ///
    /// Safe to call repeatedly: devices are only opened when none are held and
    /// the opening audio is consumed by the first call.
    pub async fn mount(&mut self) -> Result<(), SessionError> {
        if !self.live {
            return Err(SessionError::NoSession);
        }
        self.mounted = true;

        let acquired = if self.media.is_held() {
            Ok(())
        } else {
            self.media.acquire().await.map(|_| ())
        };
        if let Err(e) = &acquired {
            self.report(e.clone().into());
        }

        if let Some(opening) = self.opening_audio.take() {
            tracing::debug!("playing opening audio for session {}", self.session.id);
            self.start_playback(&opening);
        }
        acquired.map_err(SessionError::from)
    }

    /// Processes caller actions and completions until the session finishes or
    /// is torn down, then returns the final session record.
    pub async fn run(mut self) -> Session {
        if !self.mounted {
            // Errors are already published as events.
            let _ = self.mount().await;
        }

        while self.live {
            let input = tokio::select! {
                biased;
                Some(input) = self.completion_rx.recv() => input,
                input = self.control_rx.recv() => input.unwrap_or(Input::HangUp),
            };
            if self.handle_input(input).await.is_break() {
                break;
            }
        }
        self.session.clone()
    }

    async fn handle_input(&mut self, input: Input) -> ControlFlow<()> {
        match input {
            Input::BeginTurn => self.begin_turn().await,
            Input::EndTurn => self.end_turn(),
            Input::HangUp => {
                self.teardown();
                return ControlFlow::Break(());
            }
            Input::ExchangeSettled { generation, result } => {
                self.exchange_settled(generation, result)
            }
            Input::PlaybackEnded { generation } => return self.playback_ended(generation),
        }
        ControlFlow::Continue(())
    }

    async fn begin_turn(&mut self) {
        if self.session.state != SessionState::Idle {
            self.reject(Action::BeginTurn);
            return;
        }
        if !self.media.is_held() {
            if let Err(e) = self.media.acquire().await {
                self.report(e.into());
                return;
            }
        }
        let Some(handle) = self.media.handle() else {
            return;
        };
        match self.recorder.start(handle) {
            Ok(()) => self.set_state(SessionState::Listening),
            Err(e) => self.report(e.into()),
        }
    }

    fn end_turn(&mut self) {
        if self.session.state != SessionState::Listening {
            self.reject(Action::EndTurn);
            return;
        }
        let utterance = match self.recorder.stop() {
            Ok(utterance) => utterance,
            Err(e) => {
                self.report(e.into());
                self.set_state(SessionState::Idle);
                return;
            }
        };

        self.set_state(SessionState::Processing);
        let generation = self.next_generation();
        let exchange = Arc::clone(&self.exchange);
        let session_id = self.session.id.clone();
        let timeout = self.config.exchange_timeout;
        let completions = self.completion_tx.clone();

        let task = tokio::spawn(async move {
            let result =
                match tokio::time::timeout(timeout, exchange.submit(&session_id, Some(utterance)))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => Err(ExchangeError::Network(format!(
                        "no reply within {timeout:?}"
                    ))),
                };
            let _ = completions.send(Input::ExchangeSettled { generation, result });
        });
        self.track(task);
    }

    fn exchange_settled(&mut self, generation: u64, result: Result<TurnReply, ExchangeError>) {
        if generation != self.generation || self.session.state != SessionState::Processing {
            tracing::debug!("discarding stale exchange result (generation {generation})");
            return;
        }
        match result {
            Ok(reply) => {
                self.append(Turn::subject());
                self.append(Turn::agent(reply.reply_text, reply.reply_audio.clone()));
                if reply.status == TurnStatus::Complete {
                    tracing::info!("agent closed session {}", self.session.id);
                    self.session.finishing = true;
                }
                self.start_playback(&reply.reply_audio);
            }
            Err(e) => {
                self.report(e.into());
                self.set_state(SessionState::Idle);
            }
        }
    }

    fn start_playback(&mut self, audio: &AudioPayload) {
        if let Some(previous) = self.current_playback.take() {
            self.playback.stop(previous);
        }
        let generation = self.next_generation();
        self.set_state(SessionState::Speaking);

        match self.playback.play(audio) {
            Ok((handle, done)) => {
                self.current_playback = Some(handle);
                let completions = self.completion_tx.clone();
                let task = tokio::spawn(async move {
                    // A stopped playback drops the sender and never signals.
                    if done.await.is_ok() {
                        let _ = completions.send(Input::PlaybackEnded { generation });
                    }
                });
                self.track(task);
            }
            Err(e) => {
                // Nothing could be played; move on as if the clip had ended.
                self.report(e.into());
                let _ = self.completion_tx.send(Input::PlaybackEnded { generation });
            }
        }
    }

    fn playback_ended(&mut self, generation: u64) -> ControlFlow<()> {
        if generation != self.generation || self.session.state != SessionState::Speaking {
            tracing::debug!("discarding stale playback completion (generation {generation})");
            return ControlFlow::Continue(());
        }
        if let Some(handle) = self.current_playback.take() {
            self.playback.finished(handle);
        }
        if self.session.finishing {
            self.finish();
            return ControlFlow::Break(());
        }
        self.set_state(SessionState::Idle);
        ControlFlow::Continue(())
    }

    fn finish(&mut self) {
        self.media.release();
        self.set_state(SessionState::Finished);
        self.live = false;
        self.next_generation();
        tracing::info!("session {} completed", self.session.id);
        self.emit(SessionEvent::Completed {
            session_id: self.session.id.clone(),
        });
    }

    /// Releases everything the session holds. Idempotent.
    fn teardown(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        self.next_generation();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.recorder.cancel();
        self.current_playback = None;
        self.playback.halt();
        self.media.release();
        tracing::info!(
            "session {} torn down while {}",
            self.session.id,
            self.session.state
        );
        self.emit(SessionEvent::TornDown);
    }

    fn append(&mut self, turn: Turn) {
        self.session.transcript.push(turn.clone());
        self.emit(SessionEvent::TurnAppended(turn));
    }

    fn set_state(&mut self, state: SessionState) {
        if self.session.state == state {
            return;
        }
        tracing::debug!("session {}: {} -> {}", self.session.id, self.session.state, state);
        self.session.state = state;
        self.emit(SessionEvent::StateChanged(state));
    }

    fn reject(&self, action: Action) {
        self.report(SessionError::InvalidTransition {
            action,
            state: self.session.state,
        });
    }

    fn report(&self, error: SessionError) {
        tracing::warn!("session {}: {}", self.session.id, error);
        self.emit(SessionEvent::Error(error));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn track(&mut self, task: JoinHandle<()>) {
        self.tasks.retain(|t| !t.is_finished());
        self.tasks.push(task);
    }
}

impl Drop for SessionOrchestrator {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MediaError, PlaybackError};
    use crate::exchange::MockTurnExchange;
    use crate::media::tests::{FakeStream, devices_for};
    use crate::recorder::{AudioEncoding, MockRecorder, RecordedUtterance};
    use crate::session::Role;
    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    /// Audio output that either finishes every clip at once or holds them
    /// until the test calls `finish_current`.
    #[derive(Default)]
    struct FakeOutput {
        auto_finish: bool,
        starts: AtomicUsize,
        stops: AtomicUsize,
        pending: Mutex<Vec<oneshot::Sender<()>>>,
    }

    impl FakeOutput {
        fn auto() -> Arc<Self> {
            Arc::new(Self {
                auto_finish: true,
                ..Default::default()
            })
        }

        fn manual() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn finish_current(&self) {
            if let Some(done) = self.pending.lock().unwrap().pop() {
                let _ = done.send(());
            }
        }

        fn starts(&self) -> usize {
            self.starts.load(Ordering::SeqCst)
        }
    }

    impl AudioOutput for FakeOutput {
        fn start(&self, _audio: Vec<u8>, done: oneshot::Sender<()>) -> Result<(), PlaybackError> {
            self.starts.fetch_add(1, Ordering::SeqCst);
            if self.auto_finish {
                let _ = done.send(());
            } else {
                self.pending.lock().unwrap().push(done);
            }
            Ok(())
        }

        fn stop(&self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
            self.pending.lock().unwrap().clear();
        }
    }

    struct HangingExchange;

    #[async_trait]
    impl TurnExchange for HangingExchange {
        async fn submit(
            &self,
            _session_id: &str,
            _utterance: Option<RecordedUtterance>,
        ) -> Result<TurnReply, ExchangeError> {
            std::future::pending().await
        }
    }

    fn audio(bytes: &[u8]) -> AudioPayload {
        AudioPayload::new(STANDARD.encode(bytes))
    }

    fn reply(text: &str, status: TurnStatus) -> TurnReply {
        TurnReply {
            reply_text: text.to_string(),
            reply_audio: audio(text.as_bytes()),
            status,
        }
    }

    fn recorder(starts: usize) -> MockRecorder {
        let mut recorder = MockRecorder::new();
        recorder.expect_start().times(starts).returning(|_| Ok(()));
        recorder.expect_stop().returning(|| {
            Ok(RecordedUtterance {
                bytes: vec![1, 2, 3],
                encoding: AudioEncoding::Wav,
            })
        });
        recorder.expect_cancel().return_const(());
        recorder.expect_is_recording().return_const(false);
        recorder
    }

    fn parts(
        stream: &Arc<FakeStream>,
        recorder: MockRecorder,
        exchange: Arc<dyn TurnExchange>,
        output: &Arc<FakeOutput>,
    ) -> SessionParts {
        SessionParts {
            devices: Arc::new(devices_for(stream.clone())),
            recorder: Box::new(recorder),
            exchange,
            output: output.clone(),
        }
    }

    /// Collects events up to and including the first one matching `pred`.
    async fn until(
        events: &mut mpsc::UnboundedReceiver<SessionEvent>,
        pred: impl Fn(&SessionEvent) -> bool,
    ) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        loop {
            let event = events.recv().await.expect("event stream closed early");
            let matched = pred(&event);
            seen.push(event);
            if matched {
                return seen;
            }
        }
    }

    fn is_state(state: SessionState) -> impl Fn(&SessionEvent) -> bool {
        move |e| *e == SessionEvent::StateChanged(state)
    }

    #[tokio::test]
    async fn two_turn_interview_completes_once_and_releases_devices() {
        // --- Arrange ---
        let stream = Arc::new(FakeStream::default());
        let output = FakeOutput::auto();
        let mut exchange = MockTurnExchange::new();
        let calls = AtomicUsize::new(0);
        exchange.expect_submit().times(2).returning(move |id, utterance| {
            assert_eq!(id, "S1");
            assert!(utterance.is_some());
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Ok(reply("Tell me about Rust.", TurnStatus::Continue)),
                _ => Ok(reply("Thanks, that's all.", TurnStatus::Complete)),
            }
        });
        let (orchestrator, handle, mut events) = SessionOrchestrator::new(
            "S1",
            parts(&stream, recorder(2), Arc::new(exchange), &output),
            OrchestratorConfig::default(),
        );
        let orchestrator = orchestrator.with_opening_audio(audio(b"hello"));

        // --- Act ---
        let task = tokio::spawn(orchestrator.run());
        let opening = until(&mut events, is_state(SessionState::Idle)).await;
        assert_eq!(opening[0], SessionEvent::StateChanged(SessionState::Speaking));

        handle.begin_turn().unwrap();
        handle.end_turn().unwrap();
        let first = until(&mut events, is_state(SessionState::Idle)).await;

        handle.begin_turn().unwrap();
        handle.end_turn().unwrap();
        until(&mut events, |e| matches!(e, SessionEvent::Completed { .. })).await;
        let session = task.await.unwrap();

        // --- Assert ---
        assert_eq!(
            first,
            vec![
                SessionEvent::StateChanged(SessionState::Listening),
                SessionEvent::StateChanged(SessionState::Processing),
                SessionEvent::TurnAppended(Turn::subject()),
                SessionEvent::TurnAppended(Turn::agent(
                    "Tell me about Rust.".into(),
                    audio(b"Tell me about Rust.")
                )),
                SessionEvent::StateChanged(SessionState::Speaking),
                SessionEvent::StateChanged(SessionState::Idle),
            ]
        );
        assert_eq!(session.state, SessionState::Finished);
        assert!(session.is_complete());
        assert_eq!(session.transcript.len(), 4);
        assert_eq!(
            session.transcript.last().map(|t| t.text.as_str()),
            Some("Thanks, that's all.")
        );
        let roles: Vec<Role> = session.transcript.iter().map(|t| t.role).collect();
        assert_eq!(
            roles,
            vec![Role::Subject, Role::Agent, Role::Subject, Role::Agent]
        );
        assert_eq!(output.starts(), 3);
        assert_eq!(stream.stop_count(), 1);

        // Nothing follows completion, in particular no second Completed.
        assert_eq!(events.recv().await, None);
        assert!(handle.hang_up().is_err());
    }

    #[tokio::test]
    async fn network_error_returns_to_idle_without_touching_the_transcript() {
        // --- Arrange ---
        let stream = Arc::new(FakeStream::default());
        let output = FakeOutput::auto();
        let mut exchange = MockTurnExchange::new();
        exchange
            .expect_submit()
            .times(1)
            .returning(|_, _| Err(ExchangeError::Network("connection refused".into())));
        let (orchestrator, handle, mut events) = SessionOrchestrator::new(
            "S1",
            parts(&stream, recorder(2), Arc::new(exchange), &output),
            OrchestratorConfig::default(),
        );

        // --- Act ---
        let task = tokio::spawn(orchestrator.run());
        handle.begin_turn().unwrap();
        handle.end_turn().unwrap();
        let seen = until(&mut events, is_state(SessionState::Idle)).await;

        // The recorder and devices are still usable for another attempt.
        handle.begin_turn().unwrap();
        until(&mut events, is_state(SessionState::Listening)).await;
        handle.hang_up().unwrap();
        let session = task.await.unwrap();

        // --- Assert ---
        assert!(seen.contains(&SessionEvent::Error(SessionError::Exchange(
            ExchangeError::Network("connection refused".into())
        ))));
        assert!(
            !seen
                .iter()
                .any(|e| matches!(e, SessionEvent::TurnAppended(_)))
        );
        assert!(session.transcript.is_empty());
        assert_eq!(output.starts(), 0);
        assert_eq!(stream.stop_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unanswered_exchange_times_out_as_network_error() {
        let stream = Arc::new(FakeStream::default());
        let output = FakeOutput::auto();
        let (orchestrator, handle, mut events) = SessionOrchestrator::new(
            "S1",
            parts(&stream, recorder(1), Arc::new(HangingExchange), &output),
            OrchestratorConfig::default().with_exchange_timeout(Duration::from_secs(5)),
        );

        let task = tokio::spawn(orchestrator.run());
        handle.begin_turn().unwrap();
        handle.end_turn().unwrap();
        let seen = until(&mut events, is_state(SessionState::Idle)).await;

        assert!(seen.iter().any(|e| matches!(
            e,
            SessionEvent::Error(SessionError::Exchange(ExchangeError::Network(_)))
        )));
        handle.hang_up().unwrap();
        assert!(task.await.unwrap().transcript.is_empty());
    }

    #[tokio::test]
    async fn opening_audio_plays_once_across_repeated_mounts() {
        let stream = Arc::new(FakeStream::default());
        let output = FakeOutput::auto();
        let (orchestrator, handle, mut events) = SessionOrchestrator::new(
            "S1",
            parts(
                &stream,
                recorder(0),
                Arc::new(MockTurnExchange::new()),
                &output,
            ),
            OrchestratorConfig::default(),
        );
        let mut orchestrator = orchestrator.with_opening_audio(audio(b"welcome"));

        orchestrator.mount().await.unwrap();
        orchestrator.mount().await.unwrap();
        assert_eq!(orchestrator.state(), SessionState::Speaking);

        let task = tokio::spawn(orchestrator.run());
        until(&mut events, is_state(SessionState::Idle)).await;
        handle.hang_up().unwrap();
        task.await.unwrap();

        assert_eq!(output.starts(), 1);
        assert_eq!(stream.stop_count(), 1);
    }

    #[tokio::test]
    async fn actions_outside_their_state_are_rejected_without_side_effects() {
        // --- Arrange ---
        let stream = Arc::new(FakeStream::default());
        let output = FakeOutput::manual();
        let mut exchange = MockTurnExchange::new();
        exchange
            .expect_submit()
            .times(1)
            .returning(|_, _| Ok(reply("Next question.", TurnStatus::Continue)));
        let (orchestrator, handle, mut events) = SessionOrchestrator::new(
            "S1",
            parts(&stream, recorder(1), Arc::new(exchange), &output),
            OrchestratorConfig::default(),
        );
        let task = tokio::spawn(orchestrator.run());
        let rejected = |action, state| {
            SessionEvent::Error(SessionError::InvalidTransition { action, state })
        };

        // --- Act & Assert ---
        handle.end_turn().unwrap();
        assert_eq!(
            events.recv().await,
            Some(rejected(Action::EndTurn, SessionState::Idle))
        );

        handle.begin_turn().unwrap();
        handle.begin_turn().unwrap();
        let seen = until(&mut events, |e| matches!(e, SessionEvent::Error(_))).await;
        assert_eq!(
            seen,
            vec![
                SessionEvent::StateChanged(SessionState::Listening),
                rejected(Action::BeginTurn, SessionState::Listening),
            ]
        );

        handle.end_turn().unwrap();
        until(&mut events, is_state(SessionState::Speaking)).await;
        handle.end_turn().unwrap();
        handle.begin_turn().unwrap();
        assert_eq!(
            events.recv().await,
            Some(rejected(Action::EndTurn, SessionState::Speaking))
        );
        assert_eq!(
            events.recv().await,
            Some(rejected(Action::BeginTurn, SessionState::Speaking))
        );

        output.finish_current();
        until(&mut events, is_state(SessionState::Idle)).await;
        handle.hang_up().unwrap();
        let session = task.await.unwrap();
        assert_eq!(session.transcript.len(), 2);
    }

    #[tokio::test]
    async fn hang_up_while_speaking_stops_playback_and_releases_devices() {
        // --- Arrange ---
        let stream = Arc::new(FakeStream::default());
        let output = FakeOutput::manual();
        let (orchestrator, handle, mut events) = SessionOrchestrator::new(
            "S1",
            parts(
                &stream,
                recorder(0),
                Arc::new(MockTurnExchange::new()),
                &output,
            ),
            OrchestratorConfig::default(),
        );
        let orchestrator = orchestrator.with_opening_audio(audio(b"welcome"));

        // --- Act ---
        let task = tokio::spawn(orchestrator.run());
        until(&mut events, is_state(SessionState::Speaking)).await;
        handle.hang_up().unwrap();
        handle.hang_up().unwrap();
        let session = task.await.unwrap();

        // --- Assert ---
        assert_eq!(events.recv().await, Some(SessionEvent::TornDown));
        assert_eq!(events.recv().await, None);
        assert_eq!(session.state, SessionState::Speaking);
        assert_eq!(output.stops.load(Ordering::SeqCst), 1);
        assert_eq!(stream.stop_count(), 1);
        // Late completion after teardown goes nowhere.
        output.finish_current();
    }

    #[tokio::test]
    async fn hang_up_while_processing_discards_the_pending_reply() {
        let stream = Arc::new(FakeStream::default());
        let output = FakeOutput::auto();
        let (orchestrator, handle, mut events) = SessionOrchestrator::new(
            "S1",
            parts(&stream, recorder(1), Arc::new(HangingExchange), &output),
            OrchestratorConfig::default(),
        );

        let task = tokio::spawn(orchestrator.run());
        handle.begin_turn().unwrap();
        handle.end_turn().unwrap();
        until(&mut events, is_state(SessionState::Processing)).await;
        handle.hang_up().unwrap();
        let session = task.await.unwrap();

        assert_eq!(events.recv().await, Some(SessionEvent::TornDown));
        assert!(session.transcript.is_empty());
        assert_eq!(output.starts(), 0);
        assert_eq!(stream.stop_count(), 1);
    }

    #[tokio::test]
    async fn undecodable_reply_audio_still_reaches_idle() {
        let stream = Arc::new(FakeStream::default());
        let output = FakeOutput::auto();
        let mut exchange = MockTurnExchange::new();
        exchange.expect_submit().times(1).returning(|_, _| {
            Ok(TurnReply {
                reply_text: "Can you hear me?".into(),
                reply_audio: AudioPayload::new("***"),
                status: TurnStatus::Continue,
            })
        });
        let (orchestrator, handle, mut events) = SessionOrchestrator::new(
            "S1",
            parts(&stream, recorder(1), Arc::new(exchange), &output),
            OrchestratorConfig::default(),
        );

        let task = tokio::spawn(orchestrator.run());
        handle.begin_turn().unwrap();
        handle.end_turn().unwrap();
        let seen = until(&mut events, is_state(SessionState::Idle)).await;
        handle.hang_up().unwrap();
        let session = task.await.unwrap();

        assert!(seen.iter().any(|e| matches!(
            e,
            SessionEvent::Error(SessionError::Playback(PlaybackError::Decode(_)))
        )));
        assert_eq!(session.transcript.len(), 2);
        assert_eq!(output.starts(), 0);
    }

    #[tokio::test]
    async fn denied_devices_surface_on_mount_and_block_the_turn() {
        let mut devices = crate::media::MockMediaDevices::new();
        devices
            .expect_open()
            .times(2)
            .returning(|| Err(MediaError::PermissionDenied("microphone".into())));
        let output = FakeOutput::auto();
        let (orchestrator, handle, mut events) = SessionOrchestrator::new(
            "S1",
            SessionParts {
                devices: Arc::new(devices),
                recorder: Box::new(recorder(0)),
                exchange: Arc::new(MockTurnExchange::new()),
                output: output.clone(),
            },
            OrchestratorConfig::default(),
        );

        let task = tokio::spawn(orchestrator.run());
        let denied = SessionEvent::Error(SessionError::Media(MediaError::PermissionDenied(
            "microphone".into(),
        )));
        assert_eq!(events.recv().await, Some(denied.clone()));

        handle.begin_turn().unwrap();
        assert_eq!(events.recv().await, Some(denied));
        handle.hang_up().unwrap();
        assert_eq!(task.await.unwrap().state, SessionState::Idle);
    }
}
