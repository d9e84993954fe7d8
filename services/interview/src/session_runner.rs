use crate::agent_adapter::AgentExchange;
use crate::config::Config;
use crate::devices::CpalMediaDevices;
use crate::recording::WavUtteranceEncoder;
use crate::report_view::flush_stdout;
use crate::speaker::CpalSpeaker;
use anyhow::Context;
use interview_client::types::StartSessionResponse;
use interview_client::{AgentApi, Upload};
use interview_core::{
    AudioPayload, OrchestratorConfig, OrchestratorHandle, Role, SessionError, SessionEvent,
    SessionOrchestrator, SessionParts, SessionState, StreamRecorder,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// How a session is opened with the agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    /// Upload a resume (or nothing) to `/interview/start`.
    Resume(Option<PathBuf>),
    /// Redeem an admission token granted by the fit evaluation.
    AdmissionToken(String),
}

pub async fn open_session<C: AgentApi>(
    client: &C,
    entry: &Entry,
) -> anyhow::Result<StartSessionResponse> {
    let started = match entry {
        Entry::Resume(path) => {
            let resume = match path {
                Some(path) => Some(read_pdf(path).await?),
                None => None,
            };
            client.start_session(resume).await?
        }
        Entry::AdmissionToken(token) => client.init_session(token).await?,
    };
    tracing::info!("Session {} started", started.session_id());
    Ok(started)
}

pub async fn read_pdf(path: &PathBuf) -> anyhow::Result<Upload> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "resume.pdf".to_string());
    Ok(Upload::pdf(file_name, bytes))
}

/// What a line typed during a voice session asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    BeginTurn,
    EndTurn,
    HangUp,
    Wait,
}

/// Enter toggles recording; `q` hangs up from any state.
pub fn key_action(line: &str, state: SessionState) -> KeyAction {
    if line.trim().eq_ignore_ascii_case("q") {
        return KeyAction::HangUp;
    }
    match state {
        SessionState::Idle => KeyAction::BeginTurn,
        SessionState::Listening => KeyAction::EndTurn,
        _ => KeyAction::Wait,
    }
}

pub fn prompt_for(state: SessionState) -> Option<&'static str> {
    match state {
        SessionState::Idle => Some("[Enter] to answer, [q] to hang up"),
        SessionState::Listening => Some("Recording... [Enter] when you are done"),
        SessionState::Processing => Some("Thinking..."),
        SessionState::Speaking | SessionState::Finished => None,
    }
}

fn apply(handle: &OrchestratorHandle, action: KeyAction) -> Result<(), SessionError> {
    match action {
        KeyAction::BeginTurn => handle.begin_turn(),
        KeyAction::EndTurn => handle.end_turn(),
        KeyAction::HangUp => handle.hang_up(),
        KeyAction::Wait => {
            println!("(the interviewer is still speaking)");
            Ok(())
        }
    }
}

/// Runs a voice interview on the host's microphone and speaker.
///
/// Returns the session id once the agent closes the interview, or `None`
/// when the user hangs up first.
pub async fn run_voice<C: AgentApi + 'static>(
    client: Arc<C>,
    config: &Config,
    started: StartSessionResponse,
) -> anyhow::Result<Option<String>> {
    let output_device = config.output_device.clone();
    let speaker = tokio::task::spawn_blocking(move || CpalSpeaker::open(output_device.as_deref()))
        .await?
        .context("Failed to open the audio output")?;

    let parts = SessionParts {
        devices: Arc::new(CpalMediaDevices::new(config.input_device.clone())),
        recorder: Box::new(StreamRecorder::new(Arc::new(WavUtteranceEncoder))),
        exchange: Arc::new(AgentExchange::new(client)),
        output: Arc::new(speaker),
    };
    let orchestrator_config =
        OrchestratorConfig::default().with_exchange_timeout(config.exchange_timeout);

    if let Some(message) = started.message() {
        println!("Interviewer: {message}");
    }
    let (orchestrator, handle, events) =
        SessionOrchestrator::new(started.session_id(), parts, orchestrator_config);
    let orchestrator = orchestrator.with_opening_audio(AudioPayload::new(started.audio_base64()));
    let task = tokio::spawn(orchestrator.run());

    let mut stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let completed = drive(&handle, events, &mut stdin).await;
    let session = task.await.context("Session task failed")?;
    tracing::info!(
        "Session {} ended after {} transcript entries (complete: {})",
        session.id,
        session.transcript.len(),
        session.is_complete()
    );
    if let Some(last) = session.transcript.last() {
        tracing::debug!("Last turn ({:?}): {}", last.role, last.text);
    }
    Ok(completed)
}

/// Feeds keyboard input to the orchestrator and prints its events until it
/// stops publishing them.
pub async fn drive<R>(
    handle: &OrchestratorHandle,
    mut events: tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
    input: &mut R,
) -> Option<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut state = SessionState::Idle;
    let mut input_open = true;
    let mut completed = None;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::StateChanged(next) => {
                        state = next;
                        if let Some(prompt) = prompt_for(state) {
                            println!("{prompt}");
                        }
                    }
                    SessionEvent::TurnAppended(turn) => {
                        if turn.role == Role::Agent {
                            println!("Interviewer: {}", turn.text);
                        }
                    }
                    SessionEvent::Error(e) => {
                        println!("! {e}");
                        if e.is_retryable() && state == SessionState::Idle {
                            println!("Press [Enter] to try again.");
                        }
                    }
                    SessionEvent::Completed { session_id } => {
                        println!("The interview is over. Thank you!");
                        completed = Some(session_id);
                    }
                    SessionEvent::TornDown => println!("Session closed."),
                }
            }
            line = lines.next_line(), if input_open => {
                let action = match line {
                    Ok(Some(line)) => key_action(&line, state),
                    Ok(None) | Err(_) => {
                        input_open = false;
                        KeyAction::HangUp
                    }
                };
                if let Err(e) = apply(handle, action) {
                    tracing::debug!("control input ignored: {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl-C, hanging up...");
                let _ = handle.hang_up();
            }
        }
        flush_stdout();
    }
    completed
}

/// Text fallback for hosts without a microphone. Every line is one answer.
pub async fn run_text<C, R>(
    client: &C,
    started: StartSessionResponse,
    input: &mut R,
) -> anyhow::Result<Option<String>>
where
    C: AgentApi,
    R: AsyncBufRead + Unpin,
{
    let session_id = started.session_id().to_string();
    if let Some(message) = started.message() {
        println!("Interviewer: {message}");
    }
    let mut lines = input.lines();
    loop {
        print!("> ");
        flush_stdout();
        let Some(line) = lines.next_line().await? else {
            return Ok(None);
        };
        let answer = line.trim();
        if answer.eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        if answer.is_empty() {
            continue;
        }
        match client.submit_text(&session_id, answer).await {
            Ok(reply) => {
                println!("Interviewer: {}", reply.message());
                if reply.is_completed() {
                    println!("The interview is over. Thank you!");
                    return Ok(Some(session_id));
                }
            }
            Err(e) if e.is_network() => println!("! {e}. Try again."),
            Err(e) => return Err(e.into()),
        }
    }
}
