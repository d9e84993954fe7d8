use crate::error::ExchangeError;
use async_trait::async_trait;
use interview_types::Report;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;

/// Interval between report fetches while the assessment is being written.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);

/// Where report snapshots come from.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn fetch(&self, session_id: &str) -> Result<Report, ExchangeError>;
}

/// What a spawned poller is currently showing.
#[derive(Debug, Clone, PartialEq)]
pub enum PollerState {
    Fetching,
    InProgress(Report),
    Final(Report),
    Failed(String),
}

impl PollerState {
    pub fn is_final(&self) -> bool {
        matches!(self, PollerState::Final(_))
    }
}

/// Polls the report endpoint until the assessment is final.
#[derive(Clone)]
pub struct ReportPoller {
    source: Arc<dyn ReportSource>,
    interval: Duration,
}

impl ReportPoller {
    pub fn new(source: Arc<dyn ReportSource>) -> Self {
        Self {
            source,
            interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Fetches until a final report arrives. The first fetch is immediate and
    /// each in-progress snapshot is followed by one interval of waiting.
    /// A failed fetch ends polling with that error.
    pub async fn poll(&self, session_id: &str) -> Result<Report, ExchangeError> {
        loop {
            let report = self.source.fetch(session_id).await?;
            if report.is_final() {
                tracing::info!("report for session {} is ready", session_id);
                return Ok(report);
            }
            tracing::debug!("report for session {} still in progress", session_id);
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Runs polling in the background, publishing every snapshot.
    ///
    /// After a failure the task waits for [`PollerHandle::retry`] and then
    /// starts over. Dropping the handle stops polling.
    pub fn spawn(&self, session_id: impl Into<String>) -> PollerHandle {
        let session_id = session_id.into();
        let (state_tx, state_rx) = watch::channel(PollerState::Fetching);
        let state_tx = Arc::new(state_tx);
        let retry = Arc::new(Notify::new());
        let poller = self.clone();
        let publisher = Arc::clone(&state_tx);
        let retry_signal = Arc::clone(&retry);

        let task = tokio::spawn(async move {
            loop {
                match poller.poll_publishing(&session_id, &publisher).await {
                    Ok(report) => {
                        let _ = publisher.send(PollerState::Final(report));
                        return;
                    }
                    Err(e) => {
                        tracing::warn!("report polling for {} failed: {}", session_id, e);
                        if publisher.send(PollerState::Failed(e.to_string())).is_err() {
                            return;
                        }
                        // retry() has already published Fetching.
                        retry_signal.notified().await;
                    }
                }
            }
        });

        PollerHandle {
            state: state_rx,
            publisher: state_tx,
            retry,
            task,
        }
    }

    async fn poll_publishing(
        &self,
        session_id: &str,
        state: &watch::Sender<PollerState>,
    ) -> Result<Report, ExchangeError> {
        loop {
            let report = self.source.fetch(session_id).await?;
            if report.is_final() {
                return Ok(report);
            }
            let _ = state.send(PollerState::InProgress(report));
            tokio::time::sleep(self.interval).await;
        }
    }
}

/// Observer side of a background poller.
pub struct PollerHandle {
    state: watch::Receiver<PollerState>,
    publisher: Arc<watch::Sender<PollerState>>,
    retry: Arc<Notify>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn state(&self) -> PollerState {
        self.state.borrow().clone()
    }

    /// Resumes polling after a failure. Has no effect otherwise.
    ///
    /// The failure is replaced by [`PollerState::Fetching`] before this
    /// returns, so a following [`PollerHandle::settled`] waits for the new
    /// outcome.
    pub fn retry(&self) {
        if matches!(*self.state.borrow(), PollerState::Failed(_)) {
            self.publisher.send_replace(PollerState::Fetching);
            self.retry.notify_one();
        }
    }

    /// Waits until the poller publishes a state other than the current one.
    pub async fn changed(&mut self) -> Option<PollerState> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Waits for a final report or a failure, whichever comes first.
    pub async fn settled(&mut self) -> PollerState {
        loop {
            let current = self.state.borrow_and_update().clone();
            if matches!(current, PollerState::Final(_) | PollerState::Failed(_)) {
                return current;
            }
            if self.state.changed().await.is_err() {
                return self.state.borrow().clone();
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// Serves a fixed sequence of results, repeating the last one.
    struct Scripted {
        results: Mutex<Vec<Result<Report, ExchangeError>>>,
        calls: AtomicUsize,
        fetched_at: Mutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(results: Vec<Result<Report, ExchangeError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results),
                calls: AtomicUsize::new(0),
                fetched_at: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReportSource for Scripted {
        async fn fetch(&self, _session_id: &str) -> Result<Report, ExchangeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.fetched_at.lock().unwrap().push(Instant::now());
            let mut results = self.results.lock().unwrap();
            if results.len() > 1 {
                results.remove(0)
            } else {
                results[0].clone()
            }
        }
    }

    fn final_report() -> Report {
        Report::default()
            .with_verdict("Hire")
            .with_summary("Solid.", "Solid answers throughout.")
            .with_overall_score(81.0)
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_final_waiting_one_interval_between_fetches() {
        // --- Arrange ---
        let source = Scripted::new(vec![
            Ok(Report::in_progress()),
            Ok(Report::in_progress()),
            Ok(final_report()),
        ]);
        let poller = ReportPoller::new(source.clone()).with_interval(Duration::from_millis(2000));

        // --- Act ---
        let report = poller.poll("S1").await.unwrap();

        // --- Assert ---
        assert_eq!(report.verdict(), Some("Hire"));
        assert_eq!(source.calls(), 3);
        let at = source.fetched_at.lock().unwrap().clone();
        assert_eq!(at[1] - at[0], Duration::from_millis(2000));
        assert_eq!(at[2] - at[1], Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn final_first_response_needs_a_single_fetch() {
        let mut source = MockReportSource::new();
        source
            .expect_fetch()
            .times(1)
            .returning(|_| Ok(final_report()));
        let poller = ReportPoller::new(Arc::new(source));

        assert!(poller.poll("S1").await.unwrap().is_final());
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_failure_stops_polling() {
        let source = Scripted::new(vec![
            Ok(Report::in_progress()),
            Err(ExchangeError::Network("connection reset".into())),
            Ok(final_report()),
        ]);
        let poller = ReportPoller::new(source.clone());

        let err = poller.poll("S1").await.unwrap_err();
        assert!(matches!(err, ExchangeError::Network(_)));
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_poller_waits_for_retry_after_failure() {
        // --- Arrange ---
        let source = Scripted::new(vec![
            Err(ExchangeError::Server {
                status: Some(500),
                message: "boom".into(),
            }),
            Ok(Report::in_progress()),
            Ok(final_report()),
        ]);
        let poller = ReportPoller::new(source.clone());

        // --- Act ---
        let mut handle = poller.spawn("S1");
        let failed = handle.settled().await;

        // --- Assert ---
        assert!(matches!(failed, PollerState::Failed(_)));
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.calls(), 1, "no fetches until retry is requested");

        handle.retry();
        let done = handle.settled().await;
        assert!(done.is_final());
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_after_retry_waits_for_the_new_outcome() {
        // --- Arrange ---
        let source = Scripted::new(vec![
            Err(ExchangeError::Network("x".into())),
            Ok(final_report()),
        ]);
        let mut handle = ReportPoller::new(source.clone()).spawn("S1");
        assert!(matches!(handle.settled().await, PollerState::Failed(_)));

        // --- Act ---
        handle.retry();
        let state_after_retry = handle.state();
        let settled = handle.settled().await;

        // --- Assert ---
        assert_eq!(state_after_retry, PollerState::Fetching);
        match settled {
            PollerState::Final(report) => assert_eq!(report.verdict(), Some("Hire")),
            other => panic!("expected a final report, got {other:?}"),
        }
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_without_failure_is_ignored() {
        let source = Scripted::new(vec![Ok(Report::in_progress()), Ok(final_report())]);
        let mut handle = ReportPoller::new(source.clone()).spawn("S1");

        handle.retry();
        assert!(handle.settled().await.is_final());
        assert_eq!(source.calls(), 2);
    }
}
