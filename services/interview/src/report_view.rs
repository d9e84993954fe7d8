use interview_client::types::{FitEvaluation, Report, Score};
use interview_core::{PollerState, ReportPoller, ReportSource};
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Polls until the report is final, asking before each retry after a failure.
///
/// Returns `None` when the user declines to retry.
pub async fn await_report<R>(
    source: Arc<dyn ReportSource>,
    session_id: &str,
    interval: Duration,
    answers: &mut R,
) -> anyhow::Result<Option<Report>>
where
    R: AsyncBufRead + Unpin,
{
    let poller = ReportPoller::new(source).with_interval(interval);
    let mut handle = poller.spawn(session_id);
    println!("Waiting for the interview report...");

    loop {
        match handle.settled().await {
            PollerState::Final(report) => return Ok(Some(report)),
            PollerState::Failed(reason) => {
                println!("Could not fetch the report: {reason}");
                print!("Retry? [Y/n] ");
                flush_stdout();
                let mut answer = String::new();
                answers.read_line(&mut answer).await?;
                if !wants_retry(&answer) {
                    return Ok(None);
                }
                handle.retry();
            }
            // settled() only yields terminal states.
            PollerState::Fetching | PollerState::InProgress(_) => {
                anyhow::bail!("report poller stopped before the report was ready")
            }
        }
    }
}

/// An empty answer counts as yes.
pub fn wants_retry(answer: &str) -> bool {
    let answer = answer.trim().to_lowercase();
    answer.is_empty() || answer == "y" || answer == "yes"
}

pub fn render_report(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "=== Interview report ===");
    if let Some(verdict) = report.verdict() {
        let _ = writeln!(out, "Verdict: {verdict}");
    }
    // The one-line summary heads the report when a detailed one follows.
    if let Some(short) = report.short_summary().filter(|s| Some(*s) != report.summary()) {
        let _ = writeln!(out, "In short: {short}");
    }
    if let Some(summary) = report.summary() {
        let _ = writeln!(out, "\n{summary}\n");
    }

    let scores = report.scores();
    let rows: [(&str, &Option<Score>); 4] = [
        ("Technical", &scores.technical),
        ("Communication", &scores.communication),
        ("Confidence", &scores.confidence),
        ("Overall", &scores.overall),
    ];
    for (label, score) in rows {
        if let Some(score) = score {
            let _ = writeln!(out, "{label:<14} {score}");
        }
    }

    let answered = report.per_question().len();
    if answered > 0 {
        let _ = writeln!(out, "Answers evaluated: {answered}");
    }
    out
}

pub fn render_fit(fit: &FitEvaluation) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Match: {}% ({})", fit.match_percentage(), fit.status());
    if !fit.missing_keywords().is_empty() {
        let _ = writeln!(out, "Missing: {}", fit.missing_keywords().join(", "));
    }
    if !fit.summary().is_empty() {
        let _ = writeln!(out, "\n{}", fit.summary());
    }
    if !fit.recommendation().is_empty() {
        let _ = writeln!(out, "\nRecommendation: {}", fit.recommendation());
    }
    match fit.admission_token() {
        Some(token) => {
            let _ = writeln!(
                out,
                "\nAdmitted. Start the interview with:\n  interview session --admission-token {token}"
            );
        }
        None => {
            let _ = writeln!(out, "\nNo interview admission was granted.");
        }
    }
    out
}

pub(crate) fn flush_stdout() {
    use std::io::Write;
    let _ = std::io::stdout().flush();
}
