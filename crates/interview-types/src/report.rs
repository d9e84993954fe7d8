use serde_json::{Map, Value};

/// Status string the agent uses while the assessment is still being written.
pub const IN_PROGRESS: &str = "in_progress";

/// A rating as the agent reports it. Usually a number, occasionally text such as "72/100".
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Score {
    Number(f64),
    Text(String),
}

impl std::fmt::Display for Score {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Score::Number(n) => write!(f, "{n}"),
            Score::Text(t) => f.write_str(t),
        }
    }
}

/// Snapshot of `GET /interview/report/{session_id}`.
///
/// While the agent is still evaluating, the body is just `{"status": "in_progress"}`.
/// The final body carries the summary and ratings and, in practice, no status at all,
/// so anything other than an explicit `in_progress` counts as final.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Report {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    verdict: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    short_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detailed_summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    technical_rating: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    communication_rating: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    confidence_score: Option<Score>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    overall_score: Option<Score>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    evaluation_per_answer: Vec<Value>,
    /// Anything else the agent put in the report, kept verbatim.
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// The numeric part of a final report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scores {
    pub technical: Option<Score>,
    pub communication: Option<Score>,
    pub confidence: Option<Score>,
    pub overall: Option<Score>,
}

impl Report {
    pub fn in_progress() -> Self {
        Self {
            status: Some(IN_PROGRESS.to_string()),
            ..Default::default()
        }
    }

    pub fn with_verdict(mut self, verdict: &str) -> Self {
        self.verdict = Some(verdict.to_string());
        self
    }

    pub fn with_summary(mut self, short: &str, detailed: &str) -> Self {
        self.short_summary = Some(short.to_string());
        self.detailed_summary = Some(detailed.to_string());
        self
    }

    pub fn with_overall_score(mut self, score: f64) -> Self {
        self.overall_score = Some(Score::Number(score));
        self
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn is_final(&self) -> bool {
        self.status() != Some(IN_PROGRESS)
    }

    pub fn verdict(&self) -> Option<&str> {
        self.verdict.as_deref()
    }

    pub fn short_summary(&self) -> Option<&str> {
        self.short_summary.as_deref()
    }

    pub fn summary(&self) -> Option<&str> {
        self.detailed_summary
            .as_deref()
            .or(self.short_summary.as_deref())
    }

    pub fn scores(&self) -> Scores {
        Scores {
            technical: self.technical_rating.clone(),
            communication: self.communication_rating.clone(),
            confidence: self.confidence_score.clone(),
            overall: self.overall_score.clone(),
        }
    }

    /// Per-question breakdown, when the agent produced one.
    pub fn per_question(&self) -> &[Value] {
        &self.evaluation_per_answer
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }
}
