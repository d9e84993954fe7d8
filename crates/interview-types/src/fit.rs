/// Result of `POST /ats/evaluate`: how well a resume matches a job description.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FitEvaluation {
    match_percentage: u32,
    /// "Qualified" or "Not Qualified".
    status: String,
    #[serde(default)]
    missing_keywords: Vec<String>,
    #[serde(default, alias = "summary")]
    analysis_summary: String,
    #[serde(default)]
    recommendation: String,
    /// Present only when the candidate is admitted to the voice interview.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    admission_token: Option<String>,
}

impl FitEvaluation {
    pub fn match_percentage(&self) -> u32 {
        self.match_percentage
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn missing_keywords(&self) -> &[String] {
        &self.missing_keywords
    }

    pub fn summary(&self) -> &str {
        &self.analysis_summary
    }

    pub fn recommendation(&self) -> &str {
        &self.recommendation
    }

    pub fn admission_token(&self) -> Option<&str> {
        self.admission_token.as_deref()
    }

    pub fn is_qualified(&self) -> bool {
        self.status.eq_ignore_ascii_case("qualified")
    }
}
