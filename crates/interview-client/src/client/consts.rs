pub const INTERVIEW_API_URL: &str = "INTERVIEW_API_URL";
pub const INTERVIEW_API_KEY: &str = "INTERVIEW_API_KEY";

pub const BASE_URL: &str = "http://localhost:8000";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

pub const HEALTH_PATH: &str = "/";
pub const START_SESSION_PATH: &str = "/interview/start";
pub const INIT_SESSION_PATH: &str = "/interview/init";
pub const CHAT_PATH: &str = "/interview/chat";
pub const REPORT_PATH: &str = "/interview/report";
pub const EVALUATE_FIT_PATH: &str = "/ats/evaluate";

pub const API_KEY_HEADER: &str = "X-Api-Key";

// Multipart field names.
pub const RESUME_FIELD: &str = "resume";
pub const SESSION_ID_FIELD: &str = "session_id";
pub const AUDIO_FILE_FIELD: &str = "audio_file";
pub const TEXT_INPUT_FIELD: &str = "text_input";
pub const JOB_DESCRIPTION_FIELD: &str = "job_description";
