use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A code submission as it arrives from the transport layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: String,
    pub source: String,
    #[serde(default)]
    pub stdin: String,
}

/// One unit of work: created per request, discarded once its result exists
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub language: String,
    pub source: String,
    pub stdin: String,
    pub submitted_at: DateTime<Utc>,
}

impl Job {
    pub fn new(language: &str, source: &str, stdin: &str) -> Self {
        let submitted_at = Utc::now();
        Self {
            id: job_id(submitted_at),
            language: language.to_string(),
            source: source.to_string(),
            stdin: stdin.to_string(),
            submitted_at,
        }
    }
}

/// Job identifier: millisecond timestamp for ordering, random suffix for uniqueness.
///
/// Two jobs landing in the same millisecond still get distinct ids, so their
/// workspace directories never collide.
pub fn job_id(at: DateTime<Utc>) -> String {
    format!("job-{}-{}", at.timestamp_millis(), Uuid::new_v4().simple())
}

/// Why an execution failed.
///
/// The boolean `failed` flag is the compatibility contract; this tag is the
/// richer view for callers that want it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    UnsupportedLanguage,
    InvalidRequest,
    Staging,
    Build,
    Runtime,
    Timeout,
    Infra,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::UnsupportedLanguage => "unsupported_language",
            FailureKind::InvalidRequest => "invalid_request",
            FailureKind::Staging => "staging",
            FailureKind::Build => "build",
            FailureKind::Runtime => "runtime",
            FailureKind::Timeout => "timeout",
            FailureKind::Infra => "infra",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single normalized outcome returned for every job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub failed: bool,
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl ExecutionResult {
    pub fn success(stdout: String, execution_time_ms: u64) -> Self {
        Self {
            failed: false,
            output: stdout,
            kind: None,
            execution_time_ms,
        }
    }

    pub fn failure(kind: FailureKind, output: String, execution_time_ms: u64) -> Self {
        Self {
            failed: true,
            output,
            kind: Some(kind),
            execution_time_ms,
        }
    }
}
