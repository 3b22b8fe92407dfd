use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of a remote job: Pending -> Ready | Error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Ready,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// One remote generation task. Created by submission, mutated only by polling.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    pub result_url: Option<String>,
    pub error_detail: Option<String>,
}

impl Job {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
            result_url: None,
            error_detail: None,
        }
    }

    /// Fold one poll response into the job. Terminal jobs are left untouched.
    pub fn apply(&mut self, poll: &PollStatus) {
        if self.status.is_terminal() {
            return;
        }
        match poll {
            PollStatus::Pending | PollStatus::Processing => {}
            PollStatus::Ready { sample } => {
                self.status = JobStatus::Ready;
                self.result_url = Some(sample.clone());
            }
            PollStatus::Failed { status, detail } => {
                self.status = JobStatus::Error;
                self.error_detail = Some(match detail {
                    Some(d) => format!("{}: {}", status, d),
                    None => status.clone(),
                });
            }
            PollStatus::Unrecognized { raw } => {
                self.status = JobStatus::Error;
                self.error_detail = Some(format!("Unexpected response: {}", raw));
            }
        }
    }
}

/// Statuses FLUX reports for a job that ended without an image.
const FAILURE_STATUSES: &[&str] = &[
    "Error",
    "Content Moderated",
    "Request Moderated",
    "Task not found",
];

/// Parsed body of `GET /get_result`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    Pending,
    Processing,
    Ready { sample: String },
    Failed { status: String, detail: Option<String> },
    /// Unknown status, or `Ready` without a sample URL. Carries the raw JSON.
    Unrecognized { raw: String },
}

impl PollStatus {
    pub fn from_json(json: &Value) -> Self {
        let status = json.get("status").and_then(|v| v.as_str()).unwrap_or("");
        match status {
            "Pending" => PollStatus::Pending,
            "Processing" => PollStatus::Processing,
            "Ready" => match json.pointer("/result/sample").and_then(|v| v.as_str()) {
                Some(sample) => PollStatus::Ready {
                    sample: sample.to_string(),
                },
                None => PollStatus::Unrecognized {
                    raw: json.to_string(),
                },
            },
            s if FAILURE_STATUSES.contains(&s) => {
                let detail = ["detail", "message"]
                    .iter()
                    .filter_map(|k| json.get(*k))
                    .find_map(|v| match v {
                        Value::Null => None,
                        Value::String(s) => Some(s.clone()),
                        other => Some(other.to_string()),
                    });
                PollStatus::Failed {
                    status: s.to_string(),
                    detail,
                }
            }
            _ => PollStatus::Unrecognized {
                raw: json.to_string(),
            },
        }
    }

    /// Status string as reported by the API.
    pub fn label(&self) -> &str {
        match self {
            PollStatus::Pending => "Pending",
            PollStatus::Processing => "Processing",
            PollStatus::Ready { .. } => "Ready",
            PollStatus::Failed { status, .. } => status.as_str(),
            PollStatus::Unrecognized { .. } => "Unknown",
        }
    }

    /// Short human-readable description for progress display.
    pub fn describe(&self) -> String {
        match self {
            PollStatus::Pending => "Standing by...".into(),
            PollStatus::Processing => "Generating...".into(),
            PollStatus::Ready { .. } => "Ready".into(),
            PollStatus::Failed { status, .. } => match status.as_str() {
                "Content Moderated" => "Inadmissible content".into(),
                "Request Moderated" => "Incorrect request".into(),
                other => other.to_string(),
            },
            PollStatus::Unrecognized { raw } => format!("Unknown status: {}", raw),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollStatus::Pending | PollStatus::Processing)
    }
}

/// Progress notification for the host.
///
/// Poll statuses carry the FLUX label (`Pending`, `Ready`, ...). Pipeline
/// stages use their own labels, see [`stage`]. `job_id` is `None` until the
/// job has been accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub job_id: Option<String>,
    pub status: String,
    pub description: String,
    pub done: bool,
}

/// Labels for the pipeline stages reported around the poll statuses.
pub mod stage {
    pub const TRANSLATING: &str = "Translating";
    pub const TRANSLATED: &str = "Translated";
    pub const SUBMITTING: &str = "Submitting";
    pub const SUBMITTED: &str = "Submitted";
    pub const SAVING: &str = "Saving";
    pub const COMPLETE: &str = "Complete";
    pub const FAILED: &str = "Failed";
}

impl StatusUpdate {
    pub fn new(
        job_id: Option<&str>,
        status: impl Into<String>,
        description: impl Into<String>,
        done: bool,
    ) -> Self {
        Self {
            job_id: job_id.map(str::to_string),
            status: status.into(),
            description: description.into(),
            done,
        }
    }
}

/// A generated image written to the local cache. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedImage {
    pub source_url: String,
    pub local_path: PathBuf,
    pub bytes: Vec<u8>,
}

impl PersistedImage {
    /// File name inside the generations directory.
    pub fn file_name(&self) -> String {
        self.local_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Path the host serves the cache under, used in chat replies.
    pub fn reference(&self) -> String {
        format!("/cache/image/generations/{}", self.file_name())
    }
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generation {
    /// The prompt as the user wrote it, trimmed.
    pub prompt: String,
    /// The rewritten prompt actually submitted, when a rewriter ran.
    pub optimized_prompt: Option<String>,
    pub image: PersistedImage,
}
