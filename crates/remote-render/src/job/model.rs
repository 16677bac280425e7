//! The render job record and its status transition table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a render job.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Uploaded,
    DetectingErrors,
    PendingConfirmation,
    Queued,
    Rendering,
    Completed,
    Error,
    Cancelled,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Uploaded => write!(f, "Uploaded"),
            JobStatus::DetectingErrors => write!(f, "DetectingErrors"),
            JobStatus::PendingConfirmation => write!(f, "PendingConfirmation"),
            JobStatus::Queued => write!(f, "Queued"),
            JobStatus::Rendering => write!(f, "Rendering"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Error => write!(f, "Error"),
            JobStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl JobStatus {
    /// Completed, Error and Cancelled never lead anywhere but deletion.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled
        )
    }

    /// States that own a running task.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::DetectingErrors | JobStatus::Rendering)
    }

    /// Returns true if `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, next),
            (Uploaded, DetectingErrors)
                | (DetectingErrors, PendingConfirmation)
                | (DetectingErrors, Queued)
                | (DetectingErrors, Error)
                | (Queued, Rendering)
                | (PendingConfirmation, Rendering)
                | (Rendering, Completed)
                | (Rendering, Error)
                | (Uploaded, Cancelled)
                | (DetectingErrors, Cancelled)
                | (PendingConfirmation, Cancelled)
                | (Queued, Cancelled)
                | (Rendering, Cancelled)
        )
    }
}

/// Generates a new opaque job identifier.
pub fn new_job_id() -> String {
    format!("job-{}", uuid::Uuid::new_v4().simple())
}

/// One submitted file and its render lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RenderJob {
    /// Unique job identifier.
    pub id: String,
    /// Original file name as uploaded.
    pub file_name: String,
    /// Extension including the leading dot (e.g. ".blend").
    pub file_type: String,
    /// Size of the upload in bytes.
    pub file_size: u64,
    pub status: JobStatus,
    /// 0-100.
    pub progress: u8,
    /// Warnings reported by the error detector. Empty means none were found.
    #[serde(default)]
    pub detected_errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    /// When the job was submitted.
    pub submitted_at: DateTime<Utc>,
    /// Last time any field changed.
    pub updated_at: DateTime<Utc>,
}

impl RenderJob {
    /// Creates a freshly uploaded job record.
    pub fn new(id: &str, file_name: &str, file_type: &str, file_size: u64) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            file_name: file_name.to_string(),
            file_type: file_type.to_string(),
            file_size,
            status: JobStatus::Uploaded,
            progress: 0,
            detected_errors: Vec::new(),
            thumbnail_url: None,
            download_url: None,
            error_details: None,
            submitted_at: now,
            updated_at: now,
        }
    }

    /// Returns a copy moved to `status`, touching `updated_at`.
    pub fn with_status(&self, status: JobStatus) -> Self {
        Self {
            status,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    /// Returns a copy with progress set (clamped to 100).
    pub fn with_progress(&self, progress: u8) -> Self {
        Self {
            progress: progress.min(100),
            updated_at: Utc::now(),
            ..self.clone()
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [JobStatus; 8] = [
        JobStatus::Uploaded,
        JobStatus::DetectingErrors,
        JobStatus::PendingConfirmation,
        JobStatus::Queued,
        JobStatus::Rendering,
        JobStatus::Completed,
        JobStatus::Error,
        JobStatus::Cancelled,
    ];

    #[test]
    fn test_terminal_states_have_no_successors() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(
                    !from.can_transition_to(to),
                    "{} must not lead to {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_detection_outcomes() {
        let from = JobStatus::DetectingErrors;
        assert!(from.can_transition_to(JobStatus::PendingConfirmation));
        assert!(from.can_transition_to(JobStatus::Queued));
        assert!(from.can_transition_to(JobStatus::Error));
        assert!(!from.can_transition_to(JobStatus::Rendering));
        assert!(!from.can_transition_to(JobStatus::Completed));
    }

    #[test]
    fn test_every_non_terminal_state_can_be_cancelled() {
        for from in ALL.iter().filter(|s| !s.is_terminal()) {
            assert!(from.can_transition_to(JobStatus::Cancelled), "{}", from);
        }
    }

    #[test]
    fn test_active_states() {
        let active: Vec<_> = ALL.iter().filter(|s| s.is_active()).collect();
        assert_eq!(
            active,
            vec![&JobStatus::DetectingErrors, &JobStatus::Rendering]
        );
    }

    #[test]
    fn test_new_job_defaults() {
        let job = RenderJob::new("job-1", "scene.blend", ".blend", 2048);
        assert_eq!(job.status, JobStatus::Uploaded);
        assert_eq!(job.progress, 0);
        assert!(job.detected_errors.is_empty());
        assert!(job.thumbnail_url.is_none());
        assert!(job.error_details.is_none());
    }

    #[test]
    fn test_with_progress_clamps() {
        let job = RenderJob::new("job-1", "scene.blend", ".blend", 1).with_progress(130);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_job_ids_are_unique() {
        assert_ne!(new_job_id(), new_job_id());
        assert!(new_job_id().starts_with("job-"));
    }

    #[test]
    fn test_serializes_camel_case() {
        let job = RenderJob::new("job-1", "scene.blend", ".blend", 1);
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["fileName"], "scene.blend");
        assert_eq!(json["status"], "uploaded");
        assert!(json.get("thumbnailUrl").is_none());
    }
}
