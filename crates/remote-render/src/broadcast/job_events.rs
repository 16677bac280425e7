//! Job event broadcaster for real-time job status streaming.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::job::{JobStatus, RenderJob};

/// What happened to the job.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobEventKind {
    Created,
    StatusChanged,
    Progress,
    Removed,
}

/// How a notification about the event should be presented.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Destructive,
}

/// Event emitted for every job store mutation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEvent {
    /// Unique job identifier.
    pub job_id: String,
    pub kind: JobEventKind,
    /// Status after the mutation.
    pub status: JobStatus,
    /// Progress after the mutation.
    pub progress: u8,
    /// Human-readable message describing the change.
    pub message: String,
    pub level: NoticeLevel,
    /// Snapshot of the record after the mutation (the last snapshot for removals).
    pub job: RenderJob,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    fn from_job(job: &RenderJob, kind: JobEventKind, level: NoticeLevel, message: String) -> Self {
        Self {
            job_id: job.id.clone(),
            kind,
            status: job.status,
            progress: job.progress,
            message,
            level,
            job: job.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn created(job: &RenderJob) -> Self {
        Self::from_job(
            job,
            JobEventKind::Created,
            NoticeLevel::Info,
            format!("{} uploaded", job.file_name),
        )
    }

    /// Creates a status change event with the notice matching the new status.
    pub fn status_changed(job: &RenderJob) -> Self {
        let (level, message) = match job.status {
            JobStatus::Uploaded => (NoticeLevel::Info, format!("{} uploaded", job.file_name)),
            JobStatus::DetectingErrors => (
                NoticeLevel::Info,
                format!("Checking {} for potential render errors", job.file_name),
            ),
            JobStatus::PendingConfirmation => (
                NoticeLevel::Warning,
                format!("Potential errors detected. Check {} for details.", job.file_name),
            ),
            JobStatus::Queued => (NoticeLevel::Info, format!("{} queued", job.file_name)),
            JobStatus::Rendering => (
                NoticeLevel::Info,
                format!("Render started. Rendering {}...", job.file_name),
            ),
            JobStatus::Completed => (
                NoticeLevel::Success,
                format!("Render complete! {} has finished rendering.", job.file_name),
            ),
            JobStatus::Error => (
                NoticeLevel::Destructive,
                match &job.error_details {
                    Some(details) => format!("{} failed: {}", job.file_name, details),
                    None => format!("{} failed", job.file_name),
                },
            ),
            JobStatus::Cancelled => (
                NoticeLevel::Info,
                format!("Job {} has been cancelled.", job.file_name),
            ),
        };
        Self::from_job(job, JobEventKind::StatusChanged, level, message)
    }

    pub fn progress(job: &RenderJob) -> Self {
        Self::from_job(
            job,
            JobEventKind::Progress,
            NoticeLevel::Info,
            format!("{}% complete", job.progress),
        )
    }

    pub fn removed(job: &RenderJob) -> Self {
        Self::from_job(
            job,
            JobEventKind::Removed,
            NoticeLevel::Info,
            "Job has been removed from the list.".to_string(),
        )
    }
}

/// Broadcasts job events to any number of subscribers.
#[derive(Clone)]
pub struct JobEventBroadcaster {
    sender: Arc<broadcast::Sender<JobEvent>>,
}

impl JobEventBroadcaster {
    /// Creates a new broadcaster with the specified channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Sends an event to all subscribers.
    pub fn send(&self, event: JobEvent) {
        // No active receivers is fine
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for JobEventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
