//! Presentation-facing facade.
//!
//! Validates uploads before anything reaches the lifecycle controller and
//! turns job records into ready-to-draw cards.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Config;
use crate::controller::LifecycleController;
use crate::error::Result;
use crate::job::{JobStatus, RenderJob};
use crate::upload::{UploadPolicy, UploadedFile};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Colour family of the status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeTone {
    Success,
    Danger,
    Active,
    Warning,
    Neutral,
}

impl From<JobStatus> for BadgeTone {
    fn from(status: JobStatus) -> Self {
        match status {
            JobStatus::Completed => BadgeTone::Success,
            JobStatus::Error | JobStatus::Cancelled => BadgeTone::Danger,
            JobStatus::Rendering | JobStatus::DetectingErrors => BadgeTone::Active,
            JobStatus::PendingConfirmation => BadgeTone::Warning,
            JobStatus::Queued | JobStatus::Uploaded => BadgeTone::Neutral,
        }
    }
}

/// Buttons offered on a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CardAction {
    Proceed,
    Cancel,
    Download,
    Delete,
}

/// Everything needed to draw one job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCard {
    pub id: String,
    pub file_name: String,
    pub status: JobStatus,
    pub status_label: String,
    pub badge: BadgeTone,
    /// e.g. `"1.50 MB - .blend"`.
    pub size_label: String,
    pub progress: u8,
    pub show_progress: bool,
    /// Only filled while waiting for confirmation.
    pub warnings: Vec<String>,
    /// Failure banner text for errored jobs.
    pub error_banner: Option<String>,
    pub thumbnail_url: Option<String>,
    pub download_url: Option<String>,
    pub actions: Vec<CardAction>,
    pub submitted_at: DateTime<Utc>,
}

pub fn size_label(file_size: u64, file_type: &str) -> String {
    format!("{:.2} MB - {}", file_size as f64 / BYTES_PER_MB, file_type)
}

fn actions_for(job: &RenderJob) -> Vec<CardAction> {
    match job.status {
        JobStatus::PendingConfirmation => vec![CardAction::Proceed, CardAction::Cancel],
        JobStatus::Completed if job.download_url.is_some() => {
            vec![CardAction::Download, CardAction::Delete]
        }
        JobStatus::Completed | JobStatus::Error | JobStatus::Cancelled => vec![CardAction::Delete],
        JobStatus::Uploaded
        | JobStatus::DetectingErrors
        | JobStatus::Queued
        | JobStatus::Rendering => vec![CardAction::Cancel],
    }
}

impl From<&RenderJob> for JobCard {
    fn from(job: &RenderJob) -> Self {
        let show_progress = matches!(
            job.status,
            JobStatus::Rendering | JobStatus::Completed | JobStatus::DetectingErrors
        ) && job.progress > 0;

        let warnings = if job.status == JobStatus::PendingConfirmation {
            job.detected_errors.clone()
        } else {
            Vec::new()
        };

        let error_banner = match job.status {
            JobStatus::Error => job.error_details.clone(),
            _ => None,
        };

        let completed = job.status == JobStatus::Completed;

        Self {
            id: job.id.clone(),
            file_name: job.file_name.clone(),
            status: job.status,
            status_label: job.status.to_string(),
            badge: job.status.into(),
            size_label: size_label(job.file_size, &job.file_type),
            progress: job.progress,
            show_progress,
            warnings,
            error_banner,
            thumbnail_url: job.thumbnail_url.clone().filter(|_| completed),
            download_url: job.download_url.clone().filter(|_| completed),
            actions: actions_for(job),
            submitted_at: job.submitted_at,
        }
    }
}

/// Entry point for a presentation layer.
#[derive(Clone)]
pub struct Dashboard {
    controller: LifecycleController,
    policy: UploadPolicy,
}

impl Dashboard {
    pub fn new(controller: LifecycleController, policy: UploadPolicy) -> Self {
        Self { controller, policy }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            LifecycleController::from_config(config)?,
            UploadPolicy::from_config(&config.upload),
        ))
    }

    pub fn controller(&self) -> &LifecycleController {
        &self.controller
    }

    pub fn policy(&self) -> &UploadPolicy {
        &self.policy
    }

    /// Validates the selected file and submits it. A rejected file never
    /// reaches the controller.
    ///
    /// # Errors
    ///
    /// * [`RemoteRenderError::Upload`](crate::RemoteRenderError::Upload) when
    ///   no file was given or the policy rejects it.
    /// * [`RemoteRenderError::Controller`](crate::RemoteRenderError::Controller)
    ///   when the job cannot be started, for instance without a Tokio runtime.
    pub fn upload(&self, file: Option<UploadedFile>) -> Result<String> {
        if let Err(e) = self.policy.validate(file.as_ref()) {
            tracing::warn!(error = %e, "Upload rejected");
            return Err(e.into());
        }

        match file {
            Some(file) => Ok(self.controller.submit(file)?),
            None => Err(crate::error::UploadError::NoFile.into()),
        }
    }

    pub fn proceed(&self, job_id: &str) -> Result<()> {
        Ok(self.controller.proceed(job_id)?)
    }

    pub fn cancel(&self, job_id: &str) -> Result<bool> {
        Ok(self.controller.cancel(job_id)?)
    }

    pub fn delete(&self, job_id: &str) -> Result<RenderJob> {
        Ok(self.controller.delete(job_id)?)
    }

    /// Cards for every job, newest first.
    pub fn cards(&self) -> Vec<JobCard> {
        self.controller.jobs().iter().map(JobCard::from).collect()
    }
}
