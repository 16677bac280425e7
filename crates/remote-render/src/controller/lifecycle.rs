use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::broadcast::{JobCounts, JobEvent, JobEventBroadcaster, JobStore, PhaseGuard};
use crate::config::Config;
use crate::detector::{build_detector, DetectionRequest, ErrorDetector};
use crate::error::{ControllerError, DetectionError, Result};
use crate::job::{new_job_id, JobStatus, RenderJob};
use crate::render::{HandleLease, RenderBackend, RenderPoll, RenderSpec, SimulatedBackend};
use crate::sanitize;
use crate::upload::UploadedFile;

const DETECTION_FAILED_MESSAGE: &str = "Failed to process file for AI check.";

struct Inner {
    store: Arc<JobStore>,
    detector: Arc<dyn ErrorDetector>,
    backend: Arc<dyn RenderBackend>,
    tick_interval: Duration,
    runtime: Option<Handle>,
}

/// Drives every job through detection and rendering.
///
/// Cloning is cheap; all clones share the same store and backends. Phase
/// tasks run on the Tokio runtime that was current when the controller was
/// built, or on the caller's runtime when it was built outside one.
#[derive(Clone)]
pub struct LifecycleController {
    inner: Arc<Inner>,
}

impl LifecycleController {
    /// Production constructor: configured detector and the simulated farm.
    pub fn from_config(config: &Config) -> Result<Self> {
        let store = Arc::new(JobStore::new(JobEventBroadcaster::new(
            config.events.capacity,
        )));
        let detector = build_detector(&config.detector)?;
        let backend: Arc<dyn RenderBackend> = Arc::new(SimulatedBackend::new(&config.render));

        info!(
            detector = detector.name(),
            backend = backend.name(),
            tick_interval_ms = config.render.tick_interval_ms,
            "Lifecycle controller ready"
        );

        Ok(Self::new(
            store,
            detector,
            backend,
            Duration::from_millis(config.render.tick_interval_ms),
        ))
    }

    /// Wires a controller from its parts.
    ///
    /// # Arguments
    ///
    /// * `store` - Shared job store; its broadcaster carries the job events.
    /// * `detector` - Pre-render error detector.
    /// * `backend` - Render farm the render phase submits to.
    /// * `tick_interval` - Delay between render progress polls (at least 1ms).
    ///
    /// The current Tokio runtime, if any, is captured for spawning phase tasks.
    pub fn new(
        store: Arc<JobStore>,
        detector: Arc<dyn ErrorDetector>,
        backend: Arc<dyn RenderBackend>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                detector,
                backend,
                tick_interval: tick_interval.max(Duration::from_millis(1)),
                runtime: Handle::try_current().ok(),
            }),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.inner.store
    }

    /// Creates a job for an already validated upload and starts detection.
    ///
    /// The record is inserted and moved to `DetectingErrors` in one store
    /// step, so a subscriber reacting to the `Created` event cannot slip a
    /// `cancel` in between. The payload is moved into the detection task and
    /// dropped once the detector returns.
    ///
    /// # Arguments
    ///
    /// * `file` - An upload that already passed the [`UploadPolicy`](crate::UploadPolicy).
    ///
    /// # Returns
    ///
    /// The id of the new job.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::RuntimeUnavailable`] when there is no Tokio
    /// runtime to run the detection task on. No job is created then.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let controller = LifecycleController::from_config(&Config::default())?;
    /// let id = controller.submit(UploadedFile::new("forest.blend", bytes))?;
    /// assert_eq!(controller.get(&id).unwrap().status, JobStatus::DetectingErrors);
    /// ```
    pub fn submit(&self, file: UploadedFile) -> std::result::Result<String, ControllerError> {
        let runtime = self.runtime()?;
        let file_type = file.file_type();
        let mime_type = file.mime_type();
        let job_id = new_job_id();

        let job = RenderJob::new(&job_id, &file.file_name, &file_type, file.size());
        let guard = self
            .inner
            .store
            .insert_and_start_phase(job, "detect errors for", |job| {
                job.with_status(JobStatus::DetectingErrors).with_progress(0)
            })?;

        let span = info_span!("detect_errors",
            job_id = %job_id,
            file_name = %sanitize::redact_file_name(&file.file_name),
            detector = self.inner.detector.name(),
        );
        let request = DetectionRequest {
            content: file.content,
            file_name: file.file_name,
            file_type,
            mime_type,
        };

        let controller = self.clone();
        let task_guard = guard.clone();
        let task = runtime.spawn(
            async move {
                match controller.inner.detector.detect(request).await {
                    Ok(warnings) => {
                        controller.on_detection_result(&task_guard, warnings);
                    }
                    Err(e) => {
                        controller.on_detection_failure(&task_guard, &e);
                    }
                }
            }
            .instrument(span),
        );
        self.inner.store.attach_task(&guard, task.abort_handle());

        info!(job_id = %job_id, "Job submitted");
        Ok(job_id)
    }

    /// Applies a detector answer to the detection phase identified by `guard`.
    ///
    /// Returns false when the phase is no longer current (the job was
    /// cancelled or deleted in the meantime); nothing is changed then.
    pub fn on_detection_result(&self, guard: &PhaseGuard, warnings: Vec<String>) -> bool {
        if !warnings.is_empty() {
            let count = warnings.len();
            let applied = self
                .inner
                .store
                .apply(guard, |job| RenderJob {
                    detected_errors: warnings,
                    ..job
                        .with_status(JobStatus::PendingConfirmation)
                        .with_progress(100)
                })
                .is_some();
            if applied {
                info!(job_id = %guard.job_id, warnings = count, "Potential errors detected");
            }
            return applied;
        }

        let queued = self.inner.store.apply(guard, |job| RenderJob {
            detected_errors: Vec::new(),
            ..job.with_status(JobStatus::Queued).with_progress(100)
        });
        if queued.is_none() {
            return false;
        }

        match self.begin_render(
            &guard.job_id,
            JobStatus::Queued,
            Some(guard.generation),
            "render",
        ) {
            Ok(_) => true,
            Err(e) => {
                warn!(job_id = %guard.job_id, error = %e, "Queued job could not start rendering");
                false
            }
        }
    }

    /// Marks the job failed after the detector call itself failed.
    pub fn on_detection_failure(&self, guard: &PhaseGuard, error: &DetectionError) -> bool {
        warn!(job_id = %guard.job_id, error = %error, "Error detection failed");
        self.inner
            .store
            .apply(guard, |job| RenderJob {
                error_details: Some(DETECTION_FAILED_MESSAGE.to_string()),
                ..job.with_status(JobStatus::Error).with_progress(0)
            })
            .is_some()
    }

    /// Renders a job that is waiting for confirmation despite its warnings.
    ///
    /// # Errors
    ///
    /// * [`ControllerError::JobNotFound`] if the id is unknown.
    /// * [`ControllerError::InvalidTransition`] unless the job is in
    ///   `PendingConfirmation`.
    /// * [`ControllerError::RuntimeUnavailable`] without a Tokio runtime; the
    ///   job stays in `PendingConfirmation`.
    pub fn proceed(&self, job_id: &str) -> std::result::Result<(), ControllerError> {
        self.begin_render(job_id, JobStatus::PendingConfirmation, None, "proceed with")?;
        Ok(())
    }

    /// Cancels a non-terminal job and aborts its running task.
    ///
    /// # Returns
    ///
    /// `true` if the job moved to `Cancelled`, `false` if it had already
    /// finished. Finished jobs are left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::JobNotFound`] if the id is unknown.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let id = controller.submit(file)?;
    /// assert!(controller.cancel(&id)?);
    /// assert!(!controller.cancel(&id)?);
    /// ```
    pub fn cancel(&self, job_id: &str) -> std::result::Result<bool, ControllerError> {
        match self.inner.store.cancel(job_id)? {
            Some(_) => {
                info!(job_id = %job_id, "Job cancelled");
                Ok(true)
            }
            None => {
                debug!(job_id = %job_id, "Cancel ignored, job already finished");
                Ok(false)
            }
        }
    }

    /// Removes a terminal job permanently.
    ///
    /// # Errors
    ///
    /// * [`ControllerError::JobNotFound`] if the id is unknown.
    /// * [`ControllerError::InvalidTransition`] while the job is still active.
    pub fn delete(&self, job_id: &str) -> std::result::Result<RenderJob, ControllerError> {
        let job = self.inner.store.remove(job_id)?;
        info!(job_id = %job_id, "Job deleted");
        Ok(job)
    }

    /// Snapshot of all jobs, newest first.
    pub fn jobs(&self) -> Vec<RenderJob> {
        self.inner.store.get_all()
    }

    pub fn get(&self, job_id: &str) -> Option<RenderJob> {
        self.inner.store.get(job_id)
    }

    pub fn counts(&self) -> JobCounts {
        self.inner.store.counts()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.inner.store.events().subscribe()
    }

    /// Stops every running detection and render task.
    pub fn shutdown(&self) -> usize {
        let aborted = self.inner.store.abort_all();
        info!(aborted, "Lifecycle controller shut down");
        aborted
    }

    /// Runtime for phase tasks: the captured one, else the caller's.
    fn runtime(&self) -> std::result::Result<Handle, ControllerError> {
        match &self.inner.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current().map_err(|_| ControllerError::RuntimeUnavailable),
        }
    }

    fn begin_render(
        &self,
        job_id: &str,
        from: JobStatus,
        generation: Option<u64>,
        operation: &'static str,
    ) -> std::result::Result<PhaseGuard, ControllerError> {
        let runtime = self.runtime()?;
        let guard = self
            .inner
            .store
            .start_phase(job_id, from, generation, operation, |job| {
                job.with_status(JobStatus::Rendering).with_progress(0)
            })?;

        let Some(job) = self.inner.store.get(job_id) else {
            return Ok(guard);
        };
        let spec = RenderSpec {
            job_id: job.id,
            file_name: job.file_name,
            file_type: job.file_type,
        };

        let span = info_span!("render",
            job_id = %job_id,
            file_name = %sanitize::redact_file_name(&spec.file_name),
            backend = self.inner.backend.name(),
        );
        let controller = self.clone();
        let task_guard = guard.clone();
        let task = runtime.spawn(controller.run_render(task_guard, spec).instrument(span));
        self.inner.store.attach_task(&guard, task.abort_handle());

        Ok(guard)
    }

    async fn run_render(self, guard: PhaseGuard, spec: RenderSpec) {
        let backend = self.inner.backend.clone();
        let handle = match backend.submit(&spec).await {
            Ok(handle) => handle,
            Err(e) => {
                self.fail_render(&guard, format!("Render could not be started: {}", e));
                return;
            }
        };
        let lease = HandleLease::new(backend.clone(), handle);
        debug!(handle = %lease.handle(), "Render submitted to backend");

        let period = self.inner.tick_interval;
        let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticks.tick().await;

            let outcome = match backend.poll(lease.handle()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.fail_render(&guard, format!("Render backend failure: {}", e));
                    return;
                }
            };

            match outcome {
                RenderPoll::InProgress { progress } => {
                    let updated = self
                        .inner
                        .store
                        .apply(&guard, |job| job.with_progress(progress.max(job.progress)));
                    if updated.is_none() {
                        return;
                    }
                }
                RenderPoll::Completed {
                    thumbnail_url,
                    download_url,
                } => {
                    let done = self.inner.store.apply(&guard, |job| RenderJob {
                        thumbnail_url: Some(thumbnail_url),
                        download_url: Some(download_url),
                        ..job.with_status(JobStatus::Completed).with_progress(100)
                    });
                    if done.is_some() {
                        info!("Render complete");
                    }
                    return;
                }
                RenderPoll::Failed { reason, progress } => {
                    warn!(progress, reason = %reason, "Render failed");
                    self.inner.store.apply(&guard, |job| RenderJob {
                        error_details: Some(reason),
                        ..job
                            .with_status(JobStatus::Error)
                            .with_progress(progress.max(job.progress))
                    });
                    return;
                }
            }
        }
    }

    /// Ends the render phase with an error, keeping the progress reached.
    fn fail_render(&self, guard: &PhaseGuard, details: String) {
        warn!(job_id = %guard.job_id, error = %details, "Render aborted");
        self.inner.store.apply(guard, |job| RenderJob {
            error_details: Some(details),
            ..job.with_status(JobStatus::Error)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::JobEventKind;
    use crate::config::RenderConfig;
    use async_trait::async_trait;

    struct Scripted(Vec<String>);

    #[async_trait]
    impl ErrorDetector for Scripted {
        async fn detect(&self, _request: DetectionRequest) -> std::result::Result<Vec<String>, DetectionError> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    struct Failing;

    #[async_trait]
    impl ErrorDetector for Failing {
        async fn detect(&self, _request: DetectionRequest) -> std::result::Result<Vec<String>, DetectionError> {
            Err(DetectionError::Unavailable("offline".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct Hanging;

    #[async_trait]
    impl ErrorDetector for Hanging {
        async fn detect(&self, _request: DetectionRequest) -> std::result::Result<Vec<String>, DetectionError> {
            std::future::pending().await
        }

        fn name(&self) -> &'static str {
            "hanging"
        }
    }

    fn controller(detector: Arc<dyn ErrorDetector>, fault_probability: f64) -> LifecycleController {
        let backend = SimulatedBackend::new(&RenderConfig {
            fault_probability,
            seed: Some(11),
            ..Default::default()
        });
        LifecycleController::new(
            Arc::new(JobStore::default()),
            detector,
            Arc::new(backend),
            Duration::from_millis(500),
        )
    }

    fn blend() -> UploadedFile {
        UploadedFile::new("forest.blend", b"BLENDER-v300".to_vec())
    }

    /// Lets spawned tasks run without reaching the first render tick.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_starts_detection() {
        let controller = controller(Arc::new(Hanging), 0.0);
        let id = controller.submit(blend()).unwrap();

        let job = controller.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::DetectingErrors);
        assert_eq!(job.progress, 0);
        assert_eq!(job.file_type, ".blend");
        assert_eq!(job.file_size, 12);
        assert!(controller.store().has_task(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_warnings_wait_for_confirmation() {
        let controller = controller(
            Arc::new(Scripted(vec!["missing texture: wood.png".to_string()])),
            0.0,
        );
        let id = controller.submit(blend()).unwrap();
        settle().await;

        let job = controller.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::PendingConfirmation);
        assert_eq!(job.detected_errors, vec!["missing texture: wood.png"]);
        assert_eq!(job.progress, 100);
        assert!(!controller.store().has_task(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_warnings_renders_automatically() {
        let controller = controller(Arc::new(Scripted(Vec::new())), 0.0);
        let mut rx = controller.subscribe();
        let id = controller.submit(blend()).unwrap();
        settle().await;

        let statuses: Vec<JobStatus> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| e.kind != JobEventKind::Progress)
            .map(|e| e.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                JobStatus::Uploaded,
                JobStatus::DetectingErrors,
                JobStatus::Queued,
                JobStatus::Rendering,
            ]
        );
        let job = controller.get(&id).unwrap();
        assert_eq!(job.progress, 0);
        assert!(controller.store().has_task(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_runs_to_completion() {
        let controller = controller(Arc::new(Scripted(Vec::new())), 0.0);
        let id = controller.submit(blend()).unwrap();

        tokio::time::sleep(Duration::from_secs(15)).await;

        let job = controller.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(
            job.thumbnail_url.as_deref(),
            Some(format!("https://picsum.photos/seed/{}/400/300", id).as_str())
        );
        assert_eq!(job.download_url.as_deref(), Some("#"));
        assert!(!controller.store().has_task(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_render_fault_freezes_progress() {
        let controller = controller(Arc::new(Scripted(Vec::new())), 1.0);
        let id = controller.submit(blend()).unwrap();

        tokio::time::sleep(Duration::from_secs(15)).await;

        let job = controller.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.progress > 30 && job.progress < 80);
        assert!(job.error_details.unwrap().contains("simulated error"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detection_failure_marks_error() {
        let controller = controller(Arc::new(Failing), 0.0);
        let id = controller.submit(blend()).unwrap();
        settle().await;

        let job = controller.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert_eq!(job.progress, 0);
        assert_eq!(job.error_details.as_deref(), Some(DETECTION_FAILED_MESSAGE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_proceed_only_from_pending() {
        let controller = controller(Arc::new(Hanging), 0.0);
        let id = controller.submit(blend()).unwrap();

        let err = controller.proceed(&id).unwrap_err();
        assert!(matches!(
            err,
            ControllerError::InvalidTransition {
                status: JobStatus::DetectingErrors,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_proceed_starts_render() {
        let controller = controller(Arc::new(Scripted(vec!["broken link".to_string()])), 0.0);
        let id = controller.submit(blend()).unwrap();
        settle().await;

        controller.proceed(&id).unwrap();
        let job = controller.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Rendering);
        assert_eq!(job.progress, 0);

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(controller.get(&id).unwrap().status, JobStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_render_stops_ticks() {
        let controller = controller(Arc::new(Scripted(Vec::new())), 0.0);
        let id = controller.submit(blend()).unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(controller.get(&id).unwrap().progress > 0);

        let mut rx = controller.subscribe();
        assert!(controller.cancel(&id).unwrap());
        tokio::time::sleep(Duration::from_secs(15)).await;

        let job = controller.get(&id).unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert_eq!(job.progress, 0);

        let events: Vec<JobEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, JobStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_detection_ignores_late_result() {
        let controller = controller(Arc::new(Hanging), 0.0);
        let id = controller.submit(blend()).unwrap();
        let guard = PhaseGuard {
            job_id: id.clone(),
            generation: controller.store().generation(&id).unwrap(),
            expected: JobStatus::DetectingErrors,
        };

        assert!(controller.cancel(&id).unwrap());
        assert!(!controller.on_detection_result(&guard, Vec::new()));
        assert!(!controller.on_detection_failure(&guard, &DetectionError::Unavailable("late".into())));
        assert_eq!(controller.get(&id).unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_terminal_job_is_noop() {
        let controller = controller(Arc::new(Failing), 0.0);
        let id = controller.submit(blend()).unwrap();
        settle().await;

        assert!(!controller.cancel(&id).unwrap());
        assert_eq!(controller.get(&id).unwrap().status, JobStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_requires_terminal_job() {
        let controller = controller(Arc::new(Hanging), 0.0);
        let id = controller.submit(blend()).unwrap();

        assert!(controller.delete(&id).is_err());
        controller.cancel(&id).unwrap();

        let removed = controller.delete(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(controller.get(&id).is_none());
        assert_eq!(
            controller.delete(&id).unwrap_err(),
            ControllerError::JobNotFound(id)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_running_tasks() {
        let controller = controller(Arc::new(Scripted(Vec::new())), 0.0);
        let a = controller.submit(blend()).unwrap();
        let b = controller.submit(blend()).unwrap();
        settle().await;

        assert_eq!(controller.shutdown(), 2);
        tokio::time::sleep(Duration::from_secs(15)).await;

        assert_eq!(controller.get(&a).unwrap().status, JobStatus::Rendering);
        assert_eq!(controller.get(&b).unwrap().progress, 0);
        assert_eq!(controller.counts().active, 2);
    }

    #[test]
    fn test_submit_without_runtime_is_refused() {
        let controller = controller(Arc::new(Scripted(Vec::new())), 0.0);

        assert_eq!(
            controller.submit(blend()).unwrap_err(),
            ControllerError::RuntimeUnavailable
        );
        assert!(controller.jobs().is_empty());
    }

    #[test]
    fn test_controller_built_in_runtime_spawns_from_plain_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_time()
            .build()
            .unwrap();
        let controller = runtime.block_on(async { controller(Arc::new(Hanging), 0.0) });

        let id = std::thread::spawn({
            let controller = controller.clone();
            move || controller.submit(blend()).unwrap()
        })
        .join()
        .unwrap();

        assert_eq!(controller.get(&id).unwrap().status, JobStatus::DetectingErrors);
        assert!(controller.store().has_task(&id));
        controller.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_submit_emits_created_then_detecting() {
        let controller = controller(Arc::new(Hanging), 0.0);
        let mut rx = controller.subscribe();
        let id = controller.submit(blend()).unwrap();

        let first = rx.try_recv().unwrap();
        assert_eq!((first.kind, first.status), (JobEventKind::Created, JobStatus::Uploaded));
        let second = rx.try_recv().unwrap();
        assert_eq!(second.job_id, id);
        assert_eq!(second.status, JobStatus::DetectingErrors);
    }

    #[tokio::test(start_paused = true)]
    async fn test_from_default_config() {
        let controller = LifecycleController::from_config(&Config::default()).unwrap();
        let id = controller.submit(blend()).unwrap();
        assert_eq!(controller.jobs()[0].id, id);
    }
}
