//! Test harness for isolated lifecycle tests.
//!
//! The `TestHarness` wires a `Dashboard` to a fresh job store, a chosen error
//! detector and a seeded simulated render farm, and records every job event.
//! Tests run on paused Tokio time, so render ticks cost nothing.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::broadcast;

use remote_render::config::Config;
use remote_render::{
    Dashboard, ErrorDetector, JobEvent, JobEventBroadcaster, JobStatus, JobStore,
    LifecycleController, RenderJob, SimulatedBackend, UploadPolicy, UploadedFile,
};

use super::builders::{ConfigBuilder, Outcome, ScriptedDetector};

pub struct TestHarness {
    /// Scratch directory for config files.
    temp_dir: TempDir,
    pub config: Config,
    pub dashboard: Dashboard,
    events: broadcast::Receiver<JobEvent>,
    recorded: Vec<JobEvent>,
}

impl TestHarness {
    /// Harness whose detector answers `outcome` for every file.
    pub fn new(outcome: Outcome) -> (Self, Arc<ScriptedDetector>) {
        Self::scripted(ConfigBuilder::new().build(), ScriptedDetector::new(outcome))
    }

    /// Harness with a scripted detector; the detector is returned for call counting.
    pub fn scripted(config: Config, detector: ScriptedDetector) -> (Self, Arc<ScriptedDetector>) {
        let detector = Arc::new(detector);
        let harness = Self::with_detector(config, detector.clone());
        (harness, detector)
    }

    pub fn with_detector(config: Config, detector: Arc<dyn ErrorDetector>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");

        let store = Arc::new(JobStore::new(JobEventBroadcaster::new(
            config.events.capacity,
        )));
        let events = store.events().subscribe();
        let controller = LifecycleController::new(
            store,
            detector,
            Arc::new(SimulatedBackend::new(&config.render)),
            Duration::from_millis(config.render.tick_interval_ms),
        );
        let dashboard = Dashboard::new(controller, UploadPolicy::from_config(&config.upload));

        Self {
            temp_dir,
            config,
            dashboard,
            events,
            recorded: Vec::new(),
        }
    }

    pub fn controller(&self) -> &LifecycleController {
        self.dashboard.controller()
    }

    /// Uploads a `.blend`-style file through the dashboard and returns its id.
    pub fn upload(&self, file_name: &str, content: &[u8]) -> String {
        self.dashboard
            .upload(Some(UploadedFile::new(file_name, content.to_vec())))
            .expect("upload accepted")
    }

    pub fn job(&self, id: &str) -> Option<RenderJob> {
        self.controller().get(id)
    }

    pub fn status(&self, id: &str) -> JobStatus {
        self.job(id).expect("job exists").status
    }

    /// Lets spawned tasks run without reaching the first render tick.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    /// Advances virtual time.
    pub async fn advance(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Long enough for any render to reach a terminal state.
    pub async fn run_renders(&self) {
        let ticks = 100 / u64::from(self.config.render.min_increment.max(1)) + 2;
        self.advance(Duration::from_millis(self.config.render.tick_interval_ms * ticks))
            .await;
    }

    /// Moves newly received events into the record and returns all of them.
    pub fn events(&mut self) -> &[JobEvent] {
        while let Ok(event) = self.events.try_recv() {
            self.recorded.push(event);
        }
        &self.recorded
    }

    /// Recorded events for one job.
    pub fn events_for(&mut self, id: &str) -> Vec<JobEvent> {
        self.events()
            .iter()
            .filter(|e| e.job_id == id)
            .cloned()
            .collect()
    }

    /// Distinct consecutive statuses one job went through.
    pub fn status_path(&mut self, id: &str) -> Vec<JobStatus> {
        let mut path: Vec<JobStatus> = Vec::new();
        for event in self.events_for(id) {
            if path.last() != Some(&event.status) {
                path.push(event.status);
            }
        }
        path
    }

    /// Writes a config file into the scratch directory.
    pub fn write_config(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, content).expect("Failed to write config file");
        path
    }
}
