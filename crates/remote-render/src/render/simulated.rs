//! Pseudo-random render farm used until a real scheduler is wired in.
//!
//! Every poll advances the render by a random increment. Once progress
//! reaches 100 the render completes; while progress lies inside the fault
//! window each poll may instead fail with the configured probability.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{RenderBackend, RenderHandle, RenderPoll, RenderSpec};
use crate::config::{FaultWindow, RenderConfig};
use crate::error::RenderError;

const FAULT_MESSAGE: &str = "A simulated error occurred during render. Please check the logs.";

struct SimulatedRender {
    job_id: String,
    progress: u8,
}

pub struct SimulatedBackend {
    renders: Mutex<HashMap<RenderHandle, SimulatedRender>>,
    rng: Mutex<StdRng>,
    min_increment: u8,
    max_increment: u8,
    fault_probability: f64,
    fault_window: FaultWindow,
    thumbnail_url_template: String,
    download_url: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::warn!("Simulated backend lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Fault rate usable with `random_bool`; NaN and infinities mean no faults.
fn fault_probability(configured: f64) -> f64 {
    if configured.is_finite() {
        configured.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

impl SimulatedBackend {
    pub fn new(config: &RenderConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let min_increment = config.min_increment.max(1);

        Self {
            renders: Mutex::new(HashMap::new()),
            rng: Mutex::new(rng),
            min_increment,
            max_increment: config.max_increment.max(min_increment),
            fault_probability: fault_probability(config.fault_probability),
            fault_window: config.fault_window,
            thumbnail_url_template: config.thumbnail_url_template.clone(),
            download_url: config.download_url.clone(),
        }
    }

    /// Thumbnail reference for a job; stable for the same job id.
    pub fn thumbnail_url(&self, job_id: &str) -> String {
        self.thumbnail_url_template.replace("{jobId}", job_id)
    }

    /// Number of renders currently tracked.
    pub fn active_renders(&self) -> usize {
        lock(&self.renders).len()
    }

    fn advance(&self, render: &mut SimulatedRender) -> RenderPoll {
        let mut rng = lock(&self.rng);
        let step = rng.random_range(self.min_increment..=self.max_increment);
        let advanced = render.progress.saturating_add(step);

        if advanced >= 100 {
            render.progress = 100;
            return RenderPoll::Completed {
                thumbnail_url: self.thumbnail_url(&render.job_id),
                download_url: self.download_url.clone(),
            };
        }

        render.progress = advanced;
        if self.fault_window.contains(advanced) && rng.random_bool(self.fault_probability) {
            return RenderPoll::Failed {
                reason: FAULT_MESSAGE.to_string(),
                progress: advanced,
            };
        }

        RenderPoll::InProgress { progress: advanced }
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}

#[async_trait]
impl RenderBackend for SimulatedBackend {
    async fn submit(&self, spec: &RenderSpec) -> Result<RenderHandle, RenderError> {
        let handle = RenderHandle(format!("render-{}", uuid::Uuid::new_v4().simple()));
        lock(&self.renders).insert(
            handle.clone(),
            SimulatedRender {
                job_id: spec.job_id.clone(),
                progress: 0,
            },
        );
        tracing::debug!(job_id = %spec.job_id, handle = %handle, "Simulated render submitted");
        Ok(handle)
    }

    async fn poll(&self, handle: &RenderHandle) -> Result<RenderPoll, RenderError> {
        let mut renders = lock(&self.renders);
        let render = renders
            .get_mut(handle)
            .ok_or_else(|| RenderError::UnknownHandle(handle.to_string()))?;

        let outcome = self.advance(render);
        if outcome.is_terminal() {
            renders.remove(handle);
        }
        Ok(outcome)
    }

    fn release(&self, handle: &RenderHandle) {
        lock(&self.renders).remove(handle);
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}
