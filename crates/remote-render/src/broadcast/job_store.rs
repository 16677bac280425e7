//! In-memory job store with whole-record replace-by-id updates.

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::task::AbortHandle;

use crate::broadcast::job_events::{JobEvent, JobEventBroadcaster};
use crate::error::ControllerError;
use crate::job::{JobStatus, RenderJob};

// ─── Phase guard ────────────────────────────────────────────────────────────

/// Identifies one run of an active phase for one job.
///
/// Every callback coming out of a detection or render task carries the guard
/// it was started with. The store applies its update only while the job still
/// exists, still has the expected status and has not started another phase
/// since (cancellation bumps the generation too).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseGuard {
    pub job_id: String,
    pub generation: u64,
    pub expected: JobStatus,
}

// ─── Counts ─────────────────────────────────────────────────────────────────

/// Number of jobs per lifecycle bucket.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobCounts {
    /// Uploaded, DetectingErrors, Queued or Rendering.
    pub active: usize,
    /// Waiting on the user after warnings were found.
    pub pending: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl JobCounts {
    pub fn total(&self) -> usize {
        self.active + self.pending + self.completed + self.failed + self.cancelled
    }
}

// ─── JobStore ───────────────────────────────────────────────────────────────

struct StoreEntry {
    job: RenderJob,
    generation: u64,
    task: Option<AbortHandle>,
}

impl StoreEntry {
    fn matches(&self, guard: &PhaseGuard) -> bool {
        self.generation == guard.generation && self.job.status == guard.expected
    }

    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Ordered job store, newest submission first.
///
/// Every mutation replaces the whole record and emits a [`JobEvent`] while the
/// write lock is held, so subscribers see the events of one job in the order
/// the mutations happened.
pub struct JobStore {
    entries: RwLock<Vec<StoreEntry>>,
    events: JobEventBroadcaster,
}

impl JobStore {
    pub fn new(events: JobEventBroadcaster) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            events,
        }
    }

    /// The broadcaster this store publishes to.
    pub fn events(&self) -> &JobEventBroadcaster {
        &self.events
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Vec<StoreEntry>> {
        match self.entries.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Vec<StoreEntry>> {
        match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    /// Inserts a new job at the front of the store.
    ///
    /// The job rests in whatever status it carries; use
    /// [`JobStore::insert_and_start_phase`] when it must move on right away.
    pub fn insert(&self, job: RenderJob) {
        let mut entries = self.write_entries();
        self.events.send(JobEvent::created(&job));
        entries.insert(
            0,
            StoreEntry {
                job,
                generation: 0,
                task: None,
            },
        );
    }

    /// Inserts a new job and moves it into its first active phase under one
    /// write lock.
    ///
    /// No other caller can observe or mutate the job between the two steps:
    /// subscribers receive `Created` followed by `StatusChanged`, and a
    /// `cancel` issued in reaction to `Created` finds the job already in the
    /// new phase.
    ///
    /// # Arguments
    ///
    /// * `job` - The freshly created record, normally in `Uploaded`.
    /// * `operation` - Verb used in the error when the transition is illegal.
    /// * `f` - Produces the record for the new phase from the inserted one.
    ///
    /// # Errors
    ///
    /// Returns [`ControllerError::InvalidTransition`] when `f` produces a
    /// status that is not a legal successor. Nothing is inserted then.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// use remote_render::{JobStatus, JobStore, RenderJob};
    ///
    /// let store = JobStore::default();
    /// let job = RenderJob::new("job-1", "forest.blend", ".blend", 1024);
    /// let guard = store.insert_and_start_phase(job, "detect errors for", |j| {
    ///     j.with_status(JobStatus::DetectingErrors).with_progress(0)
    /// })?;
    /// assert_eq!(guard.generation, 1);
    /// ```
    pub fn insert_and_start_phase<F>(
        &self,
        job: RenderJob,
        operation: &'static str,
        f: F,
    ) -> Result<PhaseGuard, ControllerError>
    where
        F: FnOnce(&RenderJob) -> RenderJob,
    {
        let next = f(&job);
        if !job.status.can_transition_to(next.status) {
            return Err(ControllerError::InvalidTransition {
                job_id: job.id.clone(),
                status: job.status,
                operation,
            });
        }

        let mut entries = self.write_entries();
        self.events.send(JobEvent::created(&job));
        self.events.send(JobEvent::status_changed(&next));

        let guard = PhaseGuard {
            job_id: next.id.clone(),
            generation: 1,
            expected: next.status,
        };
        entries.insert(
            0,
            StoreEntry {
                job: next,
                generation: 1,
                task: None,
            },
        );
        Ok(guard)
    }

    /// Replaces the record of a running phase with `f(current)`.
    ///
    /// Returns `None` without touching anything when the guard is stale or the
    /// produced record is not a legal successor. When the new record leaves the
    /// guarded status, the phase task handle is released.
    ///
    /// # Returns
    ///
    /// The stored record after the update, or `None` if nothing was applied.
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Progress tick from a render task
    /// let updated = store.apply(&guard, |job| job.with_progress(40));
    /// if updated.is_none() {
    ///     return; // cancelled or deleted meanwhile
    /// }
    /// ```
    pub fn apply<F>(&self, guard: &PhaseGuard, f: F) -> Option<RenderJob>
    where
        F: FnOnce(&RenderJob) -> RenderJob,
    {
        let mut entries = self.write_entries();
        let entry = entries.iter_mut().find(|e| e.job.id == guard.job_id)?;

        if !entry.matches(guard) {
            log::debug!(
                "Dropping stale update for job {} (expected {} gen {}, found {} gen {})",
                guard.job_id,
                guard.expected,
                guard.generation,
                entry.job.status,
                entry.generation
            );
            return None;
        }

        let next = f(&entry.job);
        if next.status != entry.job.status && !entry.job.status.can_transition_to(next.status) {
            log::error!(
                "Refusing illegal transition {} -> {} for job {}",
                entry.job.status,
                next.status,
                guard.job_id
            );
            return None;
        }

        if next.status != guard.expected {
            // The phase this task was driving is over.
            entry.task = None;
            self.events.send(JobEvent::status_changed(&next));
        } else {
            self.events.send(JobEvent::progress(&next));
        }
        entry.job = next.clone();
        Some(next)
    }

    /// Moves a job from `from` into a new active phase produced by `f`.
    ///
    /// With `generation` set, the call only succeeds while the job is still on
    /// that generation.
    ///
    /// # Arguments
    ///
    /// * `job_id` - The job to move.
    /// * `from` - The status the job must currently have.
    /// * `generation` - Phase generation the caller observed, if any.
    /// * `operation` - Verb used in the error message.
    /// * `f` - Produces the record for the new phase.
    ///
    /// # Returns
    ///
    /// The guard for the new phase, with the generation bumped.
    ///
    /// # Errors
    ///
    /// * [`ControllerError::JobNotFound`] if the id is unknown.
    /// * [`ControllerError::InvalidTransition`] if the job is not in `from`,
    ///   the generation moved on, or `f` produced an illegal successor.
    pub fn start_phase<F>(
        &self,
        job_id: &str,
        from: JobStatus,
        generation: Option<u64>,
        operation: &'static str,
        f: F,
    ) -> Result<PhaseGuard, ControllerError>
    where
        F: FnOnce(&RenderJob) -> RenderJob,
    {
        let mut entries = self.write_entries();
        let entry = entries
            .iter_mut()
            .find(|e| e.job.id == job_id)
            .ok_or_else(|| ControllerError::JobNotFound(job_id.to_string()))?;

        let stale = generation.is_some_and(|g| g != entry.generation);
        let next = f(&entry.job);
        if stale || entry.job.status != from || !from.can_transition_to(next.status) {
            return Err(ControllerError::InvalidTransition {
                job_id: job_id.to_string(),
                status: entry.job.status,
                operation,
            });
        }

        entry.generation += 1;
        entry.job = next;
        self.events.send(JobEvent::status_changed(&entry.job));

        Ok(PhaseGuard {
            job_id: job_id.to_string(),
            generation: entry.generation,
            expected: entry.job.status,
        })
    }

    /// Records the task driving the phase identified by `guard`.
    ///
    /// If the phase is already over (finished, cancelled, deleted) the task is
    /// aborted right away.
    pub fn attach_task(&self, guard: &PhaseGuard, task: AbortHandle) -> bool {
        let mut entries = self.write_entries();
        match entries.iter_mut().find(|e| e.job.id == guard.job_id) {
            Some(entry) if entry.matches(guard) => {
                entry.task = Some(task);
                true
            }
            _ => {
                task.abort();
                false
            }
        }
    }

    /// Cancels a non-terminal job: aborts its task, sets `Cancelled`, progress 0.
    ///
    /// Returns `Ok(None)` when the job is already terminal.
    pub fn cancel(&self, job_id: &str) -> Result<Option<RenderJob>, ControllerError> {
        let mut entries = self.write_entries();
        let entry = entries
            .iter_mut()
            .find(|e| e.job.id == job_id)
            .ok_or_else(|| ControllerError::JobNotFound(job_id.to_string()))?;

        if entry.job.is_finished() {
            return Ok(None);
        }

        entry.abort_task();
        entry.generation += 1;
        entry.job = entry
            .job
            .with_status(JobStatus::Cancelled)
            .with_progress(0);
        self.events.send(JobEvent::status_changed(&entry.job));

        Ok(Some(entry.job.clone()))
    }

    /// Removes a terminal job permanently.
    pub fn remove(&self, job_id: &str) -> Result<RenderJob, ControllerError> {
        let mut entries = self.write_entries();
        let index = entries
            .iter()
            .position(|e| e.job.id == job_id)
            .ok_or_else(|| ControllerError::JobNotFound(job_id.to_string()))?;

        if !entries[index].job.is_finished() {
            return Err(ControllerError::InvalidTransition {
                job_id: job_id.to_string(),
                status: entries[index].job.status,
                operation: "delete",
            });
        }

        let mut entry = entries.remove(index);
        entry.abort_task();
        self.events.send(JobEvent::removed(&entry.job));
        Ok(entry.job)
    }

    /// Aborts every running task. Records keep their last state.
    pub fn abort_all(&self) -> usize {
        let mut entries = self.write_entries();
        let mut aborted = 0;
        for entry in entries.iter_mut() {
            if entry.task.is_some() {
                entry.abort_task();
                entry.generation += 1;
                aborted += 1;
            }
        }
        aborted
    }

    /// Returns a specific job by ID.
    pub fn get(&self, job_id: &str) -> Option<RenderJob> {
        self.read_entries()
            .iter()
            .find(|e| e.job.id == job_id)
            .map(|e| e.job.clone())
    }

    /// Current phase generation of a job.
    pub fn generation(&self, job_id: &str) -> Option<u64> {
        self.read_entries()
            .iter()
            .find(|e| e.job.id == job_id)
            .map(|e| e.generation)
    }

    /// Returns true if a phase task is attached to the job.
    pub fn has_task(&self, job_id: &str) -> bool {
        self.read_entries()
            .iter()
            .any(|e| e.job.id == job_id && e.task.is_some())
    }

    /// Returns all jobs, newest first.
    pub fn get_all(&self) -> Vec<RenderJob> {
        self.read_entries().iter().map(|e| e.job.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    pub fn counts(&self) -> JobCounts {
        let mut counts = JobCounts::default();
        for entry in self.read_entries().iter() {
            match entry.job.status {
                JobStatus::Uploaded
                | JobStatus::DetectingErrors
                | JobStatus::Queued
                | JobStatus::Rendering => counts.active += 1,
                JobStatus::PendingConfirmation => counts.pending += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Error => counts.failed += 1,
                JobStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new(JobEventBroadcaster::default())
    }
}
