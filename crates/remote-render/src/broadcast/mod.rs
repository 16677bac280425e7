//! Job storage and event streaming.
//!
//! The store owns every job record; each mutation is published on the event
//! broadcaster so any presentation layer can follow along.

pub mod job_events;
pub mod job_store;

pub use job_events::{JobEvent, JobEventBroadcaster, JobEventKind, NoticeLevel};
pub use job_store::{JobCounts, JobStore, PhaseGuard};
