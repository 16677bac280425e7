//! Shared test utilities for remote-render integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a dashboard, controller and seeded render farm
//! - Builders for configurations and scripted error detectors

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
