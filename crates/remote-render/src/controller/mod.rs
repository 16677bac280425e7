//! Render job lifecycle: detection, confirmation, rendering and user actions.

pub mod lifecycle;

pub use lifecycle::LifecycleController;
