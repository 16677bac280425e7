pub mod broadcast;
pub mod config;
pub mod controller;
pub mod dashboard;
pub mod detector;
pub mod error;
pub mod job;
pub mod logging;
pub mod render;
pub mod sanitize;
pub mod secrets;
pub mod upload;

pub use broadcast::{JobCounts, JobEvent, JobEventBroadcaster, JobEventKind, JobStore, PhaseGuard};
pub use config::{load_config, load_config_from_str, load_config_or_default, Config};
pub use controller::LifecycleController;
pub use dashboard::{BadgeTone, CardAction, Dashboard, JobCard};
pub use detector::{build_detector, DetectionRequest, ErrorDetector};
pub use error::{
    ConfigError, ControllerError, DetectionError, RemoteRenderError, RenderError, Result,
    UploadError,
};
pub use job::{JobStatus, RenderJob};
pub use logging::init_logging;
pub use render::{RenderBackend, RenderHandle, RenderPoll, RenderSpec, SimulatedBackend};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
pub use upload::{UploadPolicy, UploadedFile};
