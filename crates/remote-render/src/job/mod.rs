pub mod model;

pub use model::{new_job_id, JobStatus, RenderJob};
