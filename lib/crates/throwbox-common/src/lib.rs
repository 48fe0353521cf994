pub mod job;
pub mod types;

pub use job::{JobEvent, JobReport, JobRequest};
pub use types::*;
