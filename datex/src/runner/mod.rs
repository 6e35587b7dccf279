//! Job and service runners.
//!
//! [`JobRunner`] runs one job to completion and reports a [`JobOutcome`];
//! [`ServiceRunner`] hosts many jobs as independent tokio tasks, scheduled
//! or on demand, behind the control API.

mod dirs;
mod job;
mod service;

pub use dirs::JobDirectories;
pub use job::{JobOutcome, JobRunner};
pub use service::ServiceRunner;
