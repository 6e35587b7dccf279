//! # Datex
//!
//! A configuration-driven data exchange engine.
//!
//! Datex reads records from a source, optionally validates and reshapes
//! them, and writes them to one or more sinks, all described by a plain
//! JSON document. Jobs run one-shot from the command line or inside a
//! long-lived service that schedules them and answers an HTTP control API.
//!
//! - **Declarative pipelines**: readers, validators, transforms, writers,
//!   listeners and tasks named by registry key and configured by options
//! - **Two-tier context**: job-scoped shared state carrying the run's halt
//!   signal, plus record-scoped transaction state for each pass
//! - **Persistent context**: cross-run state on disk with a single-writer
//!   policy
//! - **Service mode**: cron-scheduled jobs plus remote start, stop, status
//!   and log access
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use datex::prelude::*;
//!
//! let config = JobConfig::parse(r#"{
//!     "name": "nightly-export",
//!     "reader": { "class": "Orders", "batch": 500 },
//!     "validate": [ { "class": "NotEmpty", "field": "id" } ],
//!     "writer": { "class": "Warehouse" }
//! }"#)?;
//!
//! let mut registry = StageRegistry::with_builtins();
//! registry.register_reader("Orders", |options| Box::new(OrdersReader::from_config(options)));
//! registry.register_writer("Warehouse", |options| Box::new(WarehouseWriter::from_config(options)));
//!
//! let outcome = JobRunner::new(registry).run(&config).await;
//! std::process::exit(outcome.exit_code());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod api;
pub mod component;
pub mod condition;
pub mod config;
pub mod context;
pub mod engine;
pub mod errors;
pub mod listener;
pub mod observability;
pub mod record;
pub mod registry;
pub mod runner;
pub mod task;
pub mod testing;
pub mod transform;
pub mod validate;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::api::ControlApi;
    pub use crate::component::{
        ContextListener, FrameReader, FrameTransform, FrameValidator, FrameWriter, ReplayReader,
        TransformTask,
    };
    pub use crate::config::{
        ComponentConfig, JobConfig, ScheduledJobConfig, ServiceConfig, StageConfig,
        DEFAULT_SERVICE_PORT,
    };
    pub use crate::context::{ContextStatus, ContextStore, JobContext, TransactionContext};
    pub use crate::engine::{EngineBuilder, EngineState, TransformEngine};
    pub use crate::errors::{ConfigurationError, DatexError, DatexResult};
    pub use crate::observability::{init_tracing, LogRegistry};
    pub use crate::record::Record;
    pub use crate::registry::StageRegistry;
    pub use crate::runner::{JobDirectories, JobOutcome, JobRunner, ServiceRunner};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_default_port_is_stable() {
        // Operator tooling addresses services on this port.
        assert_eq!(crate::config::DEFAULT_SERVICE_PORT, 55290);
    }
}
