//! Enrichment pipeline: git adapter, complexity measurer, model clients,
//! enricher/judge orchestration, scope matching, and configuration.
//!
//! This crate has no knowledge of the store's schema; it returns plain
//! `gitmem_types` values and lets `gitmem-db` persist them.

pub mod config;
pub mod coverage;
pub mod enricher;
pub mod error;
pub mod git;
pub mod judge;
pub mod measurer;
pub mod model;
pub mod ports;
pub mod progress;
pub mod scope;
pub mod telemetry;
pub mod workspace;

pub use config::GitmemConfig;
pub use error::GitmemError;
pub use progress::{Phase, Progress};
pub use workspace::Workspace;
