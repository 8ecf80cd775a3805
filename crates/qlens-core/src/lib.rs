//! qlens core - shared abstractions for the query performance engine
//!
//! This crate provides the types every other qlens crate depends on:
//!
//! - `EngineConfig` - static engine configuration and its validation
//! - `Fingerprint` - stable identifier of a normalized query shape
//! - `QueryStatistics` - per-fingerprint running aggregates
//! - `SqlExecutionSource` - injected database collaborator (plans, live statements, index usage)
//! - `MetricsSink` - pluggable metrics destination with a no-op default
//! - `QlensError` - the error taxonomy shared by all crates

mod config;
mod error;
mod fingerprint;
mod metrics;
mod source;
mod stats;
mod types;

pub use config::*;
pub use error::*;
pub use fingerprint::*;
pub use metrics::*;
pub use source::*;
pub use stats::*;
pub use types::*;
