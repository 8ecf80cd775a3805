//! qlens monitor - runtime side of the query performance engine
//!
//! This crate provides:
//! - `QueryRegistry` - per-fingerprint statistics, analysis and suggestions
//! - `PlanCache` - bounded, lazily filled execution plan cache
//! - `QueryPerformanceEngine` - the ingestion entry point and background passes
//! - `Scheduler` - live, periodic and cleanup loops with a stop/start lifecycle
//! - `OptimizationReport` - read-only snapshot of everything above

pub mod cache;
pub mod engine;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod trends;

pub use cache::*;
pub use engine::*;
pub use registry::*;
pub use report::*;
pub use scheduler::*;
pub use trends::*;
