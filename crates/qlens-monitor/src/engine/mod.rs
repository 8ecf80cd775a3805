//! Query performance engine
//!
//! One [`QueryPerformanceEngine`] owns all mutable state and is shared
//! between the foreground ingestion path and the scheduler loops.

mod query_engine;


pub use query_engine::*;
