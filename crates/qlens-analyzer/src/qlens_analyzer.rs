//! qlens analyzer - query text analysis and optimization suggestions
//!
//! This crate provides functionality for:
//! - Static analysis of query text (type, tables, complexity, selectivity, anti-patterns)
//! - Rule-based optimization suggestions from statistics, text analysis and plans
//! - Ranking of suggestions by severity and estimated improvement

pub mod suggestions;
pub mod text;

pub use suggestions::*;
pub use text::*;
