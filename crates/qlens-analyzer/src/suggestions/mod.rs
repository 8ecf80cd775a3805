//! Optimization Suggestions Module
//!
//! Rule-based advisory suggestions built from running statistics, static text
//! analysis and cached execution plans. Suggestions are advisory only; nothing
//! here applies a change.

mod generator;
mod suggestion;

pub use generator::*;
pub use suggestion::*;
