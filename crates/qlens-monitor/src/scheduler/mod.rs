//! Background scheduler
//!
//! Drives the engine's live monitoring, periodic analysis and cleanup passes
//! on independent tokio tasks.

mod lifecycle;
mod loops;

#[cfg(test)]
mod tests;

pub use lifecycle::*;
