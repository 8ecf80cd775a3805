//! Execution Plan Cache
//!
//! Bounded cache of advisory plan metadata keyed by fingerprint. Entries are
//! evicted together with their fingerprint or under capacity pressure.

mod plan_cache;

#[cfg(test)]
mod tests;

pub use plan_cache::*;
