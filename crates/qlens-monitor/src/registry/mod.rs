//! Query Statistics Registry
//!
//! Owns the running statistics, latest analysis and current suggestion set
//! of every tracked fingerprint.

mod store;


pub use store::*;
