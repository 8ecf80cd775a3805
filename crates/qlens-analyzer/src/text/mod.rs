//! Query Text Analysis Module
//!
//! Pure, heuristic analysis of SQL text. Nothing here parses SQL into an AST;
//! a lightweight tokenizer feeds independent checks, each of which can be
//! replaced without changing the [`TextAnalyzer`] contract.

mod analyzer;
mod patterns;
mod tokens;


pub use analyzer::*;
pub use patterns::AntiPattern;
