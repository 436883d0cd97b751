//! Search primitives: scored results and exact brute-force ranking.

/// Exact linear-scan search.
pub mod brute_force;
/// Scored record type returned by searches.
pub mod types;

pub use brute_force::brute_force_search;
pub use types::ScoredRecord;
