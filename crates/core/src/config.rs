//! Global configuration constants for vecstash.
//!
//! Graph tuning defaults, search defaults, and on-disk layout are defined here.
//! These are compile-time constants; runtime configuration is handled via
//! [`HnswConfig`](crate::hnsw::HnswConfig) and the CLI arguments in `vecstash-cli`.

/// Default maximum number of neighbors kept per node per layer.
///
/// Higher values improve recall but increase memory and insertion cost.
/// Typical range: 8–64. Default: 16.
pub const HNSW_DEFAULT_M: usize = 16;

/// Default ef parameter during HNSW index construction.
///
/// Carried in the configuration for compatibility with tuned setups. Neighbor
/// selection scans every node of a layer, so this value does not bound insertion.
pub const HNSW_DEFAULT_EF_CONSTRUCTION: usize = 200;

/// Default ef parameter during HNSW search.
///
/// Minimum size of the dynamic candidate list on the base layer.
/// Higher values improve recall at the cost of latency.
pub const HNSW_DEFAULT_EF_SEARCH: usize = 64;

/// Default success probability of each Bernoulli trial during level sampling (`1/e`).
pub const HNSW_DEFAULT_LEVEL_PROBABILITY: f64 = 1.0 / std::f64::consts::E;

/// Hard cap on the sampled level of a node.
///
/// With `p = 1/e` a level above 16 has probability below `1e-7`.
pub const HNSW_DEFAULT_MAX_LEVEL: usize = 16;

/// Number of results returned when a caller does not specify `top_k`.
pub const DEFAULT_TOP_K: usize = 5;

/// Default directory for the JSON record file.
pub const DEFAULT_DATA_DIR: &str = "./data";

/// File name of the record file inside the data directory.
pub const RECORDS_FILE_NAME: &str = "records.json";
