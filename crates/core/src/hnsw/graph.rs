//! HNSW graph structure and configuration.
//!
//! [`HnswConfig`] defines tuning parameters (M, ef_search, level distribution).
//! [`HnswIndex`] stores the graph using a Struct-of-Arrays layout: every node
//! owns a dense `u32` slot, vectors live contiguously in one arena, and the
//! external [`RecordId`] is only resolved at the API boundary.

use crate::config;
use crate::error::IndexError;
use crate::hnsw::distance::cosine_distance;
use crate::record::RecordId;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Configuration parameters for an HNSW index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Maximum neighbors kept per node per layer.
    pub m: usize,
    /// Candidate breadth during construction. Kept for configuration parity;
    /// neighbor selection is exhaustive per layer.
    pub ef_construction: usize,
    /// Minimum candidate list size on the base layer during search.
    pub ef_search: usize,
    /// Success probability of each level-promotion trial.
    pub level_probability: f64,
    /// Upper bound on sampled levels.
    pub max_level: usize,
    /// Seed for level sampling. `None` draws from OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: config::HNSW_DEFAULT_M,
            ef_construction: config::HNSW_DEFAULT_EF_CONSTRUCTION,
            ef_search: config::HNSW_DEFAULT_EF_SEARCH,
            level_probability: config::HNSW_DEFAULT_LEVEL_PROBABILITY,
            max_level: config::HNSW_DEFAULT_MAX_LEVEL,
            seed: None,
        }
    }
}

/// HNSW index over cosine distance.
///
/// The index is a pure synchronous data structure: it only grows, and is
/// discarded and rebuilt by its owner when the backing records change.
#[derive(Debug, Clone)]
pub struct HnswIndex {
    pub(crate) config: HnswConfig,
    pub(crate) dimension: usize,
    // SoA: per-slot node data
    pub(crate) ids: Vec<RecordId>,
    pub(crate) vectors: Vec<f32>,
    pub(crate) norms: Vec<f32>,
    pub(crate) levels: Vec<u8>,
    pub(crate) neighbors: Vec<Vec<Vec<u32>>>, // [slot][layer][neighbor slots]
    // Slots present at each layer, in insertion order
    pub(crate) layers: Vec<Vec<u32>>,
    pub(crate) slot_of: HashMap<RecordId, u32>,
    pub(crate) entry_point: Option<u32>,
    pub(crate) max_level: usize,
    rng: StdRng,
}

impl HnswIndex {
    /// Creates a new empty index for vectors of length `dimension`.
    pub fn new(dimension: usize, config: HnswConfig) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::InvalidDimension(dimension));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            dimension,
            ids: Vec::new(),
            vectors: Vec::new(),
            norms: Vec::new(),
            levels: Vec::new(),
            neighbors: Vec::new(),
            layers: Vec::new(),
            slot_of: HashMap::new(),
            entry_point: None,
            max_level: 0,
            rng,
        })
    }

    /// Creates a new empty index with the default configuration (M=16, ef_search=64).
    pub fn with_default_config(dimension: usize) -> Result<Self, IndexError> {
        Self::new(dimension, HnswConfig::default())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn config(&self) -> &HnswConfig {
        &self.config
    }

    /// Changes the search beam width. Takes effect on the next search; the
    /// graph itself is unaffected.
    pub fn set_ef_search(&mut self, ef_search: usize) {
        self.config.ef_search = ef_search;
    }

    pub fn contains(&self, id: &RecordId) -> bool {
        self.slot_of.contains_key(id)
    }

    /// Id of the node every search starts from, `None` while empty.
    pub fn entry_point(&self) -> Option<RecordId> {
        self.entry_point.map(|slot| self.ids[slot as usize])
    }

    /// Highest layer in the graph, `None` while empty.
    pub fn max_level(&self) -> Option<usize> {
        self.entry_point.map(|_| self.max_level)
    }

    /// Level sampled for `id` at insertion.
    pub fn level_of(&self, id: &RecordId) -> Option<usize> {
        self.slot_of
            .get(id)
            .map(|&slot| self.levels[slot as usize] as usize)
    }

    /// Neighbor ids of `id` at `level`. `None` if the node is unknown or does not
    /// reach that level.
    pub fn neighbors_of(&self, id: &RecordId, level: usize) -> Option<Vec<RecordId>> {
        let slot = *self.slot_of.get(id)? as usize;
        let list = self.neighbors[slot].get(level)?;
        Some(list.iter().map(|&n| self.ids[n as usize]).collect())
    }

    /// Draws a level: the number of successful Bernoulli(`level_probability`)
    /// trials before the first failure, capped at `max_level`.
    pub(crate) fn sample_level(&mut self) -> usize {
        let cap = self.config.max_level.min(u8::MAX as usize);
        let p = self.config.level_probability;
        let mut level = 0;
        while level < cap && self.rng.gen::<f64>() < p {
            level += 1;
        }
        level
    }

    #[inline]
    pub(crate) fn check_dimension(&self, len: usize) -> Result<(), IndexError> {
        if len != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: len,
            });
        }
        Ok(())
    }

    /// Slice of the vector arena for `slot`. O(1).
    #[inline]
    pub(crate) fn vector(&self, slot: u32) -> &[f32] {
        let start = slot as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// Cosine distance between two stored nodes.
    #[inline]
    pub(crate) fn distance_between(&self, a: u32, b: u32) -> f32 {
        cosine_distance(
            self.vector(a),
            self.norms[a as usize],
            self.vector(b),
            self.norms[b as usize],
        )
    }

    /// Verifies structural invariants: parallel arrays agree, the entry point sits
    /// at `max_level`, every neighbor slot is in bounds, and no node holds more
    /// than `m` neighbors on any layer.
    pub fn validate(&self) -> Result<(), IndexError> {
        let n = self.ids.len();
        if self.vectors.len() != n * self.dimension
            || self.norms.len() != n
            || self.levels.len() != n
            || self.neighbors.len() != n
            || self.slot_of.len() != n
        {
            return Err(IndexError::CorruptGraph(format!(
                "parallel arrays disagree on node count {n}"
            )));
        }

        match self.entry_point {
            None if n > 0 => {
                return Err(IndexError::CorruptGraph(
                    "non-empty index without entry point".into(),
                ))
            }
            Some(ep) => {
                let level = *self.levels.get(ep as usize).ok_or_else(|| {
                    IndexError::CorruptGraph(format!("entry point {ep} out of bounds"))
                })? as usize;
                if level != self.max_level {
                    return Err(IndexError::CorruptGraph(format!(
                        "entry point level {level} != max level {}",
                        self.max_level
                    )));
                }
            }
            None => {}
        }

        for (slot, node_layers) in self.neighbors.iter().enumerate() {
            for (layer, list) in node_layers.iter().enumerate() {
                if list.len() > self.config.m {
                    return Err(IndexError::CorruptGraph(format!(
                        "node {slot} has {} neighbors at layer {layer} (m = {})",
                        list.len(),
                        self.config.m
                    )));
                }
                if let Some(&bad) = list.iter().find(|&&nb| nb as usize >= n) {
                    return Err(IndexError::CorruptGraph(format!(
                        "neighbor {bad} out of bounds at node {slot} layer {layer}"
                    )));
                }
            }
        }
        Ok(())
    }
}
