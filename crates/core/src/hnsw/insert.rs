//! HNSW insertion.
//!
//! A new node is linked on every layer up to its sampled level to the `m`
//! nearest nodes already on that layer, found by scoring the whole layer. Edges
//! are added in both directions; an endpoint pushed past `m` neighbors keeps
//! only its `m` closest.

use crate::error::IndexError;
use crate::hnsw::distance::{cosine_distance, norm};
use crate::hnsw::graph::HnswIndex;
use crate::record::RecordId;
use ordered_float::OrderedFloat;

impl HnswIndex {
    /// Insert `vector` under `id`.
    ///
    /// Fails with [`IndexError::DuplicateId`] or [`IndexError::DimensionMismatch`]
    /// without touching the graph.
    pub fn add_item(&mut self, id: RecordId, vector: &[f32]) -> Result<(), IndexError> {
        if self.slot_of.contains_key(&id) {
            return Err(IndexError::DuplicateId(id));
        }
        self.check_dimension(vector.len())?;
        if self.ids.len() >= u32::MAX as usize {
            return Err(IndexError::CorruptGraph("slot space exhausted".into()));
        }

        let level = self.sample_level();
        let slot = self.ids.len() as u32;

        self.ids.push(id);
        self.vectors.extend_from_slice(vector);
        self.norms.push(norm(vector));
        self.levels.push(level as u8);
        self.neighbors.push(vec![Vec::new(); level + 1]);
        self.slot_of.insert(id, slot);
        while self.layers.len() <= level {
            self.layers.push(Vec::new());
        }

        // First node: no one to link to
        if self.entry_point.is_none() {
            for layer in 0..=level {
                self.layers[layer].push(slot);
            }
            self.entry_point = Some(slot);
            self.max_level = level;
            return Ok(());
        }

        for layer in 0..=level {
            let selected = self.select_neighbors(slot, layer);
            for neighbor in selected {
                self.link(slot, neighbor, layer);
            }
            self.layers[layer].push(slot);
        }

        if level > self.max_level {
            self.max_level = level;
            self.entry_point = Some(slot);
        }
        Ok(())
    }

    /// Up to `m` nearest nodes to `slot` among all nodes already on `layer`.
    fn select_neighbors(&self, slot: u32, layer: usize) -> Vec<u32> {
        let base = self.vector(slot);
        let base_norm = self.norms[slot as usize];

        let mut scored: Vec<(OrderedFloat<f32>, u32)> = self.layers[layer]
            .iter()
            .filter(|&&other| other != slot)
            .map(|&other| {
                let dist = cosine_distance(
                    base,
                    base_norm,
                    self.vector(other),
                    self.norms[other as usize],
                );
                (OrderedFloat(dist), other)
            })
            .collect();

        scored.sort_unstable();
        scored.truncate(self.config.m);
        scored.into_iter().map(|(_, other)| other).collect()
    }

    /// Add the undirected edge `a - b` on `layer`, then prune both endpoints.
    fn link(&mut self, a: u32, b: u32, layer: usize) {
        for (from, to) in [(a, b), (b, a)] {
            let layers = &mut self.neighbors[from as usize];
            while layers.len() <= layer {
                layers.push(Vec::new());
            }
            if !layers[layer].contains(&to) {
                layers[layer].push(to);
            }
        }
        self.prune(a, layer);
        self.prune(b, layer);
    }

    /// Shrink `slot`'s neighbor list on `layer` back to its `m` closest.
    /// Dropped edges are only removed on this side.
    fn prune(&mut self, slot: u32, layer: usize) {
        let m = self.config.m;
        let current = &self.neighbors[slot as usize][layer];
        if current.len() <= m {
            return;
        }

        let mut scored: Vec<(OrderedFloat<f32>, u32)> = current
            .iter()
            .map(|&nb| (OrderedFloat(self.distance_between(slot, nb)), nb))
            .collect();
        scored.sort_unstable();
        scored.truncate(m);

        self.neighbors[slot as usize][layer] = scored.into_iter().map(|(_, nb)| nb).collect();
    }
}
