//! Proximity of an execution to the target locations of the data-flow graph.
//!
//! Scores are computed upstream from coverage bitmaps; this module only holds
//! the finished values and folds in hits observed later.

use crate::containers::ContainerError;

/// Static metadata of one DFG node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DfgNodeInfo {
    pub idx: u32,
    /// Weight of a hit on this node; larger means closer to a target.
    pub score: u32,
    pub max_paths: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProximityScore {
    /// Hit-weighted sum of node scores.
    pub original: u64,
    /// Mean node score per hit.
    pub adjusted: f64,
    /// Number of distinct DFG nodes touched.
    pub covered: u32,
    total_hits: u64,
    count_map: Vec<u32>,
    dense_map: Vec<(u32, u32)>,
}

impl ProximityScore {
    /// An empty score over a graph of `node_count` nodes.
    pub fn new(node_count: usize) -> Self {
        Self {
            count_map: vec![0; node_count],
            ..Self::default()
        }
    }

    /// Builds a score from `(node index, hit count)` pairs.
    pub fn from_hits(nodes: &[DfgNodeInfo], hits: &[(u32, u32)]) -> Result<Self, ContainerError> {
        let mut score = Self::new(nodes.len());
        for &(idx, count) in hits {
            let node = nodes
                .get(idx as usize)
                .ok_or(ContainerError::BoundsViolation {
                    index: idx as usize,
                    size: nodes.len(),
                })?;
            score.record(node, count)?;
        }
        Ok(score)
    }

    /// Folds `hits` executions of `node` into the score.
    ///
    /// Returns `true` when the node had not been covered before.
    pub fn record(&mut self, node: &DfgNodeInfo, hits: u32) -> Result<bool, ContainerError> {
        let size = self.count_map.len();
        let slot = self
            .count_map
            .get_mut(node.idx as usize)
            .ok_or(ContainerError::BoundsViolation {
                index: node.idx as usize,
                size,
            })?;
        if hits == 0 {
            return Ok(false);
        }

        let newly_covered = *slot == 0;
        *slot = slot.saturating_add(hits);
        let count = *slot;

        match self.dense_map.iter_mut().find(|(idx, _)| *idx == node.idx) {
            Some(entry) => entry.1 = count,
            None => self.dense_map.push((node.idx, count)),
        }
        if newly_covered {
            self.covered += 1;
        }

        self.original = self
            .original
            .saturating_add(u64::from(node.score) * u64::from(hits));
        self.total_hits += u64::from(hits);
        self.adjusted = self.original as f64 / self.total_hits as f64;
        Ok(newly_covered)
    }

    /// Per-node hit counts, indexed by node.
    pub fn coverage_vector(&self) -> &[u32] {
        &self.count_map
    }

    /// `(node index, hit count)` for every covered node, in first-hit order.
    pub fn dense(&self) -> &[(u32, u32)] {
        &self.dense_map
    }

    pub fn node_count(&self) -> usize {
        self.count_map.len()
    }
}
