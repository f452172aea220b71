use crate::cluster::Cluster;
use crate::containers::ChainedMap;
use rand::Rng;
use rand_core::RngCore;
use tracing::{debug, warn};

/// Default soft cap on the number of clusters.
pub const DEFAULT_MAX_CLUSTERS: usize = 16;

/// An indexed collection of [`Cluster`]s keyed by an external clustering key.
///
/// Clusters are stored in creation order; a [`ChainedMap`] maps keys to
/// positions. `max_clusters` is a soft cap: exceeding it is logged, never
/// refused.
#[derive(Debug, Clone)]
pub struct ClusterManager {
    clusters: Vec<Cluster>,
    index: ChainedMap<usize>,
    max_clusters: usize,
}

impl Default for ClusterManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CLUSTERS)
    }
}

impl ClusterManager {
    pub fn new(max_clusters: usize) -> Self {
        Self {
            clusters: Vec::new(),
            index: ChainedMap::new(),
            max_clusters,
        }
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }

    pub fn max_clusters(&self) -> usize {
        self.max_clusters
    }

    /// Returns the cluster for `key`, creating an empty one if needed.
    pub fn get_or_add(&mut self, key: u32) -> &mut Cluster {
        let pos = match self.index.get(key) {
            Some(pos) => *pos,
            None => {
                let pos = self.clusters.len();
                self.clusters.push(Cluster::new(key));
                self.index.insert(key, pos);
                debug!(key, clusters = self.clusters.len(), "Created cluster");
                if self.clusters.len() > self.max_clusters {
                    warn!(
                        clusters = self.clusters.len(),
                        max_clusters = self.max_clusters,
                        "Cluster count exceeds soft cap"
                    );
                }
                pos
            }
        };
        &mut self.clusters[pos]
    }

    pub fn get(&self, key: u32) -> Option<&Cluster> {
        self.index.get(key).map(|pos| &self.clusters[*pos])
    }

    pub fn get_mut(&mut self, key: u32) -> Option<&mut Cluster> {
        let pos = *self.index.get(key)?;
        self.clusters.get_mut(pos)
    }

    /// Cluster at creation-order position `pos`.
    pub fn at(&self, pos: usize) -> Option<&Cluster> {
        self.clusters.get(pos)
    }

    pub fn at_mut(&mut self, pos: usize) -> Option<&mut Cluster> {
        self.clusters.get_mut(pos)
    }

    /// Position of a uniformly random cluster, or `None` when there are none.
    ///
    /// Cluster size and productivity are ignored.
    pub fn select_random_index(&self, rng: &mut dyn RngCore) -> Option<usize> {
        if self.clusters.is_empty() {
            return None;
        }
        Some(rng.random_range(0..self.clusters.len()))
    }

    pub fn select_random(&mut self, rng: &mut dyn RngCore) -> Option<&mut Cluster> {
        let pos = self.select_random_index(rng)?;
        self.clusters.get_mut(pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cluster> {
        self.clusters.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Cluster> {
        self.clusters.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    #[test]
    fn get_or_add_creates_once_per_key() {
        let mut manager = ClusterManager::default();
        assert_eq!(manager.get_or_add(7).id(), 7);
        assert_eq!(manager.get_or_add(3).id(), 3);
        assert_eq!(manager.get_or_add(7).id(), 7);
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.at(0).map(Cluster::id), Some(7));
        assert_eq!(manager.at(1).map(Cluster::id), Some(3));
        assert!(manager.get(99).is_none());
    }

    #[test]
    fn soft_cap_does_not_refuse_clusters() {
        let mut manager = ClusterManager::new(2);
        for key in 0..5 {
            manager.get_or_add(key);
        }
        assert_eq!(manager.len(), 5);
        assert_eq!(manager.max_clusters(), 2);
    }

    #[test]
    fn select_random_on_empty_manager_is_none() {
        let mut manager = ClusterManager::default();
        let mut rng = ChaCha8Rng::from_seed([0; 32]);
        assert!(manager.select_random(&mut rng).is_none());
    }

    #[test]
    fn select_random_covers_all_clusters_uniformly() {
        let mut manager = ClusterManager::default();
        for key in [10, 20, 30, 40] {
            manager.get_or_add(key);
        }
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut counts = std::collections::HashMap::new();
        let draws = 8000;
        for _ in 0..draws {
            let id = manager.select_random(&mut rng).map(|c| c.id());
            *counts.entry(id).or_insert(0usize) += 1;
        }
        assert_eq!(counts.len(), 4);
        for count in counts.values() {
            let share = *count as f64 / draws as f64;
            assert!((share - 0.25).abs() < 0.03, "share {share}");
        }
    }
}
