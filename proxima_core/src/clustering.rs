//! Policies mapping a corpus entry to the key of the cluster it joins.

use crate::entry::QueueEntry;
use tracing::debug;

/// Decides which cluster an entry belongs to.
///
/// Called once per entry, when it is first scheduled. Policies may keep state
/// between calls (e.g. to learn a partition from the entries seen so far).
pub trait ClusteringPolicy: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;

    fn cluster_key(&mut self, entry: &QueueEntry) -> u32;
}

/// `entry_id % modulus`. Spreads entries evenly with no regard to coverage;
/// useful as a baseline.
#[derive(Debug, Clone, Copy)]
pub struct ModuloPolicy {
    modulus: u32,
}

impl ModuloPolicy {
    pub fn new(modulus: u32) -> Self {
        Self {
            modulus: modulus.max(1),
        }
    }
}

impl ClusteringPolicy for ModuloPolicy {
    fn name(&self) -> &'static str {
        "ModuloPolicy"
    }

    fn cluster_key(&mut self, entry: &QueueEntry) -> u32 {
        entry.entry_id.0 % self.modulus
    }
}

/// Groups entries by the signature of the DFG nodes they covered, folded into
/// `buckets` clusters.
#[derive(Debug, Clone, Copy)]
pub struct DfgSignaturePolicy {
    buckets: u32,
}

impl DfgSignaturePolicy {
    pub fn new(buckets: u32) -> Self {
        Self {
            buckets: buckets.max(1),
        }
    }
}

impl ClusteringPolicy for DfgSignaturePolicy {
    fn name(&self) -> &'static str {
        "DfgSignaturePolicy"
    }

    fn cluster_key(&mut self, entry: &QueueEntry) -> u32 {
        entry.dfg_hash % self.buckets
    }
}

/// k-means over DFG coverage vectors.
///
/// Until `min_samples` entries have been seen, entries are buffered and
/// placed by `k + dfg_hash % k`, a key range disjoint from the centroid keys
/// `0..k`. The entry that completes the buffer triggers a single fit and
/// joins its nearest centroid like every later entry. The model is never
/// refitted, so keys stay stable for the whole campaign.
#[derive(Debug, Clone)]
pub struct KMeansPolicy {
    k: usize,
    min_samples: usize,
    max_iterations: usize,
    samples: Vec<Vec<f64>>,
    centroids: Option<Vec<Vec<f64>>>,
}

impl KMeansPolicy {
    pub fn new(k: u32, min_samples: usize, max_iterations: usize) -> Self {
        let k = k.max(1) as usize;
        Self {
            k,
            min_samples: min_samples.max(k),
            max_iterations: max_iterations.max(1),
            samples: Vec::new(),
            centroids: None,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.centroids.is_some()
    }

    pub fn centroids(&self) -> Option<&[Vec<f64>]> {
        self.centroids.as_deref()
    }

    fn fit(&mut self) {
        let centroids = fit_centroids(&self.samples, self.k, self.max_iterations);
        debug!(
            k = self.k,
            samples = self.samples.len(),
            "Fitted k-means clustering model"
        );
        self.samples.clear();
        self.centroids = Some(centroids);
    }
}

impl ClusteringPolicy for KMeansPolicy {
    fn name(&self) -> &'static str {
        "KMeansPolicy"
    }

    fn cluster_key(&mut self, entry: &QueueEntry) -> u32 {
        let point: Vec<f64> = entry
            .proximity()
            .coverage_vector()
            .iter()
            .map(|c| f64::from(*c))
            .collect();

        if self.centroids.is_none() {
            self.samples.push(point.clone());
            if self.samples.len() < self.min_samples {
                let k = self.k as u32;
                return k.saturating_add(entry.dfg_hash % k);
            }
            self.fit();
        }

        match &self.centroids {
            Some(centroids) => nearest(centroids, &point) as u32,
            None => 0,
        }
    }
}

/// Squared Euclidean distance; missing trailing coordinates count as zero.
fn distance(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let d = a.get(i).copied().unwrap_or(0.0) - b.get(i).copied().unwrap_or(0.0);
            d * d
        })
        .sum()
}

fn nearest(centroids: &[Vec<f64>], point: &[f64]) -> usize {
    let mut best = (0, f64::INFINITY);
    for (idx, c) in centroids.iter().enumerate() {
        let d = distance(c, point);
        if d < best.1 {
            best = (idx, d);
        }
    }
    best.0
}

/// Lloyd's algorithm seeded with farthest-point initialization.
fn fit_centroids(samples: &[Vec<f64>], k: usize, max_iterations: usize) -> Vec<Vec<f64>> {
    let Some(first) = samples.first() else {
        return Vec::new();
    };
    let dims = samples.iter().map(Vec::len).max().unwrap_or(0);

    let mut centroids: Vec<Vec<f64>> = vec![first.clone()];
    while centroids.len() < k {
        let farthest = samples
            .iter()
            .map(|s| {
                let d = centroids
                    .iter()
                    .map(|c| distance(c, s))
                    .fold(f64::INFINITY, f64::min);
                (s, d)
            })
            .fold(None::<(&Vec<f64>, f64)>, |best, cand| match best {
                Some((_, d)) if d >= cand.1 => best,
                _ => Some(cand),
            });
        match farthest {
            Some((s, d)) if d > 0.0 => centroids.push(s.clone()),
            // Fewer distinct points than clusters.
            _ => break,
        }
    }

    for _ in 0..max_iterations {
        let mut sums = vec![vec![0.0; dims]; centroids.len()];
        let mut counts = vec![0usize; centroids.len()];
        for s in samples {
            let idx = nearest(&centroids, s);
            counts[idx] += 1;
            for (acc, v) in sums[idx].iter_mut().zip(s.iter()) {
                *acc += v;
            }
        }

        let mut moved = false;
        for (idx, centroid) in centroids.iter_mut().enumerate() {
            if counts[idx] == 0 {
                continue;
            }
            let updated: Vec<f64> = sums[idx].iter().map(|v| v / counts[idx] as f64).collect();
            if distance(&updated, centroid) > 1e-12 {
                moved = true;
            }
            *centroid = updated;
        }
        if !moved {
            break;
        }
    }
    centroids
}
