use crate::cluster_manager::{ClusterManager, DEFAULT_MAX_CLUSTERS};
use crate::clustering::{ClusteringPolicy, DfgSignaturePolicy, KMeansPolicy, ModuloPolicy};
use crate::sampler::{BetaSampler, MarsagliaTsang};
use crate::scheduler::ClusterScheduler;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum SamplerBackend {
    #[default]
    MarsagliaTsang,
    RandDistr,
}

impl SamplerBackend {
    /// Builds the configured sampler. `rand-distr` falls back to the native
    /// sampler when the crate was built without the `rand-distr` feature.
    pub fn build(self) -> Box<dyn BetaSampler> {
        match self {
            SamplerBackend::MarsagliaTsang => Box::new(MarsagliaTsang),
            #[cfg(feature = "rand-distr")]
            SamplerBackend::RandDistr => Box::new(crate::sampler::RandDistrBeta),
            #[cfg(not(feature = "rand-distr"))]
            SamplerBackend::RandDistr => {
                tracing::warn!("rand-distr sampler requested but not compiled in, using marsaglia-tsang");
                Box::new(MarsagliaTsang)
            }
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "policy", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum ClusteringConfig {
    Modulo {
        #[serde(default = "default_modulus")]
        modulus: u32,
    },
    DfgSignature {
        #[serde(default = "default_buckets")]
        buckets: u32,
    },
    KMeans {
        #[serde(default = "default_k")]
        k: u32,
        #[serde(default = "default_min_samples")]
        min_samples: usize,
        #[serde(default = "default_max_iterations")]
        max_iterations: usize,
    },
}

fn default_modulus() -> u32 {
    5
}

fn default_buckets() -> u32 {
    DEFAULT_MAX_CLUSTERS as u32
}

fn default_k() -> u32 {
    8
}

fn default_min_samples() -> usize {
    32
}

fn default_max_iterations() -> usize {
    50
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        ClusteringConfig::DfgSignature {
            buckets: default_buckets(),
        }
    }
}

impl ClusteringConfig {
    pub fn build(&self) -> Box<dyn ClusteringPolicy> {
        match *self {
            ClusteringConfig::Modulo { modulus } => Box::new(ModuloPolicy::new(modulus)),
            ClusteringConfig::DfgSignature { buckets } => {
                Box::new(DfgSignaturePolicy::new(buckets))
            }
            ClusteringConfig::KMeans {
                k,
                min_samples,
                max_iterations,
            } => Box::new(KMeansPolicy::new(k, min_samples, max_iterations)),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct SchedulerSettings {
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
    #[serde(default = "default_max_clusters")]
    pub max_clusters: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub sampler: SamplerBackend,
    #[serde(default)]
    pub clustering: ClusteringConfig,
}

pub fn default_ring_capacity() -> usize {
    256
}

pub fn default_max_clusters() -> usize {
    DEFAULT_MAX_CLUSTERS
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            ring_capacity: default_ring_capacity(),
            max_clusters: default_max_clusters(),
            seed: None,
            sampler: SamplerBackend::default(),
            clustering: ClusteringConfig::default(),
        }
    }
}

impl SchedulerSettings {
    pub fn build_scheduler(&self) -> ClusterScheduler {
        ClusterScheduler::new(
            ClusterManager::new(self.max_clusters),
            self.clustering.build(),
            self.sampler.build(),
        )
    }
}

/// Parameters of a simulated campaign driven by the CLI.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CampaignSettings {
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u64,
    #[serde(default = "default_seed_entries")]
    pub seed_entries: usize,
    #[serde(default = "default_dfg_nodes")]
    pub dfg_nodes: u32,
    #[serde(default = "default_executions_per_entry")]
    pub executions_per_entry: u32,
    /// Chance that an interesting trial yields a new corpus entry rather than
    /// extra coverage for its parent.
    #[serde(default = "default_discovery_rate")]
    pub discovery_rate: f64,
}

pub fn default_max_cycles() -> u64 {
    50
}
pub fn default_seed_entries() -> usize {
    8
}
pub fn default_dfg_nodes() -> u32 {
    64
}
pub fn default_executions_per_entry() -> u32 {
    32
}
pub fn default_discovery_rate() -> f64 {
    0.25
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            seed_entries: default_seed_entries(),
            dfg_nodes: default_dfg_nodes(),
            executions_per_entry: default_executions_per_entry(),
            discovery_rate: default_discovery_rate(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ProximaConfig {
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    #[serde(default)]
    pub campaign: Option<CampaignSettings>,
}

impl ProximaConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;

        let config: ProximaConfig = toml::from_str(&content).map_err(|e| {
            anyhow::anyhow!("Failed to parse TOML from config file {:?}: {}", path, e)
        })?;

        Ok(config)
    }
}
