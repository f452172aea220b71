pub mod cluster;
pub mod cluster_manager;
pub mod clustering;
pub mod config;
pub mod containers;
pub mod corpus;
pub mod entry;
pub mod proximity;
pub mod ring_buffer;
pub mod rng;
pub mod sampler;
pub mod scheduler;
pub mod tracker;

pub use cluster::Cluster;
pub use cluster_manager::ClusterManager;
pub use clustering::{ClusteringPolicy, DfgSignaturePolicy, KMeansPolicy, ModuloPolicy};
pub use config::ProximaConfig;
pub use containers::{ChainedMap, ContainerError, FixedArray, IndexList, NodeHandle};
pub use corpus::{Corpus, CorpusError, InMemoryCorpus};
pub use entry::{EntryId, QueueEntry};
pub use proximity::{DfgNodeInfo, ProximityScore};
pub use ring_buffer::CounterRing;
pub use sampler::{BetaDist, BetaSampler, MarsagliaTsang, SamplerError};
pub use scheduler::{ClusterScheduler, Scheduler, SchedulerError};
pub use tracker::{MutatorTracker, OPERATOR_COUNT, TrackerError};
