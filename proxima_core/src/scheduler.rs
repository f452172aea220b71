use crate::cluster_manager::ClusterManager;
use crate::clustering::ClusteringPolicy;
use crate::containers::{ChainedMap, ContainerError};
use crate::corpus::{Corpus, CorpusError};
use crate::entry::EntryId;
use crate::sampler::{BetaSampler, SamplerError};
use crate::tracker::TrackerError;
use rand_core::RngCore;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors that can occur during scheduler operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    /// No entries are scheduled, so there is nothing to pick.
    #[error("Corpus is empty, cannot schedule next input")]
    CorpusEmpty,
    /// Entries are scheduled but no cluster exists to hold them.
    #[error("No clusters available")]
    NoClusters,
    /// Every scheduled entry was handled in the current cycle.
    #[error("Every scheduled entry was handled in this cycle")]
    CycleExhausted,
    /// The scheduler refers to an entry the corpus does not hold.
    #[error("Entry {0} is not known to the corpus")]
    EntryNotFound(EntryId),
    #[error("Corpus interaction failed within scheduler: {0}")]
    Corpus(#[from] CorpusError),
    #[error("Container error within scheduler: {0}")]
    Container(#[from] ContainerError),
    #[error("Tracker error within scheduler: {0}")]
    Tracker(#[from] TrackerError),
    #[error("Sampler error within scheduler: {0}")]
    Sampler(#[from] SamplerError),
}

impl SchedulerError {
    /// Whether the error signals broken internal state rather than an
    /// exhausted or empty schedule.
    pub fn is_fatal(&self) -> bool {
        match self {
            SchedulerError::CorpusEmpty | SchedulerError::CycleExhausted => false,
            SchedulerError::NoClusters | SchedulerError::EntryNotFound(_) => true,
            SchedulerError::Corpus(_) => true,
            SchedulerError::Container(e) => e.is_fatal(),
            SchedulerError::Tracker(e) => e.is_fatal(),
            SchedulerError::Sampler(e) => e.is_fatal(),
        }
    }
}

/// A `Scheduler` selects the next corpus entry to fuzz and the mutation
/// operator to fuzz it with, and learns from the reported outcomes.
pub trait Scheduler: Send {
    /// Selects the next entry to be fuzzed.
    ///
    /// # Arguments
    /// * `corpus`: The store holding the scheduled entries. Mutable because the
    ///   returned entry is marked as handled for the current cycle.
    /// * `rng`: The random number generator to draw from.
    ///
    /// # Returns
    /// The id of the selected entry, or a `SchedulerError` when nothing can be
    /// scheduled.
    fn next(
        &mut self,
        corpus: &mut dyn Corpus,
        rng: &mut dyn RngCore,
    ) -> Result<EntryId, SchedulerError>;

    /// Chooses the mutation operator to apply to `id`.
    fn choose_operator(
        &self,
        corpus: &dyn Corpus,
        id: EntryId,
        rng: &mut dyn RngCore,
    ) -> Result<usize, SchedulerError>;

    /// Reports the outcome of one trial of operator `op` on entry `id`.
    ///
    /// # Arguments
    /// * `interesting`: Whether the mutated input produced new behaviour.
    fn report_outcome(
        &mut self,
        corpus: &mut dyn Corpus,
        id: EntryId,
        op: usize,
        interesting: bool,
    ) -> Result<(), SchedulerError>;

    /// Closes the current scheduling cycle.
    fn end_cycle(&mut self, corpus: &mut dyn Corpus) -> Result<(), SchedulerError>;
}

/// Schedules entries through proximity-ordered clusters and operators through
/// per-entry Thompson sampling.
///
/// Entries join the cluster named by the clustering policy. Each call to
/// [`next`](Scheduler::next) picks a cluster uniformly at random and takes its
/// highest-scoring entry not yet handled in the current cycle; exhausted
/// clusters defer to the following ones in creation order.
#[derive(Debug)]
pub struct ClusterScheduler {
    manager: ClusterManager,
    policy: Box<dyn ClusteringPolicy>,
    sampler: Box<dyn BetaSampler>,
    /// Entry id to the key of the cluster holding it.
    scheduled: ChainedMap<u32>,
}

impl ClusterScheduler {
    pub fn new(
        manager: ClusterManager,
        policy: Box<dyn ClusteringPolicy>,
        sampler: Box<dyn BetaSampler>,
    ) -> Self {
        Self {
            manager,
            policy,
            sampler,
            scheduled: ChainedMap::new(),
        }
    }

    pub fn manager(&self) -> &ClusterManager {
        &self.manager
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    pub fn sampler_name(&self) -> &'static str {
        self.sampler.name()
    }

    /// Number of scheduled entries.
    pub fn len(&self) -> usize {
        self.scheduled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scheduled.is_empty()
    }

    /// Key of the cluster holding `id`, if it is scheduled.
    pub fn cluster_of(&self, id: EntryId) -> Option<u32> {
        self.scheduled.get(id.0).copied()
    }

    /// Places an entry into the cluster chosen by the clustering policy.
    ///
    /// Adding an entry that is already scheduled leaves it where it is.
    /// Returns the cluster key.
    pub fn add_entry(&mut self, corpus: &dyn Corpus, id: EntryId) -> Result<u32, SchedulerError> {
        if let Some(key) = self.scheduled.get(id.0) {
            return Ok(*key);
        }
        let entry = corpus.get(id).ok_or(SchedulerError::EntryNotFound(id))?;
        let key = self.policy.cluster_key(entry);
        self.manager.get_or_add(key).add_child(id, corpus)?;
        self.scheduled.insert(id.0, key);
        debug!(entry = %id, cluster = key, score = entry.prox_score, "Scheduled entry");
        Ok(key)
    }

    /// Takes an entry out of its cluster. The entry itself stays in the
    /// corpus. Returns `false` when it was not scheduled.
    pub fn remove_entry(&mut self, corpus: &dyn Corpus, id: EntryId) -> bool {
        let Some(key) = self.scheduled.remove(id.0) else {
            return false;
        };
        self.manager
            .get_mut(key)
            .is_some_and(|cluster| cluster.remove_child(id, corpus))
    }

    /// Moves an entry to the rank matching its current score, e.g. after
    /// [`QueueEntry::set_proximity`](crate::entry::QueueEntry::set_proximity)
    /// reported a change.
    pub fn rerank_entry(&mut self, corpus: &dyn Corpus, id: EntryId) -> Result<bool, SchedulerError> {
        let Some(key) = self.cluster_of(id) else {
            return Ok(false);
        };
        match self.manager.get_mut(key) {
            Some(cluster) => Ok(cluster.rerank(id, corpus)?),
            None => Ok(false),
        }
    }

    /// Moves the entry's current statistics into its historical record.
    pub fn reset_entry_statistics(
        &mut self,
        corpus: &mut dyn Corpus,
        id: EntryId,
    ) -> Result<(), SchedulerError> {
        let entry = corpus
            .get_mut(id)
            .ok_or(SchedulerError::EntryNotFound(id))?;
        entry.tracker_mut().reset()?;
        Ok(())
    }
}

impl Scheduler for ClusterScheduler {
    fn next(
        &mut self,
        corpus: &mut dyn Corpus,
        rng: &mut dyn RngCore,
    ) -> Result<EntryId, SchedulerError> {
        if self.scheduled.is_empty() {
            return Err(SchedulerError::CorpusEmpty);
        }
        let start = self
            .manager
            .select_random_index(rng)
            .ok_or(SchedulerError::NoClusters)?;
        let count = self.manager.len();

        for offset in 0..count {
            let pos = (start + offset) % count;
            let Some(cluster) = self.manager.at_mut(pos) else {
                continue;
            };
            let Some(id) = cluster.pick(&*corpus) else {
                continue;
            };
            let cluster_id = cluster.id();
            let entry = corpus
                .get_mut(id)
                .ok_or(SchedulerError::EntryNotFound(id))?;
            entry.handled_in_cycle = true;
            entry.was_fuzzed = true;
            trace!(entry = %id, cluster = cluster_id, "Picked entry");
            return Ok(id);
        }
        Err(SchedulerError::CycleExhausted)
    }

    fn choose_operator(
        &self,
        corpus: &dyn Corpus,
        id: EntryId,
        rng: &mut dyn RngCore,
    ) -> Result<usize, SchedulerError> {
        let entry = corpus.get(id).ok_or(SchedulerError::EntryNotFound(id))?;
        Ok(entry.tracker().select_operator(self.sampler.as_ref(), rng)?)
    }

    fn report_outcome(
        &mut self,
        corpus: &mut dyn Corpus,
        id: EntryId,
        op: usize,
        interesting: bool,
    ) -> Result<(), SchedulerError> {
        let entry = corpus
            .get_mut(id)
            .ok_or(SchedulerError::EntryNotFound(id))?;
        let tracker = entry.tracker_mut();
        tracker.update(op, 1, interesting, 1)?;
        tracker.update_num(interesting);
        Ok(())
    }

    /// Snapshots every scheduled entry's statistics, clears the cycle flags and
    /// rewinds all cluster cursors.
    fn end_cycle(&mut self, corpus: &mut dyn Corpus) -> Result<(), SchedulerError> {
        let ids: Vec<EntryId> = self.scheduled.iter().map(|(id, _)| EntryId(id)).collect();
        for id in ids {
            let entry = corpus
                .get_mut(id)
                .ok_or(SchedulerError::EntryNotFound(id))?;
            entry.tracker_mut().update_queue()?;
            entry.handled_in_cycle = false;
        }
        for cluster in self.manager.iter_mut() {
            cluster.rewind(&*corpus);
        }
        debug!(entries = self.scheduled.len(), "Scheduling cycle closed");
        Ok(())
    }
}
