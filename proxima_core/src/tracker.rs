//! Per-entry Beta-Bernoulli bandit over mutation operators.
//!
//! Each corpus entry owns one [`MutatorTracker`]. It counts, per operator, how
//! many trials were run and how many of them were interesting, keeps
//! entry-wide aggregates, and snapshots those aggregates once per cycle into
//! two rings so recent momentum can be compared with the long-run rate.

use crate::containers::{ContainerError, FixedArray};
use crate::ring_buffer::CounterRing;
use crate::sampler::{BetaDist, BetaSampler, SamplerError, thompson_select};
use rand_core::RngCore;
use thiserror::Error;
use tracing::debug;

/// Number of mutation operators exposed by the mutation engine.
pub const OPERATOR_COUNT: usize = 17;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("Tracker storage error: {0}")]
    Container(#[from] ContainerError),
    #[error("Tracker sampling error: {0}")]
    Sampler(#[from] SamplerError),
}

impl TrackerError {
    pub fn is_fatal(&self) -> bool {
        match self {
            TrackerError::Container(e) => e.is_fatal(),
            TrackerError::Sampler(e) => e.is_fatal(),
        }
    }
}

/// Raw trial counts. `interesting[op] <= total[op]` and
/// `inter_num <= total_num` always hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorCounts {
    interesting: FixedArray<u64>,
    total: FixedArray<u64>,
    pub inter_num: u64,
    pub total_num: u64,
}

impl OperatorCounts {
    fn new() -> Result<Self, ContainerError> {
        Ok(Self {
            interesting: FixedArray::new(OPERATOR_COUNT)?,
            total: FixedArray::new(OPERATOR_COUNT)?,
            inter_num: 0,
            total_num: 0,
        })
    }

    pub fn interesting(&self, op: usize) -> Result<u64, ContainerError> {
        self.interesting.get(op)
    }

    pub fn total(&self, op: usize) -> Result<u64, ContainerError> {
        self.total.get(op)
    }

    fn add_assign(&mut self, other: &OperatorCounts) -> Result<(), ContainerError> {
        for op in 0..OPERATOR_COUNT {
            self.interesting.set(
                op,
                self.interesting.get(op)?.saturating_add(other.interesting.get(op)?),
            )?;
            self.total
                .set(op, self.total.get(op)?.saturating_add(other.total.get(op)?))?;
        }
        self.inter_num = self.inter_num.saturating_add(other.inter_num);
        self.total_num = self.total_num.saturating_add(other.total_num);
        Ok(())
    }

    fn clear(&mut self) {
        self.interesting.fill(0);
        self.total.fill(0);
        self.inter_num = 0;
        self.total_num = 0;
    }
}

#[derive(Debug, Clone)]
pub struct MutatorTracker {
    current: OperatorCounts,
    inter_queue: CounterRing,
    total_queue: CounterRing,
    old: Option<Box<OperatorCounts>>,
}

impl MutatorTracker {
    /// Creates a tracker whose momentum rings remember `ring_capacity` cycles.
    pub fn new(ring_capacity: usize) -> Result<Self, ContainerError> {
        Ok(Self {
            current: OperatorCounts::new()?,
            inter_queue: CounterRing::new(ring_capacity)?,
            total_queue: CounterRing::new(ring_capacity)?,
            old: None,
        })
    }

    pub fn counts(&self) -> &OperatorCounts {
        &self.current
    }

    /// Cumulative counts from before the last [`reset`](Self::reset), if any.
    pub fn old(&self) -> Option<&OperatorCounts> {
        self.old.as_deref()
    }

    pub fn inter_num(&self) -> u64 {
        self.current.inter_num
    }

    pub fn total_num(&self) -> u64 {
        self.current.total_num
    }

    pub fn interesting(&self, op: usize) -> Result<u64, ContainerError> {
        self.current.interesting(op)
    }

    pub fn total(&self, op: usize) -> Result<u64, ContainerError> {
        self.current.total(op)
    }

    pub fn ring_capacity(&self) -> usize {
        self.inter_queue.capacity()
    }

    /// Records `selection_count * multiplier` trials of operator `op`.
    ///
    /// The trials also count as interesting when `interesting` is set. A zero
    /// `selection_count` is a no-op.
    pub fn update(
        &mut self,
        op: usize,
        selection_count: u32,
        interesting: bool,
        multiplier: u32,
    ) -> Result<(), ContainerError> {
        let total = self.current.total.get(op)?;
        if selection_count == 0 {
            return Ok(());
        }
        let scaled = u64::from(selection_count) * u64::from(multiplier);
        self.current.total.set(op, total.saturating_add(scaled))?;
        if interesting {
            let hits = self.current.interesting.get(op)?;
            self.current.interesting.set(op, hits.saturating_add(scaled))?;
        }
        Ok(())
    }

    /// Counts one entry-level trial, independent of which operators ran.
    pub fn update_num(&mut self, interesting: bool) {
        self.current.total_num = self.current.total_num.saturating_add(1);
        if interesting {
            self.current.inter_num = self.current.inter_num.saturating_add(1);
        }
    }

    /// Snapshots the aggregate counters into the momentum rings.
    pub fn update_queue(&mut self) -> Result<(), ContainerError> {
        self.inter_queue.enqueue(self.current.inter_num)?;
        self.total_queue.enqueue(self.current.total_num)?;
        Ok(())
    }

    /// Entry-level posterior.
    pub fn posterior(&self) -> BetaDist {
        BetaDist::from_counts(self.current.inter_num, self.current.total_num)
    }

    /// Posterior of operator `op`.
    pub fn operator_posterior(&self, op: usize) -> Result<BetaDist, ContainerError> {
        Ok(BetaDist::from_counts(
            self.current.interesting.get(op)?,
            self.current.total.get(op)?,
        ))
    }

    /// Entry-level posterior over historical plus current counts.
    pub fn historical_posterior(&self) -> BetaDist {
        let (inter, total) = match &self.old {
            Some(old) => (
                old.inter_num.saturating_add(self.current.inter_num),
                old.total_num.saturating_add(self.current.total_num),
            ),
            None => (self.current.inter_num, self.current.total_num),
        };
        BetaDist::from_counts(inter, total)
    }

    /// Interesting trials per trial over the last `window` cycle snapshots.
    ///
    /// `window` is clamped to the ring capacity. Returns `0.0` for a zero
    /// window or when no trials happened inside it.
    pub fn short_term_gradient(&self, window: usize) -> Result<f64, ContainerError> {
        let window = window.min(self.ring_capacity());
        if window == 0 {
            return Ok(0.0);
        }
        let total_diff = self.total_queue.diff(window)?;
        if total_diff == 0 {
            return Ok(0.0);
        }
        let inter_diff = self.inter_queue.diff(window)?;
        Ok(inter_diff as f64 / total_diff as f64)
    }

    /// Moves the current counts into the historical record and starts over.
    ///
    /// Historical counts only ever grow. The momentum rings are cleared.
    pub fn reset(&mut self) -> Result<(), ContainerError> {
        if self.old.is_none() {
            self.old = Some(Box::new(OperatorCounts::new()?));
        }
        if let Some(old) = self.old.as_mut() {
            old.add_assign(&self.current)?;
        }
        debug!(
            inter_num = self.current.inter_num,
            total_num = self.current.total_num,
            "Mutator tracker reset"
        );
        self.current.clear();
        self.inter_queue.clear();
        self.total_queue.clear();
        Ok(())
    }

    /// Picks an operator by Thompson sampling over the operator posteriors,
    /// each rescaled against the entry-level posterior.
    pub fn select_operator(
        &self,
        sampler: &dyn BetaSampler,
        rng: &mut dyn RngCore,
    ) -> Result<usize, TrackerError> {
        let global = self.posterior();
        let mut arms = Vec::with_capacity(OPERATOR_COUNT);
        for op in 0..OPERATOR_COUNT {
            arms.push(self.operator_posterior(op)?.rescale_against(&global));
        }
        Ok(thompson_select(&arms, sampler, rng)?.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::MarsagliaTsang;
    use rand_chacha::ChaCha8Rng;
    use rand_core::SeedableRng;

    fn tracker() -> MutatorTracker {
        MutatorTracker::new(8).unwrap()
    }

    #[test]
    fn fresh_tracker_posterior_is_beta_two_two() {
        let t = tracker();
        let dist = t.posterior();
        assert_eq!(dist, BetaDist { alpha: 2.0, beta: 2.0 });
        assert_eq!(dist.mode(), 0.5);
        assert!(t.old().is_none());
    }

    #[test]
    fn update_scales_by_multiplier() {
        let mut t = tracker();
        t.update(3, 2, true, 4).unwrap();
        t.update(3, 1, false, 4).unwrap();
        assert_eq!(t.total(3).unwrap(), 12);
        assert_eq!(t.interesting(3).unwrap(), 8);
        let dist = t.operator_posterior(3).unwrap();
        assert_eq!(dist, BetaDist { alpha: 10.0, beta: 6.0 });
    }

    #[test]
    fn zero_selection_count_is_a_noop() {
        let mut t = tracker();
        t.update(0, 0, true, 9).unwrap();
        assert_eq!(t.total(0).unwrap(), 0);
        assert_eq!(t.interesting(0).unwrap(), 0);
    }

    #[test]
    fn operator_out_of_range_is_a_bounds_violation() {
        let mut t = tracker();
        assert_eq!(
            t.update(OPERATOR_COUNT, 1, false, 1),
            Err(ContainerError::BoundsViolation {
                index: OPERATOR_COUNT,
                size: OPERATOR_COUNT
            })
        );
        assert!(t.operator_posterior(40).is_err());
    }

    #[test]
    fn update_num_tracks_entry_aggregates() {
        let mut t = tracker();
        t.update_num(true);
        t.update_num(false);
        t.update_num(false);
        assert_eq!((t.inter_num(), t.total_num()), (1, 3));
        assert_eq!(t.posterior(), BetaDist { alpha: 3.0, beta: 4.0 });
    }

    #[test]
    fn update_num_saturates_at_counter_limit() {
        let mut t = tracker();
        t.current.total_num = u64::MAX;
        t.current.inter_num = u64::MAX;
        t.update_num(true);
        assert_eq!((t.inter_num(), t.total_num()), (u64::MAX, u64::MAX));
    }

    #[test]
    fn short_term_gradient_uses_windowed_rates() {
        let mut t = tracker();
        // cycle 1: 10 trials, 1 interesting
        for i in 0..10 {
            t.update_num(i == 0);
        }
        t.update_queue().unwrap();
        // cycle 2: 10 trials, 5 interesting
        for i in 0..10 {
            t.update_num(i < 5);
        }
        t.update_queue().unwrap();
        assert_eq!(t.short_term_gradient(1).unwrap(), 0.5);
        assert_eq!(t.short_term_gradient(0).unwrap(), 0.0);
    }

    #[test]
    fn short_term_gradient_without_trials_is_zero() {
        let mut t = tracker();
        t.update_queue().unwrap();
        t.update_queue().unwrap();
        assert_eq!(t.short_term_gradient(1).unwrap(), 0.0);
        assert_eq!(tracker().short_term_gradient(4).unwrap(), 0.0);
    }

    #[test]
    fn reset_accumulates_into_old_and_clears_current() {
        let mut t = tracker();
        t.update(1, 3, true, 1).unwrap();
        t.update_num(true);
        t.update_num(false);
        t.update_queue().unwrap();
        t.reset().unwrap();

        assert_eq!(t.total_num(), 0);
        assert_eq!(t.total(1).unwrap(), 0);
        assert_eq!(t.short_term_gradient(4).unwrap(), 0.0);
        let old = t.old().unwrap();
        assert_eq!((old.inter_num, old.total_num), (1, 2));
        assert_eq!(old.interesting(1).unwrap(), 3);

        t.update(1, 2, false, 1).unwrap();
        t.update_num(true);
        t.reset().unwrap();
        let old = t.old().unwrap();
        assert_eq!((old.inter_num, old.total_num), (2, 3));
        assert_eq!(old.total(1).unwrap(), 5);
        assert_eq!(old.interesting(1).unwrap(), 3);
    }

    #[test]
    fn historical_posterior_combines_old_and_current() {
        let mut t = tracker();
        t.update_num(true);
        t.reset().unwrap();
        t.update_num(false);
        assert_eq!(t.historical_posterior(), BetaDist { alpha: 3.0, beta: 3.0 });
        assert_eq!(t.posterior(), BetaDist { alpha: 2.0, beta: 3.0 });
    }

    #[test]
    fn select_operator_converges_on_productive_operator() {
        let mut t = tracker();
        for op in 0..OPERATOR_COUNT {
            t.update(op, 200, false, 1).unwrap();
        }
        t.update(11, 200, true, 1).unwrap();
        for i in 0..400 {
            t.update_num(i % 8 == 0);
        }
        let mut rng = ChaCha8Rng::seed_from_u64(99);
        let mut hits = 0;
        for _ in 0..200 {
            if t.select_operator(&MarsagliaTsang, &mut rng).unwrap() == 11 {
                hits += 1;
            }
        }
        assert_eq!(hits, 200);
    }

    #[test]
    fn select_operator_on_fresh_tracker_explores() {
        let t = tracker();
        let mut rng = ChaCha8Rng::from_seed([4; 32]);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            let op = t.select_operator(&MarsagliaTsang, &mut rng).unwrap();
            assert!(op < OPERATOR_COUNT);
            seen.insert(op);
        }
        assert!(seen.len() > OPERATOR_COUNT / 2);
    }
}
