//! A simulated fuzzing campaign.
//!
//! No program is executed. A hidden [`TargetModel`] decides whether a trial of
//! an operator is interesting, and interesting trials either extend the
//! parent's DFG coverage or, when they reach a node nobody covered yet, add a
//! new entry to the corpus.

use proxima_core::config::CampaignSettings;
use proxima_core::corpus::{Corpus, InMemoryCorpus};
use proxima_core::entry::{EntryId, QueueEntry};
use proxima_core::proximity::{DfgNodeInfo, ProximityScore};
use proxima_core::scheduler::{ClusterScheduler, Scheduler, SchedulerError};
use proxima_core::tracker::OPERATOR_COUNT;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::debug;

/// Cycles without an interesting trial after which an entry's statistics are
/// retired into its history.
const STALE_WINDOW: usize = 4;
const STALE_MIN_TRIALS: u64 = 64;

/// Ground truth standing in for the instrumented target.
#[derive(Debug, Clone)]
pub struct TargetModel {
    nodes: Vec<DfgNodeInfo>,
    operator_success: Vec<f64>,
}

impl TargetModel {
    /// A random graph of `node_count` nodes and one operator that is far more
    /// productive than the rest.
    pub fn generate(node_count: u32, rng: &mut ChaCha8Rng) -> Self {
        let nodes = (0..node_count.max(1))
            .map(|idx| DfgNodeInfo {
                idx,
                score: rng.random_range(1..=100),
                max_paths: rng.random_range(1..=4),
            })
            .collect();
        let mut operator_success: Vec<f64> = (0..OPERATOR_COUNT)
            .map(|_| rng.random_range(0.005..0.05))
            .collect();
        let strong = rng.random_range(0..OPERATOR_COUNT);
        operator_success[strong] = 0.3;
        Self {
            nodes,
            operator_success,
        }
    }

    pub fn nodes(&self) -> &[DfgNodeInfo] {
        &self.nodes
    }

    pub fn best_operator(&self) -> usize {
        argmax(self.operator_success.iter().copied())
    }

    fn random_node(&self, rng: &mut ChaCha8Rng) -> &DfgNodeInfo {
        &self.nodes[rng.random_range(0..self.nodes.len())]
    }

    fn execute(&self, op: usize, rng: &mut ChaCha8Rng) -> bool {
        self.operator_success
            .get(op)
            .is_some_and(|p| rng.random_bool(*p))
    }
}

fn argmax<T: PartialOrd>(values: impl Iterator<Item = T>) -> usize {
    let mut best: Option<(usize, T)> = None;
    for (idx, v) in values.enumerate() {
        match &best {
            Some((_, top)) if v <= *top => {}
            _ => best = Some((idx, v)),
        }
    }
    best.map_or(0, |(idx, _)| idx)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub entries_fuzzed: u64,
    pub executions: u64,
    pub interesting: u64,
    pub discoveries: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CampaignSummary {
    pub seed: u64,
    pub policy: &'static str,
    pub sampler: &'static str,
    pub cycles: u64,
    pub executions: u64,
    pub interesting: u64,
    pub discoveries: u64,
    pub reranks: u64,
    pub stale_resets: u64,
    pub corpus_size: usize,
    pub clusters: usize,
    pub covered_nodes: usize,
    pub best_operator: usize,
    pub favourite_operator: usize,
    pub operator_selections: Vec<u64>,
    /// Mean of every entry's all-time success posterior.
    pub mean_entry_posterior: f64,
}

pub struct Campaign {
    settings: CampaignSettings,
    ring_capacity: usize,
    model: TargetModel,
    corpus: InMemoryCorpus,
    scheduler: ClusterScheduler,
    rng: ChaCha8Rng,
    seed: u64,
    global_coverage: Vec<bool>,
    cycles: u64,
    executions: u64,
    interesting: u64,
    discoveries: u64,
    reranks: u64,
    stale_resets: u64,
    operator_selections: Vec<u64>,
}

impl Campaign {
    /// Builds the target model and schedules `seed_entries` initial inputs.
    pub fn new(
        settings: CampaignSettings,
        ring_capacity: usize,
        scheduler: ClusterScheduler,
        mut rng: ChaCha8Rng,
        seed: u64,
    ) -> anyhow::Result<Self> {
        let model = TargetModel::generate(settings.dfg_nodes, &mut rng);
        let node_count = model.nodes().len();
        let mut campaign = Self {
            settings,
            ring_capacity,
            model,
            corpus: InMemoryCorpus::new(),
            scheduler,
            rng,
            seed,
            global_coverage: vec![false; node_count],
            cycles: 0,
            executions: 0,
            interesting: 0,
            discoveries: 0,
            reranks: 0,
            stale_resets: 0,
            operator_selections: vec![0; OPERATOR_COUNT],
        };

        for _ in 0..campaign.settings.seed_entries {
            let touched = campaign.rng.random_range(1..=4);
            let hits: Vec<(u32, u32)> = (0..touched)
                .map(|_| {
                    let node = campaign.model.random_node(&mut campaign.rng).idx;
                    (node, campaign.rng.random_range(1..=5))
                })
                .collect();
            campaign.add_input(&hits)?;
        }
        Ok(campaign)
    }

    pub fn corpus(&self) -> &InMemoryCorpus {
        &self.corpus
    }

    pub fn scheduler(&self) -> &ClusterScheduler {
        &self.scheduler
    }

    /// Fuzzes every scheduled entry once, then closes the cycle.
    pub fn run_cycle(&mut self) -> anyhow::Result<CycleReport> {
        let mut report = CycleReport::default();
        loop {
            let id = match self.scheduler.next(&mut self.corpus, &mut self.rng) {
                Ok(id) => id,
                Err(SchedulerError::CycleExhausted | SchedulerError::CorpusEmpty) => break,
                Err(e) => return Err(e.into()),
            };
            report.entries_fuzzed += 1;
            self.fuzz_entry(id, &mut report)?;
        }

        self.scheduler.end_cycle(&mut self.corpus)?;
        self.retire_stale_statistics()?;
        self.cycles += 1;

        self.executions += report.executions;
        self.interesting += report.interesting;
        self.discoveries += report.discoveries;
        Ok(report)
    }

    pub fn summary(&self) -> CampaignSummary {
        let posteriors: Vec<f64> = self
            .corpus
            .entries()
            .map(|e| e.tracker().historical_posterior().mean())
            .collect();
        let mean_entry_posterior = if posteriors.is_empty() {
            0.0
        } else {
            posteriors.iter().sum::<f64>() / posteriors.len() as f64
        };

        CampaignSummary {
            seed: self.seed,
            policy: self.scheduler.policy_name(),
            sampler: self.scheduler.sampler_name(),
            cycles: self.cycles,
            executions: self.executions,
            interesting: self.interesting,
            discoveries: self.discoveries,
            reranks: self.reranks,
            stale_resets: self.stale_resets,
            corpus_size: self.corpus.len(),
            clusters: self.scheduler.manager().len(),
            covered_nodes: self.global_coverage.iter().filter(|c| **c).count(),
            best_operator: self.model.best_operator(),
            favourite_operator: argmax(self.operator_selections.iter().copied()),
            operator_selections: self.operator_selections.clone(),
            mean_entry_posterior,
        }
    }

    fn add_input(&mut self, hits: &[(u32, u32)]) -> anyhow::Result<EntryId> {
        let len = self.rng.random_range(4..64);
        let input: Vec<u8> = (0..len).map(|_| self.rng.random()).collect();
        let proximity = ProximityScore::from_hits(self.model.nodes(), hits)?;

        let id = self.corpus.next_id()?;
        let entry = QueueEntry::new(id, &input, proximity, self.ring_capacity)?;
        let id = self.corpus.add(entry)?;
        self.scheduler.add_entry(&self.corpus, id)?;

        for (node, _) in hits {
            if let Some(covered) = self.global_coverage.get_mut(*node as usize) {
                *covered = true;
            }
        }
        Ok(id)
    }

    fn fuzz_entry(&mut self, id: EntryId, report: &mut CycleReport) -> anyhow::Result<()> {
        for _ in 0..self.settings.executions_per_entry {
            let op = self
                .scheduler
                .choose_operator(&self.corpus, id, &mut self.rng)?;
            let interesting = self.model.execute(op, &mut self.rng);
            self.scheduler
                .report_outcome(&mut self.corpus, id, op, interesting)?;

            report.executions += 1;
            self.operator_selections[op] += 1;
            if interesting {
                report.interesting += 1;
                self.on_interesting(id, report)?;
            }
        }
        Ok(())
    }

    fn on_interesting(&mut self, id: EntryId, report: &mut CycleReport) -> anyhow::Result<()> {
        let node = *self.model.random_node(&mut self.rng);
        let novel = !self.global_coverage[node.idx as usize];
        let discovery_rate = self.settings.discovery_rate.clamp(0.0, 1.0);

        if novel && self.rng.random_bool(discovery_rate) {
            let mut hits = self
                .corpus
                .get(id)
                .map(|e| e.proximity().dense().to_vec())
                .unwrap_or_default();
            hits.push((node.idx, 1));
            let child = self.add_input(&hits)?;
            report.discoveries += 1;
            debug!(parent = %id, entry = %child, node = node.idx, "Discovered new entry");
            return Ok(());
        }

        let Some(entry) = self.corpus.get_mut(id) else {
            return Err(SchedulerError::EntryNotFound(id).into());
        };
        let mut proximity = entry.proximity().clone();
        proximity.record(&node, 1)?;
        self.global_coverage[node.idx as usize] = true;
        if entry.set_proximity(proximity) {
            self.scheduler.rerank_entry(&self.corpus, id)?;
            self.reranks += 1;
        }
        Ok(())
    }

    fn retire_stale_statistics(&mut self) -> anyhow::Result<()> {
        for id in self.corpus.ids() {
            let stale = match self.corpus.get(id) {
                Some(entry) => {
                    let tracker = entry.tracker();
                    tracker.total_num() >= STALE_MIN_TRIALS
                        && tracker.short_term_gradient(STALE_WINDOW)? == 0.0
                }
                None => false,
            };
            if stale {
                self.scheduler
                    .reset_entry_statistics(&mut self.corpus, id)?;
                self.stale_resets += 1;
                debug!(entry = %id, "Retired stale entry statistics");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proxima_core::config::SchedulerSettings;
    use proxima_core::rng;

    fn campaign(settings: CampaignSettings, seed: u64) -> Campaign {
        let scheduler = SchedulerSettings::default().build_scheduler();
        Campaign::new(settings, 16, scheduler, rng::seeded(seed), seed).unwrap()
    }

    #[test]
    fn every_entry_is_fuzzed_each_cycle() {
        let mut c = campaign(
            CampaignSettings {
                discovery_rate: 0.0,
                ..CampaignSettings::default()
            },
            3,
        );
        let seeds = c.corpus().len() as u64;
        let report = c.run_cycle().unwrap();
        assert_eq!(report.entries_fuzzed, seeds);
        assert_eq!(report.discoveries, 0);
        assert_eq!(
            report.executions,
            seeds * u64::from(CampaignSettings::default().executions_per_entry)
        );
        assert!(c.corpus().entries().all(|e| e.was_fuzzed && !e.handled_in_cycle));
    }

    #[test]
    fn corpus_growth_is_bounded_by_the_graph() {
        let settings = CampaignSettings {
            dfg_nodes: 12,
            discovery_rate: 1.0,
            ..CampaignSettings::default()
        };
        let mut c = campaign(settings.clone(), 11);
        for _ in 0..20 {
            c.run_cycle().unwrap();
        }
        let summary = c.summary();
        assert!(summary.corpus_size <= settings.seed_entries + settings.dfg_nodes as usize);
        assert_eq!(summary.corpus_size as u64, settings.seed_entries as u64 + summary.discoveries);
        assert!(summary.covered_nodes <= 12);
        assert_eq!(summary.cycles, 20);
    }

    #[test]
    fn bandit_favours_the_productive_operator() {
        let mut c = campaign(CampaignSettings::default(), 5);
        for _ in 0..10 {
            c.run_cycle().unwrap();
        }
        let summary = c.summary();
        let uniform_share = summary.executions / OPERATOR_COUNT as u64;
        assert!(summary.operator_selections[summary.best_operator] > uniform_share);
        assert_eq!(
            summary.operator_selections.iter().sum::<u64>(),
            summary.executions
        );
    }

    #[test]
    fn empty_corpus_cycles_are_noops() {
        let mut c = campaign(
            CampaignSettings {
                seed_entries: 0,
                ..CampaignSettings::default()
            },
            1,
        );
        assert_eq!(c.run_cycle().unwrap(), CycleReport::default());
        assert_eq!(c.summary().mean_entry_posterior, 0.0);
    }

    #[test]
    fn argmax_prefers_first_maximum() {
        assert_eq!(argmax([1, 5, 5, 2].into_iter()), 1);
        assert_eq!(argmax(std::iter::empty::<u64>()), 0);
    }

    #[test]
    fn summary_serializes_to_json() {
        let c = campaign(CampaignSettings::default(), 2);
        let json = serde_json::to_value(c.summary()).unwrap();
        assert_eq!(json["policy"], "DfgSignaturePolicy");
        assert_eq!(json["operator_selections"].as_array().map(Vec::len), Some(OPERATOR_COUNT));
    }
}
