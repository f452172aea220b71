use crate::containers::ContainerError;
use crate::proximity::ProximityScore;
use crate::tracker::MutatorTracker;
use std::fmt;

/// Identity of a corpus entry. Ids are handed out by the corpus and never
/// reused, so a stale id cannot alias a newer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub u32);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// First four bytes of an MD5 digest, little-endian.
fn digest_u32(data: &[u8]) -> u32 {
    let digest = md5::compute(data);
    u32::from_le_bytes([digest.0[0], digest.0[1], digest.0[2], digest.0[3]])
}

/// Signature of the set of DFG nodes an entry touched.
fn dfg_signature(proximity: &ProximityScore) -> u32 {
    let mut covered: Vec<u32> = proximity.dense().iter().map(|(idx, _)| *idx).collect();
    covered.sort_unstable();
    let bytes: Vec<u8> = covered.iter().flat_map(|idx| idx.to_le_bytes()).collect();
    digest_u32(&bytes)
}

/// A scheduled test case.
///
/// The corpus owns entries; clusters only refer to them by [`EntryId`].
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub entry_id: EntryId,
    pub len: usize,
    pub handled_in_cycle: bool,
    pub was_fuzzed: bool,
    pub favored: bool,
    pub fs_redundant: bool,
    /// Drives cluster ordering; mirrors `proximity.original`.
    pub prox_score: u64,
    pub input_hash: u32,
    pub dfg_hash: u32,
    proximity: ProximityScore,
    tracker: MutatorTracker,
}

impl QueueEntry {
    pub fn new(
        entry_id: EntryId,
        input: &[u8],
        proximity: ProximityScore,
        ring_capacity: usize,
    ) -> Result<Self, ContainerError> {
        Ok(Self {
            entry_id,
            len: input.len(),
            handled_in_cycle: false,
            was_fuzzed: false,
            favored: false,
            fs_redundant: false,
            prox_score: proximity.original,
            input_hash: digest_u32(input),
            dfg_hash: dfg_signature(&proximity),
            proximity,
            tracker: MutatorTracker::new(ring_capacity)?,
        })
    }

    pub fn proximity(&self) -> &ProximityScore {
        &self.proximity
    }

    /// Replaces the proximity score and refreshes the derived fields.
    ///
    /// Returns `true` when `prox_score` changed, i.e. the entry needs to be
    /// re-ranked in its cluster.
    pub fn set_proximity(&mut self, proximity: ProximityScore) -> bool {
        let changed = proximity.original != self.prox_score;
        self.prox_score = proximity.original;
        self.dfg_hash = dfg_signature(&proximity);
        self.proximity = proximity;
        changed
    }

    pub fn tracker(&self) -> &MutatorTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut MutatorTracker {
        &mut self.tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proximity::DfgNodeInfo;

    fn nodes() -> Vec<DfgNodeInfo> {
        (0..4)
            .map(|idx| DfgNodeInfo { idx, score: idx + 1, max_paths: 1 })
            .collect()
    }

    #[test]
    fn new_entry_mirrors_proximity_and_hashes_input() {
        let prox = ProximityScore::from_hits(&nodes(), &[(3, 2)]).unwrap();
        let entry = QueueEntry::new(EntryId(7), b"GOOD", prox, 4).unwrap();
        assert_eq!(entry.prox_score, 8);
        assert_eq!(entry.len, 4);
        assert!(!entry.handled_in_cycle);
        assert_eq!(entry.input_hash, digest_u32(b"GOOD"));
        assert_eq!(entry.tracker().ring_capacity(), 4);
        assert_eq!(entry.entry_id.to_string(), "#7");
    }

    #[test]
    fn dfg_hash_depends_on_covered_set_not_hit_counts() {
        let a = ProximityScore::from_hits(&nodes(), &[(0, 1), (2, 5)]).unwrap();
        let b = ProximityScore::from_hits(&nodes(), &[(2, 1), (0, 9)]).unwrap();
        let c = ProximityScore::from_hits(&nodes(), &[(1, 1)]).unwrap();
        let ea = QueueEntry::new(EntryId(0), b"a", a, 2).unwrap();
        let eb = QueueEntry::new(EntryId(1), b"b", b, 2).unwrap();
        let ec = QueueEntry::new(EntryId(2), b"c", c, 2).unwrap();
        assert_eq!(ea.dfg_hash, eb.dfg_hash);
        assert_ne!(ea.dfg_hash, ec.dfg_hash);
    }

    #[test]
    fn set_proximity_reports_score_change() {
        let mut entry = QueueEntry::new(EntryId(0), b"x", ProximityScore::new(4), 2).unwrap();
        let same = ProximityScore::new(4);
        assert!(!entry.set_proximity(same));
        let better = ProximityScore::from_hits(&nodes(), &[(1, 3)]).unwrap();
        assert!(entry.set_proximity(better));
        assert_eq!(entry.prox_score, 6);
        assert_eq!(entry.proximity().covered, 1);
    }

    #[test]
    fn zero_ring_capacity_is_rejected() {
        assert!(QueueEntry::new(EntryId(0), b"", ProximityScore::new(1), 0).is_err());
    }
}
