//! A group of corpus entries kept in descending proximity-score order.
//!
//! # Invariants
//! - Iteration yields non-increasing `prox_score`; among equal scores the most
//!   recently inserted entry comes first.
//! - After `add_child`, `remove_child`, `rewind` or `pick`, the cursor is the
//!   leftmost member whose entry is not `handled_in_cycle`, or `None`.
//!
//! Members are [`EntryId`]s. The cluster never owns or drops entries; it reads
//! their score and flags through the [`Corpus`] passed to each call. Entries
//! must be removed from their cluster before they are removed from the corpus.
//! A member the corpus no longer knows ranks last and is never picked.

use crate::containers::{IndexList, NodeHandle};
use crate::corpus::{Corpus, CorpusError};
use crate::entry::EntryId;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct Cluster {
    id: u32,
    members: IndexList<EntryId>,
    first_unhandled: Option<NodeHandle>,
}

impl Cluster {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            members: IndexList::new(),
            first_unhandled: None,
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Member ids from highest to lowest score.
    pub fn iter(&self) -> impl Iterator<Item = EntryId> + '_ {
        self.members.iter().copied()
    }

    pub fn contains(&self, id: EntryId) -> bool {
        self.members.find(|m| *m == id).is_some()
    }

    /// The highest-ranked member, handled or not.
    pub fn top(&self) -> Option<EntryId> {
        self.members.head().and_then(|h| self.members.get(h).copied())
    }

    /// The cursor as last maintained, without re-checking flags.
    pub fn cursor(&self) -> Option<EntryId> {
        self.first_unhandled.and_then(|h| self.members.get(h).copied())
    }

    /// Inserts `id` at its rank and recomputes the cursor.
    ///
    /// The entry goes in front of the first member whose score is lower than
    /// or equal to its own, or at the tail when there is none.
    pub fn add_child(&mut self, id: EntryId, corpus: &dyn Corpus) -> Result<(), CorpusError> {
        let entry = corpus.get(id).ok_or(CorpusError::EntryNotFound(id))?;
        let (score, handled) = (entry.prox_score, entry.handled_in_cycle);

        let mut first_unhandled = None;
        let mut anchor = None;
        for handle in self.members.handles() {
            let (member_score, member_handled) = self.rank(handle, corpus);
            if member_score <= score {
                anchor = Some(handle);
                break;
            }
            if first_unhandled.is_none() && !member_handled {
                first_unhandled = Some(handle);
            }
        }

        let node = match anchor {
            Some(anchor) => self.members.insert_before(Some(anchor), id),
            None => self.members.push_back(id),
        };
        self.first_unhandled = match first_unhandled {
            Some(handle) => Some(handle),
            None if !handled => Some(node),
            None => self.scan_unhandled(self.members.next(node), corpus),
        };

        trace!(
            cluster = self.id,
            entry = %id,
            score,
            order = ?self.scores(corpus),
            "Cluster insert"
        );
        Ok(())
    }

    /// Unlinks `id`. Returns `false` when it is not a member.
    pub fn remove_child(&mut self, id: EntryId, corpus: &dyn Corpus) -> bool {
        let Some(handle) = self.members.find(|m| *m == id) else {
            return false;
        };
        if self.first_unhandled == Some(handle) {
            self.first_unhandled = self.scan_unhandled(self.members.next(handle), corpus);
        }
        self.members.remove(handle);
        true
    }

    /// Moves `id` to the rank matching its current score.
    pub fn rerank(&mut self, id: EntryId, corpus: &dyn Corpus) -> Result<bool, CorpusError> {
        if !self.remove_child(id, corpus) {
            return Ok(false);
        }
        self.add_child(id, corpus)?;
        Ok(true)
    }

    /// Returns the highest-ranked member not yet handled in this cycle.
    ///
    /// Members marked handled since the last call are skipped and the cursor
    /// advanced past them. Flags cleared at a cycle boundary are only seen
    /// after [`rewind`](Self::rewind).
    pub fn pick(&mut self, corpus: &dyn Corpus) -> Option<EntryId> {
        let start = self.first_unhandled?;
        self.first_unhandled = self.scan_unhandled(Some(start), corpus);
        self.cursor()
    }

    /// Recomputes the cursor from the head, for use after a cycle boundary.
    pub fn rewind(&mut self, corpus: &dyn Corpus) {
        self.first_unhandled = self.scan_unhandled(self.members.head(), corpus);
    }

    /// Member scores in list order, for diagnostics.
    pub fn scores(&self, corpus: &dyn Corpus) -> Vec<u64> {
        self.members
            .handles()
            .map(|h| self.rank(h, corpus).0)
            .collect()
    }

    fn rank(&self, handle: NodeHandle, corpus: &dyn Corpus) -> (u64, bool) {
        self.members
            .get(handle)
            .and_then(|id| corpus.get(*id))
            .map_or((0, true), |e| (e.prox_score, e.handled_in_cycle))
    }

    fn scan_unhandled(&self, from: Option<NodeHandle>, corpus: &dyn Corpus) -> Option<NodeHandle> {
        let mut cursor = from;
        while let Some(handle) = cursor {
            if !self.rank(handle, corpus).1 {
                return Some(handle);
            }
            cursor = self.members.next(handle);
        }
        None
    }
}
