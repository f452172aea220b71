use crate::entry::{EntryId, QueueEntry};
use thiserror::Error;

/// Defines errors that can arise during corpus operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorpusError {
    /// The requested entry id was never issued or has been removed.
    #[error("Entry {0} not found in corpus")]
    EntryNotFound(EntryId),

    /// The corpus has issued every id it can represent.
    #[error("Corpus id space exhausted")]
    IdsExhausted,
}

/// Defines the common interface for the store that owns queue entries.
///
/// The scheduler never owns entries. It looks them up through this trait by
/// [`EntryId`], reads their score and cycle flags, and updates their trackers.
pub trait Corpus: Send + Sync {
    /// Returns the id the next [`add`](Self::add) will assign.
    fn next_id(&self) -> Result<EntryId, CorpusError>;

    /// Adds an entry under the id from [`next_id`](Self::next_id), overwriting
    /// whatever `entry_id` the entry carried.
    fn add(&mut self, entry: QueueEntry) -> Result<EntryId, CorpusError>;

    fn get(&self, id: EntryId) -> Option<&QueueEntry>;

    fn get_mut(&mut self, id: EntryId) -> Option<&mut QueueEntry>;

    /// Removes and returns an entry. Its id is not reused.
    fn remove(&mut self, id: EntryId) -> Option<QueueEntry>;

    /// Ids of all live entries, in insertion order.
    fn ids(&self) -> Vec<EntryId>;

    /// Returns the number of live entries.
    fn len(&self) -> usize;

    /// Returns `true` if the corpus contains no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An in-memory implementation of the `Corpus` trait.
///
/// Entries live in a slot vector indexed by id. Removal leaves a vacant slot
/// behind so ids stay stable for the lifetime of the corpus.
#[derive(Debug, Default)]
pub struct InMemoryCorpus {
    entries: Vec<Option<QueueEntry>>,
    live: usize,
}

impl InMemoryCorpus {
    /// Creates a new, empty `InMemoryCorpus`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Iterates all live entries mutably.
    pub fn entries_mut(&mut self) -> impl Iterator<Item = &mut QueueEntry> {
        self.entries.iter_mut().filter_map(Option::as_mut)
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter().filter_map(Option::as_ref)
    }
}

impl Corpus for InMemoryCorpus {
    fn next_id(&self) -> Result<EntryId, CorpusError> {
        u32::try_from(self.entries.len())
            .map(EntryId)
            .map_err(|_| CorpusError::IdsExhausted)
    }

    fn add(&mut self, mut entry: QueueEntry) -> Result<EntryId, CorpusError> {
        let id = self.next_id()?;
        entry.entry_id = id;
        self.entries.push(Some(entry));
        self.live += 1;
        Ok(id)
    }

    fn get(&self, id: EntryId) -> Option<&QueueEntry> {
        self.entries.get(id.0 as usize).and_then(Option::as_ref)
    }

    fn get_mut(&mut self, id: EntryId) -> Option<&mut QueueEntry> {
        self.entries.get_mut(id.0 as usize).and_then(Option::as_mut)
    }

    fn remove(&mut self, id: EntryId) -> Option<QueueEntry> {
        let removed = self.entries.get_mut(id.0 as usize).and_then(Option::take);
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    fn ids(&self) -> Vec<EntryId> {
        self.entries().map(|e| e.entry_id).collect()
    }

    fn len(&self) -> usize {
        self.live
    }
}
