const DEFAULT_TABLE_SIZE: u32 = 16;

#[derive(Debug, Clone)]
struct Pair<V> {
    key: u32,
    value: V,
    next: Option<u32>,
}

/// A separately-chained hash map from `u32` keys to `V`.
///
/// The bucket for a key is `key % table_size`. Chains are linked through
/// indices into a pair arena; the table doubles once more than half of it is
/// occupied.
#[derive(Debug, Clone)]
pub struct ChainedMap<V> {
    table: Vec<Option<u32>>,
    pairs: Vec<Option<Pair<V>>>,
    free: Vec<u32>,
    len: usize,
}

impl<V> Default for ChainedMap<V> {
    fn default() -> Self {
        Self::with_table_size(DEFAULT_TABLE_SIZE)
    }
}

impl<V> ChainedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a map with `table_size` buckets (at least one).
    pub fn with_table_size(table_size: u32) -> Self {
        Self {
            table: vec![None; table_size.max(1) as usize],
            pairs: Vec::new(),
            free: Vec::new(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn table_size(&self) -> usize {
        self.table.len()
    }

    /// Inserts `value` under `key`, returning the value it replaced.
    pub fn insert(&mut self, key: u32, value: V) -> Option<V> {
        if let Some(idx) = self.find(key) {
            if let Some(pair) = self.pairs[idx as usize].as_mut() {
                return Some(std::mem::replace(&mut pair.value, value));
            }
        }

        let bucket = self.bucket(key);
        let pair = Pair {
            key,
            value,
            next: self.table[bucket],
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.pairs[idx as usize] = Some(pair);
                idx
            }
            None => {
                self.pairs.push(Some(pair));
                (self.pairs.len() - 1) as u32
            }
        };
        self.table[bucket] = Some(idx);
        self.len += 1;

        if self.len > self.table.len() / 2 {
            self.grow();
        }
        None
    }

    pub fn get(&self, key: u32) -> Option<&V> {
        self.find(key)
            .and_then(|idx| self.pairs[idx as usize].as_ref())
            .map(|pair| &pair.value)
    }

    pub fn get_mut(&mut self, key: u32) -> Option<&mut V> {
        let idx = self.find(key)?;
        self.pairs[idx as usize].as_mut().map(|pair| &mut pair.value)
    }

    pub fn contains_key(&self, key: u32) -> bool {
        self.find(key).is_some()
    }

    pub fn remove(&mut self, key: u32) -> Option<V> {
        let bucket = self.bucket(key);
        let mut prev: Option<u32> = None;
        let mut cursor = self.table[bucket];
        while let Some(idx) = cursor {
            let (pair_key, next) = match &self.pairs[idx as usize] {
                Some(pair) => (pair.key, pair.next),
                None => return None,
            };
            if pair_key == key {
                match prev {
                    Some(p) => {
                        if let Some(prev_pair) = self.pairs[p as usize].as_mut() {
                            prev_pair.next = next;
                        }
                    }
                    None => self.table[bucket] = next,
                }
                self.free.push(idx);
                self.len -= 1;
                return self.pairs[idx as usize].take().map(|pair| pair.value);
            }
            prev = Some(idx);
            cursor = next;
        }
        None
    }

    /// Iterates `(key, value)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &V)> {
        self.pairs
            .iter()
            .filter_map(|slot| slot.as_ref().map(|pair| (pair.key, &pair.value)))
    }

    fn bucket(&self, key: u32) -> usize {
        (key % self.table.len() as u32) as usize
    }

    fn find(&self, key: u32) -> Option<u32> {
        let mut cursor = self.table[self.bucket(key)];
        while let Some(idx) = cursor {
            let pair = self.pairs[idx as usize].as_ref()?;
            if pair.key == key {
                return Some(idx);
            }
            cursor = pair.next;
        }
        None
    }

    fn grow(&mut self) {
        let new_size = self.table.len() * 2;
        let mut new_table = vec![None; new_size];
        for (idx, slot) in self.pairs.iter_mut().enumerate() {
            if let Some(pair) = slot {
                let bucket = (pair.key % new_size as u32) as usize;
                pair.next = new_table[bucket];
                new_table[bucket] = Some(idx as u32);
            }
        }
        self.table = new_table;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let mut map = ChainedMap::with_table_size(4);
        assert_eq!(map.insert(3, "three"), None);
        assert_eq!(map.insert(7, "seven"), None);
        assert_eq!(map.get(3), Some(&"three"));
        assert_eq!(map.get(7), Some(&"seven"));
        assert_eq!(map.get(11), None);
        assert_eq!(map.remove(3), Some("three"));
        assert_eq!(map.get(3), None);
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn colliding_keys_share_a_chain() {
        // 1, 9 and 17 all land in bucket 1 of an 8-slot table before growth.
        let mut map = ChainedMap::with_table_size(8);
        map.insert(1, 'a');
        map.insert(9, 'b');
        map.insert(17, 'c');
        assert_eq!(map.remove(9), Some('b'));
        assert_eq!(map.get(1), Some(&'a'));
        assert_eq!(map.get(17), Some(&'c'));
        assert_eq!(map.remove(9), None);
    }

    #[test]
    fn reinserting_a_key_replaces_its_value() {
        let mut map = ChainedMap::new();
        map.insert(5, 1u32);
        assert_eq!(map.insert(5, 2), Some(1));
        assert_eq!(map.len(), 1);
        if let Some(v) = map.get_mut(5) {
            *v += 10;
        }
        assert_eq!(map.get(5), Some(&12));
    }

    #[test]
    fn table_doubles_past_half_load() {
        let mut map = ChainedMap::with_table_size(4);
        map.insert(0, ());
        map.insert(1, ());
        assert_eq!(map.table_size(), 4);
        map.insert(2, ());
        assert_eq!(map.table_size(), 8);
        for key in 0..3 {
            assert!(map.contains_key(key));
        }
    }

    #[test]
    fn removed_slots_are_reused() {
        let mut map = ChainedMap::with_table_size(64);
        for key in 0..10 {
            map.insert(key, key * 2);
        }
        for key in 0..5 {
            map.remove(key);
        }
        for key in 100..105 {
            map.insert(key, key);
        }
        assert_eq!(map.len(), 10);
        assert_eq!(map.iter().count(), 10);
        assert_eq!(map.get(104), Some(&104));
        assert_eq!(map.get(6), Some(&12));
    }
}
