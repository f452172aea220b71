/// A stable reference to a node in an [`IndexList`].
///
/// Handles carry the generation of the slot they were issued for, so a handle
/// to a removed node never resolves to whatever later reuses that slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone)]
struct Node<T> {
    value: T,
    prev: Option<u32>,
    next: Option<u32>,
}

#[derive(Debug, Clone)]
enum Slot<T> {
    Occupied { generation: u32, node: Node<T> },
    Vacant { generation: u32, next_free: Option<u32> },
}

/// A doubly-linked list stored in an arena of slots.
///
/// Positional inserts and removals are O(1) given a [`NodeHandle`]; lookup by
/// value is a linear scan. Freed slots are recycled through a free list.
#[derive(Debug, Clone)]
pub struct IndexList<T> {
    slots: Vec<Slot<T>>,
    free_head: Option<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl<T> Default for IndexList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> IndexList<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_head: None,
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn head(&self) -> Option<NodeHandle> {
        self.head.map(|idx| self.handle_at(idx))
    }

    pub fn tail(&self) -> Option<NodeHandle> {
        self.tail.map(|idx| self.handle_at(idx))
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&T> {
        self.node(handle).map(|node| &node.value)
    }

    pub fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut T> {
        match self.slots.get_mut(handle.index as usize) {
            Some(Slot::Occupied { generation, node }) if *generation == handle.generation => {
                Some(&mut node.value)
            }
            _ => None,
        }
    }

    pub fn next(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.node(handle)
            .and_then(|node| node.next)
            .map(|idx| self.handle_at(idx))
    }

    pub fn prev(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.node(handle)
            .and_then(|node| node.prev)
            .map(|idx| self.handle_at(idx))
    }

    pub fn push_back(&mut self, value: T) -> NodeHandle {
        let old_tail = self.tail;
        let idx = self.alloc(Node {
            value,
            prev: old_tail,
            next: None,
        });
        match old_tail {
            Some(tail) => self.node_at_mut(tail).next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        self.len += 1;
        self.handle_at(idx)
    }

    pub fn push_front(&mut self, value: T) -> NodeHandle {
        let old_head = self.head;
        let idx = self.alloc(Node {
            value,
            prev: None,
            next: old_head,
        });
        match old_head {
            Some(head) => self.node_at_mut(head).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
        self.len += 1;
        self.handle_at(idx)
    }

    /// Inserts `value` immediately before `anchor`.
    ///
    /// A `None` anchor, or one that no longer resolves, inserts at the front.
    pub fn insert_before(&mut self, anchor: Option<NodeHandle>, value: T) -> NodeHandle {
        let Some(anchor_idx) = anchor.and_then(|h| self.resolve(h)) else {
            return self.push_front(value);
        };
        let prev = self.node_at(anchor_idx).prev;
        let idx = self.alloc(Node {
            value,
            prev,
            next: Some(anchor_idx),
        });
        self.node_at_mut(anchor_idx).prev = Some(idx);
        match prev {
            Some(p) => self.node_at_mut(p).next = Some(idx),
            None => self.head = Some(idx),
        }
        self.len += 1;
        self.handle_at(idx)
    }

    /// Inserts `value` immediately after `anchor`.
    ///
    /// A `None` anchor, or one that no longer resolves, inserts at the back.
    pub fn insert_after(&mut self, anchor: Option<NodeHandle>, value: T) -> NodeHandle {
        let Some(anchor_idx) = anchor.and_then(|h| self.resolve(h)) else {
            return self.push_back(value);
        };
        let next = self.node_at(anchor_idx).next;
        let idx = self.alloc(Node {
            value,
            prev: Some(anchor_idx),
            next,
        });
        self.node_at_mut(anchor_idx).next = Some(idx);
        match next {
            Some(n) => self.node_at_mut(n).prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.len += 1;
        self.handle_at(idx)
    }

    /// Unlinks the node behind `handle` and returns its value.
    pub fn remove(&mut self, handle: NodeHandle) -> Option<T> {
        let idx = self.resolve(handle)?;
        let (prev, next) = {
            let node = self.node_at(idx);
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.node_at_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.node_at_mut(n).prev = prev,
            None => self.tail = prev,
        }

        let vacant = Slot::Vacant {
            generation: handle.generation.wrapping_add(1),
            next_free: self.free_head,
        };
        let old = std::mem::replace(&mut self.slots[idx as usize], vacant);
        self.free_head = Some(idx);
        self.len -= 1;
        match old {
            Slot::Occupied { node, .. } => Some(node.value),
            Slot::Vacant { .. } => None,
        }
    }

    /// Returns the handle of the first node, from the head, matching `pred`.
    pub fn find<F>(&self, mut pred: F) -> Option<NodeHandle>
    where
        F: FnMut(&T) -> bool,
    {
        let mut cursor = self.head();
        while let Some(handle) = cursor {
            let node = self.node(handle)?;
            if pred(&node.value) {
                return Some(handle);
            }
            cursor = node.next.map(|idx| self.handle_at(idx));
        }
        None
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
            remaining: self.len,
        }
    }

    /// Iterates handles from head to tail.
    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> + '_ {
        std::iter::successors(self.head(), move |h| self.next(*h))
    }

    /// Removes every node. Handles issued before the call stay stale.
    pub fn clear(&mut self) {
        let mut free_head = None;
        for (idx, slot) in self.slots.iter_mut().enumerate().rev() {
            let generation = match slot {
                Slot::Occupied { generation, .. } => generation.wrapping_add(1),
                Slot::Vacant { generation, .. } => *generation,
            };
            *slot = Slot::Vacant {
                generation,
                next_free: free_head,
            };
            free_head = Some(idx as u32);
        }
        self.free_head = free_head;
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    fn alloc(&mut self, node: Node<T>) -> u32 {
        match self.free_head {
            Some(idx) => {
                let slot = &mut self.slots[idx as usize];
                let (generation, next_free) = match slot {
                    Slot::Vacant {
                        generation,
                        next_free,
                    } => (*generation, *next_free),
                    Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
                };
                *slot = Slot::Occupied { generation, node };
                self.free_head = next_free;
                idx
            }
            None => {
                let idx = self.slots.len() as u32;
                self.slots.push(Slot::Occupied {
                    generation: 0,
                    node,
                });
                idx
            }
        }
    }

    fn resolve(&self, handle: NodeHandle) -> Option<u32> {
        self.node(handle).map(|_| handle.index)
    }

    fn node(&self, handle: NodeHandle) -> Option<&Node<T>> {
        match self.slots.get(handle.index as usize) {
            Some(Slot::Occupied { generation, node }) if *generation == handle.generation => {
                Some(node)
            }
            _ => None,
        }
    }

    fn handle_at(&self, idx: u32) -> NodeHandle {
        let generation = match &self.slots[idx as usize] {
            Slot::Occupied { generation, .. } | Slot::Vacant { generation, .. } => *generation,
        };
        NodeHandle {
            index: idx,
            generation,
        }
    }

    // Linked indices always point at occupied slots.
    fn node_at(&self, idx: u32) -> &Node<T> {
        match &self.slots[idx as usize] {
            Slot::Occupied { node, .. } => node,
            Slot::Vacant { .. } => unreachable!("link to vacant slot {idx}"),
        }
    }

    fn node_at_mut(&mut self, idx: u32) -> &mut Node<T> {
        match &mut self.slots[idx as usize] {
            Slot::Occupied { node, .. } => node,
            Slot::Vacant { .. } => unreachable!("link to vacant slot {idx}"),
        }
    }
}

/// Head-to-tail iterator over list values.
pub struct Iter<'a, T> {
    list: &'a IndexList<T>,
    cursor: Option<u32>,
    remaining: usize,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.cursor?;
        let node = self.list.node_at(idx);
        self.cursor = node.next;
        self.remaining = self.remaining.saturating_sub(1);
        Some(&node.value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a, T> IntoIterator for &'a IndexList<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
