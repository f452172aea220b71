//! Fixed-capacity FIFO over 64-bit counters, used to track the momentum of
//! discovery signals across scheduling cycles.
//!
//! # Invariants
//! - `front < capacity` and `len <= capacity`.
//! - The element at logical position `i` lives at `(front + i) % capacity`.
//! - Enqueueing into a full buffer evicts the oldest element first; the newest
//!   value is never dropped.

use crate::containers::{ContainerError, FixedArray};

#[derive(Debug, Clone)]
pub struct CounterRing {
    buf: FixedArray<u64>,
    front: usize,
    len: usize,
}

impl CounterRing {
    /// Creates an empty ring holding at most `capacity` values.
    ///
    /// A zero capacity is reported as a bounds violation: such a ring could
    /// never hold the value it was just handed.
    pub fn new(capacity: usize) -> Result<Self, ContainerError> {
        if capacity == 0 {
            return Err(ContainerError::BoundsViolation { index: 0, size: 0 });
        }
        Ok(Self {
            buf: FixedArray::new(capacity)?,
            front: 0,
            len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Appends `value`, evicting the oldest value first when full.
    pub fn enqueue(&mut self, value: u64) -> Result<(), ContainerError> {
        if self.is_full() {
            self.dequeue()?;
        }
        let rear = (self.front + self.len) % self.capacity();
        self.buf.set(rear, value)?;
        self.len += 1;
        Ok(())
    }

    /// Removes and returns the oldest value, or `0` when empty.
    ///
    /// The zero is not a sentinel; check [`len`](Self::len) first.
    pub fn dequeue(&mut self) -> Result<u64, ContainerError> {
        if self.is_empty() {
            return Ok(0);
        }
        let value = self.buf.get(self.front)?;
        self.front = (self.front + 1) % self.capacity();
        self.len -= 1;
        Ok(value)
    }

    /// Returns the value `offset` positions after the oldest one.
    ///
    /// Empty rings yield `0`; an offset at or past `len` is a bounds violation.
    pub fn peek(&self, offset: usize) -> Result<u64, ContainerError> {
        if self.is_empty() {
            return Ok(0);
        }
        if offset >= self.len {
            return Err(ContainerError::BoundsViolation {
                index: offset,
                size: self.len,
            });
        }
        self.buf.get((self.front + offset) % self.capacity())
    }

    /// Most recent value minus the value `window` enqueues before it.
    ///
    /// `window` is clamped to `len - 1`. Only meaningful for non-decreasing
    /// sequences; anything else may come out negative.
    pub fn diff(&self, window: usize) -> Result<i64, ContainerError> {
        if self.is_empty() {
            return Ok(0);
        }
        let last = self.len - 1;
        let window = window.min(last);
        let newest = self.peek(last)?;
        let older = self.peek(last - window)?;
        Ok(newest.wrapping_sub(older) as i64)
    }

    /// [`diff`](Self::diff) divided by the requested `window`, as a rate per
    /// enqueue. A short history is not rescaled: `diff` clamps, the divisor
    /// does not.
    pub fn gradient(&self, window: usize) -> Result<f64, ContainerError> {
        if window == 0 {
            return Ok(0.0);
        }
        Ok(self.diff(window)? as f64 / window as f64)
    }

    pub fn clear(&mut self) {
        self.buf.fill(0);
        self.front = 0;
        self.len = 0;
    }

    /// Iterates values from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = u64> + '_ {
        let slice = self.buf.as_slice();
        let cap = slice.len();
        (0..self.len).map(move |i| slice[(self.front + i) % cap])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring_with(capacity: usize, values: &[u64]) -> CounterRing {
        let mut ring = CounterRing::new(capacity).unwrap();
        for v in values {
            ring.enqueue(*v).unwrap();
        }
        ring
    }

    #[test]
    fn capacity_three_keeps_last_three() {
        let ring = ring_with(3, &[1, 2, 3, 4]);
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(ring.diff(1).unwrap(), 1);
    }

    #[test]
    fn dequeue_is_fifo_and_zero_when_empty() {
        let mut ring = ring_with(4, &[5, 6]);
        assert_eq!(ring.dequeue().unwrap(), 5);
        assert_eq!(ring.dequeue().unwrap(), 6);
        assert!(ring.is_empty());
        assert_eq!(ring.dequeue().unwrap(), 0);
        assert_eq!(ring.peek(0).unwrap(), 0);
    }

    #[test]
    fn peek_past_len_is_a_bounds_violation() {
        let ring = ring_with(4, &[1, 2]);
        assert_eq!(ring.peek(1).unwrap(), 2);
        assert!(matches!(
            ring.peek(2),
            Err(ContainerError::BoundsViolation { index: 2, size: 2 })
        ));
    }

    #[test]
    fn diff_clamps_window_to_history() {
        let ring = ring_with(8, &[10, 15, 30]);
        assert_eq!(ring.diff(1).unwrap(), 15);
        assert_eq!(ring.diff(2).unwrap(), 20);
        assert_eq!(ring.diff(100).unwrap(), 20);
        assert_eq!(ring.diff(0).unwrap(), 0);
    }

    #[test]
    fn diff_of_decreasing_sequence_is_negative() {
        let ring = ring_with(4, &[9, 4]);
        assert_eq!(ring.diff(1).unwrap(), -5);
    }

    #[test]
    fn gradient_divides_by_requested_window() {
        let ring = ring_with(8, &[0, 2, 4, 10]);
        assert_eq!(ring.gradient(3).unwrap(), 10.0 / 3.0);
        assert_eq!(ring.gradient(1).unwrap(), 6.0);
        assert_eq!(ring.gradient(10).unwrap(), 1.0);
        assert_eq!(ring.gradient(0).unwrap(), 0.0);
        assert_eq!(ring_with(8, &[7]).gradient(5).unwrap(), 0.0);
    }

    #[test]
    fn wraps_around_many_times() {
        let mut ring = CounterRing::new(5).unwrap();
        for v in 0..1000u64 {
            ring.enqueue(v).unwrap();
        }
        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![995, 996, 997, 998, 999]);
        assert_eq!(ring.diff(4).unwrap(), 4);
    }

    #[test]
    fn clear_empties_the_ring() {
        let mut ring = ring_with(3, &[1, 2, 3]);
        ring.clear();
        assert!(ring.is_empty());
        ring.enqueue(8).unwrap();
        assert_eq!(ring.peek(0).unwrap(), 8);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(CounterRing::new(0).is_err());
    }
}
