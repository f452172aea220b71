//! Storage primitives shared by the scheduler components.
//!
//! Every container exclusively owns its backing storage. Linked structures are
//! arena-allocated and addressed by indices, so nothing here hands out raw
//! pointers into another structure's memory.

pub mod array;
pub mod chained_map;
pub mod list;

pub use array::FixedArray;
pub use chained_map::ChainedMap;
pub use list::{IndexList, NodeHandle};

use thiserror::Error;

/// Errors raised by the container primitives.
///
/// Both variants signal corrupted internal state or a caller bug. They are
/// returned rather than panicking so tests can assert them, but callers are
/// expected to propagate them as fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContainerError {
    /// An index at or beyond the declared capacity was used.
    #[error("Index out of bounds: {index} >= {size}")]
    BoundsViolation { index: usize, size: usize },

    /// Backing storage for the requested number of slots could not be reserved.
    #[error("Allocation of {requested} slots failed")]
    AllocationFailure { requested: usize },
}

impl ContainerError {
    /// Every container error is an invariant breach; none are retryable.
    pub fn is_fatal(&self) -> bool {
        true
    }
}
