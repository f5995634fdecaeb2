//! Stable ID newtypes and the node index allocator.
//!
//! A [`NodeId`] is allocated from an [`IndexSpace`]. Several graphs may share
//! one space (see [`GraphGroup`](crate::group::GraphGroup)), which makes node
//! ids unique across the whole group instead of within a single graph.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Stable node identifier, unique within the index space that allocated it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic node index counter.
///
/// Cloning an `IndexSpace` shares the counter: every clone hands out ids from
/// the same sequence.
#[derive(Debug, Clone, Default)]
pub struct IndexSpace(Arc<AtomicU64>);

impl IndexSpace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a fresh space whose first allocated id is `next`.
    pub fn starting_at(next: u64) -> Self {
        IndexSpace(Arc::new(AtomicU64::new(next)))
    }

    /// Allocates the next id.
    pub fn allocate(&self) -> NodeId {
        NodeId(self.0.fetch_add(1, Ordering::Relaxed))
    }

    /// The id the next call to [`allocate`](Self::allocate) will return.
    pub fn peek(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    /// Moves the counter forward to at least `next`. Never moves it back.
    pub fn advance_to(&self, next: u64) {
        self.0.fetch_max(next, Ordering::Relaxed);
    }

    pub fn is_shared_with(&self, other: &IndexSpace) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}
