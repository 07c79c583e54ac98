//! Test collaborators for the pagevec crates.
//!
//! [`LivePool`] hands out [`Counted`] values and tracks how many of them are
//! alive, so container tests can assert that element lifetimes balance out
//! exactly — every construction matched by exactly one destruction.

#![forbid(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Issues [`Counted`] values and observes how many are currently alive.
///
/// Each pool carries its own counter, so tests running concurrently in one
/// process do not disturb each other's bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct LivePool {
    alive: Arc<AtomicUsize>,
}

impl LivePool {
    pub fn new() -> LivePool {
        LivePool::default()
    }

    /// Creates a new tracked value.
    pub fn make(&self, value: i32) -> Counted {
        self.alive.fetch_add(1, Ordering::Relaxed);
        Counted {
            value,
            boxed: Box::new(value),
            alive: self.alive.clone(),
        }
    }

    /// Returns the number of values issued by this pool that are still alive.
    pub fn alive(&self) -> usize {
        self.alive.load(Ordering::Relaxed)
    }
}

/// An element whose constructions and destructions are counted by the
/// [`LivePool`] that issued it.
///
/// Holds a heap allocation mirroring its value, so double-drop and
/// use-after-free bugs surface as allocator faults or mismatched reads
/// instead of passing silently.
#[derive(Debug)]
pub struct Counted {
    value: i32,
    boxed: Box<i32>,
    alive: Arc<AtomicUsize>,
}

impl Counted {
    pub fn value(&self) -> i32 {
        assert_eq!(self.value, *self.boxed, "inline and boxed values diverged");
        self.value
    }
}

impl Clone for Counted {
    fn clone(&self) -> Counted {
        self.alive.fetch_add(1, Ordering::Relaxed);
        Counted {
            value: self.value,
            boxed: Box::new(*self.boxed),
            alive: self.alive.clone(),
        }
    }
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.alive.fetch_sub(1, Ordering::Relaxed);
    }
}

impl PartialEq for Counted {
    fn eq(&self, other: &Counted) -> bool {
        self.value == other.value
    }
}

impl Eq for Counted {}

impl PartialOrd for Counted {
    fn partial_cmp(&self, other: &Counted) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Counted {
    fn cmp(&self, other: &Counted) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}
