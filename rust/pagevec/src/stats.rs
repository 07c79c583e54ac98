//! Process-wide growth instrumentation.
//!
//! These counters observe how often a capacity change had to be applied to
//! an existing block, and how often such a change completed without the
//! block moving (the remap or resize primitive kept the address, so not a
//! single element was copied). They exist for benchmarking and tests only
//! and carry no correctness contract; increments use relaxed atomics.

use std::sync::atomic::{AtomicUsize, Ordering};

static GROWTH_COUNT: AtomicUsize = AtomicUsize::new(0);
static REMAP_SKIP_COUNT: AtomicUsize = AtomicUsize::new(0);

/// Number of capacity changes applied to an already-allocated block.
pub fn growth_count() -> usize {
    GROWTH_COUNT.load(Ordering::Relaxed)
}

/// Number of capacity changes that kept the block at its address.
pub fn remap_skip_count() -> usize {
    REMAP_SKIP_COUNT.load(Ordering::Relaxed)
}

/// Resets both counters to zero.
pub fn reset() {
    GROWTH_COUNT.store(0, Ordering::Relaxed);
    REMAP_SKIP_COUNT.store(0, Ordering::Relaxed);
}

pub(crate) fn note_growth() {
    GROWTH_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub(crate) fn note_remap_skip() {
    REMAP_SKIP_COUNT.fetch_add(1, Ordering::Relaxed);
}
