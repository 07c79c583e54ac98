//! Threshold-based block allocation strategy.
//!
//! A block is backed either by the global heap allocator (at most
//! [`threshold`] elements) or by an anonymous page mapping (above it). The
//! same threshold test drives allocation, growth and release, so a block is
//! always returned through the primitive that produced it.
//!
//! Growth avoids copying wherever the platform allows: two mapped capacities
//! are resized with [`mmap::remap`], two heap capacities with
//! `std::alloc::realloc`. Both preserve the byte image of the live prefix,
//! which is sufficient for *any* element type — Rust moves are bitwise, so
//! relocating the object representation is the move. (This also retires the
//! question of types with address-identity side effects: there is no move
//! constructor to bypass.) Only a capacity change that crosses the threshold
//! relocates elements by hand, and that is a plain `memcpy` as well.
//!
//! Everything here operates on raw, possibly uninitialized memory and never
//! runs element constructors or destructors unless the function says so
//! ([`fill_value`], [`fill_cloned`], [`drop_range`]).

use std::alloc::{self, Layout};
use std::mem;
use std::ptr::{self, NonNull};

use pagevec_page_alloc::mmap;

use crate::error::{Error, Result};
use crate::stats;

/// Capacity granularity of mapped blocks, in bytes.
pub(crate) const PAGE_UNIT: usize = 4096;

/// Smallest useful heap block, in bytes.
const MIN_BLOCK_BYTES: usize = 64;

/// Capacity (in elements) above which a block is backed by a page mapping.
pub(crate) const fn threshold<T>() -> usize {
    let size = size_of::<T>();
    if size == 0 {
        return 1;
    }
    let t = PAGE_UNIT / size;
    if t == 0 { 1 } else { t }
}

const fn min_capacity<T>() -> usize {
    let floor = MIN_BLOCK_BYTES / size_of::<T>();
    if floor == 0 { 1 } else { floor }
}

#[cold]
pub(crate) fn capacity_overflow() -> ! {
    panic!("PageVec capacity overflow");
}

/// Rounds a requested capacity to an allocatable one.
///
/// Below the threshold the request is kept, floored to [`MIN_BLOCK_BYTES`]
/// worth of elements so tiny heap blocks do not churn. At or above the
/// threshold it is rounded up to the next strictly greater multiple of the
/// threshold, which keeps every mapped block a whole number of pages and
/// every remap request page-aligned.
pub(crate) fn fix_capacity<T>(n: usize) -> usize {
    debug_assert!(size_of::<T>() != 0);
    if n == 0 {
        return 0;
    }
    let t = threshold::<T>();
    if n < t {
        return n.max(min_capacity::<T>());
    }
    match (n / t).checked_add(1).and_then(|k| k.checked_mul(t)) {
        Some(capacity) => capacity,
        None => capacity_overflow(),
    }
}

/// Allocates a block of `capacity` raw element slots.
///
/// Never constructs elements. The backing kind is chosen by testing
/// `capacity` against [`threshold`]; pass the same capacity to
/// [`deallocate`] when releasing the block.
pub(crate) fn allocate<T>(capacity: usize) -> Result<NonNull<T>> {
    debug_assert!(capacity > 0);
    if size_of::<T>() == 0 {
        return Ok(NonNull::dangling());
    }
    let bytes = capacity * size_of::<T>();
    if capacity > threshold::<T>() {
        // Mapped blocks are page-aligned, which satisfies any real-world
        // element alignment; make the assumption explicit.
        assert!(align_of::<T>() <= mmap::page_size());
        let (ptr, _) = mmap::allocate(bytes).map_err(|e| Error::out_of_memory(bytes, e))?;
        Ok(unsafe { NonNull::new_unchecked(ptr as *mut T) })
    } else {
        let layout = match Layout::array::<T>(capacity) {
            Ok(layout) => layout,
            Err(_) => capacity_overflow(),
        };
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr as *mut T).ok_or_else(|| Error::out_of_memory(bytes, heap_exhausted()))
    }
}

/// Releases a block obtained from [`allocate`] or [`grow_block`].
///
/// # Safety
///
/// `ptr` must be the block's current address and `capacity` the capacity it
/// was last allocated or grown to — the threshold test on `capacity` selects
/// the release primitive, and a mismatch frees through the wrong one.
pub(crate) unsafe fn deallocate<T>(ptr: NonNull<T>, capacity: usize) {
    if size_of::<T>() == 0 || capacity == 0 {
        return;
    }
    let bytes = capacity * size_of::<T>();
    if capacity > threshold::<T>() {
        let _ = unsafe { mmap::free(ptr.as_ptr() as *mut _, bytes) };
    } else {
        let layout = unsafe { Layout::from_size_align_unchecked(bytes, align_of::<T>()) };
        unsafe { alloc::dealloc(ptr.as_ptr() as *mut u8, layout) };
    }
}

/// Resizes a block from `old_capacity` to `new_capacity` element slots,
/// preserving the first `length` live elements.
///
/// Three paths:
/// 1. the capacities straddle the threshold — a fresh block of the new
///    backing kind, bitwise relocation, old block released;
/// 2. both mapped — the kernel remaps the pages, no byte is copied by user
///    code; a failed remap falls back to path 1;
/// 3. both heap — `realloc`, which may also resize without moving.
///
/// On error the original block is left valid and unmodified.
///
/// # Safety
///
/// `ptr`/`old_capacity` must describe a live block from this module with at
/// least `length` initialized elements, and `length <= new_capacity`. On
/// success the old address must no longer be used.
pub(crate) unsafe fn grow_block<T>(
    ptr: NonNull<T>,
    length: usize,
    old_capacity: usize,
    new_capacity: usize,
) -> Result<NonNull<T>> {
    debug_assert!(length <= old_capacity && length <= new_capacity);
    debug_assert!(old_capacity > 0 && new_capacity > 0);
    if size_of::<T>() == 0 {
        return Ok(ptr);
    }
    stats::note_growth();

    let t = threshold::<T>();
    if (old_capacity > t) != (new_capacity > t) {
        return unsafe { relocate(ptr, length, old_capacity, new_capacity) };
    }

    let old_bytes = old_capacity * size_of::<T>();
    let new_bytes = new_capacity * size_of::<T>();
    if old_capacity > t {
        match unsafe { mmap::remap(ptr.as_ptr() as *mut _, old_bytes, new_bytes, true) } {
            Ok(new_ptr) => {
                let new_ptr = new_ptr as *mut T;
                if new_ptr == ptr.as_ptr() {
                    stats::note_remap_skip();
                }
                Ok(unsafe { NonNull::new_unchecked(new_ptr) })
            }
            Err(_) => unsafe { relocate(ptr, length, old_capacity, new_capacity) },
        }
    } else {
        let layout = unsafe { Layout::from_size_align_unchecked(old_bytes, align_of::<T>()) };
        let new_ptr = unsafe { alloc::realloc(ptr.as_ptr() as *mut u8, layout, new_bytes) };
        match NonNull::new(new_ptr as *mut T) {
            Some(new_ptr) => {
                if new_ptr == ptr {
                    stats::note_remap_skip();
                }
                Ok(new_ptr)
            }
            None => Err(Error::out_of_memory(new_bytes, heap_exhausted())),
        }
    }
}

unsafe fn relocate<T>(
    ptr: NonNull<T>,
    length: usize,
    old_capacity: usize,
    new_capacity: usize,
) -> Result<NonNull<T>> {
    let new_ptr = allocate::<T>(new_capacity)?;
    unsafe {
        ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), length);
        deallocate(ptr, old_capacity);
    }
    Ok(new_ptr)
}

fn heap_exhausted() -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::OutOfMemory,
        "the global allocator returned null",
    )
}

/// Moves `count` elements starting at `ptr` up by `by` slots within one
/// block. Overlap-safe; the vacated slots are left logically uninitialized.
///
/// # Safety
///
/// `ptr..ptr + count` must be initialized elements and
/// `ptr + by + count` must stay within the block's capacity.
pub(crate) unsafe fn shift_right<T>(ptr: *mut T, count: usize, by: usize) {
    unsafe { ptr::copy(ptr, ptr.add(by), count) };
}

/// Moves `count` elements starting at `ptr` down by `by` slots within one
/// block. Overlap-safe; the vacated slots are left logically uninitialized.
///
/// # Safety
///
/// `ptr..ptr + count` must be initialized elements and `ptr - by` must stay
/// within the same block.
pub(crate) unsafe fn shift_left<T>(ptr: *mut T, count: usize, by: usize) {
    unsafe { ptr::copy(ptr, ptr.sub(by), count) };
}

/// Clone-constructs `n` copies of `value` into the raw slots at `dst`.
///
/// If a clone panics, the already-constructed prefix is dropped before the
/// panic continues, so no element leaks.
///
/// # Safety
///
/// `dst..dst + n` must be valid, uninitialized slots within one block.
pub(crate) unsafe fn fill_value<T: Clone>(dst: *mut T, n: usize, value: &T) {
    let mut guard = PrefixGuard {
        start: dst,
        initialized: 0,
    };
    while guard.initialized < n {
        unsafe { dst.add(guard.initialized).write(value.clone()) };
        guard.initialized += 1;
    }
    mem::forget(guard);
}

/// Clone-constructs the elements of `src` into the raw slots at `dst`.
///
/// Same panic behavior as [`fill_value`].
///
/// # Safety
///
/// `dst..dst + src.len()` must be valid, uninitialized slots within one
/// block, disjoint from `src`.
pub(crate) unsafe fn fill_cloned<T: Clone>(dst: *mut T, src: &[T]) {
    let mut guard = PrefixGuard {
        start: dst,
        initialized: 0,
    };
    for item in src {
        unsafe { dst.add(guard.initialized).write(item.clone()) };
        guard.initialized += 1;
    }
    mem::forget(guard);
}

/// Drops `len` initialized elements starting at `ptr`.
///
/// Compiled out entirely for types that need no drop.
///
/// # Safety
///
/// `ptr..ptr + len` must be initialized elements that are not used again.
pub(crate) unsafe fn drop_range<T>(ptr: *mut T, len: usize) {
    if mem::needs_drop::<T>() {
        unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(ptr, len)) };
    }
}

struct PrefixGuard<T> {
    start: *mut T,
    initialized: usize,
}

impl<T> Drop for PrefixGuard<T> {
    fn drop(&mut self) {
        unsafe { drop_range(self.start, self.initialized) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_a_page_worth_of_elements() {
        assert_eq!(threshold::<u8>(), 4096);
        assert_eq!(threshold::<u32>(), 1024);
        assert_eq!(threshold::<u64>(), 512);
        assert_eq!(threshold::<[u8; 4096]>(), 1);
        assert_eq!(threshold::<[u8; 8192]>(), 1);
        assert_eq!(threshold::<()>(), 1);
    }

    #[test]
    fn fix_capacity_keeps_small_requests_with_a_floor() {
        // 64 bytes of u32 = 16 elements.
        assert_eq!(fix_capacity::<u32>(0), 0);
        assert_eq!(fix_capacity::<u32>(1), 16);
        assert_eq!(fix_capacity::<u32>(16), 16);
        assert_eq!(fix_capacity::<u32>(17), 17);
        assert_eq!(fix_capacity::<u32>(1023), 1023);
    }

    #[test]
    fn fix_capacity_rounds_to_strict_threshold_multiples() {
        let t = threshold::<u32>();
        assert_eq!(fix_capacity::<u32>(t), 2 * t);
        assert_eq!(fix_capacity::<u32>(t + 1), 2 * t);
        assert_eq!(fix_capacity::<u32>(2 * t), 3 * t);
        assert_eq!(fix_capacity::<u32>(2 * t + 1), 3 * t);
    }

    #[test]
    fn mapped_capacities_are_page_aligned() {
        let t = threshold::<u64>();
        for n in [t, t + 1, 5 * t - 1, 5 * t] {
            let capacity = fix_capacity::<u64>(n);
            assert!(capacity > t);
            assert!((capacity * size_of::<u64>()).is_multiple_of(PAGE_UNIT));
        }
    }

    #[test]
    fn allocate_deallocate_round_trip_across_threshold() {
        let t = threshold::<u64>();
        for capacity in [1, t - 1, t, fix_capacity::<u64>(t), fix_capacity::<u64>(4 * t)] {
            let ptr = allocate::<u64>(capacity).expect("allocate");
            unsafe {
                ptr.as_ptr().write(0xDEAD_BEEF);
                ptr.as_ptr().add(capacity - 1).write(0xBEEF);
                deallocate(ptr, capacity);
            }
        }
    }

    #[test]
    fn grow_within_heap_preserves_elements() {
        let ptr = allocate::<u64>(8).expect("allocate");
        unsafe {
            for i in 0..8 {
                ptr.as_ptr().add(i).write(i as u64);
            }
            let ptr = grow_block(ptr, 8, 8, 64).expect("grow");
            for i in 0..8 {
                assert_eq!(ptr.as_ptr().add(i).read(), i as u64);
            }
            deallocate(ptr, 64);
        }
    }

    #[test]
    fn grow_across_threshold_preserves_elements() {
        let t = threshold::<u64>();
        let small = t - 1;
        let big = fix_capacity::<u64>(4 * t);
        let ptr = allocate::<u64>(small).expect("allocate");
        unsafe {
            for i in 0..small {
                ptr.as_ptr().add(i).write(i as u64);
            }
            // Heap to mapped.
            let ptr = grow_block(ptr, small, small, big).expect("grow");
            for i in 0..small {
                assert_eq!(ptr.as_ptr().add(i).read(), i as u64);
            }
            // Mapped back to heap.
            let ptr = grow_block(ptr, small, big, small).expect("shrink");
            for i in 0..small {
                assert_eq!(ptr.as_ptr().add(i).read(), i as u64);
            }
            deallocate(ptr, small);
        }
    }

    #[test]
    fn grow_between_mapped_capacities_preserves_elements() {
        let t = threshold::<u64>();
        let a = fix_capacity::<u64>(2 * t);
        let b = fix_capacity::<u64>(16 * t);
        let ptr = allocate::<u64>(a).expect("allocate");
        unsafe {
            for i in 0..a {
                ptr.as_ptr().add(i).write((i * 3) as u64);
            }
            let ptr = grow_block(ptr, a, a, b).expect("grow");
            for i in 0..a {
                assert_eq!(ptr.as_ptr().add(i).read(), (i * 3) as u64);
            }
            deallocate(ptr, b);
        }
    }

    #[test]
    fn shift_moves_overlapping_ranges() {
        let mut data = [1u32, 2, 3, 4, 5, 0, 0];
        unsafe {
            shift_right(data.as_mut_ptr().add(1), 4, 2);
            assert_eq!(&data[3..7], &[2, 3, 4, 5]);
            shift_left(data.as_mut_ptr().add(3), 4, 2);
            assert_eq!(&data[1..5], &[2, 3, 4, 5]);
        }
    }

    #[test]
    fn fill_value_drops_prefix_when_a_clone_panics() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        static DROPS: AtomicUsize = AtomicUsize::new(0);
        static CLONES: AtomicUsize = AtomicUsize::new(0);

        struct Explosive;
        impl Clone for Explosive {
            fn clone(&self) -> Explosive {
                if CLONES.fetch_add(1, Ordering::Relaxed) == 3 {
                    panic!("boom");
                }
                Explosive
            }
        }
        impl Drop for Explosive {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::Relaxed);
            }
        }

        let ptr = allocate::<Explosive>(8).expect("allocate");
        let value = Explosive;
        let slots = ptr.as_ptr();
        let result = std::panic::catch_unwind(|| unsafe {
            fill_value(slots, 8, &value);
        });
        assert!(result.is_err());
        // Three clones were written before the fourth panicked; all three
        // must have been dropped by the prefix guard.
        assert_eq!(DROPS.load(Ordering::Relaxed), 3);
        unsafe { deallocate(ptr, 8) };
        mem::forget(value);
    }
}
