//! Anonymous page mappings with support for in-place resizing.
//!
//! This crate provides the byte-level primitives behind the threshold-based
//! allocation strategy of the `pagevec` container: obtaining an anonymous
//! read/write private mapping, releasing it, and — where the platform allows
//! it — resizing the mapping in place so that a growing buffer keeps its
//! contents without a single byte being copied by user code.
//!
//! All sizes are rounded up to a whole number of pages by each primitive, so
//! callers may work in their own units and pass the same nominal size to
//! [`mmap::allocate`], [`mmap::remap`] and [`mmap::free`].

#[cfg_attr(target_os = "linux", path = "mmap_linux.rs")]
#[cfg_attr(windows, path = "mmap_win.rs")]
#[cfg_attr(not(any(target_os = "linux", windows)), path = "mmap_fallback.rs")]
pub mod mmap;
