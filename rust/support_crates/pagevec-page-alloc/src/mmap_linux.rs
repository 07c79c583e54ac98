use std::sync::OnceLock;

/// Allocates an anonymous read/write private mapping.
///
/// The requested `size` is rounded up to the next page boundary; a request of
/// zero bytes still maps one page.
///
/// # Returns
///
/// `Ok((ptr, capacity))` with a page-aligned pointer and the actual mapped
/// capacity in bytes, or `Err(io::Error)` if the mapping fails.
///
/// # Safety
///
/// The returned pointer must eventually be released with [`free`], passing
/// either the requested size or the returned capacity (both round to the
/// same mapping length). The mapped memory is zero-initialized.
pub fn allocate(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let capacity = round_to_pages(size);
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            capacity,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };
    if ptr.is_null() || ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    Ok((ptr, capacity))
}

/// Releases a mapping obtained from [`allocate`] or [`remap`].
///
/// # Arguments
///
/// * `ptr` - The mapping's base address.
/// * `size` - The size the mapping was requested with (rounded up internally
///   the same way [`allocate`] rounds it).
///
/// # Safety
///
/// `ptr` must have been returned by [`allocate`] or by the most recent
/// successful [`remap`] of such a mapping, `size` must match the size the
/// current mapping was established with, and the memory must not be accessed
/// afterwards.
pub unsafe fn free(ptr: *mut std::ffi::c_void, size: usize) -> std::io::Result<()> {
    let res = unsafe { libc::munmap(ptr, round_to_pages(size)) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Resizes a mapping in place, letting the kernel relocate its pages.
///
/// This is the primitive that makes growth cheap: on success the mapping's
/// byte image is preserved verbatim — the physical pages are re-linked into
/// the (possibly new) virtual range without any copy visible to the caller.
///
/// # Arguments
///
/// * `ptr` - The mapping's current base address.
/// * `old_size` - The size the mapping was last established with.
/// * `new_size` - The desired size; both sizes are rounded up to whole pages.
/// * `may_move` - Whether the kernel may move the mapping to a new address
///   to satisfy the request. Without it, resizing fails whenever the
///   adjacent address space is occupied.
///
/// # Returns
///
/// The (possibly unchanged) base address of the resized mapping, or
/// `Err(io::Error)` if the kernel cannot resize it. On error the original
/// mapping is left intact.
///
/// # Safety
///
/// `ptr` and `old_size` must describe a live mapping created by [`allocate`]
/// or a previous [`remap`]. After success, the old address must no longer be
/// used if the mapping moved.
pub unsafe fn remap(
    ptr: *mut std::ffi::c_void,
    old_size: usize,
    new_size: usize,
    may_move: bool,
) -> std::io::Result<*mut std::ffi::c_void> {
    let flags = if may_move { libc::MREMAP_MAYMOVE } else { 0 };
    let new_ptr = unsafe {
        libc::mremap(
            ptr,
            round_to_pages(old_size),
            round_to_pages(new_size),
            flags,
        )
    };
    if new_ptr == libc::MAP_FAILED {
        return Err(std::io::Error::last_os_error());
    }
    Ok(new_ptr)
}

/// Returns the system page size in bytes, cached after the first query.
///
/// Falls back to 4KB if `sysconf(_SC_PAGESIZE)` fails.
pub fn page_size() -> usize {
    static SIZE: OnceLock<usize> = OnceLock::new();
    *SIZE.get_or_init(|| match read_page_size() {
        Ok(size) => size,
        Err(_) => 4 * 1024,
    })
}

fn round_to_pages(size: usize) -> usize {
    let page_size = page_size();
    assert!(page_size.is_power_of_two());
    (size.max(1) + page_size - 1) & !(page_size - 1)
}

fn read_page_size() -> std::io::Result<usize> {
    let res = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if res < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(res as usize)
}
