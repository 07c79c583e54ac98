use std::alloc::{Layout, alloc_zeroed, dealloc};

/// Allocates a page-aligned block (emulated with the global allocator).
pub fn allocate(size: usize) -> std::io::Result<(*mut std::ffi::c_void, usize)> {
    let capacity = round_to_pages(size);
    let layout = Layout::from_size_align(capacity, page_size())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid layout"))?;

    let ptr = unsafe { alloc_zeroed(layout) };
    if ptr.is_null() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::OutOfMemory,
            "failed to allocate memory",
        ));
    }
    Ok((ptr as *mut std::ffi::c_void, capacity))
}

/// Releases a block obtained from [`allocate`].
///
/// # Safety
///
/// `ptr` must have been returned by [`allocate`] with the same `size`, and
/// the memory must not be accessed afterwards.
pub unsafe fn free(ptr: *mut std::ffi::c_void, size: usize) -> std::io::Result<()> {
    let capacity = round_to_pages(size);
    let layout = Layout::from_size_align(capacity, page_size())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "invalid layout"))?;
    unsafe {
        dealloc(ptr as *mut u8, layout);
    }
    Ok(())
}

/// In-place resizing is not available on this platform.
///
/// Always returns `Unsupported`; callers fall back to allocate-and-copy.
///
/// # Safety
///
/// No requirements — the mapping is never touched.
pub unsafe fn remap(
    _ptr: *mut std::ffi::c_void,
    _old_size: usize,
    _new_size: usize,
    _may_move: bool,
) -> std::io::Result<*mut std::ffi::c_void> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "page remapping is not supported on this platform",
    ))
}

/// Returns the emulated page size in bytes.
pub fn page_size() -> usize {
    4 * 1024
}

fn round_to_pages(size: usize) -> usize {
    let page_size = page_size();
    (size.max(1) + page_size - 1) & !(page_size - 1)
}
